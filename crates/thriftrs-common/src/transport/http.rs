//! HTTP-JSON RPC Protocol
//!
//! Client side of a JSON-RPC dialect spoken over plain HTTP/1.1 POSTs.
//!
//! # Request
//!
//! ```text
//! POST /rpc HTTP/1.1
//! Content-Length: ..
//! Content-Encoding: UTF-8
//! Content-type: application/json
//! Connection: Keep-Alive
//!
//! {"ver":"1.0","method":"get","args":{"name":"\"alice\""},"soa":{},"iface":"","metas":{}}
//! ```
//!
//! Every argument is encoded on its own and carried as a JSON *string literal*.
//!
//! # Response
//!
//! ```text
//! {"ver":"1.0","soa":{..},"result":"<json text>"|null,"ex":{"cl":..,"fields":{..},"msg":..}|null}
//! ```
//!
//! A non-null `ex` is matched by its class name against the declared
//! exceptions of the method's result struct.
//!
//! The HTTP/1.1 exchange itself runs on a `hyper` client connection, driven
//! by a spawned task for as long as the protocol lives.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Bytes, Incoming};
use hyper::client::conn::http1::{self, SendRequest};
use hyper::header::{HeaderMap, CONNECTION, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, HOST};
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{Map, Value as Json};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::protocol::descriptor::SUCCESS_FIELD_ID;
use crate::protocol::error::{Result, ThriftError};
use crate::protocol::{Converter, MessageHeader, MessageType, Record, StructDescriptor};
use crate::transport::framed::DEFAULT_MAX_FRAME_SIZE;
use crate::transport::{Protocol, Transport};

/// Value of the `ver` key in requests, required in responses.
pub const HTTP_JSON_VERSION: &str = "1.0";

pub const DEFAULT_RPC_PATH: &str = "/rpc";

type ResponseFuture = Pin<Box<dyn Future<Output = hyper::Result<Response<Incoming>>> + Send>>;

enum Connection<T> {
    /// Handshake happens on the first request.
    Idle(T),
    Open {
        sender: SendRequest<Full<Bytes>>,
        driver: JoinHandle<()>,
    },
    Closed,
}

/// A request on the wire whose response has not been read yet.
struct Exchange {
    name: String,
    seqid: i32,
    response: ResponseFuture,
}

/// HTTP-JSON protocol over any byte stream.
///
/// The stream is kept alive across calls; one request and one response are
/// in flight at a time. An exchange that fails or times out halfway closes
/// the connection, and every later message fails with `ConnectionClosed`.
pub struct HttpJsonProtocol<T> {
    conn: Connection<T>,
    path: String,
    host: Option<String>,
    timeout: Option<Duration>,
    writing: bool,
    method: String,
    seqid: i32,
    args: Map<String, Json>,
    extra: Map<String, Json>,
    exchange: Option<Exchange>,
    response: Option<Map<String, Json>>,
}

impl<T: Transport + 'static> HttpJsonProtocol<T> {
    pub fn new(transport: T) -> Self {
        Self {
            conn: Connection::Idle(transport),
            path: DEFAULT_RPC_PATH.to_string(),
            host: None,
            timeout: None,
            writing: false,
            method: String::new(),
            seqid: 0,
            args: Map::new(),
            extra: Map::new(),
            exchange: None,
            response: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sends a `Host` header with every request.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Deadline for sending one request and for reading one response.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_open(&self) -> bool {
        !matches!(self.conn, Connection::Closed)
    }

    /// Drops any in-flight exchange and shuts the connection down.
    pub fn close(&mut self) {
        self.exchange = None;
        self.response = None;
        if let Connection::Open { driver, .. } = std::mem::replace(&mut self.conn, Connection::Closed) {
            driver.abort();
        }
    }

    /// Takes the pending request and resets the outgoing state.
    fn take_request(&mut self) -> Result<Request<Full<Bytes>>> {
        self.writing = false;
        let method = std::mem::take(&mut self.method);
        let args = std::mem::take(&mut self.args);
        let extra = std::mem::take(&mut self.extra);

        let mut body = Map::new();
        body.insert("ver".into(), Json::from(HTTP_JSON_VERSION));
        body.insert("method".into(), Json::from(method));
        body.insert("args".into(), Json::Object(args));
        body.insert("soa".into(), Json::Object(Map::new()));
        body.insert("iface".into(), Json::from(""));
        body.insert("metas".into(), Json::Object(Map::new()));
        for (key, value) in extra {
            body.insert(key, value);
        }
        let body = serde_json::to_vec(&Json::Object(body))?;

        let mut builder = Request::post(self.path.as_str());
        if let Some(host) = &self.host {
            builder = builder.header(HOST, host.as_str());
        }
        builder
            .header(CONTENT_LENGTH, body.len())
            .header(CONTENT_ENCODING, "UTF-8")
            .header(CONTENT_TYPE, "application/json")
            .header(CONNECTION, "Keep-Alive")
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| ThriftError::InvalidMessage(format!("cannot build request: {}", e)))
    }

    /// Handshakes on first use and waits until the connection takes a request.
    async fn ready_sender(&mut self) -> Result<&mut SendRequest<Full<Bytes>>> {
        self.conn = match std::mem::replace(&mut self.conn, Connection::Closed) {
            Connection::Idle(transport) => {
                let (sender, conn) = http1::Builder::new()
                    .title_case_headers(true)
                    .handshake(TokioIo::new(transport))
                    .await
                    .map_err(map_hyper_error)?;
                let driver = tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        debug!(error = %e, "HTTP connection closed with error");
                    }
                });
                Connection::Open { sender, driver }
            }
            other => other,
        };

        match &mut self.conn {
            Connection::Open { sender, .. } => {
                sender.ready().await.map_err(map_hyper_error)?;
                Ok(sender)
            }
            _ => Err(ThriftError::ConnectionClosed),
        }
    }
}

async fn bounded<F, R>(limit: Option<Duration>, fut: F) -> Result<R>
where
    F: Future<Output = Result<R>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| ThriftError::Timeout(limit.as_millis() as u64))?,
        None => fut.await,
    }
}

fn map_hyper_error(err: hyper::Error) -> ThriftError {
    if err.is_canceled() || err.is_closed() || err.is_incomplete_message() {
        ThriftError::ConnectionClosed
    } else if err.is_parse() || err.is_parse_status() {
        ThriftError::InvalidResponse(err.to_string())
    } else {
        ThriftError::Connection(format!("HTTP exchange failed: {}", err))
    }
}

/// Awaits the response head and collects its body.
async fn receive(response: ResponseFuture) -> Result<(StatusCode, HeaderMap, Bytes)> {
    let (parts, body) = response.await.map_err(map_hyper_error)?.into_parts();

    let declared = parts
        .headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<usize>().ok());
    if let Some(size) = declared.filter(|&size| size > DEFAULT_MAX_FRAME_SIZE) {
        return Err(ThriftError::MessageTooLarge {
            size,
            max: DEFAULT_MAX_FRAME_SIZE,
        });
    }

    let body = Limited::new(body, DEFAULT_MAX_FRAME_SIZE)
        .collect()
        .await
        .map_err(|e| match e.downcast::<hyper::Error>() {
            Ok(e) => map_hyper_error(*e),
            Err(e) if e.is::<LengthLimitError>() => ThriftError::InvalidResponse(format!(
                "response body exceeds {} bytes",
                DEFAULT_MAX_FRAME_SIZE
            )),
            Err(e) => ThriftError::InvalidResponse(e.to_string()),
        })?
        .to_bytes();

    Ok((parts.status, parts.headers, body))
}

/// Decodes a body with the charset named by its `Content-Type`.
fn decode_body(headers: &HeaderMap, body: &[u8]) -> Result<String> {
    let charset = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            v.split(';')
                .skip(1)
                .filter_map(|param| param.split_once('='))
                .find(|(key, _)| key.trim().eq_ignore_ascii_case("charset"))
                .map(|(_, value)| value.trim().trim_matches('"').to_ascii_lowercase())
        })
        .unwrap_or_else(|| "utf-8".to_string());

    match charset.as_str() {
        "utf-8" | "utf8" => std::str::from_utf8(body)
            .map(str::to_owned)
            .map_err(|e| ThriftError::InvalidResponse(format!("body is not valid utf-8: {}", e))),
        "us-ascii" | "ascii" => {
            if body.is_ascii() {
                Ok(body.iter().copied().map(char::from).collect())
            } else {
                Err(ThriftError::InvalidResponse("body is not valid us-ascii".into()))
            }
        }
        "iso-8859-1" | "latin-1" | "latin1" => Ok(body.iter().copied().map(char::from).collect()),
        other => Err(ThriftError::InvalidResponse(format!("unsupported charset {}", other))),
    }
}

/// Parses `text` as JSON, falling back to the plain string.
fn parse_lenient(text: &Json) -> Json {
    match text {
        Json::String(s) => serde_json::from_str(s).unwrap_or_else(|_| text.clone()),
        other => other.clone(),
    }
}

impl<T: Transport + 'static> Protocol for HttpJsonProtocol<T> {
    fn write_message_begin(&mut self, name: &str, _kind: MessageType, seqid: i32) -> Result<()> {
        self.writing = true;
        self.method = name.to_string();
        self.seqid = seqid;
        self.args.clear();
        Ok(())
    }

    fn write_metadata(&mut self, key: &str, value: Json) {
        self.extra.insert(key.to_string(), value);
    }

    async fn write_struct(&mut self, record: &Record) -> Result<()> {
        if !self.writing {
            return Err(ThriftError::ProtocolState("write_struct outside of a message".into()));
        }

        let descriptor = record.descriptor();
        for spec in descriptor.fields() {
            let node = match record.get_by_id(spec.id) {
                Some(value) => Converter::encode(value, &spec.ty)?,
                None if spec.required => {
                    return Err(ThriftError::MissingRequiredField {
                        struct_name: descriptor.name().to_string(),
                        field_name: spec.name.clone(),
                    });
                }
                None => Json::Null,
            };
            self.args
                .insert(spec.name.clone(), Json::String(serde_json::to_string(&node)?));
        }
        Ok(())
    }

    async fn write_message_end(&mut self) -> Result<()> {
        if !self.writing {
            return Err(ThriftError::ProtocolState("write_message_end outside of a message".into()));
        }
        let name = self.method.clone();
        let seqid = self.seqid;
        let request = self.take_request()?;
        self.response = None;
        self.exchange = None;

        let timeout = self.timeout;
        let sent = bounded(timeout, async {
            let sender = self.ready_sender().await?;
            Ok::<_, ThriftError>(sender.send_request(request))
        })
        .await;

        match sent {
            Ok(response) => {
                self.exchange = Some(Exchange {
                    name,
                    seqid,
                    response: Box::pin(response),
                });
                Ok(())
            }
            Err(e) => {
                self.close();
                Err(e)
            }
        }
    }

    async fn read_message_begin(&mut self) -> Result<MessageHeader> {
        self.response = None;
        if !self.is_open() {
            return Err(ThriftError::ConnectionClosed);
        }
        let exchange = self
            .exchange
            .take()
            .ok_or_else(|| ThriftError::ProtocolState("read_message_begin before a request was sent".into()))?;

        let (status, headers, body) = match bounded(self.timeout, receive(exchange.response)).await {
            Ok(response) => response,
            Err(e) => {
                self.close();
                return Err(e);
            }
        };

        if status != StatusCode::OK {
            let text = decode_body(&headers, &body)
                .unwrap_or_else(|_| String::from_utf8_lossy(&body).into_owned());
            return Err(ThriftError::HttpStatus {
                status: status.as_u16(),
                body: text,
            });
        }
        let text = decode_body(&headers, &body)?;

        let mime = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase());
        if mime.as_deref() != Some("application/json") {
            return Err(ThriftError::InvalidResponse(format!(
                "unexpected content type {}",
                mime.unwrap_or_else(|| "none".into())
            )));
        }

        let payload = match serde_json::from_str::<Json>(&text)? {
            Json::Object(payload) => payload,
            _ => return Err(ThriftError::InvalidResponse("response is not a JSON object".into())),
        };

        let version = payload.get("ver").and_then(Json::as_str);
        if version != Some(HTTP_JSON_VERSION) {
            return Err(ThriftError::BadVersion {
                expected: HTTP_JSON_VERSION.to_string(),
                found: version.unwrap_or("none").to_string(),
            });
        }

        self.response = Some(payload);
        Ok(MessageHeader::new(exchange.name, MessageType::Reply, exchange.seqid))
    }

    async fn read_struct(&mut self, descriptor: &Arc<StructDescriptor>) -> Result<Record> {
        let payload = self
            .response
            .as_ref()
            .ok_or_else(|| ThriftError::ProtocolState("read_struct before read_message_begin".into()))?;

        let mut node = Map::new();
        match payload.get("ex") {
            Some(Json::Object(ex)) => {
                let mut ex = ex.clone();
                if let Some(Json::Object(fields)) = ex.get_mut("fields") {
                    for value in fields.values_mut() {
                        *value = parse_lenient(value);
                    }
                }

                let class = ex.get("cl").and_then(Json::as_str).unwrap_or_default().to_string();
                let short = class.rsplit('.').next().unwrap_or_default();
                let field = descriptor.fields().find(|spec| {
                    spec.id != SUCCESS_FIELD_ID
                        && spec.ty.as_struct().map(|d| d.name()) == Some(short)
                });

                match field {
                    Some(spec) => {
                        node.insert(spec.name.clone(), Json::Object(ex));
                    }
                    None => {
                        let message = ex.get("msg").and_then(Json::as_str).unwrap_or_default();
                        return Err(ThriftError::UndefinedRemoteException {
                            class,
                            message: message.to_string(),
                        });
                    }
                }
            }
            _ => {
                let result = payload.get("result").map(parse_lenient).unwrap_or(Json::Null);
                node.insert("success".into(), result);
            }
        }

        Converter::decode_struct(&Json::Object(node), descriptor)
    }

    fn read_message_end(&mut self) -> Result<()> {
        Ok(())
    }

    fn metadata(&self, key: &str) -> Option<&Json> {
        self.response.as_ref().and_then(|payload| payload.get(key))
    }
}
