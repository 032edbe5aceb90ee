use std::sync::Arc;
use std::time::Duration;

use thriftrs_common::protocol::error::{Result, ThriftError};
use thriftrs_common::protocol::{
    ApplicationException, DeclaredException, MessageType, MethodDescriptor, Record,
    ServiceDescriptor, Value, SUCCESS_FIELD,
};
use thriftrs_common::transport::Protocol;
use tracing::debug;

/// RPC client over any [`Protocol`].
///
/// Calls are strictly sequential: each call writes one message and, unless
/// the method is oneway, reads one reply before returning.
///
/// A call that stops between sending its request and reading the reply
/// (timeout, transport failure, out-of-sequence reply) leaves the stream out
/// of sync. The client is then broken and every later call fails with
/// `ConnectionClosed`.
pub struct Client<P> {
    protocol: P,
    service: Arc<ServiceDescriptor>,
    seqid: i32,
    timeout: Option<Duration>,
    in_flight: bool,
    broken: bool,
}

impl<P: Protocol> Client<P> {
    pub fn new(protocol: P, service: Arc<ServiceDescriptor>) -> Self {
        Self {
            protocol,
            service,
            seqid: 0,
            timeout: None,
            in_flight: false,
            broken: false,
        }
    }

    /// Bounds every call, request and reply together.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn service(&self) -> &Arc<ServiceDescriptor> {
        &self.service
    }

    pub fn protocol_mut(&mut self) -> &mut P {
        &mut self.protocol
    }

    pub fn into_protocol(self) -> P {
        self.protocol
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    pub fn method(&self, api: &str) -> Result<&Arc<MethodDescriptor>> {
        self.service
            .method(api)
            .ok_or_else(|| ThriftError::UnknownMethod(format!("{}.{}", self.service.name(), api)))
    }

    /// An empty argument record for `api`, to be filled by the caller.
    pub fn args(&self, api: &str) -> Result<Record> {
        Ok(Record::new(self.method(api)?.args()))
    }

    /// Calls `api` with `args`.
    ///
    /// # Returns
    ///
    /// The `success` value, or `None` for void and oneway methods.
    ///
    /// # Errors
    ///
    /// - `UserException` when the server raised a declared exception
    /// - `Application` when the server replied with an exception message
    /// - `MissingResult` when a non-void method returned nothing
    /// - `Timeout` when the call exceeded the configured timeout
    /// - `ConnectionClosed` once an earlier call broke the client
    pub async fn call(&mut self, api: &str, args: Record) -> Result<Option<Value>> {
        if self.broken {
            return Err(ThriftError::ConnectionClosed);
        }

        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.send_and_receive(api, args))
                .await
                .map_err(|_| ThriftError::Timeout(limit.as_millis() as u64))
                .and_then(|result| result),
            None => self.send_and_receive(api, args).await,
        };

        if self.in_flight {
            self.in_flight = false;
            self.broken = true;
            debug!(api, "call interrupted mid-exchange, client closed");
        }
        result
    }

    async fn send_and_receive(&mut self, api: &str, args: Record) -> Result<Option<Value>> {
        let method = Arc::clone(self.method(api)?);
        if args.name() != method.args().name() {
            return Err(ThriftError::InvalidMessage(format!(
                "{} expects {}, got {}",
                api,
                method.args().name(),
                args.name()
            )));
        }

        self.seqid = self.seqid.wrapping_add(1);
        let kind = if method.is_oneway() {
            MessageType::Oneway
        } else {
            MessageType::Call
        };
        debug!(api, seqid = self.seqid, "sending call");

        self.in_flight = true;
        self.protocol.write_message_begin(api, kind, self.seqid)?;
        self.protocol.write_struct(&args).await?;
        self.protocol.write_message_end().await?;

        if method.is_oneway() {
            self.in_flight = false;
            return Ok(None);
        }

        let header = self.protocol.read_message_begin().await?;
        if header.seqid != self.seqid {
            return Err(ApplicationException::bad_sequence_id(api, self.seqid, header.seqid).into());
        }
        self.in_flight = false;
        if header.kind == MessageType::Exception {
            let record = self
                .protocol
                .read_struct(ApplicationException::descriptor())
                .await?;
            self.protocol.read_message_end()?;
            return Err(ApplicationException::from_record(&record)?.into());
        }

        let mut result = self.protocol.read_struct(method.result()).await?;
        self.protocol.read_message_end()?;

        if let Some(value) = result.take(SUCCESS_FIELD) {
            return Ok(Some(value));
        }
        for spec in method.exception_fields() {
            if let Some(Value::Struct(exception)) = result.get_by_id(spec.id) {
                return Err(DeclaredException {
                    field: spec.name.clone(),
                    exception: exception.clone(),
                }
                .into());
            }
        }

        if method.returns_value() {
            return Err(ThriftError::MissingResult(api.to_string()));
        }
        Ok(None)
    }
}
