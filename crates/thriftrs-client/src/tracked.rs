use std::sync::Arc;

use serde_json::Value as Json;
use thriftrs_common::protocol::error::{Result, ThriftError};
use thriftrs_common::protocol::{Record, ServiceDescriptor, Value};
use thriftrs_common::transport::Protocol;
use thriftrs_trace::{TraceContext, TraceHeader, Tracker};

use crate::client::Client;

/// A [`Client`] that traces every call it makes.
///
/// Each call gets a header from the tracker, whose `soa` entry (and the
/// optional `iface` label) travel to the server as message metadata. The
/// header is sealed with the call's outcome once the call returns; any error,
/// a declared exception included, records `status = false`. A reply's `soa`
/// moves the active chain past the seqs the callee handed out.
pub struct TrackedClient<P> {
    inner: Client<P>,
    tracker: Arc<Tracker>,
    iface: Option<String>,
}

impl<P: Protocol> TrackedClient<P> {
    pub fn new(inner: Client<P>, tracker: Arc<Tracker>) -> Self {
        Self {
            inner,
            tracker,
            iface: None,
        }
    }

    /// Interface label sent as `iface` metadata, e.g. `"demo.AddressBook"`.
    pub fn with_iface(mut self, iface: impl Into<String>) -> Self {
        self.iface = Some(iface.into());
        self
    }

    pub fn tracker(&self) -> &Arc<Tracker> {
        &self.tracker
    }

    pub fn service(&self) -> &Arc<ServiceDescriptor> {
        self.inner.service()
    }

    pub fn args(&self, api: &str) -> Result<Record> {
        self.inner.args(api)
    }

    pub fn inner_mut(&mut self) -> &mut Client<P> {
        &mut self.inner
    }

    pub fn into_inner(self) -> Client<P> {
        self.inner
    }

    /// Calls `api` with `args`, recording the call with the tracker.
    pub async fn call(&mut self, api: &str, args: Record) -> Result<Option<Value>> {
        let mut header = TraceHeader::default();
        self.tracker.gen_header(&mut header);
        header.api = api.to_string();
        header.server = self.tracker.server().to_string();

        let protocol = self.inner.protocol_mut();
        protocol.write_metadata("soa", header.soa());
        if let Some(iface) = &self.iface {
            protocol.write_metadata("iface", Json::from(iface.as_str()));
        }

        let result = self.inner.call(api, args).await;

        let replied = match &result {
            Ok(_) => true,
            Err(e) => e.declared().is_some() || matches!(e, ThriftError::Application(_)),
        };
        if replied {
            let reply = self
                .inner
                .protocol_mut()
                .metadata("soa")
                .and_then(TraceHeader::from_soa);
            if let (Some(ctx), Some(reply)) = (TraceContext::current(), reply) {
                ctx.absorb(&reply);
            }
        }

        self.tracker.record(header, result.as_ref().err());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use thriftrs_common::protocol::{FieldType, MessageType, MethodDescriptor};
    use thriftrs_common::transport::FramedJsonProtocol;
    use thriftrs_trace::{MemorySink, TraceSink};
    use tokio::io::DuplexStream;

    fn service() -> Arc<ServiceDescriptor> {
        Arc::new(
            ServiceDescriptor::new("Echo").with_method(
                MethodDescriptor::builder("echo")
                    .arg(1, "text", FieldType::String)
                    .returns(FieldType::String)
                    .build()
                    .unwrap(),
            ),
        )
    }

    /// Echoes `text` back and returns the metadata the call carried.
    async fn echo_once(stream: DuplexStream) -> (Option<Json>, Option<Json>) {
        let service = service();
        let mut proto = FramedJsonProtocol::new(stream);
        let header = proto.read_message_begin().await.unwrap();
        let soa = proto.metadata("soa").cloned();
        let iface = proto.metadata("iface").cloned();
        let method = service.method(&header.name).unwrap();
        let mut args = proto.read_struct(method.args()).await.unwrap();

        let text = args.take("text").unwrap();
        let result = Record::new(method.result()).with("success", text).unwrap();
        proto.write_message_begin(&header.name, MessageType::Reply, header.seqid).unwrap();
        proto.write_struct(&result).await.unwrap();
        proto.write_message_end().await.unwrap();
        (soa, iface)
    }

    fn tracked(stream: DuplexStream, sink: &Arc<MemorySink>) -> TrackedClient<FramedJsonProtocol<DuplexStream>> {
        let tracker = Arc::new(Tracker::new("web", "echo", sink.clone() as Arc<dyn TraceSink>));
        TrackedClient::new(Client::new(FramedJsonProtocol::new(stream), service()), tracker)
    }

    #[tokio::test]
    async fn test_tracked_call_sends_soa_and_records() {
        let (a, b) = tokio::io::duplex(4096);
        let server = tokio::spawn(echo_once(b));
        let sink = Arc::new(MemorySink::new());

        let mut client = tracked(a, &sink).with_iface("demo.Echo");
        let args = client.args("echo").unwrap().with("text", "hi").unwrap();
        assert_eq!(client.call("echo", args).await.unwrap(), Some(Value::from("hi")));

        let (soa, iface) = server.await.unwrap();
        let soa = soa.unwrap();
        assert_eq!(soa["rpc"], json!(0));
        assert_eq!(iface, Some(json!("demo.Echo")));

        let records = sink.records();
        assert_eq!(records.len(), 1);
        let header = &records[0];
        assert_eq!(soa["req"], json!(header.request_id));
        assert_eq!(header.api, "echo");
        assert_eq!(header.client, "web");
        assert_eq!(header.server, "echo");
        assert!(header.status);
    }

    #[tokio::test]
    async fn test_tracked_call_inherits_chain() {
        let (a, b) = tokio::io::duplex(4096);
        let server = tokio::spawn(echo_once(b));
        let sink = Arc::new(MemorySink::new());
        let mut client = tracked(a, &sink);

        TraceContext::new("chain", 0)
            .scope(async {
                let args = client.args("echo").unwrap().with("text", "hi").unwrap();
                client.call("echo", args).await.unwrap();
            })
            .await;

        let (soa, iface) = server.await.unwrap();
        assert_eq!(soa, Some(json!({"req": "chain", "rpc": 1})));
        assert_eq!(iface, None);
        assert_eq!(sink.chain("chain").len(), 1);
    }

    #[tokio::test]
    async fn test_reply_soa_advances_chain() {
        let (a, b) = tokio::io::duplex(4096);
        let server = tokio::spawn(async move {
            let service = service();
            let mut proto = FramedJsonProtocol::new(b);
            let mut seen = Vec::new();
            for reported in [4, 0] {
                let header = proto.read_message_begin().await.unwrap();
                seen.push(proto.metadata("soa").cloned().unwrap());
                let method = service.method(&header.name).unwrap();
                let mut args = proto.read_struct(method.args()).await.unwrap();

                let result = Record::new(method.result()).with("success", args.take("text").unwrap()).unwrap();
                proto.write_metadata("soa", json!({"req": "chain", "rpc": reported}));
                proto.write_message_begin(&header.name, MessageType::Reply, header.seqid).unwrap();
                proto.write_struct(&result).await.unwrap();
                proto.write_message_end().await.unwrap();
            }
            seen
        });
        let sink = Arc::new(MemorySink::new());
        let mut client = tracked(a, &sink);

        let ctx = TraceContext::new("chain", 0);
        ctx.clone()
            .scope(async {
                for text in ["one", "two"] {
                    let args = client.args("echo").unwrap().with("text", text).unwrap();
                    client.call("echo", args).await.unwrap();
                }
            })
            .await;

        // The callee reported seqs up to 4, so the next call takes 5.
        let seen = server.await.unwrap();
        assert_eq!(seen[0]["rpc"], json!(1));
        assert_eq!(seen[1]["rpc"], json!(5));
        assert_eq!(ctx.last_seq(), 5);
        let seqs: Vec<_> = sink.chain("chain").iter().map(|h| h.seq).collect();
        assert_eq!(seqs, vec![1, 5]);
    }

    #[tokio::test]
    async fn test_failed_call_records_false_status() {
        let (a, b) = tokio::io::duplex(4096);
        drop(b);
        let sink = Arc::new(MemorySink::new());
        let mut client = tracked(a, &sink);

        let args = client.args("echo").unwrap().with("text", "hi").unwrap();
        assert!(client.call("echo", args).await.is_err());

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert!(!records[0].status);
    }
}
