use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value as Json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::protocol::error::{Result, ThriftError};
use crate::protocol::{Converter, MessageHeader, MessageType, Record, StructDescriptor};
use crate::transport::tcp::{map_io_error, with_deadline};
use crate::transport::{Protocol, Transport};

/// Metadata version written into, and required from, every frame.
pub const FRAME_VERSION: i64 = 1;

/// Maximum frame size (100 MB); larger frames are rejected before allocation.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 100 * 1024 * 1024;

/// Length-prefixed JSON protocol.
///
/// # Wire Protocol
///
/// Each message is a single frame: a 4-byte length prefix (big-endian u32)
/// followed by a UTF-8 JSON object:
///
/// ```text
/// [4-byte length] {"metadata":{"version":1,"name":..,"ttype":..,"seqid":..},"payload":{..}}
/// ```
///
/// Extra metadata entries written with [`Protocol::write_metadata`] are merged
/// into the `metadata` object; entries received from the peer stay readable
/// through [`Protocol::metadata`] until the next frame arrives.
pub struct FramedJsonProtocol<T> {
    transport: T,
    max_frame_size: usize,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    outgoing: Map<String, Json>,
    incoming: Map<String, Json>,
    payload: Option<Json>,
}

/// Integer metadata entry: a JSON integer, an integral float or a decimal string.
fn as_int(value: &Json) -> Option<i64> {
    match value {
        Json::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() <= i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Json::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn initial_metadata() -> Map<String, Json> {
    let mut metadata = Map::new();
    metadata.insert("version".to_string(), Json::from(FRAME_VERSION));
    metadata
}

impl<T: Transport> FramedJsonProtocol<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            read_timeout: None,
            write_timeout: None,
            outgoing: initial_metadata(),
            incoming: Map::new(),
            payload: None,
        }
    }

    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Deadline for reading one whole frame. `None` waits forever.
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Deadline for writing one whole frame. `None` waits forever.
    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn get_ref(&self) -> &T {
        &self.transport
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    async fn read_frame(&mut self) -> Result<Json> {
        let limit = self.read_timeout;
        let reported = limit.unwrap_or_default();

        let mut len_buf = [0u8; 4];
        match with_deadline(limit, self.transport.read_exact(&mut len_buf)).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(ThriftError::ConnectionClosed);
            }
            Err(e) => return Err(map_io_error(e, "reading length prefix", reported)),
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        if len > self.max_frame_size {
            return Err(ThriftError::MessageTooLarge {
                size: len,
                max: self.max_frame_size,
            });
        }

        let mut buf = vec![0u8; len];
        with_deadline(limit, self.transport.read_exact(&mut buf))
            .await
            .map_err(|e| map_io_error(e, "reading frame", reported))?;

        Ok(serde_json::from_slice(&buf)?)
    }

    /// Reads one frame, gates it on the metadata version and buffers its payload.
    async fn fill(&mut self) -> Result<()> {
        self.payload = None;

        let mut frame = match self.read_frame().await? {
            Json::Object(frame) => frame,
            _ => return Err(ThriftError::InvalidMessage("frame is not a JSON object".into())),
        };

        let metadata = match frame.remove("metadata") {
            Some(Json::Object(metadata)) => metadata,
            _ => return Err(ThriftError::InvalidMessage("frame has no metadata".into())),
        };

        let version = metadata.get("version");
        if version.and_then(as_int) != Some(FRAME_VERSION) {
            return Err(ThriftError::BadVersion {
                expected: FRAME_VERSION.to_string(),
                found: version.map(|v| v.to_string()).unwrap_or_else(|| "none".into()),
            });
        }

        let payload = frame
            .remove("payload")
            .ok_or_else(|| ThriftError::InvalidMessage("frame has no payload".into()))?;

        self.incoming = metadata;
        self.payload = Some(payload);
        Ok(())
    }
}

impl<T: Transport> Protocol for FramedJsonProtocol<T> {
    fn write_message_begin(&mut self, name: &str, kind: MessageType, seqid: i32) -> Result<()> {
        self.outgoing.insert("name".into(), Json::from(name));
        self.outgoing.insert("ttype".into(), Json::from(kind.as_i32()));
        self.outgoing.insert("seqid".into(), Json::from(seqid));
        Ok(())
    }

    fn write_metadata(&mut self, key: &str, value: Json) {
        self.outgoing.insert(key.to_string(), value);
    }

    async fn write_struct(&mut self, record: &Record) -> Result<()> {
        let payload = Converter::encode_struct(record)?;

        let mut frame = Map::new();
        frame.insert("metadata".into(), Json::Object(self.outgoing.clone()));
        frame.insert("payload".into(), payload);
        let data = serde_json::to_vec(&Json::Object(frame))?;

        if data.len() > self.max_frame_size || data.len() > u32::MAX as usize {
            return Err(ThriftError::MessageTooLarge {
                size: data.len(),
                max: self.max_frame_size,
            });
        }

        let mut out = Vec::with_capacity(4 + data.len());
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend_from_slice(&data);

        with_deadline(self.write_timeout, self.transport.write_all(&out))
            .await
            .map_err(|e| map_io_error(e, "writing frame", self.write_timeout.unwrap_or_default()))
    }

    async fn write_message_end(&mut self) -> Result<()> {
        self.outgoing = initial_metadata();
        with_deadline(self.write_timeout, self.transport.flush())
            .await
            .map_err(|e| map_io_error(e, "flushing stream", self.write_timeout.unwrap_or_default()))
    }

    async fn read_message_begin(&mut self) -> Result<MessageHeader> {
        self.fill().await?;

        let name = self
            .incoming
            .get("name")
            .and_then(Json::as_str)
            .ok_or_else(|| ThriftError::InvalidMessage("metadata has no name".into()))?
            .to_string();
        let kind = self
            .incoming
            .get("ttype")
            .and_then(as_int)
            .and_then(|t| i32::try_from(t).ok())
            .and_then(MessageType::from_i32)
            .ok_or_else(|| ThriftError::InvalidMessage("metadata has no valid ttype".into()))?;
        let seqid = match self.incoming.get("seqid") {
            None => 0,
            Some(raw) => as_int(raw)
                .and_then(|v| i32::try_from(v).ok())
                .ok_or_else(|| ThriftError::InvalidMessage(format!("seqid {} is not an i32", raw)))?,
        };

        Ok(MessageHeader { name, kind, seqid })
    }

    async fn read_struct(&mut self, descriptor: &Arc<StructDescriptor>) -> Result<Record> {
        if self.payload.is_none() {
            self.fill().await?;
        }
        match self.payload.take() {
            Some(payload) => Converter::decode_struct(&payload, descriptor),
            None => Err(ThriftError::ProtocolState("no payload buffered".into())),
        }
    }

    fn read_message_end(&mut self) -> Result<()> {
        self.payload = None;
        Ok(())
    }

    fn metadata(&self, key: &str) -> Option<&Json> {
        self.incoming.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{FieldType, Value};
    use crate::transport::MemoryBuffer;
    use serde_json::json;

    fn item() -> Arc<StructDescriptor> {
        StructDescriptor::builder("Item")
            .field(1, "id", FieldType::I32)
            .field(2, "phones", FieldType::list(FieldType::String))
            .build()
            .unwrap()
    }

    fn frame(body: &Json) -> Vec<u8> {
        let data = serde_json::to_vec(body).unwrap();
        let mut out = (data.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(&data);
        out
    }

    #[tokio::test]
    async fn test_item_frame_layout() {
        let record = Record::new(&item())
            .with("id", 13)
            .unwrap()
            .with("phones", vec![Value::from("5234"), Value::from("12346456")])
            .unwrap();

        let mut proto = FramedJsonProtocol::new(MemoryBuffer::new());
        proto.write_message_begin("get", MessageType::Call, 7).unwrap();
        proto.write_struct(&record).await.unwrap();
        proto.write_message_end().await.unwrap();

        let written = proto.get_ref().value().to_vec();
        let len = u32::from_be_bytes([written[0], written[1], written[2], written[3]]) as usize;
        assert_eq!(len, written.len() - 4);
        assert_eq!(
            std::str::from_utf8(&written[4..]).unwrap(),
            r#"{"metadata":{"version":1,"name":"get","ttype":1,"seqid":7},"payload":{"id":13,"phones":["5234","12346456"]}}"#
        );

        let header = proto.read_message_begin().await.unwrap();
        assert_eq!(header, MessageHeader::new("get", MessageType::Call, 7));
        assert_eq!(proto.read_struct(&item()).await.unwrap(), record);
        proto.read_message_end().unwrap();
    }

    #[tokio::test]
    async fn test_extra_metadata_merged_and_reset() {
        let mut proto = FramedJsonProtocol::new(MemoryBuffer::new());
        proto.write_metadata("soa", json!({"req": "abc", "rpc": "0"}));
        proto.write_message_begin("ping", MessageType::Call, 1).unwrap();
        proto.write_struct(&Record::new(&item())).await.unwrap();
        proto.write_message_end().await.unwrap();

        proto.write_message_begin("ping", MessageType::Call, 2).unwrap();
        proto.write_struct(&Record::new(&item())).await.unwrap();
        proto.write_message_end().await.unwrap();

        proto.read_message_begin().await.unwrap();
        assert_eq!(proto.metadata("soa"), Some(&json!({"req": "abc", "rpc": "0"})));
        proto.read_struct(&item()).await.unwrap();

        let header = proto.read_message_begin().await.unwrap();
        assert_eq!(header.seqid, 2);
        assert!(proto.metadata("soa").is_none());
    }

    #[tokio::test]
    async fn test_bad_version_rejected() {
        let body = json!({"metadata": {"version": 2, "name": "x", "ttype": 1, "seqid": 0}, "payload": {"id": "oops"}});
        let mut proto = FramedJsonProtocol::new(MemoryBuffer::with_value(frame(&body)));

        let err = proto.read_message_begin().await.unwrap_err();
        assert!(matches!(err, ThriftError::BadVersion { ref found, .. } if found == "2"));
    }

    #[tokio::test]
    async fn test_integral_metadata_spellings_accepted() {
        for version in [json!("1"), json!(1.0)] {
            let body = json!({"metadata": {"version": version, "name": "x", "ttype": "2", "seqid": 9.0}, "payload": {}});
            let mut proto = FramedJsonProtocol::new(MemoryBuffer::with_value(frame(&body)));

            let header = proto.read_message_begin().await.unwrap();
            assert_eq!(header, MessageHeader::new("x", MessageType::Reply, 9));
        }

        let body = json!({"metadata": {"version": 1.5, "name": "x", "ttype": 1}, "payload": {}});
        let mut proto = FramedJsonProtocol::new(MemoryBuffer::with_value(frame(&body)));
        let err = proto.read_message_begin().await.unwrap_err();
        assert!(matches!(err, ThriftError::BadVersion { .. }));
    }

    #[tokio::test]
    async fn test_seqid_out_of_range_rejected() {
        for seqid in [json!(4_294_967_296i64), json!(-2_147_483_649i64), json!("many")] {
            let body = json!({"metadata": {"version": 1, "name": "x", "ttype": 1, "seqid": seqid}, "payload": {}});
            let mut proto = FramedJsonProtocol::new(MemoryBuffer::with_value(frame(&body)));

            let err = proto.read_message_begin().await.unwrap_err();
            assert!(matches!(err, ThriftError::InvalidMessage(ref m) if m.contains("seqid")));
        }
    }

    #[tokio::test]
    async fn test_lazy_read_struct_is_version_gated() {
        let body = json!({"metadata": {"name": "x", "ttype": 1, "seqid": 0}, "payload": {}});
        let mut proto = FramedJsonProtocol::new(MemoryBuffer::with_value(frame(&body)));

        let err = proto.read_struct(&item()).await.unwrap_err();
        assert!(matches!(err, ThriftError::BadVersion { .. }));
    }

    #[tokio::test]
    async fn test_lazy_read_struct() {
        let body = json!({"metadata": {"version": 1}, "payload": {"id": 5}});
        let mut proto = FramedJsonProtocol::new(MemoryBuffer::with_value(frame(&body)));

        let record = proto.read_struct(&item()).await.unwrap();
        assert_eq!(record.get("id"), Some(&Value::I32(5)));
    }

    #[tokio::test]
    async fn test_frame_too_large() {
        let body = json!({"metadata": {"version": 1}, "payload": {"phones": ["a long phone number"]}});
        let mut proto =
            FramedJsonProtocol::new(MemoryBuffer::with_value(frame(&body))).with_max_frame_size(16);

        let err = proto.read_message_begin().await.unwrap_err();
        assert!(matches!(err, ThriftError::MessageTooLarge { max: 16, .. }));
    }

    #[tokio::test]
    async fn test_eof_is_connection_closed() {
        let mut proto = FramedJsonProtocol::new(MemoryBuffer::new());
        let err = proto.read_message_begin().await.unwrap_err();
        assert!(matches!(err, ThriftError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_missing_name_is_invalid() {
        let body = json!({"metadata": {"version": 1, "ttype": 1}, "payload": {}});
        let mut proto = FramedJsonProtocol::new(MemoryBuffer::with_value(frame(&body)));

        let err = proto.read_message_begin().await.unwrap_err();
        assert!(matches!(err, ThriftError::InvalidMessage(_)));
    }

    #[tokio::test]
    async fn test_read_timeout() {
        let (client, _server) = tokio::io::duplex(64);
        let mut proto =
            FramedJsonProtocol::new(client).with_read_timeout(Some(Duration::from_millis(20)));

        let err = proto.read_message_begin().await.unwrap_err();
        assert!(matches!(err, ThriftError::Timeout(20)));
    }

    #[tokio::test]
    async fn test_duplex_exchange() {
        let (client, server) = tokio::io::duplex(1024);
        let mut client = FramedJsonProtocol::new(client);
        let mut server = FramedJsonProtocol::new(server);

        let record = Record::new(&item()).with("id", 1).unwrap();
        client.write_message_begin("get", MessageType::Call, 3).unwrap();
        client.write_struct(&record).await.unwrap();
        client.write_message_end().await.unwrap();

        let header = server.read_message_begin().await.unwrap();
        assert_eq!(header.name, "get");
        assert_eq!(server.read_struct(&item()).await.unwrap(), record);
    }
}
