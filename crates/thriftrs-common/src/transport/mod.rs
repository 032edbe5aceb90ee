//! thriftrs Transport Layer
//!
//! This module provides the wire protocols that carry RPC messages over a
//! byte stream, plus the stream helpers they run on.
//!
//! # Architecture
//!
//! Every protocol implements [`Protocol`], a message-level state machine:
//!
//! ```text
//! write_message_begin -> [write_metadata] -> write_struct -> write_message_end
//! read_message_begin  -> read_struct      -> read_message_end
//! ```
//!
//! Struct payloads are always encoded by the [`Converter`](crate::protocol::Converter);
//! protocols only own framing, metadata and exception marshaling.
//!
//! # Components
//!
//! - **[`FramedJsonProtocol`]**: `[4-byte length as u32 big-endian] + [JSON frame]`
//! - **[`HttpJsonProtocol`]**: JSON-RPC over HTTP/1.1 (client side)
//! - **[`MemoryBuffer`]**: In-memory stream for tests and tooling
//! - **[`connect`]** / **[`map_io_error`]**: TCP helpers
//!
//! # Example
//!
//! ```
//! use thriftrs_common::protocol::{FieldType, MessageType, Record, StructDescriptor};
//! use thriftrs_common::transport::{FramedJsonProtocol, MemoryBuffer, Protocol};
//!
//! # #[tokio::main]
//! # async fn main() -> thriftrs_common::Result<()> {
//! let args = StructDescriptor::builder("ping_args").build()?;
//! let mut proto = FramedJsonProtocol::new(MemoryBuffer::new());
//!
//! proto.write_message_begin("ping", MessageType::Call, 1)?;
//! proto.write_struct(&Record::new(&args)).await?;
//! proto.write_message_end().await?;
//!
//! let header = proto.read_message_begin().await?;
//! assert_eq!(header.name, "ping");
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;

use serde_json::Value as Json;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::protocol::{MessageHeader, MessageType, Record, Result, StructDescriptor};

pub mod framed;
pub mod http;
pub mod memory;
pub mod tcp;

pub use framed::{FramedJsonProtocol, DEFAULT_MAX_FRAME_SIZE, FRAME_VERSION};
pub use http::{HttpJsonProtocol, DEFAULT_RPC_PATH, HTTP_JSON_VERSION};
pub use memory::MemoryBuffer;
pub use tcp::{connect, map_io_error};


/// Any byte stream a protocol can run on.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

/// Message-level protocol state machine.
///
/// One message is in flight per direction; read and write state are
/// independent of each other.
pub trait Protocol: Send {
    /// Opens an outgoing message.
    fn write_message_begin(&mut self, name: &str, kind: MessageType, seqid: i32) -> Result<()>;

    /// Attaches an extra metadata entry to the outgoing message.
    ///
    /// Used by the tracing layer to inject `soa` and `iface`.
    fn write_metadata(&mut self, key: &str, value: Json);

    fn write_struct(&mut self, record: &Record) -> impl Future<Output = Result<()>> + Send;

    /// Sends the message and resets the outgoing state.
    fn write_message_end(&mut self) -> impl Future<Output = Result<()>> + Send;

    fn read_message_begin(&mut self) -> impl Future<Output = Result<MessageHeader>> + Send;

    fn read_struct(
        &mut self,
        descriptor: &Arc<StructDescriptor>,
    ) -> impl Future<Output = Result<Record>> + Send;

    fn read_message_end(&mut self) -> Result<()>;

    /// Metadata entry of the most recently received message.
    fn metadata(&self, key: &str) -> Option<&Json>;
}
