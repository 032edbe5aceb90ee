//! thriftrs Common Types and Protocols
//!
//! This crate provides the type descriptors, the structural converter and the
//! wire protocols shared by every thriftrs component.
//!
//! # Overview
//!
//! thriftrs is a Thrift-style RPC stack where record shapes are declared
//! through descriptors instead of generated code. This crate contains:
//!
//! - **Protocol Layer**: descriptors, runtime values, the converter between
//!   values and JSON trees, message envelopes and error handling
//! - **Transport Layer**: the framed-JSON and HTTP-JSON protocols and the
//!   streams they run on
//!
//! # Architecture
//!
//! - **Serialization**: JSON trees produced by the descriptor-driven [`Converter`]
//! - **Framed wire format**: `[4-byte length prefix as u32 big-endian] + [JSON frame]`
//! - **HTTP wire format**: JSON-RPC bodies over HTTP/1.1 keep-alive connections
//! - **Max Message Size**: 100 MB (prevents memory exhaustion)
//!
//! # Components
//!
//! - [`protocol`] - Descriptors, values, converter, messages, errors
//! - [`transport`] - Protocols, in-memory buffer and TCP helpers
//!
//! # Example
//!
//! ```
//! use thriftrs_common::{Converter, FieldType, Record, StructDescriptor, Value};
//!
//! let item = StructDescriptor::builder("Item")
//!     .field(1, "id", FieldType::I32)
//!     .field(2, "phones", FieldType::list(FieldType::String))
//!     .build()
//!     .unwrap();
//!
//! let record = Record::new(&item)
//!     .with("id", 13)
//!     .unwrap()
//!     .with("phones", vec![Value::from("5234")])
//!     .unwrap();
//!
//! let node = Converter::encode_struct(&record).unwrap();
//! assert_eq!(node.to_string(), r#"{"id":13,"phones":["5234"]}"#);
//! assert_eq!(Converter::decode_struct(&node, &item).unwrap(), record);
//! ```

pub mod protocol;
pub mod transport;

pub use protocol::*;
