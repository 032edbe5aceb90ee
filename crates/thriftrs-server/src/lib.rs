//! thriftrs Server
//!
//! This crate serves a [`ServiceDescriptor`](thriftrs_common::protocol::ServiceDescriptor)
//! over Framed-JSON TCP connections.
//!
//! # Architecture
//!
//! - [`Handler`]: the service implementation, one async entry point per call
//! - [`Processor`]: reads a call, dispatches it to the handler and writes the
//!   reply, optionally inside the caller's trace chain
//! - [`TcpServer`]: accept loop spawning one task per connection
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use thriftrs_common::protocol::{FieldType, MethodDescriptor, Record, ServiceDescriptor, Value};
//! use thriftrs_common::Result;
//! use thriftrs_server::{Handler, Processor, TcpServer};
//!
//! struct Greeter;
//!
//! impl Handler for Greeter {
//!     async fn handle(&self, _method: &str, args: Record) -> Result<Option<Value>> {
//!         let name = args.get("name").and_then(Value::as_str).unwrap_or("world");
//!         Ok(Some(Value::from(format!("hello {}", name))))
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<()> {
//! let service = Arc::new(ServiceDescriptor::new("Greeter").with_method(
//!     MethodDescriptor::builder("hello")
//!         .arg(1, "name", FieldType::String)
//!         .returns(FieldType::String)
//!         .build()?,
//! ));
//!
//! let processor = Arc::new(Processor::new(service, Arc::new(Greeter)));
//! TcpServer::new("127.0.0.1:9090").await?.run(processor).await
//! # }
//! ```

pub mod processor;
pub mod tcp_server;

pub use processor::{Handler, Processor};
pub use tcp_server::{ServerConfig, TcpServer};
