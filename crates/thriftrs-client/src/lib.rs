//! thriftrs RPC Client
//!
//! Clients issue calls described by a [`ServiceDescriptor`] over any
//! [`Protocol`](thriftrs_common::transport::Protocol):
//!
//! - [`Client`]: plain sequential client
//! - [`TrackedClient`]: wraps a client and traces every call through a
//!   [`Tracker`](thriftrs_trace::Tracker)
//! - [`connect_framed`] / [`connect_http`]: TCP connection helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use thriftrs_client::{connect_framed, ClientConfig};
//! use thriftrs_common::protocol::{FieldType, MethodDescriptor, ServiceDescriptor};
//!
//! # #[tokio::main]
//! # async fn main() -> thriftrs_common::Result<()> {
//! let service = Arc::new(ServiceDescriptor::new("Greeter").with_method(
//!     MethodDescriptor::builder("hello")
//!         .arg(1, "name", FieldType::String)
//!         .returns(FieldType::String)
//!         .build()?,
//! ));
//!
//! let mut client = connect_framed("127.0.0.1:9090", service, &ClientConfig::default()).await?;
//! let args = client.args("hello")?.with("name", "world")?;
//! let greeting = client.call("hello", args).await?;
//! println!("{:?}", greeting);
//! # Ok(())
//! # }
//! ```
//!
//! [`ServiceDescriptor`]: thriftrs_common::protocol::ServiceDescriptor

pub mod client;
pub mod connect;
pub mod tracked;

pub use client::Client;
pub use connect::{connect_framed, connect_http, ClientConfig, DEFAULT_TIMEOUT};
pub use tracked::TrackedClient;
