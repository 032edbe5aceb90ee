//! thriftrs
//!
//! IDL-driven JSON RPC with causal call tracing. This facade re-exports the
//! workspace crates:
//!
//! - [`common`]: descriptors, values, the converter and the wire protocols
//! - [`trace`]: trace headers, chains, trackers and sinks
//! - [`client`]: plain and tracked clients
//! - [`server`]: processor and TCP server

pub use thriftrs_client as client;
pub use thriftrs_common as common;
pub use thriftrs_server as server;
pub use thriftrs_trace as trace;

pub use thriftrs_common::{Result, ThriftError};
