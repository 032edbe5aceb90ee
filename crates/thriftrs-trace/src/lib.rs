//! thriftrs Call Tracing
//!
//! This crate threads causally linked identifiers through chained RPC calls
//! and records the outcome and duration of every call.
//!
//! # Architecture
//!
//! The tracing layer is built around four pieces:
//!
//! - [`TraceHeader`]: the per-call record (`request_id`, `seq`, labels, timing)
//! - [`TraceContext`]: the chain a task is working for, installed as a
//!   task-local while an inbound call is handled
//! - [`Tracker`]: generates headers for outbound calls, accepts inbound ones
//!   and seals finished calls
//! - [`TraceSink`]: where sealed headers go ([`LogSink`], [`MemorySink`])
//!
//! # Chains
//!
//! A call made outside any chain starts a new one: a fresh UUID v4 request id
//! and `seq = 0`. A server handling that call installs its context, and every
//! call it makes meanwhile inherits the request id and takes the next `seq`:
//!
//! ```text
//! A --(req r, seq 0)--> B --(req r, seq 1)--> C
//!                         \-(req r, seq 2)--> D
//! ```
//!
//! # Usage Example
//!
//! ```rust
//! use std::sync::Arc;
//! use thriftrs_trace::{MemorySink, TraceHeader, TraceSink, Tracker};
//!
//! let sink = Arc::new(MemorySink::new());
//! let tracker = Tracker::new("web", "api", sink.clone() as Arc<dyn TraceSink>);
//!
//! let mut header = TraceHeader::default();
//! tracker.gen_header(&mut header);
//! header.api = "ping".into();
//! // ... perform the call ...
//! let key = header.key();
//! tracker.record(header, None);
//!
//! assert!(sink.get(&key).unwrap().status);
//! ```

mod context;
mod header;
mod sink;
mod tracker;

pub use context::TraceContext;
pub use header::{now_millis, TraceHeader};
pub use sink::{LogSink, MemorySink, TraceSink};
pub use tracker::Tracker;
