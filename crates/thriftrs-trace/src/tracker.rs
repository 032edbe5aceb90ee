use std::future::Future;
use std::sync::Arc;

use thriftrs_common::ThriftError;
use tracing::debug;
use uuid::Uuid;

use crate::context::TraceContext;
use crate::header::{now_millis, TraceHeader};
use crate::sink::TraceSink;

/// Generates, propagates and records trace headers.
///
/// One tracker is shared (via `Arc`) by every client and processor of a
/// process. `client` labels the calls it issues, `server` the calls it serves.
pub struct Tracker {
    client: String,
    server: String,
    annotation: Option<String>,
    sink: Arc<dyn TraceSink>,
}

impl Tracker {
    pub fn new(client: impl Into<String>, server: impl Into<String>, sink: Arc<dyn TraceSink>) -> Self {
        Self {
            client: client.into(),
            server: server.into(),
            annotation: None,
            sink,
        }
    }

    /// Annotation stamped on every header this tracker generates.
    pub fn with_annotation(mut self, annotation: impl Into<String>) -> Self {
        self.annotation = Some(annotation.into());
        self
    }

    pub fn client(&self) -> &str {
        &self.client
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    /// Prepares `header` for an outbound call in the task's active chain.
    ///
    /// Inside a chain the request id is inherited and the chain's next `seq`
    /// is taken; otherwise a new chain is started with `seq = 0`.
    pub fn gen_header(&self, header: &mut TraceHeader) {
        self.gen_header_in(TraceContext::current().as_ref(), header);
    }

    /// [`Tracker::gen_header`] with an explicitly passed parent chain.
    pub fn gen_header_in(&self, parent: Option<&TraceContext>, header: &mut TraceHeader) {
        match parent {
            Some(ctx) => {
                header.request_id = ctx.request_id().to_string();
                header.seq = ctx.next_seq();
            }
            None => {
                header.request_id = Uuid::new_v4().to_string();
                header.seq = 0;
            }
        }
        header.client = self.client.clone();
        header.start = now_millis();
        if header.annotation.is_none() {
            header.annotation = self.annotation.clone();
        }
    }

    /// Accepts an inbound header on the server side.
    ///
    /// Stamps the local server label and returns the context to install while
    /// the call is handled.
    pub fn handle(&self, header: &mut TraceHeader) -> TraceContext {
        header.server = self.server.clone();
        TraceContext::from_header(header)
    }

    /// Runs `fut` inside the chain of an inbound header.
    ///
    /// Returns the chain context along with the output; its
    /// [`soa`](TraceContext::soa) belongs on the reply.
    pub async fn handle_scoped<F: Future>(&self, mut header: TraceHeader, fut: F) -> (F::Output, TraceContext) {
        let ctx = self.handle(&mut header);
        debug!(request_id = %header.request_id, seq = header.seq, "handling traced call");
        let output = ctx.clone().scope(fut).await;
        (output, ctx)
    }

    /// Seals `header` with the call's outcome and hands it to the sink.
    pub fn record(&self, mut header: TraceHeader, error: Option<&ThriftError>) {
        header.end = now_millis();
        header.status = error.is_none();
        if let Some(err) = error {
            debug!(key = %header.key(), error = %err, "traced call failed");
        }
        self.sink.record(header.key(), header);
    }
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("client", &self.client)
            .field("server", &self.server)
            .field("annotation", &self.annotation)
            .finish()
    }
}
