use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::{json, Value as Json};

use crate::header::TraceHeader;

tokio::task_local! {
    static ACTIVE_TRACE: TraceContext;
}

#[derive(Debug)]
struct ChainState {
    request_id: String,
    last_seq: AtomicU64,
}

/// The causal chain a task is currently working for.
///
/// Installed for the duration of an inbound call with [`TraceContext::scope`].
/// Clones share one sequence counter, so every outbound call issued within
/// the chain gets a distinct, increasing `seq`.
///
/// Counters of different processes meet through replies: a traced reply
/// reports the highest `seq` its side handed out, and the caller absorbs it
/// with [`TraceContext::absorb`] before issuing its next call.
///
/// Spawned tasks do not inherit the active context; pass
/// [`TraceContext::current`] into them and re-scope explicitly.
#[derive(Debug, Clone)]
pub struct TraceContext {
    inner: Arc<ChainState>,
}

impl TraceContext {
    pub fn new(request_id: impl Into<String>, seq: u64) -> Self {
        Self {
            inner: Arc::new(ChainState {
                request_id: request_id.into(),
                last_seq: AtomicU64::new(seq),
            }),
        }
    }

    /// Context continuing the chain of an inbound header.
    pub fn from_header(header: &TraceHeader) -> Self {
        Self::new(header.request_id.clone(), header.seq)
    }

    /// The context installed on the current task, if any.
    pub fn current() -> Option<Self> {
        ACTIVE_TRACE.try_with(|ctx| ctx.clone()).ok()
    }

    pub fn request_id(&self) -> &str {
        &self.inner.request_id
    }

    /// Highest `seq` handed out in this chain so far.
    pub fn last_seq(&self) -> u64 {
        self.inner.last_seq.load(Ordering::SeqCst)
    }

    /// Allocates the `seq` of the next call in this chain.
    pub fn next_seq(&self) -> u64 {
        self.inner.last_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Moves the counter up to `seq` if it is behind.
    pub fn advance(&self, seq: u64) {
        self.inner.last_seq.fetch_max(seq, Ordering::SeqCst);
    }

    /// Takes in the highest `seq` reported by a reply of this chain.
    /// Replies of other chains are ignored.
    pub fn absorb(&self, reply: &TraceHeader) {
        if reply.request_id == self.inner.request_id {
            self.advance(reply.seq);
        }
    }

    /// The `soa` entry a server attaches to its reply: the chain's request
    /// id and the highest `seq` handed out so far.
    pub fn soa(&self) -> Json {
        json!({"req": self.request_id(), "rpc": self.last_seq()})
    }

    /// Runs `fut` with this context installed. The context is removed when
    /// the future completes or is dropped.
    pub async fn scope<F: Future>(self, fut: F) -> F::Output {
        ACTIVE_TRACE.scope(self, fut).await
    }

    /// Synchronous counterpart of [`TraceContext::scope`].
    pub fn sync_scope<R>(self, f: impl FnOnce() -> R) -> R {
        ACTIVE_TRACE.sync_scope(self, f)
    }
}
