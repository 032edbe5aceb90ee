use std::collections::BTreeMap;
use std::sync::RwLock;

use tracing::info;

use crate::header::TraceHeader;

/// Destination of sealed trace headers.
///
/// Sinks receive each header exactly once, by value, under its
/// [`TraceHeader::key`]. Implementations own their concurrency discipline.
pub trait TraceSink: Send + Sync {
    fn record(&self, key: String, header: TraceHeader);
}

/// Logs every header through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl TraceSink for LogSink {
    fn record(&self, key: String, header: TraceHeader) {
        info!(
            key = %key,
            client = %header.client,
            server = %header.server,
            api = %header.api,
            status = header.status,
            duration_ms = header.duration_ms(),
            annotation = header.annotation.as_deref().unwrap_or(""),
            "trace"
        );
    }
}

/// Keeps every header in memory, ordered by key.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: RwLock<BTreeMap<String, TraceHeader>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<TraceHeader> {
        self.records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    /// All headers recorded so far, ordered by key.
    pub fn records(&self) -> Vec<TraceHeader> {
        self.records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    /// Headers of one chain, ordered by `seq`.
    pub fn chain(&self, request_id: &str) -> Vec<TraceHeader> {
        let mut chain: Vec<_> = self
            .records()
            .into_iter()
            .filter(|h| h.request_id == request_id)
            .collect();
        chain.sort_by_key(|h| h.seq);
        chain
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TraceSink for MemorySink {
    fn record(&self, key: String, header: TraceHeader) {
        self.records
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, header);
    }
}
