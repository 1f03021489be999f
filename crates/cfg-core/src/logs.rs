//! Rule log: a bounded FIFO of [`LogEntry`] records and the sink contract the
//! engine writes through.

use std::collections::VecDeque;

use serde_json::Value;

use crate::error::SinkError;
use crate::store::{RuleStore, StatePatch};
use crate::types::LogEntry;

/// Entries kept in the persisted log.
pub const LOG_CAPACITY: usize = 200;

/// Accepts log entries. Delivery failures are reported but the engine never
/// lets them interrupt a pass.
#[allow(async_fn_in_trait)]
pub trait LogSink {
    async fn append(&self, entry: LogEntry) -> Result<(), SinkError>;
}

/// Bounded log; pushing past capacity evicts the oldest entry.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRing<T = LogEntry> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> Default for LogRing<T> {
    fn default() -> Self {
        Self::with_capacity(LOG_CAPACITY)
    }
}

impl<T> LogRing<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(LOG_CAPACITY)),
            capacity,
        }
    }

    /// Adopt an existing log, dropping the oldest entries beyond capacity.
    pub fn from_entries(entries: Vec<T>, capacity: usize) -> Self {
        let mut entries = VecDeque::from(entries);
        while entries.len() > capacity {
            entries.pop_front();
        }
        Self { entries, capacity }
    }

    pub fn push(&mut self, entry: T) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.entries.into()
    }
}

/// Sink that appends to the `logs` array of a [`RuleStore`].
///
/// Read-modify-write over the raw stored entries, so records this build
/// cannot decode are carried along rather than rewritten. Concurrent appends
/// from several tabs can lose entries.
pub struct StoreLogSink<S> {
    store: S,
    capacity: usize,
}

impl<S: RuleStore> StoreLogSink<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            capacity: LOG_CAPACITY,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: RuleStore> LogSink for StoreLogSink<S> {
    async fn append(&self, entry: LogEntry) -> Result<(), SinkError> {
        let doc = self.store.read_raw().await?;
        let logs = match doc.get("logs") {
            Some(Value::Array(logs)) => logs.clone(),
            _ => Vec::new(),
        };
        let entry = serde_json::to_value(entry).map_err(|e| SinkError(e.to_string()))?;
        let mut ring = LogRing::from_entries(logs, self.capacity);
        ring.push(entry);
        self.store.write(StatePatch::logs(ring.into_vec())).await?;
        Ok(())
    }
}
