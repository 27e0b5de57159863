//! Reporting sinks for check results.

use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::warn;

use skyaudit_core::CheckResult;

/// Receives every result as soon as a unit produces it.
///
/// `report` must not block: it is called from inside scan tasks.
pub trait ReportSink: Send + Sync {
    fn report(&self, result: CheckResult);
}

/// Forwards results over an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<CheckResult>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<CheckResult>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ReportSink for ChannelSink {
    fn report(&self, result: CheckResult) {
        if let Err(e) = self.tx.send(result) {
            warn!(rule_id = %e.0.rule_id, "result receiver dropped, discarding result");
        }
    }
}

/// Collects results in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    results: Mutex<Vec<CheckResult>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything reported so far.
    pub fn results(&self) -> Vec<CheckResult> {
        self.results.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn take(&self) -> Vec<CheckResult> {
        std::mem::take(&mut *self.results.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.results.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReportSink for MemorySink {
    fn report(&self, result: CheckResult) {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyaudit_core::ScanScope;

    fn result(rule: &str) -> CheckResult {
        CheckResult::pass(rule, "doc", "res", ScanScope::new("aws", "1", "r", "s"))
    }

    #[tokio::test]
    async fn channel_sink_delivers_in_order() {
        let (sink, mut rx) = ChannelSink::new();
        sink.report(result("a"));
        sink.report(result("b"));
        drop(sink);

        let mut seen = Vec::new();
        while let Some(r) = rx.recv().await {
            seen.push(r.rule_id);
        }
        assert_eq!(seen, vec!["a", "b"]);
    }

    #[test]
    fn channel_sink_survives_dropped_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.report(result("a"));
    }

    #[test]
    fn memory_sink_take_drains() {
        let sink = MemorySink::new();
        sink.report(result("a"));
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.take().len(), 1);
        assert!(sink.is_empty());
    }
}
