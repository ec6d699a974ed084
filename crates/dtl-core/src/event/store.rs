//! Transaction log storage.

use std::collections::HashMap;

use crate::event::types::{TransactionEvent, TransactionEventKind};

/// Append-only log of transaction events, keyed by stream name: an engine
/// never mutates history, it only appends and later queries by sequence.
pub trait TransactionLog {
    fn append(&mut self, stream: &str, kind: TransactionEventKind, sim_time: f64) -> TransactionEvent;
    fn list(&self, stream: &str) -> Vec<TransactionEvent>;
    /// Committed transactions for `variable` published by `publisher`, in
    /// commit order. Used to resolve `TransactionSelection::{Single,Range}`.
    fn committed_for(&self, stream: &str, variable: &str, publisher: &str) -> Vec<TransactionEvent>;
}

#[derive(Debug, Default)]
pub struct InMemoryTransactionLog {
    events: HashMap<String, Vec<TransactionEvent>>,
    next_seq: u64,
}

impl InMemoryTransactionLog {
    pub fn new() -> Self {
        Self { events: HashMap::new(), next_seq: 0 }
    }
}

impl TransactionLog for InMemoryTransactionLog {
    fn append(&mut self, stream: &str, kind: TransactionEventKind, sim_time: f64) -> TransactionEvent {
        let seq = self.next_seq;
        self.next_seq += 1;
        let event = TransactionEvent { seq, stream: stream.to_string(), kind, sim_time };
        self.events.entry(stream.to_string()).or_default().push(event.clone());
        event
    }

    fn list(&self, stream: &str) -> Vec<TransactionEvent> {
        self.events.get(stream).cloned().unwrap_or_default()
    }

    fn committed_for(&self, stream: &str, variable: &str, publisher: &str) -> Vec<TransactionEvent> {
        self.list(stream)
            .into_iter()
            .filter(|e| matches!(&e.kind, TransactionEventKind::Committed { variable: v, publisher: p, .. } if v == variable && p == publisher))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_list_preserve_order() {
        let mut log = InMemoryTransactionLog::new();
        log.append("s1", TransactionEventKind::Committed { variable: "v".into(), publisher: "p0".into(), local_size: 8, fingerprint: "abc".into() }, 0.0);
        log.append("s1", TransactionEventKind::Committed { variable: "v".into(), publisher: "p0".into(), local_size: 8, fingerprint: "def".into() }, 1.0);
        let events = log.list("s1");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].seq, 0);
        assert_eq!(events[1].seq, 1);
    }

    #[test]
    fn committed_for_filters_by_variable_and_publisher() {
        let mut log = InMemoryTransactionLog::new();
        log.append("s1", TransactionEventKind::Committed { variable: "v".into(), publisher: "p0".into(), local_size: 8, fingerprint: "a".into() }, 0.0);
        log.append("s1", TransactionEventKind::Committed { variable: "v".into(), publisher: "p1".into(), local_size: 8, fingerprint: "b".into() }, 0.0);
        let p0_only = log.committed_for("s1", "v", "p0");
        assert_eq!(p0_only.len(), 1);
    }
}
