//! Transaction log event types.
//!
//! An append-only, sequence-numbered record per Stream rather than mutable
//! state, so a subscriber can replay "what did publisher P commit as
//! transaction N" by reconstructing it from the event log.

use serde::{Deserialize, Serialize};

/// What happened to one publisher's data inside a Stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransactionEventKind {
    /// A publisher committed a transaction for `variable`, with the given
    /// local byte size (post-reduction, if any was applied) and a content
    /// fingerprint derived from the transaction manifest.
    Committed { variable: String, publisher: String, local_size: u64, fingerprint: String },
    /// A subscriber completed a `get` against a committed transaction.
    Consumed { variable: String, subscriber: String, transaction_seq: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionEvent {
    pub seq: u64,
    pub stream: String,
    pub kind: TransactionEventKind,
    /// Simulated time at which this event was recorded.
    pub sim_time: f64,
}
