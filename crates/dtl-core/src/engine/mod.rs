//! Engine: a per-`open()` session carrying the transaction state machine.
//! Two concrete variants exist, `FileEngine` and `StagingEngine`; `Engine`
//! is a small dispatched capability set over both, so callers that don't
//! care which Transport backs a Stream can still drive
//! `begin_transaction`/`put`/`get`/`end_transaction`/`close` uniformly.

pub mod file_engine;
pub mod staging_engine;

pub use file_engine::FileEngine;
pub use staging_engine::StagingEngine;

use crate::constants::DTL_VERSION;
use crate::errors::DtlError;
use crate::hashing::hash_value;
use crate::model::Variable;

/// Access mode an Engine was opened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Publish,
    Subscribe,
}

/// Per-Engine transaction state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Opened,
    InTransaction,
    Closed,
    Failed,
}

/// One buffered `put`/`get` request inside the currently open transaction.
///
/// `bytes` is the total across `transaction_selection.count()` historical
/// transactions; on the subscribe side, `transfers` preserves the
/// per-publisher breakdown needed to read/move each
/// publisher's slab separately rather than as one lump sum. Publish-side
/// requests leave `transfers` empty: there is exactly one writer.
#[derive(Debug, Clone)]
pub(crate) struct BufferedRequest {
    pub variable: Variable,
    pub bytes: u64,
    pub transfers: Vec<(String, u64)>,
}

/// Dispatched handle over the two concrete Engine variants.
#[derive(Debug)]
pub enum Engine {
    File(FileEngine),
    Staging(StagingEngine),
}

impl Engine {
    pub fn mode(&self) -> Mode {
        match self {
            Engine::File(e) => e.mode(),
            Engine::Staging(e) => e.mode(),
        }
    }

    pub fn state(&self) -> EngineState {
        match self {
            Engine::File(e) => e.state(),
            Engine::Staging(e) => e.state(),
        }
    }

    pub fn current_transaction_id(&self) -> u64 {
        match self {
            Engine::File(e) => e.current_transaction_id(),
            Engine::Staging(e) => e.current_transaction_id(),
        }
    }

    pub fn begin_transaction(&mut self) -> Result<(), DtlError> {
        match self {
            Engine::File(e) => e.begin_transaction(),
            Engine::Staging(e) => e.begin_transaction(),
        }
    }

    pub fn put(&mut self, var: &Variable, explicit_bytes: Option<u64>) -> Result<(), DtlError> {
        match self {
            Engine::File(e) => e.put(var, explicit_bytes),
            Engine::Staging(e) => e.put(var, explicit_bytes),
        }
    }

    pub fn get(&mut self, var: &Variable) -> Result<(), DtlError> {
        match self {
            Engine::File(e) => e.get(var),
            Engine::Staging(e) => e.get(var),
        }
    }

    pub fn end_transaction(&mut self) -> Result<(), DtlError> {
        match self {
            Engine::File(e) => e.end_transaction(),
            Engine::Staging(e) => e.end_transaction(),
        }
    }

    pub fn close(&mut self) -> Result<(), DtlError> {
        match self {
            Engine::File(e) => e.close(),
            Engine::Staging(e) => e.close(),
        }
    }
}

/// Shared state-machine transition checks used by both engine variants.
pub(crate) fn require_state(current: EngineState, expected: EngineState, op: &str) -> Result<(), DtlError> {
    if current == expected {
        Ok(())
    } else {
        Err(DtlError::UsageError(format!("cannot call {op} while Engine is in state {current:?} (expected {expected:?})")))
    }
}

/// Content fingerprint for one committed `(variable, bytes, transaction)`
/// manifest entry, folding in `DTL_VERSION` so a change to the DTL's own
/// semantics shows up in the fingerprint even when the data and the
/// stream definition did not change. Canonicalized through `hash_value`
/// rather than a hand-built format string so the fingerprint is stable
/// under key reordering the way the manifest's JSON representation would
/// be if it were ever written out literally.
pub(crate) fn manifest_fingerprint(variable: &str, bytes: u64, transaction_id: u64) -> String {
    hash_value(&serde_json::json!({
        "dtl_version": DTL_VERSION,
        "variable": variable,
        "bytes": bytes,
        "transaction_id": transaction_id,
    }))
}
