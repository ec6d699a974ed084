//! `Stream`: named coupling channel binding a metadata store to an Engine
//! type + Transport method.
//!
//! A `Stream` is a cheap-to-clone handle over mutex-guarded shared state:
//! every actor that has the Stream in scope (via `Dtl::add_stream`) sees
//! the *same* Variable registry, publisher/subscriber counters, and
//! transaction log, shared by all connected actors the way a process-wide
//! map would be. The simulator this crate targets is cooperative
//! (mutation between yield points is safe), so a `std::sync::Mutex`
//! guarding short, non-yielding critical sections is sufficient without
//! needing the mutation itself to ever block on I/O.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use log::{debug, info};

use crate::collab::{FileSystemBackend, NetworkBackend, SimClock};
use crate::engine::{Engine, FileEngine, Mode, StagingEngine};
use crate::errors::DtlError;
use crate::event::{InMemoryTransactionLog, TransactionEvent, TransactionEventKind, TransactionLog};
use crate::model::reduction::{attach_reduction, AttachedReduction, ReductionKind, ReductionParams};
use crate::model::variable::validate_definition;
use crate::model::Variable;
use crate::transport::{check_combination, EngineType, TransportMethod};

/// Canonical record for one Variable name within a Stream's metadata
/// store: the identity (shape/element_size) every co-defining actor must
/// agree on, the local slab each publisher has registered under that name
/// (used by the intersection arithmetic in `selection`), and any
/// reduction a publisher has attached (propagated to subscribers on
/// `inquire_variable`).
#[derive(Debug, Clone)]
pub(crate) struct VariableRecord {
    pub shape: Vec<u64>,
    pub element_size: u64,
    pub publisher_regions: BTreeMap<String, (Vec<u64>, Vec<u64>)>,
    pub publisher_reduction: Option<AttachedReduction>,
}

impl VariableRecord {
    fn same_identity(&self, shape: &[u64], element_size: u64) -> bool {
        self.shape == shape && self.element_size == element_size
    }
}

#[derive(Debug)]
struct StreamInner {
    name: String,
    engine_type: Option<EngineType>,
    transport_method: Option<TransportMethod>,
    metadata_export: bool,
    locked_by_preset: bool,
    variables: IndexMap<String, VariableRecord>,
    num_publishers: u64,
    num_subscribers: u64,
    next_file_publisher_index: u64,
    file_publisher_index: IndexMap<String, u64>,
    tx_log: InMemoryTransactionLog,
}

/// Named coupling channel; see module docs.
#[derive(Debug, Clone)]
pub struct Stream {
    inner: Arc<Mutex<StreamInner>>,
}

impl Stream {
    pub(crate) fn new_plain(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StreamInner {
                name: name.into(),
                engine_type: None,
                transport_method: None,
                metadata_export: true,
                locked_by_preset: false,
                variables: IndexMap::new(),
                num_publishers: 0,
                num_subscribers: 0,
                next_file_publisher_index: 0,
                file_publisher_index: IndexMap::new(),
                tx_log: InMemoryTransactionLog::new(),
            })),
        }
    }

    pub(crate) fn from_preset(name: impl Into<String>, engine_type: EngineType, transport_method: TransportMethod, metadata_export: bool) -> Result<Self, DtlError> {
        check_combination(engine_type, transport_method)?;
        let name = name.into();
        Ok(Self {
            inner: Arc::new(Mutex::new(StreamInner {
                name,
                engine_type: Some(engine_type),
                transport_method: Some(transport_method),
                metadata_export,
                locked_by_preset: true,
                variables: IndexMap::new(),
                num_publishers: 0,
                num_subscribers: 0,
                next_file_publisher_index: 0,
                file_publisher_index: IndexMap::new(),
                tx_log: InMemoryTransactionLog::new(),
            })),
        })
    }

    pub fn name(&self) -> String {
        self.inner.lock().unwrap().name.clone()
    }

    pub fn engine_type(&self) -> Option<EngineType> {
        self.inner.lock().unwrap().engine_type
    }

    pub fn transport_method(&self) -> Option<TransportMethod> {
        self.inner.lock().unwrap().transport_method
    }

    pub fn metadata_export(&self) -> bool {
        self.inner.lock().unwrap().metadata_export
    }

    pub fn num_publishers(&self) -> u64 {
        self.inner.lock().unwrap().num_publishers
    }

    pub fn num_subscribers(&self) -> u64 {
        self.inner.lock().unwrap().num_subscribers
    }

    /// Sets the engine type. Builder-style: returns a cloned handle so
    /// callers can chain `.set_engine_type(..)?.set_transport_method(..)?`
    /// the way `original_source/test/python/*.py` chains these calls.
    ///
    /// On a config preset (`locked_by_preset`), only a call consistent
    /// with the preset's own engine/transport pair is allowed; anything
    /// that would move the stream away from it fails.
    pub fn set_engine_type(&self, engine_type: EngineType) -> Result<Self, DtlError> {
        let mut guard = self.inner.lock().unwrap();
        if guard.locked_by_preset && guard.engine_type != Some(engine_type) {
            return Err(DtlError::UsageError(format!(
                "stream '{}' is config-locked to engine_type {:?}",
                guard.name,
                guard.engine_type
            )));
        }
        if let Some(transport) = guard.transport_method {
            check_combination(engine_type, transport)?;
        }
        guard.engine_type = Some(engine_type);
        debug!("stream '{}': engine_type set to {engine_type:?}", guard.name);
        drop(guard);
        Ok(self.clone())
    }

    pub fn set_transport_method(&self, transport_method: TransportMethod) -> Result<Self, DtlError> {
        let mut guard = self.inner.lock().unwrap();
        if guard.locked_by_preset && guard.transport_method != Some(transport_method) {
            return Err(DtlError::UsageError(format!(
                "stream '{}' is config-locked to transport_method {:?}",
                guard.name,
                guard.transport_method
            )));
        }
        if let Some(engine_type) = guard.engine_type {
            check_combination(engine_type, transport_method)?;
        }
        guard.transport_method = Some(transport_method);
        debug!("stream '{}': transport_method set to {transport_method:?}", guard.name);
        drop(guard);
        Ok(self.clone())
    }

    pub fn set_metadata_export(&self) -> Self {
        self.inner.lock().unwrap().metadata_export = true;
        self.clone()
    }

    pub fn unset_metadata_export(&self) -> Self {
        self.inner.lock().unwrap().metadata_export = false;
        self.clone()
    }

    /// `kind ∈ {"decimation", "compression"}`; anything else fails
    /// `UnknownReductionMethod`.
    pub fn define_reduction_method(&self, kind: &str) -> Result<ReductionKind, DtlError> {
        match kind {
            "decimation" => Ok(ReductionKind::Decimation),
            "compression" => Ok(ReductionKind::Compression),
            other => Err(DtlError::UnknownReductionMethod(other.to_string())),
        }
    }

    /// Attaches (or re-parameterizes) a reduction on `var`. Publisher-side
    /// attachments are recorded into the metadata store so
    /// later `inquire_variable` calls see them; subscriber-side
    /// attachments stay local to `var`.
    pub fn set_reduction_operation(&self, var: &mut Variable, kind: ReductionKind, params: &ReductionParams, applied_by_publisher: bool) -> Result<(), DtlError> {
        if !applied_by_publisher {
            if let Some(record) = self.inner.lock().unwrap().variables.get(&var.name) {
                if let Some(publisher_reduction) = &record.publisher_reduction {
                    var.reduction = Some(publisher_reduction.clone());
                }
            }
        }
        attach_reduction(var, kind, params, applied_by_publisher)?;
        if applied_by_publisher {
            let mut guard = self.inner.lock().unwrap();
            if let Some(record) = guard.variables.get_mut(&var.name) {
                record.publisher_reduction = var.reduction.clone();
            }
        }
        Ok(())
    }

    /// N-dimensional definition/redefinition. `actor_id` identifies the
    /// calling publisher so multiple actors can co-define
    /// the same name, each owning its own `(start, count)` slab.
    pub fn define_variable(&self, actor_id: &str, name: &str, shape: Vec<u64>, start: Vec<u64>, count: Vec<u64>, element_size: u64) -> Result<Variable, DtlError> {
        validate_definition(&shape, &start, &count, element_size)?;
        let mut guard = self.inner.lock().unwrap();
        let stream_name = guard.name.clone();
        match guard.variables.get_mut(name) {
            Some(record) => {
                if !record.same_identity(&shape, element_size) {
                    return Err(DtlError::MultipleVariableDefinition(name.to_string()));
                }
                record.publisher_regions.insert(actor_id.to_string(), (start.clone(), count.clone()));
            }
            None => {
                let mut publisher_regions = BTreeMap::new();
                publisher_regions.insert(actor_id.to_string(), (start.clone(), count.clone()));
                guard.variables.insert(
                    name.to_string(),
                    VariableRecord { shape: shape.clone(), element_size, publisher_regions, publisher_reduction: None },
                );
            }
        }
        drop(guard);
        debug!("stream '{stream_name}': actor '{actor_id}' defined variable '{name}'");
        Variable::new_ndim(name, shape, start, count, element_size)
    }

    /// Scalar overload: `define_variable(name, element_size)`.
    pub fn define_scalar_variable(&self, actor_id: &str, name: &str, element_size: u64) -> Result<Variable, DtlError> {
        self.define_variable(actor_id, name, Vec::new(), Vec::new(), Vec::new(), element_size)
    }

    pub fn remove_variable(&self, name: &str) -> Result<(), DtlError> {
        let mut guard = self.inner.lock().unwrap();
        if guard.variables.shift_remove(name).is_none() {
            return Err(DtlError::UnknownVariable(name.to_string()));
        }
        Ok(())
    }

    /// Returns a fresh `Variable` describing the whole global shape,
    /// carrying forward any publisher-side reduction so subsequent
    /// `set_reduction_operation` calls can enforce §4.3's preconditions.
    pub fn inquire_variable(&self, name: &str) -> Result<Variable, DtlError> {
        let guard = self.inner.lock().unwrap();
        let record = guard.variables.get(name).ok_or_else(|| DtlError::UnknownVariable(name.to_string()))?;
        let mut var = Variable::new_ndim(name, record.shape.clone(), vec![0; record.shape.len()], record.shape.clone(), record.element_size)?;
        var.reduction = record.publisher_reduction.clone();
        Ok(var)
    }

    pub fn all_variables(&self) -> Vec<String> {
        self.inner.lock().unwrap().variables.keys().cloned().collect()
    }

    /// Opens a Publish- or Subscribe-mode session against this Stream,
    /// dispatching to the File or Staging engine by whichever
    /// `engine_type` the Stream was configured with. `uri` is a File
    /// engine URI when `engine_type() == Some(EngineType::File)`, or an
    /// opaque Staging rendezvous name otherwise.
    pub fn open(
        &self,
        uri: &str,
        mode: Mode,
        actor_id: &str,
        clock: Arc<dyn SimClock>,
        fs: Arc<dyn FileSystemBackend>,
        net: Arc<dyn NetworkBackend>,
    ) -> Result<Engine, DtlError> {
        let engine_type = self.engine_type().ok_or(DtlError::UndefinedEngineType)?;
        self.transport_method().ok_or(DtlError::UndefinedTransportMethod)?;
        match engine_type {
            EngineType::File => Ok(Engine::File(FileEngine::open(self, uri, mode, actor_id, clock, fs)?)),
            EngineType::Staging => Ok(Engine::Staging(StagingEngine::open(self, uri, mode, actor_id, clock, net)?)),
        }
    }

    pub(crate) fn publisher_regions_for(&self, name: &str) -> BTreeMap<String, (Vec<u64>, Vec<u64>)> {
        self.inner
            .lock()
            .unwrap()
            .variables
            .get(name)
            .map(|r| r.publisher_regions.clone())
            .unwrap_or_default()
    }

    pub(crate) fn record_publisher_open(&self, actor_id: &str) -> u64 {
        let mut guard = self.inner.lock().unwrap();
        let index = guard.next_file_publisher_index;
        guard.next_file_publisher_index += 1;
        guard.num_publishers += 1;
        guard.file_publisher_index.insert(actor_id.to_string(), index);
        info!("stream '{}': publisher opened (rank {index}, total {})", guard.name, guard.num_publishers);
        index
    }

    /// The `data.<k>` rank assigned to `publisher` at `open` time, used to
    /// locate its backing file on the File engine's subscriber side.
    pub(crate) fn file_publisher_index(&self, publisher: &str) -> Option<u64> {
        self.inner.lock().unwrap().file_publisher_index.get(publisher).copied()
    }

    pub(crate) fn record_publisher_close(&self) {
        let mut guard = self.inner.lock().unwrap();
        guard.num_publishers = guard.num_publishers.saturating_sub(1);
        info!("stream '{}': publisher closed ({} remain)", guard.name, guard.num_publishers);
    }

    pub(crate) fn record_subscriber_open(&self) {
        let mut guard = self.inner.lock().unwrap();
        guard.num_subscribers += 1;
        info!("stream '{}': subscriber opened (total {})", guard.name, guard.num_subscribers);
    }

    pub(crate) fn record_subscriber_close(&self) {
        let mut guard = self.inner.lock().unwrap();
        guard.num_subscribers = guard.num_subscribers.saturating_sub(1);
        info!("stream '{}': subscriber closed ({} remain)", guard.name, guard.num_subscribers);
    }

    pub(crate) fn commit_transaction(&self, variable: &str, publisher: &str, local_size: u64, fingerprint: String, sim_time: f64) -> TransactionEvent {
        let mut guard = self.inner.lock().unwrap();
        let stream_name = guard.name.clone();
        guard.tx_log.append(
            &stream_name,
            TransactionEventKind::Committed { variable: variable.to_string(), publisher: publisher.to_string(), local_size, fingerprint },
            sim_time,
        )
    }

    pub(crate) fn committed_for(&self, variable: &str, publisher: &str) -> Vec<TransactionEvent> {
        let guard = self.inner.lock().unwrap();
        guard.tx_log.committed_for(&guard.name, variable, publisher)
    }

    /// Records that `subscriber` completed a `get` for `variable` at the
    /// engine-local transaction `transaction_seq` (the subscribing
    /// Engine's own `current_transaction_id`, not a publisher's).
    pub(crate) fn record_consumption(&self, variable: &str, subscriber: &str, transaction_seq: u64, sim_time: f64) -> TransactionEvent {
        let mut guard = self.inner.lock().unwrap();
        let stream_name = guard.name.clone();
        guard.tx_log.append(
            &stream_name,
            TransactionEventKind::Consumed { variable: variable.to_string(), subscriber: subscriber.to_string(), transaction_seq },
            sim_time,
        )
    }

    /// Number of transactions `publisher` has committed for `variable` so
    /// far; the upper bound a subscriber needs before calling
    /// `Variable::set_transaction_selection_single`/`_range`.
    pub fn transaction_count(&self, variable: &str, publisher: &str) -> u64 {
        self.committed_for(variable, publisher).len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_stream_and_define_variable_roundtrip() {
        let stream = Stream::new_plain("s");
        stream.set_engine_type(EngineType::File).unwrap().set_transport_method(TransportMethod::File).unwrap();
        let var = stream.define_variable("pub-0", "var", vec![10, 10], vec![0, 0], vec![10, 10], 8).unwrap();
        assert_eq!(var.global_size().unwrap(), 800);
        assert_eq!(stream.all_variables(), vec!["var".to_string()]);

        let inquired = stream.inquire_variable("var").unwrap();
        assert_eq!(inquired.global_size().unwrap(), 800);
    }

    #[test]
    fn redefinition_changing_identity_fails() {
        let stream = Stream::new_plain("s");
        stream.define_variable("pub-0", "var", vec![10, 10], vec![0, 0], vec![10, 10], 8).unwrap();
        let err = stream.define_variable("pub-0", "var", vec![20, 20], vec![0, 0], vec![20, 20], 8).unwrap_err();
        assert!(matches!(err, DtlError::MultipleVariableDefinition(_)));
    }

    #[test]
    fn redefinition_changing_only_region_succeeds() {
        let stream = Stream::new_plain("s");
        stream.define_variable("pub-0", "var", vec![10, 10], vec![0, 0], vec![5, 10], 8).unwrap();
        stream.define_variable("pub-0", "var", vec![10, 10], vec![5, 0], vec![5, 10], 8).unwrap();
        let regions = stream.publisher_regions_for("var");
        assert_eq!(regions.get("pub-0"), Some(&(vec![5, 0], vec![5, 10])));
    }

    #[test]
    fn invalid_engine_transport_combination_rejected() {
        let stream = Stream::new_plain("s");
        stream.set_engine_type(EngineType::File).unwrap();
        assert!(stream.set_transport_method(TransportMethod::MQ).is_err());
    }

    #[test]
    fn preset_stream_rejects_setters_that_change_its_pair() {
        let stream = Stream::from_preset("Stream2", EngineType::Staging, TransportMethod::MQ, true).unwrap();

        // Consistent with the preset: allowed, no-op on the stored pair.
        stream.set_engine_type(EngineType::Staging).unwrap();
        stream.set_transport_method(TransportMethod::MQ).unwrap();

        // Would otherwise pass `check_combination` (Staging/Mailbox is a
        // legal pair) but disagrees with the preset's own pair.
        let err = stream.set_transport_method(TransportMethod::Mailbox).unwrap_err();
        assert!(matches!(err, DtlError::UsageError(_)));
        assert_eq!(stream.transport_method(), Some(TransportMethod::MQ));

        let err = stream.set_engine_type(EngineType::File).unwrap_err();
        assert!(matches!(err, DtlError::UsageError(_)));
        assert_eq!(stream.engine_type(), Some(EngineType::Staging));
    }

    #[test]
    fn unknown_variable_errors() {
        let stream = Stream::new_plain("s");
        assert!(matches!(stream.inquire_variable("nope").unwrap_err(), DtlError::UnknownVariable(_)));
        assert!(matches!(stream.remove_variable("nope").unwrap_err(), DtlError::UnknownVariable(_)));
    }

    #[test]
    fn open_without_engine_type_or_transport_method_fails() {
        use std::sync::Arc;
        use dtl_sim::{InMemoryFileSystem, InMemoryNetwork, VirtualClock};

        let no_engine_type = Stream::new_plain("no_engine_type");
        no_engine_type.set_transport_method(TransportMethod::File).unwrap();
        let err = no_engine_type
            .open("zone:fs:/pfs/file", Mode::Publish, "Pub", Arc::new(VirtualClock::new()), Arc::new(InMemoryFileSystem::new()), Arc::new(InMemoryNetwork::new()))
            .unwrap_err();
        assert!(matches!(err, DtlError::UndefinedEngineType));

        let no_transport = Stream::new_plain("no_transport");
        no_transport.set_engine_type(EngineType::File).unwrap();
        let err = no_transport
            .open("zone:fs:/pfs/file", Mode::Publish, "Pub", Arc::new(VirtualClock::new()), Arc::new(InMemoryFileSystem::new()), Arc::new(InMemoryNetwork::new()))
            .unwrap_err();
        assert!(matches!(err, DtlError::UndefinedTransportMethod));
    }

    #[test]
    fn subscriber_end_transaction_records_a_consumed_event() {
        use std::sync::Arc;
        use dtl_sim::{InMemoryFileSystem, InMemoryNetwork, VirtualClock};

        let stream = Stream::new_plain("s");
        stream.set_engine_type(EngineType::File).unwrap().set_transport_method(TransportMethod::File).unwrap();
        let var = stream.define_variable("Pub", "var", vec![10, 10], vec![0, 0], vec![10, 10], 8).unwrap();

        let clock = Arc::new(VirtualClock::new());
        let fs = Arc::new(InMemoryFileSystem::new());
        let net = Arc::new(InMemoryNetwork::new());

        let mut publisher = stream.open("zone:fs:/pfs/file", Mode::Publish, "Pub", clock.clone(), fs.clone(), net.clone()).unwrap();
        publisher.begin_transaction().unwrap();
        publisher.put(&var, None).unwrap();
        publisher.end_transaction().unwrap();
        publisher.close().unwrap();

        let mut subscriber = stream.open("zone:fs:/pfs/file", Mode::Subscribe, "Sub", clock.clone(), fs.clone(), net.clone()).unwrap();
        subscriber.begin_transaction().unwrap();
        subscriber.get(&var).unwrap();
        subscriber.end_transaction().unwrap();
        subscriber.close().unwrap();

        let events = stream.inner.lock().unwrap().tx_log.list("s");
        let consumed = events
            .iter()
            .find(|e| matches!(&e.kind, TransactionEventKind::Consumed { subscriber, .. } if subscriber == "Sub"))
            .expect("a Consumed event for 'Sub' was recorded");
        assert!(matches!(&consumed.kind, TransactionEventKind::Consumed { variable, transaction_seq, .. } if variable == "var" && *transaction_seq == 0));
    }
}
