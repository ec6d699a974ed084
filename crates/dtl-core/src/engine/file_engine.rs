//! FileEngine: the File/File transport.
//!
//! A Publisher writes into `path/data.<k>` where `k` is its rank among
//! currently-attached publishers; a per-transaction manifest is appended
//! to `path/md.idx` when the Stream has `metadata_export` set. The
//! manifest's *logical* content lives in the Stream's in-memory
//! transaction log (the metadata store already makes it visible to every
//! connected actor in this process); `FileSystemBackend::append`/`read`
//! only charge the simulated I/O time writing/reading that many bytes
//! would take — the DTL never moves real user data.

use std::fmt;
use std::sync::Arc;

use log::{info, warn};

use crate::collab::FileSystemBackend;
use crate::collab::SimClock;
use crate::engine::{manifest_fingerprint, require_state, BufferedRequest, EngineState, Mode};
use crate::errors::DtlError;
use crate::model::{variable::checked_byte_size, ReductionMethod, Variable};
use crate::selection::transfers_for_variable;
use crate::stream::Stream;
use crate::uri::FileUri;

pub struct FileEngine {
    stream: Stream,
    mode: Mode,
    actor_id: String,
    uri: FileUri,
    state: EngineState,
    current_transaction_id: u64,
    buffer: Vec<BufferedRequest>,
    publisher_index: Option<u64>,
    clock: Arc<dyn SimClock>,
    fs: Arc<dyn FileSystemBackend>,
}

/// Manual impl: the `SimClock`/`FileSystemBackend` collaborators are
/// trait objects and don't implement `Debug`.
impl fmt::Debug for FileEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileEngine")
            .field("stream", &self.stream.name())
            .field("mode", &self.mode)
            .field("actor_id", &self.actor_id)
            .field("uri", &self.uri)
            .field("state", &self.state)
            .field("current_transaction_id", &self.current_transaction_id)
            .finish()
    }
}

impl FileEngine {
    pub fn open(stream: &Stream, uri_str: &str, mode: Mode, actor_id: &str, clock: Arc<dyn SimClock>, fs: Arc<dyn FileSystemBackend>) -> Result<Self, DtlError> {
        let uri = FileUri::parse(uri_str)?;
        let publisher_index = match mode {
            Mode::Publish => {
                let index = stream.record_publisher_open(actor_id);
                fs.create(&uri.data_file(index)).map_err(DtlError::Io)?;
                Some(index)
            }
            Mode::Subscribe => {
                stream.record_subscriber_open();
                if stream.metadata_export() {
                    // Charge the simulated time of reading whatever has
                    // been committed so far; the manifest's content is
                    // already visible through the shared metadata store.
                    if let Ok(elapsed) = fs.read(&uri.manifest_file(), 0, 0) {
                        clock.sleep_for(elapsed);
                    }
                }
                None
            }
        };
        info!("stream '{}': FileEngine opened in {:?} mode at '{uri_str}'", stream.name(), mode);
        Ok(Self {
            stream: stream.clone(),
            mode,
            actor_id: actor_id.to_string(),
            uri,
            state: EngineState::Opened,
            current_transaction_id: 0,
            buffer: Vec::new(),
            publisher_index,
            clock,
            fs,
        })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn current_transaction_id(&self) -> u64 {
        self.current_transaction_id
    }

    pub fn begin_transaction(&mut self) -> Result<(), DtlError> {
        require_state(self.state, EngineState::Opened, "begin_transaction")?;
        self.buffer.clear();
        self.state = EngineState::InTransaction;
        Ok(())
    }

    pub fn put(&mut self, var: &Variable, explicit_bytes: Option<u64>) -> Result<(), DtlError> {
        require_state(self.state, EngineState::InTransaction, "put")?;
        if self.mode != Mode::Publish {
            return Err(DtlError::UsageError("put is only valid on a Publish-mode Engine".into()));
        }
        let bytes = if var.is_reduced_by_publisher() {
            ReductionMethod::reduced_local_size(var)?
        } else if let Some(explicit) = explicit_bytes {
            explicit
        } else {
            var.local_size()?
        };
        self.buffer.push(BufferedRequest { variable: var.clone(), bytes, transfers: Vec::new() });
        Ok(())
    }

    pub fn get(&mut self, var: &Variable) -> Result<(), DtlError> {
        require_state(self.state, EngineState::InTransaction, "get")?;
        if self.mode != Mode::Subscribe {
            return Err(DtlError::UsageError("get is only valid on a Subscribe-mode Engine".into()));
        }
        let tx_count = var.transaction_selection.count();
        let transfers: Vec<(String, u64)> = transfers_for_variable(var, &self.stream.publisher_regions_for(&var.name))?
            .into_iter()
            .map(|t| (t.publisher, t.bytes.saturating_mul(tx_count)))
            .collect();
        let bytes = transfers.iter().map(|(_, b)| b).sum();
        self.buffer.push(BufferedRequest { variable: var.clone(), bytes, transfers });
        Ok(())
    }

    pub fn end_transaction(&mut self) -> Result<(), DtlError> {
        require_state(self.state, EngineState::InTransaction, "end_transaction")?;
        let result = match self.mode {
            Mode::Publish => self.end_transaction_publish(),
            Mode::Subscribe => self.end_transaction_subscribe(),
        };
        match result {
            Ok(()) => {
                self.current_transaction_id += 1;
                self.state = EngineState::Opened;
                Ok(())
            }
            Err(e) => {
                self.state = EngineState::Failed;
                warn!("stream '{}': FileEngine failed during end_transaction: {e}", self.stream.name());
                Err(e)
            }
        }
    }

    fn end_transaction_publish(&mut self) -> Result<(), DtlError> {
        let index = self.publisher_index.expect("publish-mode engine always has a publisher index");
        let data_file = self.uri.data_file(index);
        for request in &self.buffer {
            if request.variable.is_reduced_by_publisher() {
                let flops = ReductionMethod::flops_to_reduce(&request.variable)?;
                self.clock.charge_flops(&self.actor_id, flops);
            }
            let elapsed = self.fs.append(&data_file, request.bytes).map_err(DtlError::Io)?;
            self.clock.sleep_for(elapsed);

            let fingerprint = manifest_fingerprint(&request.variable.name, request.bytes, self.current_transaction_id);
            self.stream.commit_transaction(&request.variable.name, &self.actor_id, request.bytes, fingerprint, self.clock.now());
        }
        if self.stream.metadata_export() {
            let manifest_bytes = checked_byte_size(8, &[self.buffer.len() as u64]).unwrap_or(0);
            let elapsed = self.fs.append(&self.uri.manifest_file(), manifest_bytes).map_err(DtlError::Io)?;
            self.clock.sleep_for(elapsed);
        }
        Ok(())
    }

    fn end_transaction_subscribe(&mut self) -> Result<(), DtlError> {
        let mut total_elapsed = 0.0;
        for request in &self.buffer {
            for (publisher, bytes) in &request.transfers {
                let idx = self.stream.file_publisher_index(publisher).unwrap_or(0);
                let elapsed = self.fs.read(&self.uri.data_file(idx), 0, *bytes).map_err(DtlError::Io)?;
                total_elapsed += elapsed;
            }
            if request.variable.is_reduced() {
                let flops = ReductionMethod::flops_to_decompress(&request.variable)?;
                self.clock.charge_flops(&self.actor_id, flops);
            }
            self.stream.record_consumption(&request.variable.name, &self.actor_id, self.current_transaction_id, self.clock.now());
        }
        self.clock.sleep_for(total_elapsed);
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), DtlError> {
        if self.state == EngineState::Failed {
            self.state = EngineState::Closed;
            return Ok(());
        }
        require_state(self.state, EngineState::Opened, "close")?;
        match self.mode {
            Mode::Publish => {
                self.stream.record_publisher_close();
                if self.stream.num_publishers() == 0 {
                    info!("stream '{}': last publisher closed, finalizing manifest", self.stream.name());
                }
            }
            Mode::Subscribe => self.stream.record_subscriber_close(),
        }
        self.state = EngineState::Closed;
        Ok(())
    }
}
