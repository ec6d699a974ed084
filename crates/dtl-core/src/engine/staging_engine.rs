//! StagingEngine: the Staging engine over the MQ and Mailbox transports.
//!
//! Unlike the File engine there is no shared on-disk slab to read back
//! from: every publisher pushes its contribution as one message per
//! transaction onto a per-Stream, per-Variable channel (a message queue or
//! a mailbox, picked by the Stream's `TransportMethod`), and a subscriber
//! pops one message per publisher its selection intersects. The channel
//! name is derived from the rendezvous name the Stream was opened with, so
//! every publisher and subscriber of the same Stream+Variable rendezvous on
//! the same channel (`original_source/test/python/dtl_staging_engine.py`).

use std::fmt;
use std::sync::Arc;

use log::{info, warn};

use crate::collab::NetworkBackend;
use crate::collab::SimClock;
use crate::engine::{manifest_fingerprint, require_state, BufferedRequest, EngineState, Mode};
use crate::errors::DtlError;
use crate::model::{ReductionMethod, Variable};
use crate::selection::transfers_for_variable;
use crate::stream::Stream;
use crate::transport::TransportMethod;

pub struct StagingEngine {
    stream: Stream,
    mode: Mode,
    actor_id: String,
    rendezvous: String,
    transport: TransportMethod,
    state: EngineState,
    current_transaction_id: u64,
    buffer: Vec<BufferedRequest>,
    clock: Arc<dyn SimClock>,
    net: Arc<dyn NetworkBackend>,
}

/// Manual impl: the `SimClock`/`NetworkBackend` collaborators are trait
/// objects and don't implement `Debug`.
impl fmt::Debug for StagingEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagingEngine")
            .field("stream", &self.stream.name())
            .field("mode", &self.mode)
            .field("actor_id", &self.actor_id)
            .field("rendezvous", &self.rendezvous)
            .field("transport", &self.transport)
            .field("state", &self.state)
            .field("current_transaction_id", &self.current_transaction_id)
            .finish()
    }
}

impl StagingEngine {
    pub fn open(
        stream: &Stream,
        rendezvous: &str,
        mode: Mode,
        actor_id: &str,
        clock: Arc<dyn SimClock>,
        net: Arc<dyn NetworkBackend>,
    ) -> Result<Self, DtlError> {
        let transport = stream.transport_method().ok_or(DtlError::UndefinedTransportMethod)?;
        match mode {
            Mode::Publish => {
                stream.record_publisher_open(actor_id);
            }
            Mode::Subscribe => stream.record_subscriber_open(),
        }
        info!("stream '{}': StagingEngine opened in {:?} mode, rendezvous '{rendezvous}'", stream.name(), mode);
        Ok(Self {
            stream: stream.clone(),
            mode,
            actor_id: actor_id.to_string(),
            rendezvous: rendezvous.to_string(),
            transport,
            state: EngineState::Opened,
            current_transaction_id: 0,
            buffer: Vec::new(),
            clock,
            net,
        })
    }

    fn channel(&self, variable: &str) -> String {
        format!("{}/{variable}", self.rendezvous)
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
                warn!("stream '{}': StagingEngine failed during end_transaction: {e}", self.stream.name());
                Err(e)
            }
        }
    }

    fn push(&self, channel: &str, bytes: u64) -> f64 {
        match self.transport {
            TransportMethod::MQ => self.net.mq_push(channel, bytes),
            TransportMethod::Mailbox => self.net.mailbox_put(channel, bytes),
            TransportMethod::File => unreachable!("File transport never backs a StagingEngine"),
        }
    }

    fn pop(&self, channel: &str) -> f64 {
        match self.transport {
            TransportMethod::MQ => self.net.mq_pop(channel),
            TransportMethod::Mailbox => self.net.mailbox_get(channel),
            TransportMethod::File => unreachable!("File transport never backs a StagingEngine"),
        }
    }

    fn end_transaction_publish(&mut self) -> Result<(), DtlError> {
        for request in &self.buffer {
            if request.variable.is_reduced_by_publisher() {
                let flops = ReductionMethod::flops_to_reduce(&request.variable)?;
                self.clock.charge_flops(&self.actor_id, flops);
            }
            let channel = self.channel(&request.variable.name);
            let elapsed = self.push(&channel, request.bytes);
            self.clock.sleep_for(elapsed);

            let fingerprint = manifest_fingerprint(&request.variable.name, request.bytes, self.current_transaction_id);
            self.stream.commit_transaction(&request.variable.name, &self.actor_id, request.bytes, fingerprint, self.clock.now());
        }
        Ok(())
    }

    fn end_transaction_subscribe(&mut self) -> Result<(), DtlError> {
        let mut total_elapsed = 0.0;
        for request in &self.buffer {
            let channel = self.channel(&request.variable.name);
            for _ in &request.transfers {
                total_elapsed += self.pop(&channel);
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
            Mode::Publish => self.stream.record_publisher_close(),
            Mode::Subscribe => self.stream.record_subscriber_close(),
        }
        self.state = EngineState::Closed;
        Ok(())
    }
}
