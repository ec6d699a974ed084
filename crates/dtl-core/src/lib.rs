//! dtl-core: simulated Data Transport Layer (DTL) for scientific I/O couplers.
//!
//! Models the stream/engine/transport machinery of an ADIOS2-style coupler
//! inside a discrete-event simulator: a typed, N-dimensional `Variable`
//! data model, a per-Stream metadata store shared by every connected
//! actor, File and Staging engines with their own transaction state
//! machines, and a reduction pipeline (decimation/compression) that can be
//! applied publisher- or subscriber-side.
//!
//! `dtl-core` never talks to a real simulator: it is generic over three
//! small collaborator traits it declares itself (`collab::SimClock`,
//! `collab::FileSystemBackend`, `collab::NetworkBackend`), treating the
//! host kernel and filesystem as collaborators reached only through those
//! stated interfaces. `dtl-sim` supplies the in-memory implementations
//! this workspace's tests and demo binary run against; a real embedding
//! substitutes its own.
//!
//! Module map:
//! - `model`: `Variable` and the reduction pipeline attached to it.
//! - `transport`: `EngineType`/`TransportMethod` tags and their legal pairing.
//! - `stream`: `Stream`, the per-Stream Variable registry (metadata store).
//! - `registry`: `Dtl`, the process-wide stream registry and connection set.
//! - `engine`: the Publish/Subscribe transaction state machines (File, Staging).
//! - `collab`: collaborator traits the host simulation, filesystem, and
//!   network are expected to implement.
//! - `event`: append-only per-Stream transaction log backing historical
//!   transaction selection.
//! - `hashing`: canonical JSON + content hashing, used to fingerprint
//!   transaction manifests.
//! - `config`: JSON stream-preset loading for `Dtl::create`.
//! - `errors`: the DTL's error surface plus ambient config/usage errors.

pub mod collab;
pub mod config;
pub mod constants;
pub mod engine;
pub mod errors;
pub mod event;
pub mod hashing;
pub mod model;
pub mod registry;
pub mod selection;
pub mod stream;
pub mod transport;
pub mod uri;

pub use collab::{FileSystemBackend, NetworkBackend, SimClock};
pub use engine::{Engine, EngineState, FileEngine, Mode, StagingEngine};
pub use errors::DtlError;
pub use model::{AttachedReduction, ReductionKind, ReductionMethod, TransactionSelection, Variable};
pub use registry::{Dtl, DtlHandle};
pub use stream::Stream;
pub use transport::{EngineType, TransportMethod};
