//! dtl-sim: in-memory `SimClock`/`FileSystemBackend`/`NetworkBackend`
//! collaborators for `dtl-core`'s tests and the workspace demo binary.
//!
//! None of this models a real simulator: it is the smallest stand-in that
//! lets `dtl-core` run its state machines and charge simulated time/FLOPs
//! without an actual discrete-event kernel underneath, the way this
//! workspace's integration tests need something to hand `Stream::open`
//! besides a real `simgrid`-style engine.

pub mod clock;
pub mod fs;
pub mod net;

pub use clock::VirtualClock;
pub use fs::InMemoryFileSystem;
pub use net::InMemoryNetwork;
