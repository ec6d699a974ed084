//! `Dtl`: process-wide stream registry and connection set.
//!
//! Rather than a process-global singleton reached for via a static
//! `DTL.create`/`DTL.connect` pair, this is an explicit lifecycled service
//! object, `DtlHandle = Arc<Dtl>`, created once by whoever sets up the
//! simulation and handed to every actor that needs it, the way collaborator
//! handles are threaded through elsewhere in this crate rather than reached
//! for as globals.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use log::info;

use crate::config::load_presets;
use crate::errors::DtlError;
use crate::stream::Stream;

/// Shared handle to a `Dtl` instance; cheap to clone, hand to every actor
/// that calls `connect`.
pub type DtlHandle = Arc<Dtl>;

#[derive(Debug, Default)]
struct DtlInner {
    streams: IndexMap<String, Stream>,
    connected_actors: HashSet<String>,
}

/// Process-wide stream registry and connection tracking.
#[derive(Debug)]
pub struct Dtl {
    inner: Mutex<DtlInner>,
}

impl Dtl {
    /// Creates a fresh `Dtl`, optionally pre-registering the streams
    /// described by a JSON config document. All-or-nothing: a malformed
    /// config means no `Dtl` is returned and nothing is partially
    /// registered.
    pub fn create(config_json: Option<&str>) -> Result<DtlHandle, DtlError> {
        let mut streams = IndexMap::new();
        if let Some(json) = config_json {
            for preset in load_presets(json)? {
                let stream = Stream::from_preset(preset.name.clone(), preset.engine_type, preset.transport_method, preset.metadata_export)?;
                streams.insert(preset.name, stream);
            }
        }
        info!("DTL created with {} preset stream(s)", streams.len());
        Ok(Arc::new(Dtl { inner: Mutex::new(DtlInner { streams, connected_actors: HashSet::new() }) }))
    }

    /// Registers `actor_id` as connected. Connecting the same actor twice
    /// without an intervening `disconnect` is a usage error.
    pub fn connect(&self, actor_id: &str) -> Result<(), DtlError> {
        let mut guard = self.inner.lock().unwrap();
        if !guard.connected_actors.insert(actor_id.to_string()) {
            return Err(DtlError::UsageError(format!("actor '{actor_id}' is already connected")));
        }
        info!("actor '{actor_id}' connected ({} total)", guard.connected_actors.len());
        Ok(())
    }

    /// Unregisters `actor_id`. Disconnecting an actor that never connected
    /// (or already disconnected) is a usage error.
    pub fn disconnect(&self, actor_id: &str) -> Result<(), DtlError> {
        let mut guard = self.inner.lock().unwrap();
        if !guard.connected_actors.remove(actor_id) {
            return Err(DtlError::UsageError(format!("actor '{actor_id}' disconnected without a matching connect")));
        }
        info!("actor '{actor_id}' disconnected ({} remain)", guard.connected_actors.len());
        Ok(())
    }

    /// Whether any actor is currently connected.
    pub fn has_active_connections(&self) -> bool {
        !self.inner.lock().unwrap().connected_actors.is_empty()
    }

    /// Returns the named Stream, creating a fresh, unconfigured one (no
    /// `engine_type`/`transport_method` set) on first reference if it
    /// doesn't already exist.
    pub fn add_stream(&self, name: &str) -> Stream {
        let mut guard = self.inner.lock().unwrap();
        guard.streams.entry(name.to_string()).or_insert_with(|| Stream::new_plain(name)).clone()
    }

    /// Returns the named Stream if it has been registered, or `None`.
    pub fn stream_by_name_or_null(&self, name: &str) -> Option<Stream> {
        self.inner.lock().unwrap().streams.get(name).cloned()
    }

    pub fn stream_names(&self) -> Vec<String> {
        self.inner.lock().unwrap().streams.keys().cloned().collect()
    }
}
