//! JSON configuration loading for `Dtl::create`.
//!
//! ```json
//! { "streams": [
//!     { "name": "Stream1", "engine": "File", "transport": "File", "metadata_export": true },
//!     { "name": "Stream2", "engine": "Staging", "transport": "MQ" }
//! ] }
//! ```
//!
//! Loading is all-or-nothing: an invalid engine/transport combination, or
//! any other malformed preset, fails `DtlError::ConfigError` before any
//! stream is registered (`original_source/test/python/dtl_config.py`
//! relies on partial config never taking effect).

use serde::Deserialize;

use crate::errors::DtlError;
use crate::transport::{check_combination, EngineType, TransportMethod};

#[derive(Debug, Deserialize)]
struct RawStreamPreset {
    name: String,
    engine: String,
    transport: String,
    #[serde(default = "default_metadata_export")]
    metadata_export: bool,
}

fn default_metadata_export() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    streams: Vec<RawStreamPreset>,
}

/// A validated, parsed stream preset ready to register with a `Dtl`.
#[derive(Debug, Clone)]
pub struct StreamPreset {
    pub name: String,
    pub engine_type: EngineType,
    pub transport_method: TransportMethod,
    pub metadata_export: bool,
}

/// Parses and validates the DTL configuration grammar. Does not touch any
/// `Dtl` state; the caller (`Dtl::create`) registers the returned presets.
pub fn load_presets(json: &str) -> Result<Vec<StreamPreset>, DtlError> {
    let raw: RawConfig = serde_json::from_str(json).map_err(|e| DtlError::ConfigError(e.to_string()))?;
    let mut presets = Vec::with_capacity(raw.streams.len());
    for entry in raw.streams {
        let engine_type = EngineType::parse(&entry.engine)?;
        let transport_method = TransportMethod::parse(&entry.transport)?;
        check_combination(engine_type, transport_method)?;
        presets.push(StreamPreset { name: entry.name, engine_type, transport_method, metadata_export: entry.metadata_export });
    }
    Ok(presets)
}
