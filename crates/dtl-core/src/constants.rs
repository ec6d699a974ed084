//! Engine-wide constants.
//!
//! `DTL_VERSION` is a stable tag folded into transaction manifests so a
//! change in the DTL's own semantics is visible in the fingerprint even
//! when the data and the stream definition did not change.

pub const DTL_VERSION: &str = "DTL-1.0";

/// Default FLOPs charged per output element when a reduction method does
/// not override `cost_per_element`.
pub const DEFAULT_DECIMATION_COST_PER_ELEMENT: f64 = 1.0;
pub const DEFAULT_COMPRESSION_COST_PER_ELEMENT: f64 = 1.0;
pub const DEFAULT_DECOMPRESSION_COST_PER_ELEMENT: f64 = 1.0;
