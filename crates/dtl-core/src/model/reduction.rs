//! Reduction pipeline: decimation and compression.
//!
//! A `Variable` carries at most one `AttachedReduction`: attaching a
//! second, different method is `DoubleReduction`; re-parameterizing the
//! *same* method is allowed and simply replaces the params.
//! `ReductionMethod` is the query surface a publisher or subscriber calls
//! to ask what a reduction would do to a variable's size and how many
//! FLOPs it costs to apply or reverse.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_COMPRESSION_COST_PER_ELEMENT, DEFAULT_DECIMATION_COST_PER_ELEMENT, DEFAULT_DECOMPRESSION_COST_PER_ELEMENT,
};
use crate::errors::DtlError;
use crate::model::variable::Variable;

/// String-keyed parameter bag: plain key/value pairs rather than a typed
/// struct per method, matching how the configuration grammar and test
/// harnesses pass reduction options.
pub type ReductionParams = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReductionKind {
    Decimation,
    Compression,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interpolation {
    Nearest,
    Linear,
    Quadratic,
    Cubic,
}

impl Default for Interpolation {
    fn default() -> Self {
        Interpolation::Nearest
    }
}

impl Interpolation {
    fn parse(s: &str) -> Result<Self, DtlError> {
        match s {
            "nearest" => Ok(Interpolation::Nearest),
            "linear" => Ok(Interpolation::Linear),
            "quadratic" => Ok(Interpolation::Quadratic),
            "cubic" => Ok(Interpolation::Cubic),
            other => Err(DtlError::UnknownDecimationInterpolation(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecimationParams {
    pub stride: Vec<u64>,
    pub interpolation: Interpolation,
    pub cost_per_element: f64,
}

impl DecimationParams {
    pub fn parse(params: &ReductionParams, ndims: usize) -> Result<Self, DtlError> {
        let mut stride = vec![1u64; ndims];
        let mut interpolation = Interpolation::default();
        let mut cost_per_element = DEFAULT_DECIMATION_COST_PER_ELEMENT;

        for (key, value) in params {
            match key.as_str() {
                "stride" => {
                    let parsed: Result<Vec<u64>, _> = value.split(',').map(|s| s.trim().parse::<u64>()).collect();
                    let parsed = parsed.map_err(|_| DtlError::InconsistentDecimationStride(format!("non-numeric stride '{value}'")))?;
                    if parsed.len() != ndims {
                        return Err(DtlError::InconsistentDecimationStride(format!(
                            "stride has {} entries, variable has {ndims} dimensions",
                            parsed.len()
                        )));
                    }
                    if parsed.iter().any(|&s| s == 0) {
                        return Err(DtlError::InconsistentDecimationStride("stride entries must be >= 1".into()));
                    }
                    stride = parsed;
                }
                "interpolation" => interpolation = Interpolation::parse(value)?,
                "cost_per_element" => {
                    cost_per_element = value
                        .parse::<f64>()
                        .map_err(|_| DtlError::UnknownDecimationOption(format!("cost_per_element '{value}' is not numeric")))?;
                }
                other => return Err(DtlError::UnknownDecimationOption(other.to_string())),
            }
        }

        Ok(DecimationParams { stride, interpolation, cost_per_element })
    }

    fn reduced_dims(&self, dims: &[u64]) -> Vec<u64> {
        dims.iter()
            .zip(self.stride.iter())
            .map(|(&d, &s)| (d + s - 1) / s)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionParams {
    pub ratio: f64,
    pub compression_cost_per_element: f64,
    pub decompression_cost_per_element: f64,
}

/// `-log10(accuracy)`-derived ratio for the "sz" profile: at
/// `accuracy=1e-3, data_smoothness=0.5` this must exceed the "zfp"
/// profile's ratio at `accuracy=1e-6`. SZ's ratio grows with the field's
/// smoothness, reflecting that a smoother field leaves
/// more redundancy for the predictor to exploit.
fn sz_ratio(accuracy: f64, data_smoothness: f64) -> f64 {
    (data_smoothness * (-accuracy.log10()) * 10.0).max(1.0)
}

/// ZFP compresses by a fixed-rate transform independent of smoothness.
fn zfp_ratio(accuracy: f64) -> f64 {
    ((-accuracy.log10()) * 2.0).max(1.0)
}

impl CompressionParams {
    pub fn parse(params: &ReductionParams) -> Result<Self, DtlError> {
        let mut ratio: Option<f64> = None;
        let mut compression_cost_per_element = DEFAULT_COMPRESSION_COST_PER_ELEMENT;
        let mut decompression_cost_per_element = DEFAULT_DECOMPRESSION_COST_PER_ELEMENT;
        let mut profile: Option<String> = None;
        let mut accuracy: Option<f64> = None;
        let mut data_smoothness: Option<f64> = None;

        for (key, value) in params {
            match key.as_str() {
                "compression_ratio" => {
                    ratio = Some(value.parse::<f64>().map_err(|_| {
                        DtlError::InconsistentCompressionRatio(format!("compression_ratio '{value}' is not numeric"))
                    })?);
                }
                "compressor" => profile = Some(value.clone()),
                "accuracy" => {
                    accuracy = Some(value.parse::<f64>().map_err(|_| {
                        DtlError::InconsistentCompressionRatio(format!("accuracy '{value}' is not numeric"))
                    })?);
                }
                "data_smoothness" => {
                    data_smoothness = Some(value.parse::<f64>().map_err(|_| {
                        DtlError::InconsistentCompressionRatio(format!("data_smoothness '{value}' is not numeric"))
                    })?);
                }
                "compression_cost_per_element" => {
                    compression_cost_per_element = value
                        .parse::<f64>()
                        .map_err(|_| DtlError::UnknownCompressionOption(format!("compression_cost_per_element '{value}' is not numeric")))?;
                }
                "decompression_cost_per_element" => {
                    decompression_cost_per_element = value
                        .parse::<f64>()
                        .map_err(|_| DtlError::UnknownCompressionOption(format!("decompression_cost_per_element '{value}' is not numeric")))?;
                }
                other => return Err(DtlError::UnknownCompressionOption(other.to_string())),
            }
        }

        let resolved_ratio = match (ratio, profile.as_deref()) {
            (Some(r), _) => r,
            (None, Some("sz")) => {
                let acc = accuracy.ok_or_else(|| DtlError::InconsistentCompressionRatio("sz profile requires 'accuracy'".into()))?;
                sz_ratio(acc, data_smoothness.unwrap_or(1.0))
            }
            (None, Some("zfp")) => {
                let acc = accuracy.ok_or_else(|| DtlError::InconsistentCompressionRatio("zfp profile requires 'accuracy'".into()))?;
                zfp_ratio(acc)
            }
            (None, Some(other)) => return Err(DtlError::UnknownCompressionOption(format!("unknown compressor profile '{other}'"))),
            (None, None) => return Err(DtlError::InconsistentCompressionRatio("no compression_ratio or compressor profile given".into())),
        };

        if resolved_ratio < 1.0 {
            return Err(DtlError::InconsistentCompressionRatio(format!("ratio {resolved_ratio} must be >= 1.0")));
        }

        Ok(CompressionParams { ratio: resolved_ratio, compression_cost_per_element, decompression_cost_per_element })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachedReduction {
    pub kind: ReductionKind,
    pub decimation: Option<DecimationParams>,
    pub compression: Option<CompressionParams>,
    pub applied_by_publisher: bool,
}

impl AttachedReduction {
    pub fn decimation(params: DecimationParams, applied_by_publisher: bool) -> Self {
        Self { kind: ReductionKind::Decimation, decimation: Some(params), compression: None, applied_by_publisher }
    }

    pub fn compression(params: CompressionParams, applied_by_publisher: bool) -> Self {
        Self { kind: ReductionKind::Compression, decimation: None, compression: Some(params), applied_by_publisher }
    }

    /// Whether `self` and a newly requested attachment are the same method
    /// (re-parameterization is allowed) as opposed to a genuinely different
    /// method (forbidden, `DoubleReduction`).
    pub fn same_method(&self, other_kind: ReductionKind) -> bool {
        self.kind == other_kind
    }
}

/// Attaches (or re-parameterizes) a reduction on `var`: a subscriber may
/// never attach compression on top of a publisher-side reduction, and a
/// subscriber may not switch a publisher-reduced variable to a different
/// method (only reparametrize the existing one).
pub fn attach_reduction(var: &mut Variable, kind: ReductionKind, params: &ReductionParams, applied_by_publisher: bool) -> Result<(), DtlError> {
    if !applied_by_publisher && kind == ReductionKind::Compression && var.is_reduced_by_publisher() {
        return Err(DtlError::SubscriberSideCompression);
    }
    if let Some(existing) = &var.reduction {
        if !applied_by_publisher && !existing.same_method(kind) {
            return Err(DtlError::DoubleReduction);
        }
    }

    let ndims = var.shape.len();
    let keep_applied_by_publisher = var.reduction.as_ref().map(|r| r.applied_by_publisher).unwrap_or(applied_by_publisher);
    let new_reduction = match kind {
        ReductionKind::Decimation => AttachedReduction::decimation(DecimationParams::parse(params, ndims)?, keep_applied_by_publisher),
        ReductionKind::Compression => AttachedReduction::compression(CompressionParams::parse(params)?, keep_applied_by_publisher),
    };
    var.reduction = Some(new_reduction);
    Ok(())
}

/// Stateless query surface over a `Variable`'s attached reduction. Grouped
/// behind a unit struct (rather than free functions) so call sites read
/// `ReductionMethod::global_size(var)` rather than a loose collection of
/// top-level functions.
pub struct ReductionMethod;

impl ReductionMethod {
    pub fn reduced_global_shape(var: &Variable) -> Result<Vec<u64>, DtlError> {
        let reduction = var.reduction.as_ref().ok_or(DtlError::UnknownReductionMethod("none attached".into()))?;
        match reduction.kind {
            ReductionKind::Decimation => {
                let params = reduction.decimation.as_ref().expect("decimation kind implies decimation params");
                Ok(params.reduced_dims(&var.shape))
            }
            ReductionKind::Compression => Ok(var.shape.clone()),
        }
    }

    pub fn reduced_global_size(var: &Variable) -> Result<u64, DtlError> {
        let reduction = var.reduction.as_ref().ok_or(DtlError::UnknownReductionMethod("none attached".into()))?;
        match reduction.kind {
            ReductionKind::Decimation => {
                let shape = Self::reduced_global_shape(var)?;
                super::variable::checked_byte_size(var.element_size, &shape)
            }
            ReductionKind::Compression => {
                let params = reduction.compression.as_ref().expect("compression kind implies compression params");
                let raw = var.global_size()?;
                Ok(((raw as f64) / params.ratio).ceil() as u64)
            }
        }
    }

    /// Reduced byte size of this actor's local region for one transaction,
    /// scaled by `var.transaction_selection.count()` the same way
    /// `Variable::local_size` is. Computed from the raw per-transaction
    /// region directly (not via `Variable::local_size`) so the transaction
    /// multiplier is applied exactly once.
    pub fn reduced_local_size(var: &Variable) -> Result<u64, DtlError> {
        let reduction = var.reduction.as_ref().ok_or(DtlError::UnknownReductionMethod("none attached".into()))?;
        let tx_count = var.transaction_selection.count();
        let per_tx = match reduction.kind {
            ReductionKind::Decimation => {
                let params = reduction.decimation.as_ref().expect("decimation kind implies decimation params");
                let (_, count) = var.effective_region();
                let reduced = params.reduced_dims(&count);
                super::variable::checked_byte_size(var.element_size, &reduced)?
            }
            ReductionKind::Compression => {
                let params = reduction.compression.as_ref().expect("compression kind implies compression params");
                let (_, count) = var.effective_region();
                let raw = super::variable::checked_byte_size(var.element_size, &count)?;
                ((raw as f64) / params.ratio).ceil() as u64
            }
        };
        Ok(per_tx.saturating_mul(tx_count))
    }

    /// FLOPs charged to the publisher actor that applies the reduction
    /// before a transaction commits.
    pub fn flops_to_reduce(var: &Variable) -> Result<f64, DtlError> {
        let reduction = var.reduction.as_ref().ok_or(DtlError::UnknownReductionMethod("none attached".into()))?;
        let (_, count) = var.effective_region();
        let elements: u64 = count.iter().product::<u64>().max(1);
        let cost_per_element = match reduction.kind {
            ReductionKind::Decimation => reduction.decimation.as_ref().expect("decimation params").cost_per_element,
            ReductionKind::Compression => reduction.compression.as_ref().expect("compression params").compression_cost_per_element,
        };
        Ok(cost_per_element * elements as f64)
    }

    /// FLOPs charged to the subscriber actor that decompresses on `get`,
    /// scaled by `var.transaction_selection.count()`: decompressing `k`
    /// historical transactions' worth of data costs `k` times as much.
    /// Decimation has no inverse cost: a decimated variable simply has
    /// fewer samples, there's nothing to reconstruct.
    pub fn flops_to_decompress(var: &Variable) -> Result<f64, DtlError> {
        let reduction = var.reduction.as_ref().ok_or(DtlError::UnknownReductionMethod("none attached".into()))?;
        match reduction.kind {
            ReductionKind::Decimation => Ok(0.0),
            ReductionKind::Compression => {
                let params = reduction.compression.as_ref().expect("compression params");
                let (_, count) = var.effective_region();
                let elements: u64 = count.iter().product::<u64>().max(1);
                let tx_count = var.transaction_selection.count();
                Ok(params.decompression_cost_per_element * elements as f64 * tx_count as f64)
            }
        }
    }
}
