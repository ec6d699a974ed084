//! Error surface of the DTL, plus the ambient additions a real crate
//! needs: config parsing and collaborator-contract usage errors.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DtlError {
    #[error("engine_type is undefined for this stream")]
    UndefinedEngineType,
    #[error("transport_method is undefined for this stream")]
    UndefinedTransportMethod,
    #[error("invalid engine/transport combination")]
    InvalidEngineAndTransportCombination,
    #[error("inconsistent variable definition: {0}")]
    InconsistentVariableDefinition(String),
    #[error("variable '{0}' redefined with incompatible shape or element_size")]
    MultipleVariableDefinition(String),
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),
    #[error("unknown reduction method '{0}'")]
    UnknownReductionMethod(String),
    #[error("unknown decimation option '{0}'")]
    UnknownDecimationOption(String),
    #[error("inconsistent decimation stride: {0}")]
    InconsistentDecimationStride(String),
    #[error("unknown decimation interpolation '{0}'")]
    UnknownDecimationInterpolation(String),
    #[error("unknown compression option '{0}'")]
    UnknownCompressionOption(String),
    #[error("inconsistent compression ratio: {0}")]
    InconsistentCompressionRatio(String),
    #[error("subscribers may not attach compression on a publisher-reduced variable")]
    SubscriberSideCompression,
    #[error("a different reduction method is already attached to this variable")]
    DoubleReduction,
    #[error("dimension product overflowed the platform integer")]
    Overflow,

    #[error("invalid DTL configuration: {0}")]
    ConfigError(String),
    #[error("usage error: {0}")]
    UsageError(String),
    #[error("engine I/O failure: {0}")]
    Io(String),
}
