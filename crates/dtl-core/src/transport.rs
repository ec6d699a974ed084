//! Engine/Transport tagging and the legality check between them.

use serde::{Deserialize, Serialize};

use crate::errors::DtlError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineType {
    File,
    Staging,
}

impl EngineType {
    pub fn parse(s: &str) -> Result<Self, DtlError> {
        match s {
            "File" => Ok(EngineType::File),
            "Staging" => Ok(EngineType::Staging),
            other => Err(DtlError::ConfigError(format!("unknown engine type '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportMethod {
    File,
    MQ,
    Mailbox,
}

impl TransportMethod {
    pub fn parse(s: &str) -> Result<Self, DtlError> {
        match s {
            "File" => Ok(TransportMethod::File),
            "MQ" => Ok(TransportMethod::MQ),
            "Mailbox" => Ok(TransportMethod::Mailbox),
            other => Err(DtlError::ConfigError(format!("unknown transport method '{other}'"))),
        }
    }
}

/// Legal combinations are File↔File and Staging↔{MQ, Mailbox}; any other
/// assignment fails `InvalidEngineAndTransportCombination`.
pub fn check_combination(engine: EngineType, transport: TransportMethod) -> Result<(), DtlError> {
    let ok = matches!(
        (engine, transport),
        (EngineType::File, TransportMethod::File) | (EngineType::Staging, TransportMethod::MQ) | (EngineType::Staging, TransportMethod::Mailbox)
    );
    if ok {
        Ok(())
    } else {
        Err(DtlError::InvalidEngineAndTransportCombination)
    }
}
