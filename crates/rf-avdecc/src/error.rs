//! Engine error types

use rf_avdecc_pdu::DecodeError;
use thiserror::Error;

/// Errors surfaced by the engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("frame decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("model error: {0}")]
    Model(#[from] rf_avdecc_model::ModelError),

    #[error("command timed out after {attempts} attempts")]
    TimedOut { attempts: u8 },

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("L2 transport is down")]
    TransportDown,

    #[error("inflight table is full")]
    InflightFull,

    #[error("engine is stopped")]
    Stopped,
}

/// Result alias
pub type EngineResult<T> = Result<T, EngineError>;
