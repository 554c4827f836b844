//! Error types for Govsim

use crate::types::{AgentId, Location, Phase};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("unsupported phase {phase:?} at location {location:?}")]
    UnsupportedPhase { location: Location, phase: Phase },

    #[error("unknown prompt variant: {0}")]
    UnknownPromptVariant(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("unknown agent: {0}")]
    UnknownAgent(AgentId),

    #[error("{agent} is not at {location:?}")]
    NotPresent { agent: AgentId, location: Location },

    #[error("no resource count observed for agent {0}")]
    MissingResourceCount(AgentId),

    #[error("harvest of {requested} exceeds available {available}")]
    HarvestOutOfRange { requested: u32, available: u32 },

    #[error("memory store error: {0}")]
    Memory(String),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn unsupported_phase(location: Location, phase: Phase) -> Self {
        Self::UnsupportedPhase { location, phase }
    }

    pub fn memory(message: impl Into<String>) -> Self {
        Self::Memory(message.into())
    }
}

/// Failure of a single Oracle call. Propagated to the caller untouched.
#[derive(Error, Debug)]
pub enum OracleError {
    #[error("oracle backend failed: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("malformed {call} payload: {message}")]
    MalformedPayload { call: &'static str, message: String },

    #[error("oracle refused: {0}")]
    Refused(String),
}

impl OracleError {
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(err))
    }

    pub fn malformed(call: &'static str, message: impl Into<String>) -> Self {
        Self::MalformedPayload {
            call,
            message: message.into(),
        }
    }
}
