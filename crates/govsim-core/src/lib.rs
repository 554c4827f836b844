//! Govsim Core - Types, contracts, and error handling for the persona engine

pub mod config;
pub mod error;
pub mod memory;
pub mod oracle;
pub mod types;

pub use config::{InjectionStrategy, PersonaConfig, PromptVariant};
pub use error::{Error, OracleError, Result};
pub use memory::{InMemoryStore, MemoryStore, RetrievedMemory};
pub use oracle::*;
pub use types::*;
