//! Govsim LLM - Provider adapters and the LLM-backed Oracle

pub mod anthropic;
pub mod oracle;
pub mod parse;
pub mod prompts;
pub mod provider;
pub mod types;

pub use anthropic::AnthropicProvider;
pub use oracle::{LlmOracle, OracleConfig};
pub use provider::{LlmError, LlmProvider, LlmResult, LlmStream};
pub use types::*;
