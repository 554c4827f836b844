//! Persona configuration
//!
//! One snapshot per persona, threaded through construction. Nothing here is
//! process-global.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How resource counts from the last period are fed into group conversations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InjectionStrategy {
    #[default]
    None,
    /// Each participant announces their own count.
    Individual,
    /// The mayor reads out everyone's count in one utterance.
    Manager,
}

/// Utterance prompt variant. Only `one_shot` exists today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptVariant {
    OneShot,
}

impl FromStr for PromptVariant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "one_shot" => Ok(Self::OneShot),
            other => Err(Error::UnknownPromptVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    /// Hard cap on utterances in a private conversation.
    pub max_private_turns: usize,
    /// Hard cap on utterances in a group conversation, injected ones included.
    pub max_group_turns: usize,
    pub injection: InjectionStrategy,
    /// Raw selector, resolved into a [`PromptVariant`] when a group conversation starts.
    pub prompt_utterance: String,
    /// Unit used in framework-authored text, e.g. "tons of fish".
    pub resource_unit: String,
    /// Seed focal points for the reflection pass at home.
    pub reflection_focal_points: Vec<String>,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            max_private_turns: 6,
            max_group_turns: 10,
            injection: InjectionStrategy::None,
            prompt_utterance: "one_shot".into(),
            resource_unit: "tons of fish".into(),
            reflection_focal_points: vec!["harvesting".into()],
        }
    }
}

impl PersonaConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_private_turns == 0 {
            return Err(Error::InvalidConfig(
                "max_private_turns must be at least 1".into(),
            ));
        }
        if self.max_group_turns == 0 {
            return Err(Error::InvalidConfig(
                "max_group_turns must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn prompt_variant(&self) -> Result<PromptVariant> {
        self.prompt_utterance.parse()
    }
}
