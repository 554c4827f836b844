//! Simulation configuration
//!
//! Loaded from TOML at startup, falls back to defaults if no config file exists.

use govsim_core::PersonaConfig;
use govsim_llm::OracleConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Engine settings shared by every persona.
    pub persona: PersonaConfig,
    /// LLM backend settings.
    pub oracle: OracleConfig,
    pub memory: MemoryConfig,
    pub personas: Vec<PersonaSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Directory for per-persona memory files. In-memory only when unset.
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaSpec {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub goals: String,
}

impl Default for SimConfig {
    fn default() -> Self {
        let personas = ["John", "Kate", "Jack", "Emma", "Luke"]
            .iter()
            .enumerate()
            .map(|(i, name)| PersonaSpec {
                id: i as u32,
                name: name.to_string(),
                goals: String::new(),
            })
            .collect();
        Self {
            persona: PersonaConfig::default(),
            oracle: OracleConfig::default(),
            memory: MemoryConfig::default(),
            personas,
        }
    }
}

impl SimConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}, using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {}, using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the current config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Memory file for one persona, if persistence is enabled.
    pub fn memory_path(&self, persona: &PersonaSpec) -> Option<PathBuf> {
        self.memory
            .dir
            .as_ref()
            .map(|dir| dir.join(format!("{}-{}.json", persona.id, persona.name.to_lowercase())))
    }
}
