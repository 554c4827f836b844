//! Driver - JSON lines in, JSON lines out
//!
//! Each input line is `{"agent": <id>, "observation": {...}}`. Each output line
//! is the resulting `PersonaAction`. Blank lines are skipped.

use crate::config::SimConfig;
use anyhow::Context;
use govsim_core::{AgentId, Identity, InMemoryStore, MemoryStore, Observation, Oracle};
use govsim_persona::{Persona, PeerRegistry, PersonaRuntime};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub agent: AgentId,
    pub observation: Observation,
}

/// Build every persona from config and register them.
pub async fn build_runtime(config: &SimConfig, oracle: Arc<dyn Oracle>) -> anyhow::Result<PersonaRuntime> {
    config.persona.validate()?;
    let persona_config = Arc::new(config.persona.clone());

    let mut personas = Vec::with_capacity(config.personas.len());
    for entry in &config.personas {
        let memory: Arc<dyn MemoryStore> = match config.memory_path(entry) {
            Some(path) => Arc::new(
                InMemoryStore::open(&path)
                    .with_context(|| format!("opening memory {}", path.display()))?,
            ),
            None => Arc::new(InMemoryStore::new()),
        };
        personas.push(Arc::new(Persona::new(
            Identity::new(entry.id, entry.name.clone()),
            persona_config.clone(),
            memory,
        )));
    }

    let peers = PeerRegistry::new(personas).await?;
    Ok(PersonaRuntime::new(oracle, Arc::new(peers)))
}

/// Step the runtime once per input line. Returns the number of actions written.
pub async fn run<R, W>(runtime: &PersonaRuntime, reader: R, mut writer: W) -> anyhow::Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = reader.lines();
    let mut line_no = 0usize;
    let mut written = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let record: ObservationRecord = serde_json::from_str(&line)
            .with_context(|| format!("line {}: invalid observation record", line_no))?;

        let action = runtime
            .step(record.agent, &record.observation)
            .await
            .with_context(|| format!("line {}: step for {} failed", line_no, record.agent))?;

        serde_json::to_writer(&mut writer, &action)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        written += 1;
    }

    info!("Processed {} observations", written);
    Ok(written)
}
