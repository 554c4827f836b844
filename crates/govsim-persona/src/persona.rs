//! Persona - identity, memory handle, and per-persona mutable state

use chrono::{DateTime, Utc};
use govsim_core::{
    AgentId, Identity, MemoryEntry, MemoryStore, Observation, PersonaConfig, Result,
    RetrievedMemory, Utterance,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct PersonaState {
    current_time: DateTime<Utc>,
    /// Peer id -> everything said in private chats with that peer.
    private_conversations: HashMap<AgentId, Vec<Utterance>>,
}

pub struct Persona {
    identity: Identity,
    config: Arc<PersonaConfig>,
    memory: Arc<dyn MemoryStore>,
    state: RwLock<PersonaState>,
}

impl Persona {
    pub fn new(identity: Identity, config: Arc<PersonaConfig>, memory: Arc<dyn MemoryStore>) -> Self {
        Self {
            identity,
            config,
            memory,
            state: RwLock::new(PersonaState::default()),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn id(&self) -> AgentId {
        self.identity.id
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn config(&self) -> &PersonaConfig {
        &self.config
    }

    pub fn memory(&self) -> &Arc<dyn MemoryStore> {
        &self.memory
    }

    pub async fn current_time(&self) -> DateTime<Utc> {
        self.state.read().await.current_time
    }

    /// Bring time up to date and note the observation's context as an event.
    pub async fn perceive(&self, obs: &Observation) -> Result<()> {
        self.state.write().await.current_time = obs.current_time;
        if !obs.context.trim().is_empty() {
            self.memory
                .store(MemoryEntry::event(obs.context.trim(), obs.current_time))
                .await?;
        }
        Ok(())
    }

    pub async fn retrieve(&self, focal_points: &[String], top_k: usize) -> Result<Vec<RetrievedMemory>> {
        self.memory.retrieve(focal_points, top_k).await
    }

    pub async fn store(&self, entry: MemoryEntry) -> Result<()> {
        self.memory.store(entry).await
    }

    pub(crate) async fn seed_private_history(&self, peer: AgentId) {
        self.state
            .write()
            .await
            .private_conversations
            .entry(peer)
            .or_default();
    }

    pub async fn private_history(&self, peer: AgentId) -> Vec<Utterance> {
        self.state
            .read()
            .await
            .private_conversations
            .get(&peer)
            .cloned()
            .unwrap_or_default()
    }

    /// Peers this persona has a private log for.
    pub async fn private_peers(&self) -> Vec<AgentId> {
        let mut peers: Vec<AgentId> = self
            .state
            .read()
            .await
            .private_conversations
            .keys()
            .copied()
            .collect();
        peers.sort();
        peers
    }

    pub(crate) async fn extend_private_history(&self, peer: AgentId, utterances: &[Utterance]) {
        self.state
            .write()
            .await
            .private_conversations
            .entry(peer)
            .or_default()
            .extend_from_slice(utterances);
    }
}

impl std::fmt::Debug for Persona {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persona")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}
