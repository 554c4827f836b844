//! PeerRegistry - read-only lookup from agent id to live persona
//!
//! Built once by the simulation driver and shared as `Arc<PeerRegistry>`.
//! Personas never hold a reference to it; protocols receive it as an argument.

use crate::persona::Persona;
use govsim_core::{AgentId, Error, Identity, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

pub struct PeerRegistry {
    personas: HashMap<AgentId, Arc<Persona>>,
    order: Vec<AgentId>,
}

impl PeerRegistry {
    /// Register every persona and give each an empty private log per peer.
    pub async fn new(personas: impl IntoIterator<Item = Arc<Persona>>) -> Result<Self> {
        let mut map: HashMap<AgentId, Arc<Persona>> = HashMap::new();
        let mut order = Vec::new();
        for persona in personas {
            let id = persona.id();
            if id.is_framework() {
                return Err(Error::InvalidConfig(format!(
                    "{} uses the reserved framework id",
                    persona.name()
                )));
            }
            // Speakers are nominated by name, so names must be unique ignoring case.
            if let Some(other) = map
                .values()
                .find(|p| p.name().eq_ignore_ascii_case(persona.name()))
            {
                return Err(Error::InvalidConfig(format!(
                    "{} and {} share a name",
                    other.id(),
                    id
                )));
            }
            if map.insert(id, persona).is_some() {
                return Err(Error::InvalidConfig(format!("duplicate agent id {}", id)));
            }
            order.push(id);
        }

        for persona in map.values() {
            for peer in &order {
                if *peer != persona.id() {
                    persona.seed_private_history(*peer).await;
                }
            }
        }

        info!("Peer registry ready: {} personas", order.len());
        Ok(Self {
            personas: map,
            order,
        })
    }

    pub fn get(&self, id: &AgentId) -> Result<&Arc<Persona>> {
        self.personas.get(id).ok_or(Error::UnknownAgent(*id))
    }

    pub fn identity(&self, id: &AgentId) -> Result<Identity> {
        self.get(id).map(|p| p.identity().clone())
    }

    /// Names of all registered personas, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Persona>> {
        self.order.iter().filter_map(|id| self.personas.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
