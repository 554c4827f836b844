//! PersonaRuntime - per-tick phase dispatch

use crate::group::converse_group;
use crate::pairing::run_pairing;
use crate::persona::Persona;
use crate::reflect::reflect_on_focal_points;
use crate::registry::PeerRegistry;
use govsim_core::{
    ActionKind, AgentId, AuditLog, Error, HarvestContext, Identity, Location, Observation, Oracle,
    PersonaAction, Phase, Result, Stats,
};
use std::sync::Arc;
use tracing::{debug, info};

const HARVEST_TOP_K: usize = 10;

/// What a (location, phase) pair asks the persona to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Harvest,
    RecordOnly,
    Socialize,
    Reflect,
}

impl Route {
    pub fn resolve(location: Location, phase: Phase) -> Result<Self> {
        match (location, phase) {
            (Location::HarvestSite, Phase::Harvest) => Ok(Route::Harvest),
            (Location::HarvestSite, Phase::PostHarvest) => Ok(Route::RecordOnly),
            (Location::SocialSite, Phase::Conversation) => Ok(Route::Socialize),
            (Location::Home, Phase::Reflection) => Ok(Route::Reflect),
            (location, phase) => Err(Error::unsupported_phase(location, phase)),
        }
    }
}

pub struct PersonaRuntime {
    oracle: Arc<dyn Oracle>,
    peers: Arc<PeerRegistry>,
}

impl PersonaRuntime {
    pub fn new(oracle: Arc<dyn Oracle>, peers: Arc<PeerRegistry>) -> Self {
        Self { oracle, peers }
    }

    pub fn peers(&self) -> &Arc<PeerRegistry> {
        &self.peers
    }

    /// Process one observation for `agent` and produce exactly one action.
    pub async fn step(&self, agent: AgentId, obs: &Observation) -> Result<PersonaAction> {
        let route = Route::resolve(obs.location, obs.phase)?;
        let persona = self.peers.get(&agent)?;
        persona.perceive(obs).await?;
        debug!(agent = persona.name(), ?route, "step");

        let mut audit = AuditLog::new();
        let kind = match route {
            Route::Harvest => self.harvest(persona, obs, &mut audit).await?,
            Route::RecordOnly => ActionKind::Noop,
            Route::Socialize => self.socialize(persona, obs, &mut audit).await?,
            Route::Reflect => {
                let focal_points = persona.config().reflection_focal_points.clone();
                reflect_on_focal_points(
                    self.oracle.as_ref(),
                    &self.peers.names(),
                    persona,
                    &focal_points,
                    &mut audit,
                )
                .await?;
                ActionKind::Noop
            }
        };

        persona.memory().flush().await?;

        Ok(PersonaAction {
            agent,
            location: obs.location,
            kind,
            audit,
        })
    }

    async fn harvest(
        &self,
        persona: &Persona,
        obs: &Observation,
        audit: &mut AuditLog,
    ) -> Result<ActionKind> {
        if obs.resource_count == 0 {
            audit.note("no resources to harvest");
            return Ok(ActionKind::Harvesting {
                quantity: 0,
                stats: Stats::new(),
            });
        }

        let memories = persona
            .retrieve(&[obs.location.label().to_string()], HARVEST_TOP_K)
            .await?;
        let ctx = HarvestContext {
            location: obs.location,
            time: obs.current_time,
            context: &obs.context,
            memories: &memories,
            available: obs.resource_count,
            sustainability_threshold: obs.sustainability_threshold,
        };
        let quantity = audit.take(
            self.oracle
                .harvest_quantity(persona.identity(), &ctx)
                .await?,
        );
        if quantity > obs.resource_count {
            return Err(Error::HarvestOutOfRange {
                requested: quantity,
                available: obs.resource_count,
            });
        }

        info!("{} harvests {}", persona.name(), quantity);
        let mut stats = Stats::new();
        stats.insert(
            format!("{}_collected_resource", persona.id()),
            quantity.into(),
        );
        Ok(ActionKind::Harvesting { quantity, stats })
    }

    async fn socialize(
        &self,
        persona: &Persona,
        obs: &Observation,
        audit: &mut AuditLog,
    ) -> Result<ActionKind> {
        // Config errors surface before any Oracle call.
        persona.config().prompt_variant()?;

        let present = obs.agents_at(Location::SocialSite);
        if !present.contains(&persona.id()) {
            return Err(Error::NotPresent {
                agent: persona.id(),
                location: Location::SocialSite,
            });
        }
        let participants: Vec<Identity> = present
            .iter()
            .map(|id| self.peers.identity(id))
            .collect::<Result<_>>()?;

        let (private_chats, _) = run_pairing(
            self.oracle.as_ref(),
            &self.peers,
            &present,
            obs.location,
            audit,
        )
        .await?;
        debug!("{} private chats before the group", private_chats.len());

        let conversation = converse_group(
            self.oracle.as_ref(),
            &self.peers,
            persona,
            &participants,
            obs.location,
            &obs.context,
            &obs.agent_resource_counts,
            audit,
        )
        .await?;

        let resource_ceiling = conversation.resource_ceiling;
        let mut stats = Stats::new();
        stats.insert(
            "conversation_resource_limit".to_string(),
            resource_ceiling.into(),
        );
        Ok(ActionKind::Chat {
            conversation,
            resource_ceiling,
            stats,
        })
    }
}
