//! Private-chat pairing
//!
//! Greedy, first-come-first-served. Personas are visited in the order the
//! observation enumerated them; each still-eligible persona nominates a partner
//! or nobody. A nomination is honoured only if the target is still in the
//! pool, in which case both leave the pool and their private conversation runs
//! to completion before the next persona is visited. Earlier personas win
//! ties. A nomination of someone already paired is dropped and never retried
//! this tick; the nominating persona stays eligible as someone else's target.

use crate::private::converse_private;
use crate::registry::PeerRegistry;
use govsim_core::{
    AgentId, AuditLog, Conversation, Identity, Location, Oracle, PairingContext, Result,
};
use tracing::{debug, info, warn};

const PAIRING_TOP_K: usize = 5;

/// Per-tick set of personas not yet committed to a private conversation.
#[derive(Debug, Clone, Default)]
pub struct EligiblePool {
    members: Vec<AgentId>,
}

impl EligiblePool {
    pub fn new(agents: impl IntoIterator<Item = AgentId>) -> Self {
        let mut members = Vec::new();
        for agent in agents {
            if !members.contains(&agent) {
                members.push(agent);
            }
        }
        Self { members }
    }

    pub fn contains(&self, agent: &AgentId) -> bool {
        self.members.contains(agent)
    }

    /// Remove both if both are eligible. Returns whether the pair was formed.
    pub fn pair(&mut self, a: AgentId, b: AgentId) -> bool {
        if a == b || !self.contains(&a) || !self.contains(&b) {
            return false;
        }
        self.members.retain(|m| *m != a && *m != b);
        true
    }

    pub fn members(&self) -> &[AgentId] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Run pairing over `co_located` and every private conversation it produces.
pub async fn run_pairing(
    oracle: &dyn Oracle,
    peers: &PeerRegistry,
    co_located: &[AgentId],
    location: Location,
    audit: &mut AuditLog,
) -> Result<(Vec<Conversation>, EligiblePool)> {
    let mut pool = EligiblePool::new(co_located.iter().copied());
    let identities: Vec<Identity> = pool
        .members()
        .iter()
        .map(|id| peers.identity(id))
        .collect::<Result<_>>()?;
    let order: Vec<AgentId> = pool.members().to_vec();
    let focal_points = vec![format!("Considering a private chat in {}", location.label())];

    let mut conversations = Vec::new();

    for agent_id in order {
        if !pool.contains(&agent_id) {
            continue;
        }
        let agent = peers.get(&agent_id)?;
        let candidates: Vec<Identity> = identities
            .iter()
            .filter(|i| i.id != agent_id)
            .cloned()
            .collect();
        let memories = agent.retrieve(&focal_points, PAIRING_TOP_K).await?;

        let ctx = PairingContext {
            location,
            time: agent.current_time().await,
            memories: &memories,
            candidates: &candidates,
        };
        let nominee = audit.take(oracle.nominate_partner(agent.identity(), &ctx).await?);

        let Some(target_id) = nominee else {
            debug!("{} wants no private chat", agent.name());
            continue;
        };
        if !candidates.iter().any(|c| c.id == target_id) {
            warn!("{} nominated {}, who is not here; ignored", agent.name(), target_id);
            continue;
        }
        if !pool.pair(agent_id, target_id) {
            info!(
                "{} nominated {}, already paired; nomination discarded",
                agent.name(),
                target_id
            );
            continue;
        }

        let target = peers.get(&target_id)?;
        info!("Pairing {} with {}", agent.name(), target.name());
        let conversation = converse_private(oracle, agent, target, location, audit).await?;
        conversations.push(conversation);
    }

    Ok((conversations, pool))
}
