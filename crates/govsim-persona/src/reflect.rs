//! Reflection - turn focal points or a conversation into stored thoughts

use crate::persona::Persona;
use govsim_core::{
    AuditLog, ConversationReflectionContext, InsightContext, MemoryEntry, Oracle, Result,
    Utterance,
};
use tracing::{debug, info};

const REFLECTION_TOP_K: usize = 10;

/// For each focal point: retrieve, ask for insights, store each insight.
pub async fn reflect_on_focal_points(
    oracle: &dyn Oracle,
    peer_names: &[String],
    persona: &Persona,
    focal_points: &[String],
    audit: &mut AuditLog,
) -> Result<Vec<String>> {
    let time = persona.current_time().await;
    let mut acc = Vec::new();

    for focal_point in focal_points {
        let memories = persona
            .retrieve(std::slice::from_ref(focal_point), REFLECTION_TOP_K)
            .await?;
        let ctx = InsightContext {
            focal_point,
            memories: &memories,
            peer_names,
        };
        let insights = audit.take(oracle.insights(persona.identity(), &ctx).await?);
        debug!(focal_point = focal_point.as_str(), count = insights.len(), "insights");

        for insight in insights {
            persona.store(MemoryEntry::thought(insight.clone(), time)).await?;
            acc.push(insight);
        }
    }

    info!("{} reflected: {} insights", persona.name(), acc.len());
    Ok(acc)
}

/// One planning thought and one memorisation thought, both stored.
pub async fn reflect_on_conversation(
    oracle: &dyn Oracle,
    peer_names: &[String],
    persona: &Persona,
    transcript: &[Utterance],
    audit: &mut AuditLog,
) -> Result<()> {
    let time = persona.current_time().await;
    let ctx = ConversationReflectionContext {
        transcript,
        peer_names,
    };

    let planning = audit.take(oracle.planning_thought(persona.identity(), &ctx).await?);
    persona.store(MemoryEntry::thought(planning, time)).await?;

    let memo = audit.take(oracle.memorize_thought(persona.identity(), &ctx).await?);
    persona.store(MemoryEntry::thought(memo, time)).await?;
    Ok(())
}
