//! Private two-party conversation
//!
//! Speaker and listener swap after every turn. The conversation ends when the
//! current speaker sets the end flag or after `max_private_turns` utterances,
//! whichever comes first. The finished transcript is summarised once and
//! written to both participants, initiator first.

use crate::persona::Persona;
use govsim_core::{
    AuditLog, Conversation, ConversationKind, Location, MemoryEntry, Oracle, PrivateTurnContext,
    Result, Termination, Utterance,
};
use tracing::{debug, info};

const PRIVATE_TOP_K: usize = 3;

pub async fn converse_private(
    oracle: &dyn Oracle,
    initiator: &Persona,
    target: &Persona,
    location: Location,
    audit: &mut AuditLog,
) -> Result<Conversation> {
    let time = initiator.current_time().await;
    let max_turns = initiator.config().max_private_turns;

    let mut utterances: Vec<Utterance> = Vec::new();
    let mut termination = Termination::TurnCap;
    let (mut speaker, mut listener) = (initiator, target);

    for turn in 0..max_turns {
        let mut focal_points = vec![format!("Private chat with {}", listener.name())];
        if let Some(last) = utterances.last() {
            focal_points.push(last.text.clone());
        }
        let memories = speaker.retrieve(&focal_points, PRIVATE_TOP_K).await?;

        let ctx = PrivateTurnContext {
            interlocutor: listener.identity(),
            location,
            time,
            memories: &memories,
            history: &utterances,
        };
        let reply = audit.take(oracle.private_utterance(speaker.identity(), &ctx).await?);
        debug!(turn, speaker = speaker.name(), end = reply.end_conversation, "private turn");

        utterances.push(Utterance::new(speaker.identity().clone(), reply.utterance));

        if reply.end_conversation {
            termination = Termination::EndSignal;
            break;
        }
        std::mem::swap(&mut speaker, &mut listener);
    }

    let summary = audit.take(oracle.summarize(&utterances).await?);

    let participants = [initiator.id(), target.id()];
    for persona in [initiator, target] {
        persona
            .store(MemoryEntry::chat(
                summary.clone(),
                utterances.clone(),
                time,
                participants,
            ))
            .await?;
    }
    initiator.extend_private_history(target.id(), &utterances).await;
    target.extend_private_history(initiator.id(), &utterances).await;

    info!(
        "Private chat {} -> {}: {} utterances, {:?}",
        initiator.name(),
        target.name(),
        utterances.len(),
        termination
    );

    Ok(Conversation {
        kind: ConversationKind::Private,
        utterances,
        termination,
        summary,
        resource_ceiling: None,
    })
}
