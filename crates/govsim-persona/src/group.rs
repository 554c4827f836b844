//! Group conversation
//!
//! Optional framework-authored opening, then Oracle turns. Each turn names the
//! next speaker. The loop stops on an end flag, when the transcript holds
//! `max_group_turns` utterances, or when the nominated speaker is not one of
//! the declared participants. The initiator must be a declared participant and
//! the opening may not exceed the cap. Afterwards every participant gets the
//! summary, a post-conversation reflection, and, if one was agreed, the ceiling
//! as an always-salient memory.

use crate::persona::Persona;
use crate::reflect;
use crate::registry::PeerRegistry;
use govsim_core::{
    AgentId, AuditLog, Conversation, ConversationKind, Error, GroupTurnContext, Identity,
    InjectionStrategy, Location, MemoryEntry, Oracle, Result, Termination, Utterance,
};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

const GROUP_TOP_K: usize = 5;
const FOCAL_WINDOW: usize = 4;

/// Framework-authored openers announcing last period's counts.
pub fn opening_utterances(
    strategy: InjectionStrategy,
    participants: &[Identity],
    resource_counts: &BTreeMap<AgentId, u32>,
    unit: &str,
) -> Result<Vec<Utterance>> {
    let count = |id: &AgentId| {
        resource_counts
            .get(id)
            .copied()
            .ok_or(Error::MissingResourceCount(*id))
    };

    match strategy {
        InjectionStrategy::None => Ok(Vec::new()),
        InjectionStrategy::Individual => participants
            .iter()
            .map(|p| -> Result<Utterance> {
                Ok(Utterance::new(
                    p.clone(),
                    format!("This month, I caught {} {}!", count(&p.id)?, unit),
                ))
            })
            .collect(),
        InjectionStrategy::Manager => {
            let mut report = String::new();
            for p in participants {
                report.push_str(&format!("{} caught {} {}. ", p.name, count(&p.id)?, unit));
            }
            Ok(vec![Utterance::new(
                Identity::framework(),
                format!(
                    "Ladies and gentlemen, let me give you the monthly report. {}",
                    report.trim_end()
                ),
            )])
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn converse_group(
    oracle: &dyn Oracle,
    peers: &PeerRegistry,
    initiator: &Persona,
    participants: &[Identity],
    location: Location,
    topic: &str,
    resource_counts: &BTreeMap<AgentId, u32>,
    audit: &mut AuditLog,
) -> Result<Conversation> {
    let config = initiator.config();
    let variant = config.prompt_variant()?;
    let time = initiator.current_time().await;
    let max_turns = config.max_group_turns;

    if !participants.iter().any(|p| p.id == initiator.id()) {
        return Err(Error::NotPresent {
            agent: initiator.id(),
            location,
        });
    }

    let mut utterances = opening_utterances(
        config.injection,
        participants,
        resource_counts,
        &config.resource_unit,
    )?;
    if utterances.len() > max_turns {
        return Err(Error::InvalidConfig(format!(
            "{:?} injection opens with {} utterances but max_group_turns is {}",
            config.injection,
            utterances.len(),
            max_turns
        )));
    }
    if config.injection == InjectionStrategy::Individual {
        for u in &utterances {
            audit.note(format!("{}: {}", u.speaker.name, u.text));
        }
    }

    let mut termination = Termination::TurnCap;
    let mut current = initiator.identity().clone();

    while utterances.len() < max_turns {
        let speaker = peers.get(&current.id)?;

        let mut focal_points = vec![topic.to_string()];
        let window = utterances.len().saturating_sub(FOCAL_WINDOW);
        focal_points.extend(utterances[window..].iter().map(|u| u.text.clone()));
        let memories = speaker.retrieve(&focal_points, GROUP_TOP_K).await?;

        let ctx = GroupTurnContext {
            variant,
            participants,
            location,
            time,
            topic,
            memories: &memories,
            history: &utterances,
        };
        let turn = audit.take(oracle.group_utterance(speaker.identity(), &ctx).await?);
        debug!(
            speaker = speaker.name(),
            end = turn.end_conversation,
            next = ?turn.next_speaker,
            "group turn"
        );

        utterances.push(Utterance::new(current.clone(), turn.utterance));

        if turn.end_conversation {
            termination = Termination::EndSignal;
            break;
        }
        if utterances.len() >= max_turns {
            break;
        }

        let next = turn
            .next_speaker
            .as_deref()
            .and_then(|name| participants.iter().find(|p| p.name == name));
        match next {
            Some(next) => current = next.clone(),
            None => {
                warn!(
                    "{} nominated {:?}, not a participant; ending conversation",
                    current.name, turn.next_speaker
                );
                termination = Termination::InvalidNomination {
                    nominee: turn.next_speaker,
                };
                break;
            }
        }
    }

    let summary = audit.take(oracle.summarize(&utterances).await?);
    let resource_ceiling = audit.take(oracle.extract_ceiling(&utterances).await?);

    info!(
        "Group chat at {}: {} utterances, {:?}, ceiling {:?}",
        location.label(),
        utterances.len(),
        termination,
        resource_ceiling
    );

    let peer_names = peers.names();
    for participant in participants {
        let p = peers.get(&participant.id)?;
        p.store(MemoryEntry::chat(
            summary.clone(),
            utterances.clone(),
            time,
            [p.id()],
        ))
        .await?;
        reflect::reflect_on_conversation(oracle, &peer_names, p, &utterances, audit).await?;

        if let Some(ceiling) = resource_ceiling {
            p.store(
                MemoryEntry::thought(
                    format!(
                        "The community agreed on a maximum limit of {} {} per person.",
                        ceiling, config.resource_unit
                    ),
                    time,
                )
                .salient(),
            )
            .await?;
        }
    }

    Ok(Conversation {
        kind: ConversationKind::Group,
        utterances,
        termination,
        summary,
        resource_ceiling,
    })
}
