//! Core types for Govsim

use crate::oracle::AuditLog;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Stable numeric agent id - the only key used to address a persona
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub u32);

impl AgentId {
    /// Reserved for framework-authored utterances. Never registered as a persona.
    pub const FRAMEWORK: AgentId = AgentId(u32::MAX);

    pub fn is_framework(&self) -> bool {
        *self == Self::FRAMEWORK
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_framework() {
            write!(f, "framework")
        } else {
            write!(f, "persona_{}", self.0)
        }
    }
}

impl From<u32> for AgentId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Immutable name + id pair
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: AgentId,
    pub name: String,
}

impl Identity {
    pub fn new(id: impl Into<AgentId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// The mayor who reads out the monthly report.
    pub fn framework() -> Self {
        Self::new(AgentId::FRAMEWORK, "Mayor")
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// One line of a conversation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    pub speaker: Identity,
    pub text: String,
}

impl Utterance {
    pub fn new(speaker: Identity, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
        }
    }
}

/// Render a transcript as `-Name: text` lines.
pub fn render_transcript(utterances: &[Utterance]) -> String {
    utterances
        .iter()
        .map(|u| format!("-{}: {}\n", u.speaker.name, u.text))
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Private,
    Group,
}

/// Why a conversation stopped
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum Termination {
    /// A speaker set the end flag.
    EndSignal,
    /// The configured turn cap was reached.
    TurnCap,
    /// The nominated next speaker is not a declared participant.
    InvalidNomination { nominee: Option<String> },
}

/// A finished conversation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Conversation {
    pub kind: ConversationKind,
    pub utterances: Vec<Utterance>,
    pub termination: Termination,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_ceiling: Option<u32>,
}

impl Conversation {
    pub fn len(&self) -> usize {
        self.utterances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utterances.is_empty()
    }

    pub fn render(&self) -> String {
        render_transcript(&self.utterances)
    }

    /// Distinct speakers in order of first appearance.
    pub fn speakers(&self) -> Vec<&Identity> {
        let mut seen = Vec::new();
        for u in &self.utterances {
            if !seen.contains(&&u.speaker) {
                seen.push(&u.speaker);
            }
        }
        seen
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    Event,
    Chat,
    Thought,
}

/// A single entry in a persona's memory store
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub kind: MemoryKind,
    pub text: String,
    pub created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub participants: BTreeSet<AgentId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transcript: Vec<Utterance>,
    /// Exempt from relevance-based forgetting.
    #[serde(default)]
    pub always_salient: bool,
}

impl MemoryEntry {
    pub fn event(text: impl Into<String>, created: DateTime<Utc>) -> Self {
        Self {
            kind: MemoryKind::Event,
            text: text.into(),
            created,
            participants: BTreeSet::new(),
            transcript: Vec::new(),
            always_salient: false,
        }
    }

    pub fn thought(text: impl Into<String>, created: DateTime<Utc>) -> Self {
        Self {
            kind: MemoryKind::Thought,
            ..Self::event(text, created)
        }
    }

    pub fn chat(
        summary: impl Into<String>,
        transcript: Vec<Utterance>,
        created: DateTime<Utc>,
        participants: impl IntoIterator<Item = AgentId>,
    ) -> Self {
        Self {
            kind: MemoryKind::Chat,
            text: summary.into(),
            created,
            participants: participants.into_iter().collect(),
            transcript,
            always_salient: false,
        }
    }

    pub fn salient(mut self) -> Self {
        self.always_salient = true;
        self
    }
}

/// Where a persona is this tick
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Location {
    #[serde(rename = "lake")]
    HarvestSite,
    #[serde(rename = "restaurant")]
    SocialSite,
    #[serde(rename = "home")]
    Home,
}

impl Location {
    pub fn label(&self) -> &'static str {
        match self {
            Location::HarvestSite => "lake",
            Location::SocialSite => "restaurant",
            Location::Home => "home",
        }
    }
}

/// Sub-stage within a location
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    #[serde(rename = "lake")]
    Harvest,
    #[serde(rename = "pool_after_harvesting")]
    PostHarvest,
    #[serde(rename = "restaurant")]
    Conversation,
    #[serde(rename = "home")]
    Reflection,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentLocation {
    pub agent: AgentId,
    pub location: Location,
}

/// What a persona sees at the start of a tick
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Observation {
    pub location: Location,
    pub phase: Phase,
    pub current_time: DateTime<Utc>,
    /// Resources currently available at the harvest site.
    #[serde(default)]
    pub resource_count: u32,
    /// Where every agent is, in enumeration order.
    #[serde(default)]
    pub agent_locations: Vec<AgentLocation>,
    #[serde(default)]
    pub context: String,
    /// Resource counts each agent collected last period.
    #[serde(default)]
    pub agent_resource_counts: BTreeMap<AgentId, u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sustainability_threshold: Option<u32>,
}

impl Observation {
    /// Agents at `location`, in the order they were first enumerated.
    pub fn agents_at(&self, location: Location) -> Vec<AgentId> {
        let mut agents = Vec::new();
        for a in &self.agent_locations {
            if a.location == location && !agents.contains(&a.agent) {
                agents.push(a.agent);
            }
        }
        agents
    }
}

pub type Stats = BTreeMap<String, serde_json::Value>;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    Noop,
    Harvesting {
        quantity: u32,
        stats: Stats,
    },
    Chat {
        conversation: Conversation,
        resource_ceiling: Option<u32>,
        stats: Stats,
    },
}

/// The single action a persona returns per tick
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersonaAction {
    pub agent: AgentId,
    pub location: Location,
    pub kind: ActionKind,
    pub audit: AuditLog,
}

impl PersonaAction {
    pub fn noop(agent: AgentId, location: Location, audit: AuditLog) -> Self {
        Self {
            agent,
            location,
            kind: ActionKind::Noop,
            audit,
        }
    }

    pub fn quantity(&self) -> Option<u32> {
        match &self.kind {
            ActionKind::Harvesting { quantity, .. } => Some(*quantity),
            _ => None,
        }
    }
}
