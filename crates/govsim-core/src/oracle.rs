//! Oracle contract - the external decision capability
//!
//! One method per call site. Every call returns its payload together with an
//! opaque [`AuditRecord`]; the engine never looks inside the record, it only
//! collects it into the tick's [`AuditLog`] for later inspection or replay.
//! Implementations must not mutate caller-supplied arguments and must be
//! deterministic for a fixed seed.

use crate::config::PromptVariant;
use crate::error::OracleError;
use crate::memory::RetrievedMemory;
use crate::types::{AgentId, Identity, Location, Utterance};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type OracleResult<T> = std::result::Result<Decision<T>, OracleError>;

/// A payload plus the audit record of the call that produced it
#[derive(Clone, Debug)]
pub struct Decision<T> {
    pub payload: T,
    pub audit: AuditRecord,
}

impl<T> Decision<T> {
    pub fn new(payload: T, audit: AuditRecord) -> Self {
        Self { payload, audit }
    }
}

/// Which call site produced a record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleCall {
    Harvest,
    NominatePartner,
    PrivateUtterance,
    GroupUtterance,
    Summarize,
    ExtractCeiling,
    Insights,
    PlanningThought,
    MemorizeThought,
}

impl OracleCall {
    pub fn as_str(&self) -> &'static str {
        match self {
            OracleCall::Harvest => "harvest",
            OracleCall::NominatePartner => "nominate_partner",
            OracleCall::PrivateUtterance => "private_utterance",
            OracleCall::GroupUtterance => "group_utterance",
            OracleCall::Summarize => "summarize",
            OracleCall::ExtractCeiling => "extract_ceiling",
            OracleCall::Insights => "insights",
            OracleCall::PlanningThought => "planning_thought",
            OracleCall::MemorizeThought => "memorize_thought",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub call: OracleCall,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller: Option<Identity>,
    pub prompt: String,
    pub response: String,
}

impl AuditRecord {
    pub fn new(
        call: OracleCall,
        caller: Option<&Identity>,
        prompt: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            call,
            caller: caller.cloned(),
            prompt: prompt.into(),
            response: response.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum AuditEntry {
    Oracle(AuditRecord),
    /// Something the engine did on its own, without asking the Oracle.
    Framework { note: String },
}

/// Ordered interaction log for one tick
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditLog(Vec<AuditEntry>);

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: AuditRecord) {
        self.0.push(AuditEntry::Oracle(record));
    }

    pub fn note(&mut self, note: impl Into<String>) {
        self.0.push(AuditEntry::Framework { note: note.into() });
    }

    /// Keep the record, hand back the payload.
    pub fn take<T>(&mut self, decision: Decision<T>) -> T {
        self.record(decision.audit);
        decision.payload
    }

    pub fn extend(&mut self, other: AuditLog) {
        self.0.extend(other.0);
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn oracle_calls(&self) -> impl Iterator<Item = &AuditRecord> {
        self.0.iter().filter_map(|e| match e {
            AuditEntry::Oracle(r) => Some(r),
            AuditEntry::Framework { .. } => None,
        })
    }

    pub fn count_calls(&self, call: OracleCall) -> usize {
        self.oracle_calls().filter(|r| r.call == call).count()
    }
}

/// One utterance plus the speaker's wish to stop
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub utterance: String,
    pub end_conversation: bool,
}

/// A group turn also names who should talk next
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupTurn {
    pub utterance: String,
    pub end_conversation: bool,
    pub next_speaker: Option<String>,
}

pub struct HarvestContext<'a> {
    pub location: Location,
    pub time: DateTime<Utc>,
    pub context: &'a str,
    pub memories: &'a [RetrievedMemory],
    /// Upper bound (inclusive) of the allowed quantity.
    pub available: u32,
    pub sustainability_threshold: Option<u32>,
}

pub struct PairingContext<'a> {
    pub location: Location,
    pub time: DateTime<Utc>,
    pub memories: &'a [RetrievedMemory],
    /// Co-located personas other than the caller.
    pub candidates: &'a [Identity],
}

pub struct PrivateTurnContext<'a> {
    pub interlocutor: &'a Identity,
    pub location: Location,
    pub time: DateTime<Utc>,
    pub memories: &'a [RetrievedMemory],
    pub history: &'a [Utterance],
}

pub struct GroupTurnContext<'a> {
    pub variant: PromptVariant,
    pub participants: &'a [Identity],
    pub location: Location,
    pub time: DateTime<Utc>,
    pub topic: &'a str,
    pub memories: &'a [RetrievedMemory],
    pub history: &'a [Utterance],
}

pub struct InsightContext<'a> {
    pub focal_point: &'a str,
    pub memories: &'a [RetrievedMemory],
    pub peer_names: &'a [String],
}

pub struct ConversationReflectionContext<'a> {
    pub transcript: &'a [Utterance],
    pub peer_names: &'a [String],
}

#[async_trait::async_trait]
pub trait Oracle: Send + Sync {
    /// How many units to harvest, within `0..=ctx.available`.
    async fn harvest_quantity(&self, caller: &Identity, ctx: &HarvestContext<'_>)
        -> OracleResult<u32>;

    /// Pick a private-chat partner among `ctx.candidates`, or nobody.
    async fn nominate_partner(
        &self,
        caller: &Identity,
        ctx: &PairingContext<'_>,
    ) -> OracleResult<Option<AgentId>>;

    async fn private_utterance(
        &self,
        caller: &Identity,
        ctx: &PrivateTurnContext<'_>,
    ) -> OracleResult<Turn>;

    async fn group_utterance(
        &self,
        caller: &Identity,
        ctx: &GroupTurnContext<'_>,
    ) -> OracleResult<GroupTurn>;

    /// One-sentence summary of a finished conversation.
    async fn summarize(&self, transcript: &[Utterance]) -> OracleResult<String>;

    /// A per-person harvesting ceiling the group agreed on, if any.
    async fn extract_ceiling(&self, transcript: &[Utterance]) -> OracleResult<Option<u32>>;

    async fn insights(&self, caller: &Identity, ctx: &InsightContext<'_>)
        -> OracleResult<Vec<String>>;

    async fn planning_thought(
        &self,
        caller: &Identity,
        ctx: &ConversationReflectionContext<'_>,
    ) -> OracleResult<String>;

    async fn memorize_thought(
        &self,
        caller: &Identity,
        ctx: &ConversationReflectionContext<'_>,
    ) -> OracleResult<String>;
}
