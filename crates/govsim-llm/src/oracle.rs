//! LlmOracle - an Oracle backed by any LlmProvider

use crate::parse::{
    is_no_one, parse_answer, CeilingAnswer, GroupTurnAnswer, HarvestAnswer, InsightsAnswer,
    NominationAnswer, SummaryAnswer, ThoughtAnswer, TurnAnswer,
};
use crate::prompts;
use crate::provider::LlmProvider;
use crate::types::{LlmMessage, LlmRequest, DEFAULT_MODEL};
use govsim_core::{
    AgentId, AuditRecord, ConversationReflectionContext, Decision, GroupTurn, GroupTurnContext,
    HarvestContext, Identity, InsightContext, Oracle, OracleCall, OracleError, OracleResult,
    PairingContext, PrivateTurnContext, Turn, Utterance,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Model used for persona decisions.
    pub model: String,
    /// Model used for summaries and ceiling extraction.
    pub framework_model: String,
    pub max_tokens: u32,
    /// 0.0 keeps runs reproducible.
    pub temperature: f32,
    /// Override the provider endpoint (proxies, mocks).
    pub base_url: Option<String>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.into(),
            framework_model: DEFAULT_MODEL.into(),
            max_tokens: 1024,
            temperature: 0.0,
            base_url: None,
        }
    }
}

pub struct LlmOracle {
    provider: Arc<dyn LlmProvider>,
    config: OracleConfig,
    /// Taken from the persona config so prompts and memories agree.
    resource_unit: String,
    goals: HashMap<AgentId, String>,
}

impl LlmOracle {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        config: OracleConfig,
        resource_unit: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            config,
            resource_unit: resource_unit.into(),
            goals: HashMap::new(),
        }
    }

    /// Per-persona goals appended to the system prompt.
    pub fn with_goals(mut self, goals: HashMap<AgentId, String>) -> Self {
        self.goals = goals;
        self
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    async fn ask(
        &self,
        call: OracleCall,
        caller: Option<&Identity>,
        prompt: String,
    ) -> Result<(String, AuditRecord), OracleError> {
        let (model, system) = match caller {
            Some(persona) => (
                self.config.model.clone(),
                prompts::system_prompt(
                    persona,
                    self.goals.get(&persona.id).map(String::as_str),
                    &self.resource_unit,
                ),
            ),
            None => (
                self.config.framework_model.clone(),
                prompts::framework_system_prompt(),
            ),
        };

        debug!(call = call.as_str(), caller = ?caller.map(|c| &c.name), "oracle call");

        let request = LlmRequest {
            model,
            messages: vec![LlmMessage::user(prompt.clone())],
            max_tokens: Some(self.config.max_tokens),
            temperature: Some(self.config.temperature),
            system: Some(system.clone()),
        };

        let response = self
            .provider
            .complete(request)
            .await
            .map_err(OracleError::backend)?;

        let audit = AuditRecord::new(call, caller, format!("{}\n\n{}", system, prompt), &response);
        Ok((response, audit))
    }
}

fn resolve_name<'a>(identities: &'a [Identity], name: &str) -> Option<&'a Identity> {
    let name = name.trim();
    identities.iter().find(|i| i.name.eq_ignore_ascii_case(name))
}

#[async_trait::async_trait]
impl Oracle for LlmOracle {
    async fn harvest_quantity(
        &self,
        caller: &Identity,
        ctx: &HarvestContext<'_>,
    ) -> OracleResult<u32> {
        let prompt = prompts::harvest(caller, ctx, &self.resource_unit);
        let (text, audit) = self.ask(OracleCall::Harvest, Some(caller), prompt).await?;
        let answer: HarvestAnswer = parse_answer(OracleCall::Harvest, &text)?;
        Ok(Decision::new(answer.quantity, audit))
    }

    async fn nominate_partner(
        &self,
        caller: &Identity,
        ctx: &PairingContext<'_>,
    ) -> OracleResult<Option<AgentId>> {
        let prompt = prompts::nominate_partner(caller, ctx);
        let (text, audit) = self
            .ask(OracleCall::NominatePartner, Some(caller), prompt)
            .await?;
        let answer: NominationAnswer = parse_answer(OracleCall::NominatePartner, &text)?;
        let partner = match answer.partner.as_deref() {
            None => None,
            Some(name) if is_no_one(name) => None,
            Some(name) => match resolve_name(ctx.candidates, name) {
                Some(identity) => Some(identity.id),
                None => {
                    return Err(OracleError::malformed(
                        OracleCall::NominatePartner.as_str(),
                        format!("{} is not one of the candidates", name),
                    ))
                }
            },
        };
        Ok(Decision::new(partner, audit))
    }

    async fn private_utterance(
        &self,
        caller: &Identity,
        ctx: &PrivateTurnContext<'_>,
    ) -> OracleResult<Turn> {
        let prompt = prompts::private_utterance(caller, ctx);
        let (text, audit) = self
            .ask(OracleCall::PrivateUtterance, Some(caller), prompt)
            .await?;
        let answer: TurnAnswer = parse_answer(OracleCall::PrivateUtterance, &text)?;
        Ok(Decision::new(
            Turn {
                utterance: answer.utterance,
                end_conversation: answer.end_conversation,
            },
            audit,
        ))
    }

    async fn group_utterance(
        &self,
        caller: &Identity,
        ctx: &GroupTurnContext<'_>,
    ) -> OracleResult<GroupTurn> {
        let prompt = prompts::group_utterance(caller, ctx);
        let (text, audit) = self
            .ask(OracleCall::GroupUtterance, Some(caller), prompt)
            .await?;
        let answer: GroupTurnAnswer = parse_answer(OracleCall::GroupUtterance, &text)?;
        // Canonicalise the spelling when it matches; the engine decides validity.
        let next_speaker = answer.next_speaker.map(|name| {
            resolve_name(ctx.participants, &name)
                .map(|i| i.name.clone())
                .unwrap_or(name)
        });
        Ok(Decision::new(
            GroupTurn {
                utterance: answer.utterance,
                end_conversation: answer.end_conversation,
                next_speaker,
            },
            audit,
        ))
    }

    async fn summarize(&self, transcript: &[Utterance]) -> OracleResult<String> {
        let prompt = prompts::summarize(transcript);
        let (text, audit) = self.ask(OracleCall::Summarize, None, prompt).await?;
        let answer: SummaryAnswer = parse_answer(OracleCall::Summarize, &text)?;
        Ok(Decision::new(answer.summary, audit))
    }

    async fn extract_ceiling(&self, transcript: &[Utterance]) -> OracleResult<Option<u32>> {
        let prompt = prompts::extract_ceiling(transcript, &self.resource_unit);
        let (text, audit) = self.ask(OracleCall::ExtractCeiling, None, prompt).await?;
        let answer: CeilingAnswer = parse_answer(OracleCall::ExtractCeiling, &text)?;
        Ok(Decision::new(answer.ceiling, audit))
    }

    async fn insights(
        &self,
        caller: &Identity,
        ctx: &InsightContext<'_>,
    ) -> OracleResult<Vec<String>> {
        let prompt = prompts::insights(caller, ctx);
        let (text, audit) = self.ask(OracleCall::Insights, Some(caller), prompt).await?;
        let answer: InsightsAnswer = parse_answer(OracleCall::Insights, &text)?;
        let insights = answer
            .insights
            .into_iter()
            .filter(|i| !i.trim().is_empty())
            .collect();
        Ok(Decision::new(insights, audit))
    }

    async fn planning_thought(
        &self,
        caller: &Identity,
        ctx: &ConversationReflectionContext<'_>,
    ) -> OracleResult<String> {
        let prompt = prompts::planning_thought(caller, ctx);
        let (text, audit) = self
            .ask(OracleCall::PlanningThought, Some(caller), prompt)
            .await?;
        let answer: ThoughtAnswer = parse_answer(OracleCall::PlanningThought, &text)?;
        Ok(Decision::new(answer.thought, audit))
    }

    async fn memorize_thought(
        &self,
        caller: &Identity,
        ctx: &ConversationReflectionContext<'_>,
    ) -> OracleResult<String> {
        let prompt = prompts::memorize_thought(caller, ctx);
        let (text, audit) = self
            .ask(OracleCall::MemorizeThought, Some(caller), prompt)
            .await?;
        let answer: ThoughtAnswer = parse_answer(OracleCall::MemorizeThought, &text)?;
        Ok(Decision::new(answer.thought, audit))
    }
}
