//! Tests for govsim-persona: dispatch, pairing, private and group conversations, reflection

use chrono::{DateTime, TimeZone, Utc};
use govsim_core::*;
use govsim_persona::*;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

// ===========================================================================
// Scripted Oracle
// ===========================================================================

type NominateFn = dyn Fn(&Identity, &[Identity]) -> Option<AgentId> + Send + Sync;
type PrivateEndFn = dyn Fn(&Identity, &[Utterance]) -> bool + Send + Sync;
type GroupFn = dyn Fn(&Identity, &[Identity], &[Utterance]) -> GroupTurn + Send + Sync;

/// Deterministic Oracle driven by closures. Records every call it receives.
struct ScriptedOracle {
    harvest: u32,
    nominate: Box<NominateFn>,
    private_end: Box<PrivateEndFn>,
    group: Box<GroupFn>,
    ceiling: Option<u32>,
    insights: Vec<String>,
    fail_on: Option<OracleCall>,
    calls: Mutex<Vec<OracleCall>>,
}

impl ScriptedOracle {
    fn new() -> Self {
        Self {
            harvest: 5,
            nominate: Box::new(|_: &Identity, _: &[Identity]| -> Option<AgentId> { None }),
            private_end: Box::new(|_: &Identity, _: &[Utterance]| false),
            group: Box::new(|caller: &Identity, _: &[Identity], _: &[Utterance]| GroupTurn {
                utterance: format!("{} has nothing to add", caller.name),
                end_conversation: true,
                next_speaker: None,
            }),
            ceiling: None,
            insights: vec!["fish stocks recover slowly".into()],
            fail_on: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn with_harvest(mut self, quantity: u32) -> Self {
        self.harvest = quantity;
        self
    }

    fn with_nominate(
        mut self,
        f: impl Fn(&Identity, &[Identity]) -> Option<AgentId> + Send + Sync + 'static,
    ) -> Self {
        self.nominate = Box::new(f);
        self
    }

    fn with_private_end(
        mut self,
        f: impl Fn(&Identity, &[Utterance]) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.private_end = Box::new(f);
        self
    }

    fn with_group(
        mut self,
        f: impl Fn(&Identity, &[Identity], &[Utterance]) -> GroupTurn + Send + Sync + 'static,
    ) -> Self {
        self.group = Box::new(f);
        self
    }

    fn with_ceiling(mut self, ceiling: u32) -> Self {
        self.ceiling = Some(ceiling);
        self
    }

    fn with_insights(mut self, insights: &[&str]) -> Self {
        self.insights = insights.iter().map(|s| s.to_string()).collect();
        self
    }

    fn failing_on(mut self, call: OracleCall) -> Self {
        self.fail_on = Some(call);
        self
    }

    fn count(&self, call: OracleCall) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == call).count()
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn record(
        &self,
        call: OracleCall,
        caller: Option<&Identity>,
    ) -> std::result::Result<AuditRecord, OracleError> {
        self.calls.lock().unwrap().push(call);
        if self.fail_on == Some(call) {
            return Err(OracleError::Refused(format!("{} refused", call.as_str())));
        }
        Ok(AuditRecord::new(call, caller, "scripted", call.as_str()))
    }
}

#[async_trait::async_trait]
impl Oracle for ScriptedOracle {
    async fn harvest_quantity(
        &self,
        caller: &Identity,
        _ctx: &HarvestContext<'_>,
    ) -> OracleResult<u32> {
        let audit = self.record(OracleCall::Harvest, Some(caller))?;
        Ok(Decision::new(self.harvest, audit))
    }

    async fn nominate_partner(
        &self,
        caller: &Identity,
        ctx: &PairingContext<'_>,
    ) -> OracleResult<Option<AgentId>> {
        let audit = self.record(OracleCall::NominatePartner, Some(caller))?;
        Ok(Decision::new((self.nominate)(caller, ctx.candidates), audit))
    }

    async fn private_utterance(
        &self,
        caller: &Identity,
        ctx: &PrivateTurnContext<'_>,
    ) -> OracleResult<Turn> {
        let audit = self.record(OracleCall::PrivateUtterance, Some(caller))?;
        let turn = Turn {
            utterance: format!("{} to {}", caller.name, ctx.interlocutor.name),
            end_conversation: (self.private_end)(caller, ctx.history),
        };
        Ok(Decision::new(turn, audit))
    }

    async fn group_utterance(
        &self,
        caller: &Identity,
        ctx: &GroupTurnContext<'_>,
    ) -> OracleResult<GroupTurn> {
        let audit = self.record(OracleCall::GroupUtterance, Some(caller))?;
        Ok(Decision::new(
            (self.group)(caller, ctx.participants, ctx.history),
            audit,
        ))
    }

    async fn summarize(&self, transcript: &[Utterance]) -> OracleResult<String> {
        let audit = self.record(OracleCall::Summarize, None)?;
        Ok(Decision::new(
            format!("a chat of {} lines", transcript.len()),
            audit,
        ))
    }

    async fn extract_ceiling(&self, _transcript: &[Utterance]) -> OracleResult<Option<u32>> {
        let audit = self.record(OracleCall::ExtractCeiling, None)?;
        Ok(Decision::new(self.ceiling, audit))
    }

    async fn insights(
        &self,
        caller: &Identity,
        _ctx: &InsightContext<'_>,
    ) -> OracleResult<Vec<String>> {
        let audit = self.record(OracleCall::Insights, Some(caller))?;
        Ok(Decision::new(self.insights.clone(), audit))
    }

    async fn planning_thought(
        &self,
        caller: &Identity,
        _ctx: &ConversationReflectionContext<'_>,
    ) -> OracleResult<String> {
        let audit = self.record(OracleCall::PlanningThought, Some(caller))?;
        Ok(Decision::new(format!("{} plans to fish less", caller.name), audit))
    }

    async fn memorize_thought(
        &self,
        caller: &Identity,
        _ctx: &ConversationReflectionContext<'_>,
    ) -> OracleResult<String> {
        let audit = self.record(OracleCall::MemorizeThought, Some(caller))?;
        Ok(Decision::new(format!("{} remembers the chat", caller.name), audit))
    }
}

/// Every speaker hands over to the next participant and nobody ever ends.
fn round_robin(caller: &Identity, participants: &[Identity], _history: &[Utterance]) -> GroupTurn {
    let idx = participants
        .iter()
        .position(|p| p.id == caller.id)
        .unwrap_or(0);
    GroupTurn {
        utterance: format!("{} keeps talking", caller.name),
        end_conversation: false,
        next_speaker: Some(participants[(idx + 1) % participants.len()].name.clone()),
    }
}

// ===========================================================================
// Fixtures
// ===========================================================================

struct World {
    peers: Arc<PeerRegistry>,
    stores: Vec<Arc<InMemoryStore>>,
}

impl World {
    async fn new(names: &[&str], config: PersonaConfig) -> Self {
        let config = Arc::new(config);
        let mut stores = Vec::new();
        let mut personas = Vec::new();
        for (i, name) in names.iter().enumerate() {
            let store = Arc::new(InMemoryStore::new());
            personas.push(Arc::new(Persona::new(
                Identity::new(i as u32, *name),
                config.clone(),
                store.clone(),
            )));
            stores.push(store);
        }
        Self {
            peers: Arc::new(PeerRegistry::new(personas).await.unwrap()),
            stores,
        }
    }

    fn persona(&self, id: u32) -> &Arc<Persona> {
        self.peers.get(&AgentId(id)).unwrap()
    }

    fn identities(&self) -> Vec<Identity> {
        self.peers.iter().map(|p| p.identity().clone()).collect()
    }

    async fn entries(&self, id: u32) -> Vec<MemoryEntry> {
        self.stores[id as usize].entries().await
    }

    async fn entries_of(&self, id: u32, kind: MemoryKind) -> Vec<MemoryEntry> {
        self.entries(id)
            .await
            .into_iter()
            .filter(|e| e.kind == kind)
            .collect()
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap()
}

fn observation(location: Location, phase: Phase, present: &[u32]) -> Observation {
    Observation {
        location,
        phase,
        current_time: t0(),
        resource_count: 0,
        agent_locations: present
            .iter()
            .map(|&i| AgentLocation {
                agent: AgentId(i),
                location,
            })
            .collect(),
        context: String::new(),
        agent_resource_counts: BTreeMap::new(),
        sustainability_threshold: None,
    }
}

fn ids(agents: &[u32]) -> BTreeSet<AgentId> {
    agents.iter().map(|&i| AgentId(i)).collect()
}

// ===========================================================================
// Route / dispatch
// ===========================================================================

#[test]
fn route_accepts_exactly_four_pairs() {
    assert_eq!(
        Route::resolve(Location::HarvestSite, Phase::Harvest).unwrap(),
        Route::Harvest
    );
    assert_eq!(
        Route::resolve(Location::HarvestSite, Phase::PostHarvest).unwrap(),
        Route::RecordOnly
    );
    assert_eq!(
        Route::resolve(Location::SocialSite, Phase::Conversation).unwrap(),
        Route::Socialize
    );
    assert_eq!(
        Route::resolve(Location::Home, Phase::Reflection).unwrap(),
        Route::Reflect
    );
    assert!(matches!(
        Route::resolve(Location::Home, Phase::Harvest),
        Err(Error::UnsupportedPhase { .. })
    ));
    assert!(matches!(
        Route::resolve(Location::SocialSite, Phase::PostHarvest),
        Err(Error::UnsupportedPhase { .. })
    ));
}

#[tokio::test]
async fn unsupported_phase_makes_no_oracle_call() {
    let world = World::new(&["John", "Kate"], PersonaConfig::default()).await;
    let oracle = Arc::new(ScriptedOracle::new());
    let runtime = PersonaRuntime::new(oracle.clone(), world.peers.clone());

    let obs = observation(Location::Home, Phase::Harvest, &[0]);
    let err = runtime.step(AgentId(0), &obs).await.unwrap_err();
    assert!(matches!(
        err,
        Error::UnsupportedPhase {
            location: Location::Home,
            phase: Phase::Harvest
        }
    ));
    assert_eq!(oracle.total_calls(), 0);
    assert!(world.entries(0).await.is_empty());
}

#[tokio::test]
async fn unknown_agent_rejected() {
    let world = World::new(&["John"], PersonaConfig::default()).await;
    let runtime = PersonaRuntime::new(Arc::new(ScriptedOracle::new()), world.peers.clone());
    let obs = observation(Location::HarvestSite, Phase::PostHarvest, &[7]);
    assert!(matches!(
        runtime.step(AgentId(7), &obs).await,
        Err(Error::UnknownAgent(AgentId(7)))
    ));
}

// ===========================================================================
// Harvest
// ===========================================================================

#[tokio::test]
async fn zero_resources_harvest_without_oracle() {
    let world = World::new(&["John"], PersonaConfig::default()).await;
    let oracle = Arc::new(ScriptedOracle::new());
    let runtime = PersonaRuntime::new(oracle.clone(), world.peers.clone());

    let obs = observation(Location::HarvestSite, Phase::Harvest, &[0]);
    let action = runtime.step(AgentId(0), &obs).await.unwrap();

    assert_eq!(action.quantity(), Some(0));
    assert_eq!(action.audit.oracle_calls().count(), 0);
    assert_eq!(action.audit.len(), 1);
    assert!(matches!(
        &action.audit.entries()[0],
        AuditEntry::Framework { note } if note.contains("no resources")
    ));
    assert_eq!(oracle.total_calls(), 0);
}

#[tokio::test]
async fn harvest_reports_quantity_and_stats() {
    let world = World::new(&["John"], PersonaConfig::default()).await;
    let oracle = Arc::new(ScriptedOracle::new().with_harvest(7));
    let runtime = PersonaRuntime::new(oracle.clone(), world.peers.clone());

    let mut obs = observation(Location::HarvestSite, Phase::Harvest, &[0]);
    obs.resource_count = 100;
    let action = runtime.step(AgentId(0), &obs).await.unwrap();

    assert_eq!(action.agent, AgentId(0));
    assert_eq!(action.location, Location::HarvestSite);
    match &action.kind {
        ActionKind::Harvesting { quantity, stats } => {
            assert_eq!(*quantity, 7);
            assert_eq!(
                stats.get("persona_0_collected_resource"),
                Some(&serde_json::Value::from(7))
            );
        }
        other => panic!("Expected Harvesting, got {:?}", other),
    }
    assert_eq!(action.audit.count_calls(OracleCall::Harvest), 1);
    assert_eq!(oracle.count(OracleCall::Harvest), 1);
}

#[tokio::test]
async fn harvest_above_available_is_an_error() {
    let world = World::new(&["John"], PersonaConfig::default()).await;
    let oracle = Arc::new(ScriptedOracle::new().with_harvest(9));
    let runtime = PersonaRuntime::new(oracle, world.peers.clone());

    let mut obs = observation(Location::HarvestSite, Phase::Harvest, &[0]);
    obs.resource_count = 5;
    assert!(matches!(
        runtime.step(AgentId(0), &obs).await,
        Err(Error::HarvestOutOfRange {
            requested: 9,
            available: 5
        })
    ));
}

#[tokio::test]
async fn post_harvest_records_observation_only() {
    let world = World::new(&["John"], PersonaConfig::default()).await;
    let oracle = Arc::new(ScriptedOracle::new());
    let runtime = PersonaRuntime::new(oracle.clone(), world.peers.clone());

    let mut obs = observation(Location::HarvestSite, Phase::PostHarvest, &[0]);
    obs.context = "The lake now holds 80 tons of fish.".into();
    let action = runtime.step(AgentId(0), &obs).await.unwrap();

    assert!(matches!(action.kind, ActionKind::Noop));
    assert!(action.audit.is_empty());
    assert_eq!(oracle.total_calls(), 0);
    assert_eq!(world.persona(0).current_time().await, t0());

    let events = world.entries_of(0, MemoryKind::Event).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].text, "The lake now holds 80 tons of fish.");
}

// ===========================================================================
// Reflection
// ===========================================================================

#[tokio::test]
async fn home_reflection_stores_insights() {
    let world = World::new(&["John", "Kate"], PersonaConfig::default()).await;
    let oracle = Arc::new(
        ScriptedOracle::new().with_insights(&["fish are scarce", "Kate fishes a lot"]),
    );
    let runtime = PersonaRuntime::new(oracle.clone(), world.peers.clone());

    let obs = observation(Location::Home, Phase::Reflection, &[0]);
    let action = runtime.step(AgentId(0), &obs).await.unwrap();

    assert!(matches!(action.kind, ActionKind::Noop));
    assert_eq!(action.audit.count_calls(OracleCall::Insights), 1);

    let thoughts = world.entries_of(0, MemoryKind::Thought).await;
    let texts: Vec<&str> = thoughts.iter().map(|t| t.text.as_str()).collect();
    assert_eq!(texts, vec!["fish are scarce", "Kate fishes a lot"]);
    assert!(thoughts.iter().all(|t| !t.always_salient));
    assert!(world.entries(1).await.is_empty());
}

#[tokio::test]
async fn reflection_runs_once_per_focal_point() {
    let config = PersonaConfig {
        reflection_focal_points: vec!["harvesting".into(), "community".into()],
        ..Default::default()
    };
    let world = World::new(&["John"], config).await;
    let oracle = ScriptedOracle::new().with_insights(&["one insight"]);
    let mut audit = AuditLog::new();

    let insights = govsim_persona::reflect::reflect_on_focal_points(
        &oracle,
        &world.peers.names(),
        world.persona(0),
        &world.persona(0).config().reflection_focal_points,
        &mut audit,
    )
    .await
    .unwrap();

    assert_eq!(insights.len(), 2);
    assert_eq!(audit.count_calls(OracleCall::Insights), 2);
    assert_eq!(world.entries_of(0, MemoryKind::Thought).await.len(), 2);
}

// ===========================================================================
// Private conversation
// ===========================================================================

#[tokio::test]
async fn private_chat_alternates_until_cap() {
    let world = World::new(&["John", "Kate"], PersonaConfig::default()).await;
    let oracle = ScriptedOracle::new();
    let mut audit = AuditLog::new();

    let conv = converse_private(
        &oracle,
        world.persona(0),
        world.persona(1),
        Location::SocialSite,
        &mut audit,
    )
    .await
    .unwrap();

    assert_eq!(conv.kind, ConversationKind::Private);
    assert_eq!(conv.len(), 6);
    assert_eq!(conv.termination, Termination::TurnCap);
    let speakers: Vec<u32> = conv.utterances.iter().map(|u| u.speaker.id.0).collect();
    assert_eq!(speakers, vec![0, 1, 0, 1, 0, 1]);
    assert_eq!(conv.speakers().len(), 2);
    assert_eq!(audit.count_calls(OracleCall::PrivateUtterance), 6);
    assert_eq!(audit.count_calls(OracleCall::Summarize), 1);
}

#[tokio::test]
async fn private_chat_stops_on_end_signal() {
    let world = World::new(&["John", "Kate"], PersonaConfig::default()).await;
    let oracle = ScriptedOracle::new().with_private_end(|_, history| history.len() == 1);
    let mut audit = AuditLog::new();

    let conv = converse_private(
        &oracle,
        world.persona(0),
        world.persona(1),
        Location::SocialSite,
        &mut audit,
    )
    .await
    .unwrap();

    assert_eq!(conv.len(), 2);
    assert_eq!(conv.termination, Termination::EndSignal);
    assert_eq!(conv.utterances[1].speaker.name, "Kate");
    assert_eq!(oracle.count(OracleCall::PrivateUtterance), 2);
}

#[tokio::test]
async fn private_chat_written_to_both_participants() {
    let world = World::new(&["John", "Kate", "Jack"], PersonaConfig::default()).await;
    let oracle = ScriptedOracle::new().with_private_end(|_, history| history.len() == 2);
    let mut audit = AuditLog::new();

    let conv = converse_private(
        &oracle,
        world.persona(0),
        world.persona(1),
        Location::SocialSite,
        &mut audit,
    )
    .await
    .unwrap();

    let john = world.entries_of(0, MemoryKind::Chat).await;
    let kate = world.entries_of(1, MemoryKind::Chat).await;
    assert_eq!(john.len(), 1);
    assert_eq!(john, kate);
    assert_eq!(john[0].participants, ids(&[0, 1]));
    assert_eq!(john[0].text, conv.summary);
    assert_eq!(john[0].transcript, conv.utterances);
    assert!(world.entries(2).await.is_empty());

    assert_eq!(world.persona(0).private_history(AgentId(1)).await, conv.utterances);
    assert_eq!(world.persona(1).private_history(AgentId(0)).await, conv.utterances);
    assert!(world.persona(0).private_history(AgentId(2)).await.is_empty());
}

// ===========================================================================
// Pairing
// ===========================================================================

#[test]
fn eligible_pool_pairs_once() {
    let mut pool = EligiblePool::new([AgentId(0), AgentId(1), AgentId(2), AgentId(1)]);
    assert_eq!(pool.len(), 3);
    assert!(!pool.pair(AgentId(0), AgentId(0)));
    assert!(pool.pair(AgentId(0), AgentId(1)));
    assert!(!pool.pair(AgentId(2), AgentId(0)));
    assert_eq!(pool.members(), &[AgentId(2)]);
    assert!(!pool.pair(AgentId(2), AgentId(9)));
    assert!(pool.contains(&AgentId(2)));
}

#[tokio::test]
async fn pairing_removes_both_and_skips_target() {
    let world = World::new(&["John", "Kate"], PersonaConfig::default()).await;
    let oracle = ScriptedOracle::new()
        .with_nominate(|caller, candidates| {
            candidates.iter().find(|c| c.id != caller.id).map(|c| c.id)
        })
        .with_private_end(|_, history| history.len() == 1);
    let mut audit = AuditLog::new();

    let (convs, pool) = run_pairing(
        &oracle,
        &world.peers,
        &[AgentId(0), AgentId(1)],
        Location::SocialSite,
        &mut audit,
    )
    .await
    .unwrap();

    assert_eq!(convs.len(), 1);
    assert!(pool.is_empty());
    // Kate was paired before her turn came up.
    assert_eq!(oracle.count(OracleCall::NominatePartner), 1);
    assert_eq!(convs[0].utterances[0].speaker.name, "John");
}

#[tokio::test]
async fn pairing_discards_nomination_of_paired_agent() {
    let world = World::new(&["John", "Kate", "Jack", "Emma"], PersonaConfig::default()).await;
    let oracle = ScriptedOracle::new()
        .with_nominate(|caller, _| match caller.id.0 {
            0 => Some(AgentId(1)),
            1 => Some(AgentId(0)),
            2 => Some(AgentId(0)),
            3 => Some(AgentId(2)),
            _ => None,
        })
        .with_private_end(|_, history| history.len() == 1);
    let mut audit = AuditLog::new();

    let (convs, pool) = run_pairing(
        &oracle,
        &world.peers,
        &[AgentId(0), AgentId(1), AgentId(2), AgentId(3)],
        Location::SocialSite,
        &mut audit,
    )
    .await
    .unwrap();

    // John-Kate, then Jack's pick is dropped, then Emma picks Jack.
    assert_eq!(convs.len(), 2);
    assert!(pool.is_empty());
    assert_eq!(oracle.count(OracleCall::NominatePartner), 3);

    let second: BTreeSet<AgentId> = convs[1].speakers().iter().map(|s| s.id).collect();
    assert_eq!(second, ids(&[2, 3]));
    assert_eq!(convs[1].utterances[0].speaker.name, "Emma");

    assert!(world.persona(2).private_history(AgentId(0)).await.is_empty());
    assert_eq!(world.persona(2).private_history(AgentId(3)).await.len(), 2);
}

#[tokio::test]
async fn pairing_ignores_absent_nominee() {
    let world = World::new(&["John", "Kate", "Jack"], PersonaConfig::default()).await;
    let oracle = ScriptedOracle::new().with_nominate(|caller, _| {
        if caller.id == AgentId(0) {
            Some(AgentId(2))
        } else {
            None
        }
    });
    let mut audit = AuditLog::new();

    // Jack is registered but not at the restaurant.
    let (convs, pool) = run_pairing(
        &oracle,
        &world.peers,
        &[AgentId(0), AgentId(1)],
        Location::SocialSite,
        &mut audit,
    )
    .await
    .unwrap();

    assert!(convs.is_empty());
    assert_eq!(pool.members(), &[AgentId(0), AgentId(1)]);
    assert_eq!(oracle.count(OracleCall::PrivateUtterance), 0);
}

// ===========================================================================
// Group conversation
// ===========================================================================

#[tokio::test]
async fn group_chat_stops_at_turn_cap() {
    let config = PersonaConfig {
        max_group_turns: 4,
        ..Default::default()
    };
    let world = World::new(&["John", "Kate", "Jack"], config).await;
    let oracle = ScriptedOracle::new().with_group(round_robin);
    let mut audit = AuditLog::new();

    let conv = converse_group(
        &oracle,
        &world.peers,
        world.persona(0),
        &world.identities(),
        Location::SocialSite,
        "How much should we fish?",
        &BTreeMap::new(),
        &mut audit,
    )
    .await
    .unwrap();

    assert_eq!(conv.kind, ConversationKind::Group);
    assert_eq!(conv.len(), 4);
    assert_eq!(conv.termination, Termination::TurnCap);
    let speakers: Vec<&str> = conv.utterances.iter().map(|u| u.speaker.name.as_str()).collect();
    assert_eq!(speakers, vec!["John", "Kate", "Jack", "John"]);
    assert_eq!(oracle.count(OracleCall::GroupUtterance), 4);
}

#[tokio::test]
async fn group_chat_ends_on_unknown_next_speaker() {
    let world = World::new(&["John", "Kate"], PersonaConfig::default()).await;
    let oracle = ScriptedOracle::new().with_group(|caller, _, _| GroupTurn {
        utterance: format!("{} asks Zed", caller.name),
        end_conversation: false,
        next_speaker: Some("Zed".into()),
    });
    let mut audit = AuditLog::new();

    let conv = converse_group(
        &oracle,
        &world.peers,
        world.persona(0),
        &world.identities(),
        Location::SocialSite,
        "",
        &BTreeMap::new(),
        &mut audit,
    )
    .await
    .unwrap();

    assert_eq!(conv.len(), 1);
    assert_eq!(
        conv.termination,
        Termination::InvalidNomination {
            nominee: Some("Zed".into())
        }
    );
    // Post-conversation steps still run.
    assert_eq!(audit.count_calls(OracleCall::Summarize), 1);
    assert_eq!(world.entries_of(1, MemoryKind::Chat).await.len(), 1);
}

#[tokio::test]
async fn group_chat_ends_on_missing_next_speaker() {
    let world = World::new(&["John", "Kate"], PersonaConfig::default()).await;
    let oracle = ScriptedOracle::new().with_group(|_, _, _| GroupTurn {
        utterance: "...".into(),
        end_conversation: false,
        next_speaker: None,
    });
    let mut audit = AuditLog::new();

    let conv = converse_group(
        &oracle,
        &world.peers,
        world.persona(1),
        &world.identities(),
        Location::SocialSite,
        "",
        &BTreeMap::new(),
        &mut audit,
    )
    .await
    .unwrap();

    assert_eq!(conv.len(), 1);
    assert_eq!(conv.utterances[0].speaker.name, "Kate");
    assert_eq!(
        conv.termination,
        Termination::InvalidNomination { nominee: None }
    );
}

#[tokio::test]
async fn manager_injection_opens_with_one_report() {
    let config = PersonaConfig {
        injection: InjectionStrategy::Manager,
        ..Default::default()
    };
    let world = World::new(&["John", "Kate", "Jack"], config).await;
    let oracle = ScriptedOracle::new();
    let counts = BTreeMap::from([(AgentId(0), 10), (AgentId(1), 5), (AgentId(2), 7)]);
    let mut audit = AuditLog::new();

    let conv = converse_group(
        &oracle,
        &world.peers,
        world.persona(0),
        &world.identities(),
        Location::SocialSite,
        "",
        &counts,
        &mut audit,
    )
    .await
    .unwrap();

    assert_eq!(conv.len(), 2);
    let mayor: Vec<&Utterance> = conv
        .utterances
        .iter()
        .filter(|u| u.speaker.id.is_framework())
        .collect();
    assert_eq!(mayor.len(), 1);
    assert_eq!(conv.utterances[0].speaker, Identity::framework());
    assert!(conv.utterances[0].text.contains("John caught 10 tons of fish."));
    assert!(conv.utterances[0].text.contains("Jack caught 7 tons of fish."));
    assert_eq!(conv.utterances[1].speaker.name, "John");
    assert_eq!(oracle.count(OracleCall::GroupUtterance), 1);
}

#[tokio::test]
async fn individual_injection_counts_toward_cap() {
    let config = PersonaConfig {
        injection: InjectionStrategy::Individual,
        max_group_turns: 4,
        ..Default::default()
    };
    let world = World::new(&["John", "Kate", "Jack"], config).await;
    let oracle = ScriptedOracle::new().with_group(round_robin);
    let counts = BTreeMap::from([(AgentId(0), 10), (AgentId(1), 5), (AgentId(2), 7)]);
    let mut audit = AuditLog::new();

    let conv = converse_group(
        &oracle,
        &world.peers,
        world.persona(0),
        &world.identities(),
        Location::SocialSite,
        "",
        &counts,
        &mut audit,
    )
    .await
    .unwrap();

    assert_eq!(conv.len(), 4);
    assert_eq!(conv.termination, Termination::TurnCap);
    assert_eq!(conv.utterances[1].text, "This month, I caught 5 tons of fish!");
    assert_eq!(oracle.count(OracleCall::GroupUtterance), 1);

    let notes = audit
        .entries()
        .iter()
        .filter(|e| matches!(e, AuditEntry::Framework { .. }))
        .count();
    assert_eq!(notes, 3);
}

#[tokio::test]
async fn injection_requires_every_count() {
    let config = PersonaConfig {
        injection: InjectionStrategy::Individual,
        ..Default::default()
    };
    let world = World::new(&["John", "Kate", "Jack"], config).await;
    let oracle = ScriptedOracle::new();
    let counts = BTreeMap::from([(AgentId(0), 10), (AgentId(1), 5)]);
    let mut audit = AuditLog::new();

    let result = converse_group(
        &oracle,
        &world.peers,
        world.persona(0),
        &world.identities(),
        Location::SocialSite,
        "",
        &counts,
        &mut audit,
    )
    .await;

    assert!(matches!(result, Err(Error::MissingResourceCount(AgentId(2)))));
    assert_eq!(oracle.total_calls(), 0);
}

#[tokio::test]
async fn injection_longer_than_cap_is_rejected() {
    let config = PersonaConfig {
        injection: InjectionStrategy::Individual,
        max_group_turns: 2,
        ..Default::default()
    };
    let world = World::new(&["John", "Kate", "Jack"], config).await;
    let oracle = ScriptedOracle::new().with_group(round_robin);
    let counts = BTreeMap::from([(AgentId(0), 10), (AgentId(1), 5), (AgentId(2), 7)]);
    let mut audit = AuditLog::new();

    let result = converse_group(
        &oracle,
        &world.peers,
        world.persona(0),
        &world.identities(),
        Location::SocialSite,
        "",
        &counts,
        &mut audit,
    )
    .await;

    assert!(matches!(result, Err(Error::InvalidConfig(m)) if m.contains("max_group_turns")));
    assert_eq!(oracle.total_calls(), 0);
    assert!(audit.entries().is_empty());
    assert!(world.entries_of(1, MemoryKind::Chat).await.is_empty());
}

#[tokio::test]
async fn initiator_outside_participants_is_rejected() {
    let world = World::new(&["John", "Kate", "Jack"], PersonaConfig::default()).await;
    let oracle = ScriptedOracle::new().with_group(round_robin);
    let participants: Vec<Identity> = world.identities().into_iter().skip(1).collect();
    let mut audit = AuditLog::new();

    let result = converse_group(
        &oracle,
        &world.peers,
        world.persona(0),
        &participants,
        Location::SocialSite,
        "",
        &BTreeMap::new(),
        &mut audit,
    )
    .await;

    assert!(matches!(
        result,
        Err(Error::NotPresent { agent: AgentId(0), location: Location::SocialSite })
    ));
    assert_eq!(oracle.total_calls(), 0);
}

#[tokio::test]
async fn ceiling_reaches_every_participant() {
    let world = World::new(&["John", "Kate", "Jack"], PersonaConfig::default()).await;
    let oracle = ScriptedOracle::new().with_ceiling(12);
    let mut audit = AuditLog::new();

    let conv = converse_group(
        &oracle,
        &world.peers,
        world.persona(0),
        &world.identities(),
        Location::SocialSite,
        "",
        &BTreeMap::new(),
        &mut audit,
    )
    .await
    .unwrap();

    // Only John spoke; Kate and Jack still hear about the ceiling.
    assert_eq!(conv.len(), 1);
    assert_eq!(conv.resource_ceiling, Some(12));
    for id in 0..3 {
        let salient: Vec<MemoryEntry> = world
            .entries(id)
            .await
            .into_iter()
            .filter(|e| e.always_salient)
            .collect();
        assert_eq!(salient.len(), 1, "persona {}", id);
        assert_eq!(
            salient[0].text,
            "The community agreed on a maximum limit of 12 tons of fish per person."
        );

        let chats = world.entries_of(id, MemoryKind::Chat).await;
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].participants, ids(&[id]));
    }
    assert_eq!(audit.count_calls(OracleCall::PlanningThought), 3);
    assert_eq!(audit.count_calls(OracleCall::MemorizeThought), 3);
}

#[tokio::test]
async fn no_ceiling_no_salient_memory() {
    let world = World::new(&["John", "Kate"], PersonaConfig::default()).await;
    let oracle = ScriptedOracle::new();
    let mut audit = AuditLog::new();

    let conv = converse_group(
        &oracle,
        &world.peers,
        world.persona(0),
        &world.identities(),
        Location::SocialSite,
        "",
        &BTreeMap::new(),
        &mut audit,
    )
    .await
    .unwrap();

    assert_eq!(conv.resource_ceiling, None);
    for id in 0..2 {
        assert!(world.entries(id).await.iter().all(|e| !e.always_salient));
        // chat summary + planning + memorisation
        assert_eq!(world.entries(id).await.len(), 3);
    }
}

// ===========================================================================
// Social tick end to end
// ===========================================================================

#[tokio::test]
async fn social_tick_pairs_then_includes_everyone_in_group() {
    let world = World::new(&["John", "Kate"], PersonaConfig::default()).await;
    let oracle = Arc::new(
        ScriptedOracle::new()
            .with_nominate(|caller, candidates| {
                candidates.iter().find(|c| c.id != caller.id).map(|c| c.id)
            })
            .with_private_end(|_, history| history.len() == 1)
            .with_ceiling(8),
    );
    let runtime = PersonaRuntime::new(oracle.clone(), world.peers.clone());

    let mut obs = observation(Location::SocialSite, Phase::Conversation, &[0, 1]);
    obs.context = "Discuss tonight's fishing".into();
    let action = runtime.step(AgentId(0), &obs).await.unwrap();

    let ActionKind::Chat {
        conversation,
        resource_ceiling,
        stats,
    } = &action.kind
    else {
        panic!("Expected Chat, got {:?}", action.kind);
    };
    assert_eq!(*resource_ceiling, Some(8));
    assert_eq!(
        stats.get("conversation_resource_limit"),
        Some(&serde_json::Value::from(8))
    );
    assert_eq!(conversation.kind, ConversationKind::Group);

    assert_eq!(action.audit.count_calls(OracleCall::NominatePartner), 1);
    assert_eq!(action.audit.count_calls(OracleCall::PrivateUtterance), 2);
    assert_eq!(action.audit.count_calls(OracleCall::GroupUtterance), 1);
    assert_eq!(action.audit.count_calls(OracleCall::Summarize), 2);
    assert_eq!(action.audit.count_calls(OracleCall::ExtractCeiling), 1);
    assert_eq!(action.audit.oracle_calls().count(), oracle.total_calls());

    // Each has the private chat and the group chat.
    for id in 0..2 {
        let chats = world.entries_of(id, MemoryKind::Chat).await;
        assert_eq!(chats.len(), 2);
        assert_eq!(chats[0].participants, ids(&[0, 1]));
        assert_eq!(chats[1].participants, ids(&[id]));
    }
    let events = world.entries_of(0, MemoryKind::Event).await;
    assert_eq!(events.len(), 1);
    assert!(world.entries_of(1, MemoryKind::Event).await.is_empty());
}

#[tokio::test]
async fn social_tick_without_ceiling_reports_null_limit() {
    let world = World::new(&["John", "Kate"], PersonaConfig::default()).await;
    let runtime = PersonaRuntime::new(Arc::new(ScriptedOracle::new()), world.peers.clone());

    let obs = observation(Location::SocialSite, Phase::Conversation, &[0, 1]);
    let action = runtime.step(AgentId(1), &obs).await.unwrap();
    match &action.kind {
        ActionKind::Chat {
            resource_ceiling,
            stats,
            conversation,
        } => {
            assert_eq!(*resource_ceiling, None);
            assert_eq!(
                stats.get("conversation_resource_limit"),
                Some(&serde_json::Value::Null)
            );
            assert_eq!(conversation.utterances[0].speaker.name, "Kate");
        }
        other => panic!("Expected Chat, got {:?}", other),
    }
}

#[tokio::test]
async fn unknown_prompt_variant_fails_before_any_call() {
    let config = PersonaConfig {
        prompt_utterance: "few_shot".into(),
        ..Default::default()
    };
    let world = World::new(&["John", "Kate"], config).await;
    let oracle = Arc::new(ScriptedOracle::new().with_nominate(|_, c| c.first().map(|i| i.id)));
    let runtime = PersonaRuntime::new(oracle.clone(), world.peers.clone());

    let obs = observation(Location::SocialSite, Phase::Conversation, &[0, 1]);
    let err = runtime.step(AgentId(0), &obs).await.unwrap_err();
    assert!(matches!(err, Error::UnknownPromptVariant(v) if v == "few_shot"));
    assert_eq!(oracle.total_calls(), 0);
}

#[tokio::test]
async fn absent_agent_cannot_socialize() {
    let world = World::new(&["John", "Kate", "Jack"], PersonaConfig::default()).await;
    let oracle = Arc::new(
        ScriptedOracle::new()
            .with_nominate(|caller, candidates| {
                candidates.iter().find(|c| c.id != caller.id).map(|c| c.id)
            })
            .with_group(round_robin),
    );
    let runtime = PersonaRuntime::new(oracle.clone(), world.peers.clone());

    let obs = observation(Location::SocialSite, Phase::Conversation, &[1, 2]);
    let err = runtime.step(AgentId(0), &obs).await.unwrap_err();
    assert!(matches!(
        err,
        Error::NotPresent { agent: AgentId(0), location: Location::SocialSite }
    ));
    assert_eq!(oracle.total_calls(), 0);
    assert!(world.persona(1).private_history(AgentId(2)).await.is_empty());
}

#[tokio::test]
async fn oracle_failure_propagates_unchanged() {
    let world = World::new(&["John", "Kate"], PersonaConfig::default()).await;
    let oracle = Arc::new(
        ScriptedOracle::new()
            .with_nominate(|caller, candidates| {
                candidates.iter().find(|c| c.id != caller.id).map(|c| c.id)
            })
            .failing_on(OracleCall::PrivateUtterance),
    );
    let runtime = PersonaRuntime::new(oracle, world.peers.clone());

    let obs = observation(Location::SocialSite, Phase::Conversation, &[0, 1]);
    let err = runtime.step(AgentId(0), &obs).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Oracle(OracleError::Refused(msg)) if msg == "private_utterance refused"
    ));
}

// ===========================================================================
// Registry and persistence
// ===========================================================================

fn bare_persona(id: AgentId, name: &str) -> Arc<Persona> {
    Arc::new(Persona::new(
        Identity::new(id, name),
        Arc::new(PersonaConfig::default()),
        Arc::new(InMemoryStore::new()),
    ))
}

#[tokio::test]
async fn registry_rejects_duplicate_and_reserved_ids() {
    let dup = PeerRegistry::new([bare_persona(AgentId(1), "A"), bare_persona(AgentId(1), "B")]).await;
    assert!(matches!(dup, Err(Error::InvalidConfig(_))));

    let reserved = PeerRegistry::new([bare_persona(AgentId::FRAMEWORK, "Mayor")]).await;
    assert!(matches!(reserved, Err(Error::InvalidConfig(_))));
}

#[tokio::test]
async fn registry_rejects_names_differing_only_in_case() {
    let clash = PeerRegistry::new([
        bare_persona(AgentId(0), "John"),
        bare_persona(AgentId(1), "john"),
    ])
    .await;
    assert!(matches!(clash, Err(Error::InvalidConfig(m)) if m.contains("share a name")));

    let distinct = PeerRegistry::new([
        bare_persona(AgentId(0), "John"),
        bare_persona(AgentId(1), "Johnny"),
    ])
    .await;
    assert!(distinct.is_ok());
}

#[tokio::test]
async fn registry_seeds_private_logs() {
    let world = World::new(&["John", "Kate", "Jack"], PersonaConfig::default()).await;
    assert_eq!(world.peers.len(), 3);
    assert_eq!(world.peers.names(), vec!["John", "Kate", "Jack"]);
    assert_eq!(
        world.persona(1).private_peers().await,
        vec![AgentId(0), AgentId(2)]
    );
    assert!(world.persona(1).private_history(AgentId(0)).await.is_empty());
}

#[tokio::test]
async fn step_flushes_memory_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("0-john.json");
    let store = Arc::new(InMemoryStore::open(&path).unwrap());
    let persona = Arc::new(Persona::new(
        Identity::new(0u32, "John"),
        Arc::new(PersonaConfig::default()),
        store,
    ));
    let peers = Arc::new(PeerRegistry::new([persona]).await.unwrap());
    let runtime = PersonaRuntime::new(Arc::new(ScriptedOracle::new()), peers);

    let mut obs = observation(Location::HarvestSite, Phase::PostHarvest, &[0]);
    obs.context = "The lake now holds 80 tons of fish.".into();
    runtime.step(AgentId(0), &obs).await.unwrap();

    assert!(path.exists());
    let reloaded = InMemoryStore::open(&path).unwrap();
    assert_eq!(reloaded.len().await, 1);
    assert_eq!(
        reloaded.entries().await[0].text,
        "The lake now holds 80 tons of fish."
    );
}
