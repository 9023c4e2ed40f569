//! Speaker selection.
//!
//! Decides which AI persona speaks next, or that the human should. Rules are
//! applied in strict priority order:
//!
//! 1. If it is the human's turn, nobody is selected.
//! 2. A last speaker that asked to continue, and is still a candidate, keeps
//!    the floor.
//! 3. Without a generative service or a context bundle, the deterministic
//!    fallback (rule 5) decides.
//! 4. Otherwise the service picks an id from the candidates. An id that is not
//!    a candidate, an explicit "none", or any service failure yields to the
//!    human.
//! 5. Fallback: the candidate that spoke least recently. Never-spoken
//!    candidates come first; ties keep candidate order.
//!
//! Selection never fails. Every concrete pick is stamped on an internal
//! logical clock that feeds rule 5 on later calls.

use std::collections::HashMap;
use std::sync::Arc;

use minijinja::context;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::{ServiceError, TribunalError};
use crate::persona::{Persona, PersonaId, Role};
use crate::prompts::{self, SPEAKER_SELECTION};
use crate::service::{GenerativeService, OutputContract};
use crate::turn::TurnGovernor;

/// A persona eligible to speak, with the memories shown to the chooser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: PersonaId,
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub memories: Vec<String>,
}

impl Candidate {
    pub fn new(id: PersonaId, name: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            name: name.into(),
            role,
            memories: Vec::new(),
        }
    }

    pub fn from_persona(persona: &Persona, memory_count: usize) -> Self {
        Self {
            id: persona.id(),
            name: persona.name().to_string(),
            role: persona.role(),
            memories: persona.recent_memories(memory_count),
        }
    }
}

/// Conversation state handed to the selector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionContext {
    pub premise: String,
    pub last_message: String,
    pub last_speaker: Option<PersonaId>,
    pub last_speaker_name: Option<String>,
    pub wants_to_continue: bool,
    pub evidence_names: Vec<String>,
    pub transcript: String,
}

/// How a selection was reached. Logged with every pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionReason {
    Continuation,
    ServiceChoice,
    LeastRecentlySpoken,
}

/// Chooses the next speaker among candidate personas.
pub struct SpeakerSelector {
    service: Option<Arc<dyn GenerativeService>>,
    last_spoken: HashMap<PersonaId, u64>,
    clock: u64,
}

impl SpeakerSelector {
    pub fn new(service: Option<Arc<dyn GenerativeService>>) -> Self {
        Self {
            service,
            last_spoken: HashMap::new(),
            clock: 0,
        }
    }

    /// Logical time at which `persona` was last selected.
    pub fn last_spoken_at(&self, persona: PersonaId) -> Option<u64> {
        self.last_spoken.get(&persona).copied()
    }

    /// Stamps `persona` as having just spoken.
    pub fn record_spoken(&mut self, persona: PersonaId) {
        self.clock += 1;
        self.last_spoken.insert(persona, self.clock);
    }

    /// Picks the next speaker, or `None` to yield to the human.
    pub async fn select(
        &mut self,
        governor: &TurnGovernor,
        candidates: &[Candidate],
        context: Option<&SelectionContext>,
    ) -> Option<PersonaId> {
        if governor.is_human_turn() || candidates.is_empty() {
            return None;
        }

        if let Some(ctx) = context
            && ctx.wants_to_continue
            && let Some(last) = ctx.last_speaker
            && candidates.iter().any(|c| c.id == last)
        {
            return Some(self.pick(last, SelectionReason::Continuation));
        }

        let (Some(service), Some(ctx)) = (self.service.clone(), context) else {
            let id = self.least_recently_spoken(candidates)?;
            return Some(self.pick(id, SelectionReason::LeastRecentlySpoken));
        };

        match self.ask_service(service.as_ref(), candidates, ctx).await {
            Ok(Some(id)) if candidates.iter().any(|c| c.id == id) => {
                Some(self.pick(id, SelectionReason::ServiceChoice))
            }
            Ok(Some(id)) => {
                debug!(
                    target: "tribunal::selector",
                    chosen = id,
                    "service chose a non-candidate; yielding to human"
                );
                None
            }
            Ok(None) => {
                debug!(target: "tribunal::selector", "service yielded to human");
                None
            }
            Err(e) => {
                warn!(
                    target: "tribunal::selector",
                    service = %service.name(),
                    error = %e,
                    "speaker selection failed; yielding to human"
                );
                None
            }
        }
    }

    fn pick(&mut self, id: PersonaId, reason: SelectionReason) -> PersonaId {
        self.record_spoken(id);
        debug!(target: "tribunal::selector", speaker = id, reason = ?reason, "speaker selected");
        id
    }

    fn least_recently_spoken(&self, candidates: &[Candidate]) -> Option<PersonaId> {
        candidates
            .iter()
            .enumerate()
            .min_by_key(|(index, c)| (self.last_spoken_at(c.id), *index))
            .map(|(_, c)| c.id)
    }

    async fn ask_service(
        &self,
        service: &dyn GenerativeService,
        candidates: &[Candidate],
        ctx: &SelectionContext,
    ) -> Result<Option<PersonaId>, SelectionFailure> {
        let prompt = prompts::render(
            SPEAKER_SELECTION,
            context! {
                premise => &ctx.premise,
                evidence => &ctx.evidence_names,
                transcript => &ctx.transcript,
                last_message => &ctx.last_message,
                last_speaker => &ctx.last_speaker_name,
                candidates => candidates,
            },
        )?;
        let contract = selection_contract(candidates);
        let value = service.generate(prompt, &contract).await?.into_value()?;
        Ok(value.as_ref().and_then(parse_speaker_id))
    }
}

/// Failure while asking the service for a speaker. Only ever logged.
#[derive(Debug, thiserror::Error)]
enum SelectionFailure {
    #[error(transparent)]
    Prompt(#[from] TribunalError),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Builds the output contract for a speaker choice.
pub fn selection_contract(candidates: &[Candidate]) -> OutputContract {
    let ids: Vec<PersonaId> = candidates.iter().map(|c| c.id).collect();
    OutputContract::new(
        "speaker_choice",
        "the id of the character who speaks next, or \"none\" for the player",
        json!({
            "type": "object",
            "properties": {
                "speaker_id": {
                    "oneOf": [
                        { "type": "integer", "enum": ids },
                        { "type": "string", "enum": ["none"] }
                    ]
                }
            },
            "required": ["speaker_id"]
        }),
    )
}

/// Reads a speaker id out of a service answer. `"none"`, null and anything
/// unparsable read as no pick.
fn parse_speaker_id(value: &Value) -> Option<PersonaId> {
    let raw = match value {
        Value::Object(map) => map.get("speaker_id")?,
        other => other,
    };
    match raw {
        Value::Number(n) => n.as_u64().and_then(|n| PersonaId::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::Generation;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ChoosingService {
        answer: Result<Value, ()>,
        prompts: Mutex<Vec<String>>,
    }

    impl ChoosingService {
        fn answering(answer: Value) -> Arc<Self> {
            Arc::new(Self {
                answer: Ok(answer),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn broken() -> Arc<Self> {
            Arc::new(Self {
                answer: Err(()),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl GenerativeService for ChoosingService {
        async fn generate(
            &self,
            prompt: String,
            _contract: &OutputContract,
        ) -> Result<crate::service::Generation, ServiceError> {
            self.prompts.lock().unwrap().push(prompt);
            match &self.answer {
                Ok(value) => Ok(Generation::Structured(value.clone())),
                Err(()) => Err(ServiceError::ProcessError("unreachable backend".into())),
            }
        }
    }

    fn candidates() -> Vec<Candidate> {
        vec![
            Candidate::new(10, "Judge", Role::Judge),
            Candidate::new(4, "Larry", Role::Witness),
            Candidate::new(7, "Payne", Role::Prosecutor),
        ]
    }

    fn open_governor() -> TurnGovernor {
        let mut governor = TurnGovernor::new();
        governor.open_window(10);
        governor
    }

    fn context() -> SelectionContext {
        SelectionContext {
            premise: "A murder at the Gatewater Hotel".into(),
            last_message: "Who saw the victim last?".into(),
            evidence_names: vec!["Attorney's Badge".into()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_human_turn_short_circuits() {
        let service = ChoosingService::answering(json!({"speaker_id": 4}));
        let mut selector = SpeakerSelector::new(Some(service.clone()));
        let ctx = SelectionContext {
            wants_to_continue: true,
            last_speaker: Some(4),
            ..context()
        };

        let chosen = selector
            .select(&TurnGovernor::new(), &candidates(), Some(&ctx))
            .await;

        assert_eq!(chosen, None);
        assert!(service.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_continuation_preempts_service_and_cooldown() {
        let service = ChoosingService::answering(json!({"speaker_id": 10}));
        let mut selector = SpeakerSelector::new(Some(service.clone()));
        selector.record_spoken(10);
        selector.record_spoken(7);
        selector.record_spoken(4); // most recent speaker

        let ctx = SelectionContext {
            wants_to_continue: true,
            last_speaker: Some(4),
            ..context()
        };
        let chosen = selector
            .select(&open_governor(), &candidates(), Some(&ctx))
            .await;

        assert_eq!(chosen, Some(4));
        assert!(service.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_continuation_ignored_when_speaker_not_candidate() {
        let mut selector = SpeakerSelector::new(None);
        let ctx = SelectionContext {
            wants_to_continue: true,
            last_speaker: Some(99),
            ..context()
        };
        let chosen = selector
            .select(&open_governor(), &candidates(), Some(&ctx))
            .await;
        assert_eq!(chosen, Some(10));
    }

    #[tokio::test]
    async fn test_fallback_cycles_least_recently_spoken() {
        let mut selector = SpeakerSelector::new(None);
        let governor = open_governor();
        let candidates = candidates();

        let mut order = Vec::new();
        for _ in 0..6 {
            order.push(selector.select(&governor, &candidates, None).await.unwrap());
        }

        assert_eq!(order, vec![10, 4, 7, 10, 4, 7]);
    }

    #[tokio::test]
    async fn test_fallback_prefers_never_spoken() {
        let mut selector = SpeakerSelector::new(None);
        selector.record_spoken(10);
        let chosen = selector
            .select(&open_governor(), &candidates(), Some(&context()))
            .await;
        assert_eq!(chosen, Some(4));
        assert!(selector.last_spoken_at(4) > selector.last_spoken_at(10));
    }

    #[tokio::test]
    async fn test_service_choice_is_used_and_recorded() {
        let service = ChoosingService::answering(json!({"speaker_id": "7"}));
        let mut selector = SpeakerSelector::new(Some(service.clone()));

        let chosen = selector
            .select(&open_governor(), &candidates(), Some(&context()))
            .await;

        assert_eq!(chosen, Some(7));
        assert!(selector.last_spoken_at(7).is_some());
        let prompts = service.prompts.lock().unwrap();
        assert!(prompts[0].contains("id 4: Larry (witness)"));
        assert!(prompts[0].contains("Attorney's Badge"));
    }

    #[tokio::test]
    async fn test_service_none_or_unknown_yields_to_human() {
        for answer in [
            json!({"speaker_id": "none"}),
            json!({"speaker_id": 99}),
            json!({"speaker_id": null}),
            json!({"unexpected": true}),
        ] {
            let mut selector = SpeakerSelector::new(Some(ChoosingService::answering(answer)));
            let chosen = selector
                .select(&open_governor(), &candidates(), Some(&context()))
                .await;
            assert_eq!(chosen, None);
        }
    }

    #[tokio::test]
    async fn test_service_error_yields_to_human() {
        let mut selector = SpeakerSelector::new(Some(ChoosingService::broken()));
        let chosen = selector
            .select(&open_governor(), &candidates(), Some(&context()))
            .await;
        assert_eq!(chosen, None);
        assert_eq!(selector.last_spoken_at(10), None);
    }

    #[tokio::test]
    async fn test_service_without_context_uses_fallback() {
        let service = ChoosingService::answering(json!({"speaker_id": 7}));
        let mut selector = SpeakerSelector::new(Some(service.clone()));
        let chosen = selector.select(&open_governor(), &candidates(), None).await;
        assert_eq!(chosen, Some(10));
        assert!(service.prompts.lock().unwrap().is_empty());
    }
}
