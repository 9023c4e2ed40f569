//! Case orchestrator: drives beats of the courtroom dialogue.
//!
//! One [`CaseOrchestrator`] owns everything a session mutates: the case, the
//! turn governor, the speaker selector and the transcript. A beat is
//!
//! 1. snapshot persona memories,
//! 2. select a speaker (or yield to the human),
//! 3. stamp the speaker's selection time,
//! 4. render the speech instruction,
//! 5. generate, apply and log the line,
//! 6. advance the turn governor,
//! 7. report the outcome.
//!
//! Beats take `&mut self`, so two beats can never overlap on the same
//! orchestrator.

use std::collections::HashSet;
use std::sync::Arc;

use minijinja::context;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::case::{Case, CaseState, Evidence};
use crate::catalog::PresetCatalog;
use crate::channel::OutputChannel;
use crate::config::SessionConfig;
use crate::error::TribunalError;
use crate::persona::{Persona, PersonaId, PersonaProfile, Role};
use crate::prompts::{self, Redactor, SPEECH_INSTRUCTION};
use crate::selector::{Candidate, SelectionContext, SpeakerSelector};
use crate::service::GenerativeService;
use crate::transcript::TranscriptLog;
use crate::turn::TurnGovernor;

const DEFAULT_HUMAN_NAME: &str = "Player";
const ANNOUNCER_NAME: &str = "Court";
const OPENING_TRIGGER: &str = "The court is now in session.";

/// Result of one beat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BeatOutcome {
    /// `None` when the beat yielded to the human.
    pub speaker_id: Option<PersonaId>,
    /// Empty when the beat yielded or the service produced nothing.
    pub text: String,
    pub wants_to_continue: bool,
}

impl BeatOutcome {
    fn yielded() -> Self {
        Self::default()
    }

    pub fn is_yield(&self) -> bool {
        self.speaker_id.is_none()
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// The line the next speaker responds to.
#[derive(Debug, Clone)]
struct LastMessage {
    speaker_id: Option<PersonaId>,
    speaker_name: String,
    text: String,
    wants_to_continue: bool,
}

#[derive(Serialize)]
struct MemoryDigestEntry<'a> {
    name: &'a str,
    notes: Vec<String>,
}

/// Top-level coordinator of one courtroom session.
pub struct CaseOrchestrator {
    case: Case,
    service: Option<Arc<dyn GenerativeService>>,
    selector: SpeakerSelector,
    governor: TurnGovernor,
    transcript: TranscriptLog,
    config: SessionConfig,
    last_message: Option<LastMessage>,
    window_size: usize,
    messages_sent: usize,
}

impl std::fmt::Debug for CaseOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaseOrchestrator")
            .field("case", &self.case)
            .field("has_service", &self.service.is_some())
            .field("turn", &self.governor.state())
            .field("transcript_len", &self.transcript.len())
            .field("messages_sent", &self.messages_sent)
            .finish()
    }
}

impl CaseOrchestrator {
    /// Assembles a case from generated profiles.
    ///
    /// Every AI persona is given a preset from `catalog` that no other persona
    /// in the case holds. Human personas take the catalog's player preset.
    /// Duplicate persona or evidence ids fail the whole call.
    pub fn create_case(
        premise: impl Into<String>,
        key_points: Vec<String>,
        profiles: Vec<PersonaProfile>,
        evidence: Vec<Evidence>,
        catalog: &PresetCatalog,
    ) -> Result<Self, TribunalError> {
        let mut case = Case::new(premise, key_points);
        let mut claimed = HashSet::new();

        for mut profile in profiles {
            if case.persona(profile.id).is_some() {
                return Err(TribunalError::DuplicatePersona(profile.id));
            }

            let preset_id = if profile.is_human {
                catalog.player_preset_id().or(profile.preset_id)
            } else {
                let id = catalog.assign(
                    profile.id,
                    &profile.name,
                    profile.preset_id,
                    profile.role,
                    &claimed,
                )?;
                claimed.insert(id);
                Some(id)
            };
            profile.preset_id = preset_id;

            debug!(
                target: "tribunal::orchestrator",
                persona = profile.id,
                name = %profile.name,
                role = %profile.role,
                preset = ?preset_id,
                "persona created"
            );
            let preset = preset_id.and_then(|id| catalog.get(id));
            case.add_persona(Persona::new(profile, preset))?;
        }

        for item in evidence {
            case.add_evidence(item)?;
        }

        info!(
            target: "tribunal::orchestrator",
            personas = case.personas().len(),
            evidence = case.evidence().len(),
            "case assembled"
        );

        let config = SessionConfig::default();
        Ok(Self {
            case,
            service: None,
            selector: SpeakerSelector::new(None),
            governor: TurnGovernor::new(),
            transcript: TranscriptLog::new(config.transcript_window, config.transcript_capacity),
            config,
            last_message: None,
            window_size: 0,
            messages_sent: 0,
        })
    }

    /// Sets the generative service used for speaker selection and speech.
    pub fn with_service(mut self, service: Arc<dyn GenerativeService>) -> Self {
        self.selector = SpeakerSelector::new(Some(Arc::clone(&service)));
        self.service = Some(service);
        self
    }

    /// Replaces the session configuration.
    ///
    /// The transcript is rebuilt with the new window and capacity, so call
    /// this before any line is logged.
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.transcript = TranscriptLog::new(config.transcript_window, config.transcript_capacity);
        for persona in self.case.personas_mut() {
            persona.set_retention(config.memory_capacity, config.speech_capacity);
        }
        self.config = config;
        self
    }

    pub fn case(&self) -> &Case {
        &self.case
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn governor(&self) -> &TurnGovernor {
        &self.governor
    }

    pub fn transcript(&self) -> &TranscriptLog {
        &self.transcript
    }

    pub fn messages_sent(&self) -> usize {
        self.messages_sent
    }

    /// Binds a persona to the output channel its lines are delivered on.
    pub fn bind_persona_channel(
        &mut self,
        id: PersonaId,
        channel: Arc<dyn OutputChannel>,
    ) -> Result<(), TribunalError> {
        let persona = self
            .case
            .persona_mut(id)
            .ok_or(TribunalError::UnknownPersona(id))?;
        persona.bind_channel(channel);
        debug!(target: "tribunal::orchestrator", persona = id, "channel bound");
        Ok(())
    }

    /// All AI personas, in case order.
    pub fn eligible_candidates(&self) -> Vec<PersonaId> {
        self.case
            .personas()
            .iter()
            .filter(|p| !p.is_human())
            .map(Persona::id)
            .collect()
    }

    pub fn advance_key_point(&mut self) -> bool {
        let advanced = self.case.advance_key_point();
        if advanced {
            info!(
                target: "tribunal::orchestrator",
                cursor = self.case.key_point_cursor(),
                "key point advanced"
            );
        }
        advanced
    }

    pub fn add_evidence(&mut self, evidence: Evidence) -> Result<(), TribunalError> {
        self.case.add_evidence(evidence)
    }

    /// Logs a line from the human and opens an AI window.
    ///
    /// `budget` defaults to [`SessionConfig::default_window`].
    pub fn receive_human_message(&mut self, text: impl Into<String>, budget: Option<usize>) {
        let text = text.into();
        let name = self.human_name();
        self.transcript.append(None, name, None, text.clone());
        self.begin_human_input(text, budget);
    }

    /// Opens an AI window in response to a human line without logging it.
    ///
    /// For hosts whose transport already records what the human said. The
    /// line still becomes the trigger the next speaker answers.
    pub fn begin_human_input(&mut self, text: impl Into<String>, budget: Option<usize>) {
        self.last_message = Some(LastMessage {
            speaker_id: None,
            speaker_name: self.human_name(),
            text: text.into(),
            wants_to_continue: false,
        });

        let budget = budget.unwrap_or(self.config.default_window);
        self.window_size = budget;
        self.governor.begin_human_input(budget);
    }

    fn human_name(&self) -> String {
        self.case
            .human()
            .map(|p| p.name().to_string())
            .unwrap_or_else(|| DEFAULT_HUMAN_NAME.to_string())
    }

    /// Opens a system-initiated AI window, optionally logging an announcement
    /// that the personas respond to.
    pub fn open_window(&mut self, turns: usize, announcement: Option<String>) {
        if let Some(text) = announcement {
            self.transcript.append(None, ANNOUNCER_NAME, None, text.clone());
            self.last_message = Some(LastMessage {
                speaker_id: None,
                speaker_name: ANNOUNCER_NAME.to_string(),
                text,
                wants_to_continue: false,
            });
        }
        self.window_size = turns;
        self.governor.open_window(turns);
    }

    /// Runs one beat among `candidates`.
    ///
    /// Service failures never surface here: they degrade to a yield or an
    /// empty line. Errors are configuration problems, such as an unknown
    /// candidate id or a speaker without a bound channel.
    #[tracing::instrument(
        name = "case.next_beat",
        skip(self),
        fields(remaining = self.governor.remaining(), messages_sent = self.messages_sent)
    )]
    pub async fn next_beat(
        &mut self,
        candidates: &[PersonaId],
    ) -> Result<BeatOutcome, TribunalError> {
        let mut pool = Vec::with_capacity(candidates.len());
        for &id in candidates {
            let persona = self
                .case
                .persona(id)
                .ok_or(TribunalError::UnknownPersona(id))?;
            if !persona.is_human() {
                pool.push(Candidate::from_persona(persona, self.config.recent_memory_count));
            }
        }

        let context = self.selection_context();
        let Some(speaker_id) = self
            .selector
            .select(&self.governor, &pool, Some(&context))
            .await
        else {
            if self.governor.has_ai_turn_available() {
                debug!(target: "tribunal::orchestrator", "no speaker chosen; yielding to human");
                self.governor.force_human_turn();
            }
            return Ok(BeatOutcome::yielded());
        };

        let instruction = self.speech_instruction(speaker_id)?;
        let persona = self
            .case
            .persona(speaker_id)
            .ok_or(TribunalError::UnknownPersona(speaker_id))?;
        // Only the prosecution sees evidence names, including ones quoted in
        // the transcript or in memories.
        let redactor = (persona.role() != Role::Prosecutor)
            .then(|| Redactor::new(self.case.evidence_names()));
        let draft = persona
            .generate_speech_with(
                &instruction,
                self.service.as_deref(),
                &self.config,
                redactor.as_ref(),
            )
            .await?;

        if draft.is_empty() {
            warn!(
                target: "tribunal::orchestrator",
                persona = speaker_id,
                "empty draft; nothing applied"
            );
            self.governor.complete_one_ai_turn();
            return Ok(BeatOutcome {
                speaker_id: Some(speaker_id),
                text: String::new(),
                wants_to_continue: false,
            });
        }

        let persona = self
            .case
            .persona_mut(speaker_id)
            .ok_or(TribunalError::UnknownPersona(speaker_id))?;
        let display = persona.apply_response(&draft).await?;
        let name = persona.name().to_string();

        self.transcript
            .append(Some(speaker_id), name.clone(), Some(display), draft.text.clone());
        self.messages_sent += 1;
        self.last_message = Some(LastMessage {
            speaker_id: Some(speaker_id),
            speaker_name: name,
            text: draft.text.clone(),
            wants_to_continue: draft.wants_to_continue,
        });

        self.governor.complete_one_ai_turn();
        if draft.needs_human_reply {
            self.governor.force_human_turn();
        }

        info!(
            target: "tribunal::orchestrator",
            persona = speaker_id,
            remaining = self.governor.remaining(),
            wants_to_continue = draft.wants_to_continue,
            needs_human_reply = draft.needs_human_reply,
            "beat complete"
        );

        Ok(BeatOutcome {
            speaker_id: Some(speaker_id),
            text: draft.text,
            wants_to_continue: draft.wants_to_continue,
        })
    }

    /// Runs beats until the AI window closes.
    ///
    /// The loop also stops at the session's message ceiling and on the first
    /// beat that produces no text. Either early stop hands the turn to the
    /// human. Yields are not included in the returned outcomes.
    pub async fn run_window(&mut self) -> Result<Vec<BeatOutcome>, TribunalError> {
        let mut outcomes = Vec::new();

        while self.governor.has_ai_turn_available() {
            if self.messages_sent >= self.config.max_messages {
                info!(
                    target: "tribunal::orchestrator",
                    max_messages = self.config.max_messages,
                    "message ceiling reached"
                );
                self.governor.force_human_turn();
                break;
            }

            let candidates = self.eligible_candidates();
            let outcome = self.next_beat(&candidates).await?;
            if outcome.is_yield() {
                break;
            }
            if outcome.is_empty() {
                warn!(target: "tribunal::orchestrator", "beat produced no text; ending window");
                self.governor.force_human_turn();
                break;
            }
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    pub fn get_case_state(&self) -> CaseState {
        CaseState {
            premise: self.case.premise().to_string(),
            key_points: self.case.key_points().to_vec(),
            key_point_cursor: self.case.key_point_cursor(),
            current_key_point: self.case.current_key_point().map(str::to_string),
            evidence: self.case.evidence().to_vec(),
            personas: self.case.personas().iter().map(Persona::state).collect(),
            turn: self.governor.state(),
            messages_sent: self.messages_sent,
            recent_transcript: self.transcript.window().into_iter().cloned().collect(),
        }
    }

    fn selection_context(&self) -> SelectionContext {
        let last = self.last_message.as_ref();
        SelectionContext {
            premise: self.case.premise().to_string(),
            last_message: last.map(|m| m.text.clone()).unwrap_or_default(),
            last_speaker: last.and_then(|m| m.speaker_id),
            last_speaker_name: last.map(|m| m.speaker_name.clone()),
            wants_to_continue: last.is_some_and(|m| m.wants_to_continue),
            evidence_names: self.case.evidence_names(),
            transcript: self.transcript.render(),
        }
    }

    fn speech_instruction(&self, speaker_id: PersonaId) -> Result<String, TribunalError> {
        let speaker = self
            .case
            .persona(speaker_id)
            .ok_or(TribunalError::UnknownPersona(speaker_id))?;

        let evidence = if speaker.role() == Role::Prosecutor {
            self.case.evidence_names()
        } else {
            Vec::new()
        };

        let sees_prosecution_notes = speaker.role() == Role::Prosecutor;
        let memory_digest: Vec<MemoryDigestEntry<'_>> = self
            .case
            .personas()
            .iter()
            .filter(|p| sees_prosecution_notes || p.role() != Role::Prosecutor)
            .map(|p| MemoryDigestEntry {
                name: p.name(),
                notes: p.recent_memories(self.config.recent_memory_count),
            })
            .filter(|entry| !entry.notes.is_empty())
            .collect();

        let last = self.last_message.as_ref();
        let previous_speaker = last.map(|m| {
            match m.speaker_id.and_then(|id| self.case.persona(id)) {
                Some(p) => format!("{} ({}, {})", p.name(), p.role(), p.mood()),
                None => m.speaker_name.clone(),
            }
        });
        let trigger = last.map_or(OPENING_TRIGGER, |m| m.text.as_str());

        let budget = self.window_size.max(1);
        let message_number = (budget - self.governor.remaining().min(budget)) + 1;

        prompts::render(
            SPEECH_INSTRUCTION,
            context! {
                premise => self.case.premise(),
                key_point => self.case.current_key_point(),
                key_point_index => self.case.key_point_cursor() + 1,
                key_point_total => self.case.key_points().len(),
                evidence => evidence,
                memory_digest => memory_digest,
                transcript => self.transcript.render(),
                previous_speaker => previous_speaker,
                trigger => trigger,
                message_number => message_number,
                message_budget => budget,
                speaker_name => speaker.name(),
            },
        )
    }
}
