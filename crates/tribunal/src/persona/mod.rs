//! Personas: identity, memory and display state of one participant.
//!
//! A [`Persona`] is both the record of a participant and its context builder:
//! it renders the prompt context describing itself, asks the generative
//! service for a [`Draft`], and applies that draft back onto its own state
//! before emitting the line through its bound [`OutputChannel`].

pub mod draft;

pub use draft::{Draft, SceneSuggestion, coerce_pose, speech_contract};

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use minijinja::context;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};
use tracing::{debug, warn};

use crate::catalog::{Pose, PoseId, Preset, PresetId};
use crate::channel::{OutputChannel, SpokenLine};
use crate::config::SessionConfig;
use crate::error::TribunalError;
use crate::prompts::{self, PERSONA_CONTEXT, Redactor};
use crate::service::GenerativeService;
use draft::MemoryLimits;

/// Numeric persona identifier, unique within a case.
pub type PersonaId = u32;

/// Returns the current Unix timestamp in seconds.
pub(crate) fn current_unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Courtroom role of a persona.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Role {
    Prosecutor,
    Judge,
    Witness,
    Defendant,
    #[default]
    Unassigned,
}

impl Role {
    /// The catalog side tag presets for this role carry.
    pub fn side(self) -> Option<&'static str> {
        match self {
            Role::Prosecutor => Some("prosecution"),
            Role::Judge => Some("bench"),
            Role::Witness => Some("witness"),
            Role::Defendant => Some("defendant"),
            Role::Unassigned => None,
        }
    }
}

/// Displayed mood of a persona.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Mood {
    #[default]
    Neutral,
    Happy,
    Sad,
    Angry,
    Surprised,
    Nervous,
    Confident,
    Thinking,
}

impl Mood {
    pub fn all() -> Vec<Mood> {
        Mood::iter().collect()
    }

    /// Parses a mood label case-insensitively. Unknown labels yield `None`.
    pub fn parse_lenient(label: &str) -> Option<Mood> {
        label.trim().parse().ok()
    }
}

/// A timestamped memory note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub text: String,
    pub timestamp: u64,
}

/// A timestamped line the persona has spoken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechEntry {
    pub text: String,
    pub timestamp: u64,
}

/// The generated profile a persona is created from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaProfile {
    pub id: PersonaId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_human: bool,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub preset_id: Option<PresetId>,
    #[serde(default)]
    pub disguised: bool,
}

impl PersonaProfile {
    pub fn ai(id: PersonaId, name: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            is_human: false,
            role,
            preset_id: None,
            disguised: false,
        }
    }

    pub fn human(id: PersonaId, name: impl Into<String>) -> Self {
        Self {
            is_human: true,
            ..Self::ai(id, name, Role::Unassigned)
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_preset(mut self, preset_id: PresetId) -> Self {
        self.preset_id = Some(preset_id);
        self
    }

    pub fn disguised(mut self) -> Self {
        self.disguised = true;
        self
    }
}

/// Pose and mood at the moment a line was spoken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplaySnapshot {
    pub pose_id: Option<PoseId>,
    pub mood: Mood,
}

/// Serializable view of a persona for [`crate::CaseState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaState {
    pub id: PersonaId,
    pub name: String,
    pub role: Role,
    pub is_human: bool,
    pub disguised: bool,
    pub preset_id: Option<PresetId>,
    pub pose_id: Option<PoseId>,
    pub mood: Mood,
    pub memories: Vec<MemoryEntry>,
    pub lines_spoken: usize,
    pub bound: bool,
}

/// A participant in the case.
pub struct Persona {
    id: PersonaId,
    name: String,
    description: String,
    is_human: bool,
    role: Role,
    preset_id: Option<PresetId>,
    disguised: bool,
    poses: Vec<Pose>,
    pose_id: Option<PoseId>,
    mood: Mood,
    memories: Vec<MemoryEntry>,
    speech: Vec<SpeechEntry>,
    memory_capacity: usize,
    speech_capacity: usize,
    lines_spoken: usize,
    channel: Option<Arc<dyn OutputChannel>>,
}

impl std::fmt::Debug for Persona {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persona")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("role", &self.role)
            .field("preset_id", &self.preset_id)
            .field("pose_id", &self.pose_id)
            .field("mood", &self.mood)
            .field("bound", &self.channel.is_some())
            .finish()
    }
}

impl Persona {
    /// Creates a persona from its profile and resolved preset.
    ///
    /// The preset's first pose becomes the initial pose.
    pub fn new(profile: PersonaProfile, preset: Option<&Preset>) -> Self {
        let poses = preset.map(|p| p.poses.clone()).unwrap_or_default();
        let retention = SessionConfig::default();
        Self {
            id: profile.id,
            name: profile.name,
            description: profile.description,
            is_human: profile.is_human,
            role: profile.role,
            preset_id: preset.map(|p| p.id).or(profile.preset_id),
            disguised: profile.disguised,
            pose_id: poses.first().map(|pose| pose.id),
            poses,
            mood: Mood::default(),
            memories: Vec::new(),
            speech: Vec::new(),
            memory_capacity: retention.memory_capacity,
            speech_capacity: retention.speech_capacity,
            lines_spoken: 0,
            channel: None,
        }
    }

    pub fn id(&self) -> PersonaId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn is_human(&self) -> bool {
        self.is_human
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn preset_id(&self) -> Option<PresetId> {
        self.preset_id
    }

    pub fn is_disguised(&self) -> bool {
        self.disguised
    }

    pub fn pose_id(&self) -> Option<PoseId> {
        self.pose_id
    }

    pub fn mood(&self) -> Mood {
        self.mood
    }

    pub fn memories(&self) -> &[MemoryEntry] {
        &self.memories
    }

    pub fn speech(&self) -> &[SpeechEntry] {
        &self.speech
    }

    pub fn is_bound(&self) -> bool {
        self.channel.is_some()
    }

    pub fn valid_pose_ids(&self) -> Vec<PoseId> {
        self.poses.iter().map(|pose| pose.id).collect()
    }

    /// The most recent `count` memory notes, oldest first.
    pub fn recent_memories(&self, count: usize) -> Vec<String> {
        let start = self.memories.len().saturating_sub(count);
        self.memories[start..]
            .iter()
            .map(|entry| entry.text.clone())
            .collect()
    }

    /// The most recent `count` lines this persona spoke, oldest first.
    pub fn recent_speech(&self, count: usize) -> Vec<String> {
        let start = self.speech.len().saturating_sub(count);
        self.speech[start..]
            .iter()
            .map(|entry| entry.text.clone())
            .collect()
    }

    pub fn display(&self) -> DisplaySnapshot {
        DisplaySnapshot {
            pose_id: self.pose_id,
            mood: self.mood,
        }
    }

    pub fn bind_channel(&mut self, channel: Arc<dyn OutputChannel>) {
        self.channel = Some(channel);
    }

    pub fn unbind_channel(&mut self) {
        self.channel = None;
    }

    fn bound_channel(&self) -> Result<Arc<dyn OutputChannel>, TribunalError> {
        self.channel
            .clone()
            .ok_or(TribunalError::PersonaUnbound(self.id))
    }

    /// Changes the displayed pose. Poses outside the preset's set are ignored.
    pub fn set_pose(&mut self, pose: PoseId) -> Result<(), TribunalError> {
        self.bound_channel()?;
        if self.poses.is_empty() || self.poses.iter().any(|p| p.id == pose) {
            self.pose_id = Some(pose);
        } else {
            debug!(
                target: "tribunal::persona",
                persona = self.id,
                pose,
                "ignoring pose outside the preset's pose set"
            );
        }
        Ok(())
    }

    pub fn set_mood(&mut self, mood: Mood) -> Result<(), TribunalError> {
        self.bound_channel()?;
        self.mood = mood;
        Ok(())
    }

    pub fn remember(&mut self, note: impl Into<String>) {
        self.memories.push(MemoryEntry {
            text: note.into(),
            timestamp: current_unix_timestamp(),
        });
        self.trim_history();
    }

    /// Bounds how many memory notes and spoken lines this persona keeps.
    ///
    /// Older entries are dropped first, immediately and on every append.
    pub fn set_retention(&mut self, memory_capacity: usize, speech_capacity: usize) {
        self.memory_capacity = memory_capacity;
        self.speech_capacity = speech_capacity;
        self.trim_history();
    }

    fn trim_history(&mut self) {
        let excess = self.memories.len().saturating_sub(self.memory_capacity);
        self.memories.drain(..excess);
        let excess = self.speech.len().saturating_sub(self.speech_capacity);
        self.speech.drain(..excess);
    }

    /// Renders this persona's prompt context.
    pub fn build_context(&self, config: &SessionConfig) -> Result<String, TribunalError> {
        let poses: Vec<&Pose> = self.poses.iter().take(config.pose_sample_size).collect();
        prompts::render(
            PERSONA_CONTEXT,
            context! {
                name => &self.name,
                description => &self.description,
                disguised => self.disguised,
                role => self.role.to_string(),
                preset_id => self.preset_id,
                mood => self.mood.to_string(),
                pose_id => self.pose_id,
                poses => poses,
                memories => self.recent_memories(config.recent_memory_count),
                speech => self.recent_speech(config.recent_speech_count),
            },
        )
    }

    /// Asks the generative service for this persona's next line.
    ///
    /// Returns an empty draft when no service is configured, when the persona
    /// is not bound to a channel, or when the service fails or answers with
    /// something unusable. Only template errors are returned as `Err`.
    pub async fn generate_speech(
        &self,
        instruction: &str,
        service: Option<&dyn GenerativeService>,
        config: &SessionConfig,
    ) -> Result<Draft, TribunalError> {
        self.generate_speech_with(instruction, service, config, None).await
    }

    /// Like [`Persona::generate_speech`], with `redactor` applied to the full
    /// prompt before it leaves the crate.
    pub(crate) async fn generate_speech_with(
        &self,
        instruction: &str,
        service: Option<&dyn GenerativeService>,
        config: &SessionConfig,
        redactor: Option<&Redactor>,
    ) -> Result<Draft, TribunalError> {
        let Some(service) = service else {
            return Ok(Draft::empty());
        };
        if !self.is_bound() {
            debug!(
                target: "tribunal::persona",
                persona = self.id,
                "persona not bound; skipping generation"
            );
            return Ok(Draft::empty());
        }

        let mut prompt = format!("{}\n\n{}", self.build_context(config)?, instruction);
        if let Some(redactor) = redactor {
            prompt = redactor.apply(&prompt);
        }
        let valid_poses = self.valid_pose_ids();
        let contract = speech_contract(&valid_poses);

        let value = match service.generate(prompt, &contract).await {
            Ok(generation) => generation.into_value(),
            Err(e) => Err(e),
        };

        match value {
            Ok(Some(value)) => Ok(Draft::from_value(
                &value,
                &valid_poses,
                self.pose_id,
                MemoryLimits {
                    max_entries: config.memory_limit,
                    max_words: config.memory_word_limit,
                },
            )),
            Ok(None) => {
                warn!(
                    target: "tribunal::persona",
                    persona = self.id,
                    service = %service.name(),
                    "service returned an empty draft"
                );
                Ok(Draft::empty())
            }
            Err(e) => {
                warn!(
                    target: "tribunal::persona",
                    persona = self.id,
                    service = %service.name(),
                    error = %e,
                    "speech generation failed; using empty draft"
                );
                Ok(Draft::empty())
            }
        }
    }

    /// Applies a draft to this persona and emits the line.
    ///
    /// Fails with [`TribunalError::PersonaUnbound`] if no channel is bound.
    /// Channel delivery failures are logged and do not fail the call.
    pub async fn apply_response(
        &mut self,
        draft: &Draft,
    ) -> Result<DisplaySnapshot, TribunalError> {
        let channel = self.bound_channel()?;
        let now = current_unix_timestamp();

        if let Some(scene) = &draft.scene {
            if let Some(pose) = scene.pose_id {
                self.set_pose(pose)?;
            }
            if let Some(mood) = scene.mood.as_deref().and_then(Mood::parse_lenient) {
                self.mood = mood;
            }
        }

        self.memories
            .extend(draft.memories.iter().map(|note| MemoryEntry {
                text: note.clone(),
                timestamp: now,
            }));
        self.speech.push(SpeechEntry {
            text: draft.text.clone(),
            timestamp: now,
        });
        self.lines_spoken += 1;
        self.trim_history();

        let line = SpokenLine {
            persona_id: self.id,
            speaker_name: self.name.clone(),
            preset_id: self.preset_id,
            pose_id: self.pose_id,
            mood: self.mood,
            text: draft.text.clone(),
        };

        let delivery = match self.preset_id {
            Some(preset) => channel.change_identity(preset).await,
            None => Ok(()),
        };
        if let Err(e) = match delivery {
            Ok(()) => channel.speak(line).await,
            Err(e) => Err(e),
        } {
            warn!(
                target: "tribunal::persona",
                persona = self.id,
                error = %e,
                "failed to deliver line to output channel"
            );
        }

        Ok(self.display())
    }

    pub fn state(&self) -> PersonaState {
        PersonaState {
            id: self.id,
            name: self.name.clone(),
            role: self.role,
            is_human: self.is_human,
            disguised: self.disguised,
            preset_id: self.preset_id,
            pose_id: self.pose_id,
            mood: self.mood,
            memories: self.memories.clone(),
            lines_spoken: self.lines_spoken,
            bound: self.is_bound(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelCommand, MpscChannel};
    use crate::error::ServiceError;
    use crate::service::{Generation, OutputContract};
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::Mutex;

    struct ScriptedService {
        reply: Result<Value, String>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedService {
        fn replying(reply: Value) -> Self {
            Self {
                reply: Ok(reply),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                reply: Err("backend down".to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl GenerativeService for ScriptedService {
        async fn generate(
            &self,
            prompt: String,
            _contract: &OutputContract,
        ) -> Result<Generation, ServiceError> {
            self.prompts.lock().unwrap().push(prompt);
            match &self.reply {
                Ok(value) => Ok(Generation::Structured(value.clone())),
                Err(message) => Err(ServiceError::ProcessError(message.clone())),
            }
        }
    }

    fn witness_preset() -> Preset {
        Preset {
            id: 3,
            name: "Witness A".into(),
            side: "witness".into(),
            poses: vec![
                Pose {
                    id: 30,
                    name: "normal".into(),
                },
                Pose {
                    id: 31,
                    name: "sweating".into(),
                },
            ],
        }
    }

    fn witness() -> Persona {
        Persona::new(
            PersonaProfile::ai(4, "Larry", Role::Witness)
                .with_description("A hapless street vendor."),
            Some(&witness_preset()),
        )
    }

    fn bound_witness() -> (Persona, tokio::sync::mpsc::UnboundedReceiver<ChannelCommand>) {
        let mut persona = witness();
        let (channel, rx) = MpscChannel::new();
        persona.bind_channel(Arc::new(channel));
        (persona, rx)
    }

    #[test]
    fn test_new_persona_starts_in_first_pose() {
        let persona = witness();
        assert_eq!(persona.preset_id(), Some(3));
        assert_eq!(persona.pose_id(), Some(30));
        assert_eq!(persona.mood(), Mood::Neutral);
        assert!(!persona.is_bound());
    }

    #[test]
    fn test_build_context_includes_identity_and_omits_empty_sections() {
        let mut persona = witness();
        let config = SessionConfig::default();

        let context = persona.build_context(&config).unwrap();
        assert!(context.contains("# Persona: Larry"));
        assert!(context.contains("A hapless street vendor."));
        assert!(context.contains("- 31: sweating"));
        assert!(!context.contains("What you remember"));
        assert!(!context.contains("What you said recently"));

        persona.remember("The defendant wore a red scarf");
        let context = persona.build_context(&config).unwrap();
        assert!(context.contains("## What you remember"));
        assert!(context.contains("red scarf"));
    }

    #[test]
    fn test_mood_parsing_is_case_insensitive() {
        assert_eq!(Mood::parse_lenient("ANGRY"), Some(Mood::Angry));
        assert_eq!(Mood::parse_lenient(" thinking "), Some(Mood::Thinking));
        assert_eq!(Mood::parse_lenient("furious"), None);
        assert_eq!("Prosecutor".parse::<Role>().unwrap(), Role::Prosecutor);
    }

    #[tokio::test]
    async fn test_generate_speech_without_service_is_empty() {
        let (persona, _rx) = bound_witness();
        let draft = persona
            .generate_speech("say something", None, &SessionConfig::default())
            .await
            .unwrap();
        assert!(draft.is_empty());
    }

    #[tokio::test]
    async fn test_generate_speech_unbound_is_empty() {
        let persona = witness();
        let service = ScriptedService::replying(json!({"text": "Hello"}));
        let draft = persona
            .generate_speech("say something", Some(&service), &SessionConfig::default())
            .await
            .unwrap();
        assert!(draft.is_empty());
        assert!(service.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_generate_speech_coerces_bad_pose_to_current() {
        let (persona, _rx) = bound_witness();
        let service = ScriptedService::replying(json!({
            "text": "I-I saw him!",
            "scene": {"pose_id": "not-a-number", "mood": "nervous"},
            "needs_human_reply": false,
            "wants_to_continue": true
        }));

        let draft = persona
            .generate_speech("Testify.", Some(&service), &SessionConfig::default())
            .await
            .unwrap();

        assert_eq!(draft.text, "I-I saw him!");
        assert_eq!(draft.scene.unwrap().pose_id, Some(30));
        assert!(draft.wants_to_continue);

        let prompts = service.prompts.lock().unwrap();
        assert!(prompts[0].starts_with("# Persona: Larry"));
        assert!(prompts[0].ends_with("Testify."));
    }

    #[tokio::test]
    async fn test_generate_speech_service_error_is_empty() {
        let (persona, _rx) = bound_witness();
        let service = ScriptedService::failing();
        let draft = persona
            .generate_speech("Testify.", Some(&service), &SessionConfig::default())
            .await
            .unwrap();
        assert!(draft.is_empty());
    }

    #[tokio::test]
    async fn test_apply_response_unbound_fails_loudly() {
        let mut persona = witness();
        let draft = Draft {
            text: "Hello".into(),
            ..Default::default()
        };
        let err = persona.apply_response(&draft).await.unwrap_err();
        assert!(matches!(err, TribunalError::PersonaUnbound(4)));
        assert!(matches!(
            persona.set_mood(Mood::Happy),
            Err(TribunalError::PersonaUnbound(4))
        ));
    }

    #[tokio::test]
    async fn test_apply_response_updates_state_and_emits() {
        let (mut persona, mut rx) = bound_witness();
        let draft = Draft {
            text: "That's him! The guy with the scarf!".into(),
            scene: Some(SceneSuggestion {
                action: Some("points".into()),
                mood: Some("SURPRISED".into()),
                pose_id: Some(31),
            }),
            needs_human_reply: false,
            memories: vec!["Pointed out the defendant".into()],
            wants_to_continue: false,
        };

        let snapshot = persona.apply_response(&draft).await.unwrap();

        assert_eq!(snapshot.pose_id, Some(31));
        assert_eq!(snapshot.mood, Mood::Surprised);
        assert_eq!(persona.recent_memories(5), vec!["Pointed out the defendant"]);
        assert_eq!(persona.recent_speech(5).len(), 1);

        assert_eq!(rx.recv().await, Some(ChannelCommand::ChangeIdentity(3)));
        match rx.recv().await {
            Some(ChannelCommand::Speak(line)) => {
                assert_eq!(line.persona_id, 4);
                assert_eq!(line.pose_id, Some(31));
                assert_eq!(line.mood, Mood::Surprised);
            }
            other => panic!("expected speak command, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_history_is_bounded_by_retention() {
        let (mut persona, _rx) = bound_witness();
        persona.set_retention(2, 1);

        for i in 0..4 {
            let draft = Draft {
                text: format!("line {i}"),
                memories: vec![format!("note {i}")],
                ..Default::default()
            };
            persona.apply_response(&draft).await.unwrap();
        }
        persona.remember("note 4");

        assert_eq!(persona.recent_memories(10), vec!["note 3", "note 4"]);
        assert_eq!(persona.recent_speech(10), vec!["line 3"]);
        assert_eq!(persona.state().lines_spoken, 4);
    }

    #[tokio::test]
    async fn test_apply_response_ignores_unknown_mood() {
        let (mut persona, _rx) = bound_witness();
        persona.set_mood(Mood::Sad).unwrap();
        let draft = Draft {
            text: "...".into(),
            scene: Some(SceneSuggestion {
                action: None,
                mood: Some("melancholic".into()),
                pose_id: None,
            }),
            ..Default::default()
        };
        let snapshot = persona.apply_response(&draft).await.unwrap();
        assert_eq!(snapshot.mood, Mood::Sad);
        assert_eq!(snapshot.pose_id, Some(30));
    }
}
