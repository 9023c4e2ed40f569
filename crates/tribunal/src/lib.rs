//! 'tribunal' - Turn arbitration for multi-persona courtroom dialogues.
//!
//! A single human participant and several AI personas take turns inside one
//! conversation. An external generative service writes each AI line; this
//! crate decides whose turn it is, which persona speaks next, what context
//! that persona sees, and how long an AI-only run may last before the human
//! gets the floor back.
//!
//! # Components
//!
//! - [`TurnGovernor`]: human turn vs. a bounded AI window
//! - [`SpeakerSelector`]: continuation, then service choice, then
//!   least-recently-spoken fallback
//! - [`Persona`]: identity, memory and display state, plus prompt context
//! - [`TranscriptLog`]: append-only log with a prompting window
//! - [`CaseOrchestrator`]: runs beats over all of the above
//! - [`SessionHandle`]: shared, re-entry safe access for transport tasks
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tribunal::{
//!     CaseOrchestrator, Evidence, MpscChannel, PersonaProfile, PresetCatalog, Role,
//!     SessionHandle,
//! };
//!
//! # async fn run(catalog_json: &str) -> Result<(), tribunal::TribunalError> {
//! let catalog = PresetCatalog::from_json_str(catalog_json)?;
//! let mut orchestrator = CaseOrchestrator::create_case(
//!     "A body was found in the hotel lobby.",
//!     vec!["Time of death".into(), "The missing key".into()],
//!     vec![
//!         PersonaProfile::human(1, "Phoenix"),
//!         PersonaProfile::ai(10, "Judge", Role::Judge),
//!         PersonaProfile::ai(4, "Larry", Role::Witness),
//!     ],
//!     vec![Evidence::new(1, "Autopsy Report")],
//!     &catalog,
//! )?;
//!
//! for id in orchestrator.eligible_candidates() {
//!     let (channel, _commands) = MpscChannel::new();
//!     orchestrator.bind_persona_channel(id, Arc::new(channel))?;
//! }
//!
//! let session = SessionHandle::new(orchestrator);
//! let beats = session.handle_human_message("The witness is lying!", Some(3)).await?;
//! for beat in beats {
//!     println!("{:?}: {}", beat.speaker_id, beat.text);
//! }
//! # Ok(())
//! # }
//! ```

pub mod case;
pub mod catalog;
pub mod channel;
pub mod config;
pub mod error;
pub mod extract;
pub mod observability;
pub mod orchestrator;
pub mod persona;
mod prompts;
pub mod selector;
pub mod service;
pub mod session;
pub mod transcript;
pub mod turn;

pub use case::{Case, CaseState, Evidence, EvidenceId};
pub use catalog::{Pose, PoseId, Preset, PresetCatalog, PresetId};
pub use channel::{ChannelCommand, MpscChannel, OutputChannel, SpokenLine};
pub use config::SessionConfig;
pub use error::{ChannelError, ServiceError, TribunalError};
pub use extract::{FlexibleExtractor, MarkdownCodeBlockExtractor, ParseError, extract_json};
pub use orchestrator::{BeatOutcome, CaseOrchestrator};
pub use persona::{
    DisplaySnapshot, Draft, MemoryEntry, Mood, Persona, PersonaId, PersonaProfile, PersonaState,
    Role, SceneSuggestion, SpeechEntry,
};
pub use selector::{Candidate, SelectionContext, SpeakerSelector};
pub use service::{GenerativeService, Generation, OutputContract, RetryingService};
pub use session::SessionHandle;
pub use transcript::{TranscriptEntry, TranscriptLog};
pub use turn::{TurnGovernor, TurnState};
