//! Configuration for session and beat behavior.

use serde::Deserialize;

/// Configuration for a courtroom session.
///
/// This struct centralizes the tunables used by the orchestrator, the
/// transcript log and the persona context builder.
///
/// # Examples
///
/// ```
/// use tribunal::SessionConfig;
///
/// // Use default configuration
/// let config = SessionConfig::default();
/// assert_eq!(config.transcript_window, 20);
///
/// // Customize specific values
/// let custom = SessionConfig {
///     max_messages: 10,
///     ..Default::default()
/// };
/// assert_eq!(custom.default_window, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Number of most recent transcript entries surfaced in prompts.
    ///
    /// **Default:** 20
    pub transcript_window: usize,

    /// Number of transcript entries retained in memory. Older entries are
    /// dropped once the log grows past this size.
    ///
    /// **Default:** 500
    pub transcript_capacity: usize,

    /// Number of memory notes per persona shown in prompts and digests.
    ///
    /// **Default:** 5
    pub recent_memory_count: usize,

    /// Number of a persona's own past lines shown in its context.
    ///
    /// **Default:** 3
    pub recent_speech_count: usize,

    /// Number of poses listed as a sample in a persona's context.
    ///
    /// **Default:** 8
    pub pose_sample_size: usize,

    /// Ceiling on AI messages for the whole session.
    ///
    /// The beat loop stops once this many AI lines have been produced, even
    /// if the current AI window still has turns left.
    ///
    /// **Default:** 60
    pub max_messages: usize,

    /// AI window size opened after a human message when the caller does not
    /// pass an explicit budget.
    ///
    /// **Default:** 3
    pub default_window: usize,

    /// Maximum number of memory notes accepted from one draft.
    ///
    /// **Default:** 4
    pub memory_limit: usize,

    /// Maximum number of words kept per memory note.
    ///
    /// **Default:** 12
    pub memory_word_limit: usize,

    /// Number of memory notes each persona retains. The oldest notes are
    /// dropped past this size.
    ///
    /// **Default:** 50
    pub memory_capacity: usize,

    /// Number of its own lines each persona retains.
    ///
    /// **Default:** 50
    pub speech_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            transcript_window: 20,
            transcript_capacity: 500,
            recent_memory_count: 5,
            recent_speech_count: 3,
            pose_sample_size: 8,
            max_messages: 60,
            default_window: 3,
            memory_limit: 4,
            memory_word_limit: 12,
            memory_capacity: 50,
            speech_capacity: 50,
        }
    }
}
