//! Speech drafts returned by the generative service.
//!
//! A draft is untrusted: every field is coerced to a safe value when it is read
//! from the raw JSON, so nothing invalid crosses into persona state.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::catalog::PoseId;
use crate::service::OutputContract;

use super::Mood;

/// Optional staging that accompanies a line of dialogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneSuggestion {
    pub action: Option<String>,
    /// Raw mood label; validated against [`Mood`] when applied.
    pub mood: Option<String>,
    /// Always a valid pose for the persona, or `None` when it has no poses.
    pub pose_id: Option<PoseId>,
}

/// One structured speech attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    pub text: String,
    pub scene: Option<SceneSuggestion>,
    pub needs_human_reply: bool,
    pub memories: Vec<String>,
    pub wants_to_continue: bool,
}

/// Bounds applied while reading memories out of a draft.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MemoryLimits {
    pub max_entries: usize,
    pub max_words: usize,
}

impl Draft {
    /// A draft with no content. Produced whenever generation is unavailable.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Reads a draft from raw service JSON.
    ///
    /// `valid_poses` is the persona's pose set and `current_pose` the pose it
    /// is displayed in now. A pose that is missing, unparsable or outside the
    /// valid set resolves to `current_pose`, then to the first valid pose.
    pub(crate) fn from_value(
        value: &Value,
        valid_poses: &[PoseId],
        current_pose: Option<PoseId>,
        limits: MemoryLimits,
    ) -> Self {
        let text = string_field(value, &["text", "dialogue"]).unwrap_or_default();

        let scene = value.get("scene").filter(|scene| scene.is_object()).map(|scene| {
            SceneSuggestion {
                action: string_field(scene, &["action"]),
                mood: string_field(scene, &["mood"]),
                pose_id: coerce_pose(scene.get("pose_id"), valid_poses, current_pose),
            }
        });

        let memories = value
            .get("memories")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|note| truncate_words(note, limits.max_words))
                    .filter(|note| !note.is_empty())
                    .take(limits.max_entries)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            text,
            scene,
            needs_human_reply: bool_field(value, "needs_human_reply"),
            memories,
            wants_to_continue: bool_field(value, "wants_to_continue"),
        }
    }
}

/// Coerces a drafted pose into a member of `valid_poses`.
pub fn coerce_pose(
    raw: Option<&Value>,
    valid_poses: &[PoseId],
    current_pose: Option<PoseId>,
) -> Option<PoseId> {
    let parsed = raw.and_then(|value| match value {
        Value::Number(n) => n.as_u64().and_then(|n| PoseId::try_from(n).ok()),
        Value::String(s) => s.trim().parse::<PoseId>().ok(),
        _ => None,
    });

    parsed
        .filter(|pose| valid_poses.is_empty() || valid_poses.contains(pose))
        .or(current_pose)
        .or_else(|| valid_poses.first().copied())
}

/// Builds the structured-output contract for a persona's speech.
pub fn speech_contract(valid_poses: &[PoseId]) -> OutputContract {
    let moods: Vec<String> = Mood::all().iter().map(ToString::to_string).collect();
    OutputContract::new(
        "speech_draft",
        "one line of courtroom dialogue with optional staging",
        json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "What the character says" },
                "scene": {
                    "type": "object",
                    "properties": {
                        "action": { "type": "string" },
                        "mood": { "type": "string", "enum": moods },
                        "pose_id": { "type": "integer", "enum": valid_poses }
                    }
                },
                "needs_human_reply": { "type": "boolean" },
                "memories": {
                    "type": "array",
                    "maxItems": 4,
                    "items": { "type": "string", "description": "At most 12 words" }
                },
                "wants_to_continue": { "type": "boolean" }
            },
            "required": ["text", "needs_human_reply", "wants_to_continue"]
        }),
    )
}

fn string_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn bool_field(value: &Value, key: &str) -> bool {
    match value.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn truncate_words(note: &str, max_words: usize) -> String {
    note.split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMITS: MemoryLimits = MemoryLimits {
        max_entries: 4,
        max_words: 12,
    };

    #[test]
    fn test_full_draft_is_read() {
        let value = json!({
            "text": "Objection!",
            "scene": {"action": "slams desk", "mood": "Angry", "pose_id": 21},
            "needs_human_reply": true,
            "memories": ["The knife was moved"],
            "wants_to_continue": false
        });

        let draft = Draft::from_value(&value, &[20, 21], Some(20), LIMITS);

        assert_eq!(draft.text, "Objection!");
        let scene = draft.scene.unwrap();
        assert_eq!(scene.pose_id, Some(21));
        assert_eq!(scene.mood.as_deref(), Some("Angry"));
        assert!(draft.needs_human_reply);
        assert_eq!(draft.memories, vec!["The knife was moved"]);
    }

    #[test]
    fn test_unparsable_pose_keeps_current_pose() {
        let value = json!({"text": "Hm.", "scene": {"pose_id": "not-a-number"}});
        let draft = Draft::from_value(&value, &[20, 21, 22], Some(22), LIMITS);
        assert_eq!(draft.scene.unwrap().pose_id, Some(22));
    }

    #[test]
    fn test_numeric_string_pose_is_parsed() {
        let value = json!({"text": "Hm.", "scene": {"pose_id": " 21 "}});
        let draft = Draft::from_value(&value, &[20, 21], Some(20), LIMITS);
        assert_eq!(draft.scene.unwrap().pose_id, Some(21));
    }

    #[test]
    fn test_out_of_range_pose_falls_back_to_first_valid() {
        let pose = coerce_pose(Some(&json!(999)), &[20, 21], None);
        assert_eq!(pose, Some(20));
        assert_eq!(coerce_pose(None, &[], None), None);
    }

    #[test]
    fn test_memories_are_bounded() {
        let value = json!({
            "text": "...",
            "memories": [
                "one two three four five six seven eight nine ten eleven twelve thirteen",
                42,
                "",
                "b", "c", "d", "e"
            ]
        });
        let draft = Draft::from_value(&value, &[], None, LIMITS);
        assert_eq!(draft.memories.len(), 4);
        assert_eq!(draft.memories[0].split_whitespace().count(), 12);
        assert_eq!(draft.memories[1], "b");
    }

    #[test]
    fn test_malformed_payload_yields_empty_draft() {
        let draft = Draft::from_value(&json!(["not", "an", "object"]), &[1], Some(1), LIMITS);
        assert!(draft.is_empty());
        assert!(draft.scene.is_none());
        assert!(!draft.wants_to_continue);
    }

    #[test]
    fn test_contract_lists_valid_poses() {
        let contract = speech_contract(&[5, 6]);
        assert_eq!(
            contract.schema["properties"]["scene"]["properties"]["pose_id"]["enum"],
            json!([5, 6])
        );
    }
}
