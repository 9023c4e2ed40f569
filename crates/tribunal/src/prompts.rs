//! Prompt templates for persona context, speech and speaker selection.
//!
//! Templates are rendered with minijinja. Every section that can be empty is
//! wrapped in a guard so it disappears from the prompt instead of rendering a
//! bare heading.

use minijinja::Environment;
use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::error::TribunalError;

/// Replacement text for withheld terms.
pub(crate) const WITHHELD: &str = "[withheld]";

/// Renders a template source against a serializable context.
pub(crate) fn render<S: Serialize>(source: &str, ctx: S) -> Result<String, TribunalError> {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    let rendered = env.render_str(source, ctx)?;
    Ok(rendered.trim().to_string())
}

/// Masks a set of terms, case-insensitively, wherever they appear in a prompt.
///
/// Used to keep evidence names out of prompts for personas that are not
/// supposed to know them, including when they leak through memories or the
/// transcript.
#[derive(Debug, Clone, Default)]
pub(crate) struct Redactor {
    pattern: Option<Regex>,
}

impl Redactor {
    pub(crate) fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut terms: Vec<String> = terms
            .into_iter()
            .map(|term| term.as_ref().trim().to_string())
            .filter(|term| !term.is_empty())
            .collect();
        if terms.is_empty() {
            return Self::default();
        }
        // Longest first, so a name is never half-masked by a shorter one.
        terms.sort_by_key(|term| std::cmp::Reverse(term.len()));
        let alternation = terms
            .iter()
            .map(|term| regex::escape(term))
            .collect::<Vec<_>>()
            .join("|");

        match RegexBuilder::new(&alternation).case_insensitive(true).build() {
            Ok(pattern) => Self {
                pattern: Some(pattern),
            },
            Err(e) => {
                tracing::warn!(
                    target: "tribunal::prompts",
                    error = %e,
                    "failed to build redaction pattern; prompts are not redacted"
                );
                Self::default()
            }
        }
    }

    pub(crate) fn apply(&self, text: &str) -> String {
        match &self.pattern {
            Some(pattern) => pattern.replace_all(text, WITHHELD).into_owned(),
            None => text.to_string(),
        }
    }
}

pub(crate) const PERSONA_CONTEXT: &str = r#"
# Persona: {{ name }}
{% if description %}
{{ description }}
{% endif %}
{% if disguised %}
You are concealing your true identity. Stay in your cover story.
{% endif %}

- Role: {{ role }}
{% if preset_id is not none %}
- Preset: {{ preset_id }}
{% endif %}
- Mood: {{ mood }}
{% if pose_id is not none %}
- Pose: {{ pose_id }}
{% endif %}
{% if poses %}

## Available poses
{% for pose in poses %}
- {{ pose.id }}: {{ pose.name }}
{% endfor %}
{% endif %}
{% if memories %}

## What you remember
{% for memory in memories %}
- {{ memory }}
{% endfor %}
{% endif %}
{% if speech %}

## What you said recently
{% for line in speech %}
- "{{ line }}"
{% endfor %}
{% endif %}
"#;

pub(crate) const SPEECH_INSTRUCTION: &str = r#"
# Courtroom Scene

## Premise
{{ premise }}
{% if key_point %}

## Current key point ({{ key_point_index }}/{{ key_point_total }})
{{ key_point }}
{% endif %}
{% if evidence %}

## Evidence in your possession
{% for item in evidence %}
- {{ item }}
{% endfor %}
{% endif %}
{% if memory_digest %}

## What everyone remembers
{% for entry in memory_digest %}
- {{ entry.name }}: {{ entry.notes | join("; ") }}
{% endfor %}
{% endif %}
{% if transcript %}

## Recent transcript
{{ transcript }}
{% endif %}
{% if previous_speaker %}

## Previous speaker
{{ previous_speaker }}
{% endif %}

## Message you are responding to
{{ trigger }}

---

This is message {{ message_number }} of {{ message_budget }}.
Speak as {{ speaker_name }} in one or two sentences. Set `needs_human_reply` to true when you expect the player to answer you directly. Set `wants_to_continue` to true only if you have more to say right away.
"#;

pub(crate) const SPEAKER_SELECTION: &str = r#"
# Speaker Selection Task

Decide which character should speak next in this courtroom scene, or whether the player should answer.
{% if premise %}

## Premise
{{ premise }}
{% endif %}
{% if evidence %}

## Evidence on record
{% for item in evidence %}
- {{ item }}
{% endfor %}
{% endif %}
{% if transcript %}

## Recent transcript
{{ transcript }}
{% endif %}
{% if last_message %}

## Last message{% if last_speaker %} (from {{ last_speaker }}){% endif %}

{{ last_message }}
{% endif %}

## Candidates
{% for candidate in candidates %}
- id {{ candidate.id }}: {{ candidate.name }} ({{ candidate.role }}){% if candidate.memories %} remembers: {{ candidate.memories | join("; ") }}{% endif %}

{% endfor %}

Return `speaker_id` as one of the candidate ids, or `"none"` if the player should speak next.
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::context;

    #[test]
    fn test_empty_sections_are_omitted() {
        let rendered = render(
            PERSONA_CONTEXT,
            context! {
                name => "Judge",
                description => "",
                disguised => false,
                role => "judge",
                preset_id => 4,
                mood => "neutral",
                pose_id => (),
                poses => Vec::<String>::new(),
                memories => Vec::<String>::new(),
                speech => Vec::<String>::new(),
            },
        )
        .unwrap();

        assert!(rendered.starts_with("# Persona: Judge"));
        assert!(rendered.contains("- Preset: 4"));
        assert!(!rendered.contains("- Pose:"));
        assert!(!rendered.contains("## What you remember"));
        assert!(!rendered.contains("## Available poses"));
    }

    #[test]
    fn test_redactor_masks_terms_case_insensitively() {
        let redactor = Redactor::new(["Autopsy Report", "Autopsy", "  "]);
        assert_eq!(
            redactor.apply("The autopsy report says so. AUTOPSY done."),
            "The [withheld] says so. [withheld] done."
        );
    }

    #[test]
    fn test_redactor_escapes_and_passes_through() {
        let redactor = Redactor::new(["Photo (1)"]);
        assert_eq!(redactor.apply("See Photo (1)."), "See [withheld].");
        assert_eq!(Redactor::new(Vec::<String>::new()).apply("text"), "text");
    }

    #[test]
    fn test_undefined_variable_renders_empty() {
        let rendered = render("a{{ missing }}b", context! {}).unwrap();
        assert_eq!(rendered, "ab");
    }
}
