//! JSON extraction from raw generative-service text.
//!
//! Services that answer in free text often wrap the requested JSON in prose,
//! Markdown fences or XML-like tags. These helpers pull the first usable JSON
//! entity out so it can be validated against an output contract.

use log::debug;
use regex::Regex;
use thiserror::Error;

/// Errors that can occur while extracting JSON from text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Tag extraction failed: {0}")]
    TagExtractionFailed(String),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("All extraction strategies failed: {0:?}")]
    AllStrategiesFailed(Vec<String>),
}

/// Extraction strategy tried by [`FlexibleExtractor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionStrategy {
    /// Extract content within XML-like tags: `<tag>content</tag>`.
    TaggedContent(String),

    /// Find the first complete JSON object or array.
    FirstJsonEntity,
}

/// Flexible content extractor with multiple strategies.
#[derive(Debug, Default)]
pub struct FlexibleExtractor {
    debug_mode: bool,
}

impl FlexibleExtractor {
    pub fn new() -> Self {
        Self { debug_mode: false }
    }

    pub fn with_debug(mut self) -> Self {
        self.debug_mode = true;
        self
    }

    pub fn standard_extraction_strategies() -> Vec<ExtractionStrategy> {
        vec![
            ExtractionStrategy::TaggedContent("answer".to_string()),
            ExtractionStrategy::FirstJsonEntity,
        ]
    }

    /// Standard extraction.
    pub fn extract(&self, text: &str) -> Result<String, ParseError> {
        if self.debug_mode {
            debug!("Extracting content from text: {}", text);
        }
        self.extract_with_strategies(text, &Self::standard_extraction_strategies())
    }

    /// Try multiple extraction strategies in order.
    pub fn extract_with_strategies(
        &self,
        text: &str,
        strategies: &[ExtractionStrategy],
    ) -> Result<String, ParseError> {
        let mut errors = Vec::new();

        for strategy in strategies {
            let extracted = match strategy {
                ExtractionStrategy::TaggedContent(tag) => self
                    .extract_tagged(text, tag)
                    .and_then(|inner| self.extract_first_json_entity(&inner)),
                ExtractionStrategy::FirstJsonEntity => self.extract_first_json_entity(text),
            };

            match extracted {
                Some(result) => {
                    if self.debug_mode {
                        debug!("Successfully extracted with strategy: {:?}", strategy);
                    }
                    return Ok(result);
                }
                None => errors.push(format!("Strategy {:?} failed", strategy)),
            }
        }

        Err(ParseError::AllStrategiesFailed(errors))
    }

    /// Extract content within `<tag>...</tag>`.
    pub fn extract_tagged(&self, text: &str, tag: &str) -> Option<String> {
        let pattern = format!(r"(?s)<{tag}>(.*?)</{tag}>", tag = regex::escape(tag));

        let captured = Regex::new(&pattern)
            .ok()
            .and_then(|regex| regex.captures(text))
            .and_then(|captures| captures.get(1))
            .map(|content| content.as_str().trim().to_string());

        if captured.is_none() && self.debug_mode {
            debug!("Failed to extract tagged content with tag: {}", tag);
        }

        captured
    }

    /// Extract the first complete JSON entity (object or array) from text.
    pub fn extract_first_json_entity(&self, text: &str) -> Option<String> {
        let mut depth = 0usize;
        let mut start_pos = None;
        let mut in_string = false;
        let mut escape_next = false;
        let mut opening_char = None;

        for (i, ch) in text.char_indices() {
            if escape_next {
                escape_next = false;
                continue;
            }

            match ch {
                '\\' if in_string => escape_next = true,
                '"' if start_pos.is_some() => in_string = !in_string,
                '{' | '[' if !in_string => {
                    if depth == 0 {
                        start_pos = Some(i);
                        opening_char = Some(ch);
                    }
                    depth += 1;
                }
                '}' | ']' if !in_string && depth > 0 => {
                    depth -= 1;
                    if depth == 0 {
                        let (Some(p), Some(opening)) = (start_pos, opening_char) else {
                            continue;
                        };
                        let is_valid =
                            (opening == '{' && ch == '}') || (opening == '[' && ch == ']');
                        if is_valid {
                            return Some(text[p..=i].to_string());
                        }
                        start_pos = None;
                        opening_char = None;
                    }
                }
                _ => {}
            }
        }

        None
    }
}

/// Extractor for Markdown code blocks.
#[derive(Debug, Default)]
pub struct MarkdownCodeBlockExtractor {
    /// Optional language to filter by (e.g., "json")
    pub language: Option<String>,
}

impl MarkdownCodeBlockExtractor {
    /// Create a new extractor for any code block.
    pub fn new() -> Self {
        Self { language: None }
    }

    /// Create a new extractor for a specific language.
    pub fn with_language(language: impl Into<String>) -> Self {
        Self {
            language: Some(language.into()),
        }
    }

    /// Extract content from the first matching Markdown code block.
    pub fn extract(&self, text: &str) -> Result<String, ParseError> {
        let pattern = match &self.language {
            Some(lang) => format!(
                r"(?m)^\s*```\s*{}\s*\n((?:.*\n)*?)^\s*```\s*$",
                regex::escape(lang)
            ),
            None => r"(?m)^\s*```[^\n]*\n((?:.*\n)*?)^\s*```\s*$".to_string(),
        };

        let regex = Regex::new(&pattern)
            .map_err(|e| ParseError::InvalidFormat(format!("Failed to compile regex: {}", e)))?;

        regex
            .captures(text)
            .and_then(|captures| captures.get(1))
            .map(|content| content.as_str().trim_end().to_string())
            .ok_or_else(|| {
                ParseError::TagExtractionFailed(match &self.language {
                    Some(lang) => format!("No markdown code block found with language '{}'", lang),
                    None => "No markdown code block found".to_string(),
                })
            })
    }
}

/// Extracts a JSON string from a raw service response.
///
/// Order of preference: a ```json fenced block, any fenced block that holds
/// JSON, an `<answer>` tag, then the first balanced JSON entity in the text.
pub fn extract_json(text: &str) -> Result<String, ParseError> {
    if let Ok(content) = MarkdownCodeBlockExtractor::with_language("json").extract(text) {
        return Ok(content);
    }

    let extractor = FlexibleExtractor::new();

    if let Ok(content) = MarkdownCodeBlockExtractor::new().extract(text)
        && let Some(json) = extractor.extract_first_json_entity(&content)
    {
        return Ok(json);
    }

    extractor.extract(text)
}
