//! Boundary to the generative content service.
//!
//! The service is modeled as a single fallible operation from a prompt and an
//! [`OutputContract`] to a [`Generation`]. Nothing about latency or output
//! quality is assumed: callers treat malformed or empty results as expected
//! outcomes and validate every field before it reaches domain state.
//!
//! ```rust,ignore
//! use tribunal::service::{GenerativeService, Generation, OutputContract};
//! use tribunal::ServiceError;
//!
//! struct MyBackend;
//!
//! #[async_trait::async_trait]
//! impl GenerativeService for MyBackend {
//!     async fn generate(
//!         &self,
//!         prompt: String,
//!         contract: &OutputContract,
//!     ) -> Result<Generation, ServiceError> {
//!         let raw = call_my_llm(&prompt, &contract.to_instruction()).await?;
//!         Ok(Generation::Text(raw))
//!     }
//! }
//! ```

pub mod retry;

pub use retry::{RetryingService, retry_execution};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ServiceError;
use crate::extract::extract_json;

/// The structured-output contract a generation request must satisfy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputContract {
    /// Short identifier, e.g. `"speech_draft"`.
    pub name: String,
    /// What the output represents.
    pub description: String,
    /// JSON schema of the expected output.
    pub schema: Value,
}

impl OutputContract {
    pub fn new(name: impl Into<String>, description: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
        }
    }

    /// Renders the contract as an instruction block for text-only backends.
    pub fn to_instruction(&self) -> String {
        let schema = serde_json::to_string_pretty(&self.schema).unwrap_or_default();
        format!(
            "Respond with a single JSON object ({}) matching this schema:\n```json\n{}\n```\nReturn ONLY the JSON object.",
            self.description, schema
        )
    }
}

/// Result of one generation request.
///
/// Backends that support structured output return [`Generation::Structured`];
/// text-only backends return [`Generation::Text`] and leave JSON extraction to
/// [`Generation::into_value`].
#[derive(Debug, Clone, PartialEq)]
pub enum Generation {
    /// A JSON value produced by a structured-output backend.
    Structured(Value),
    /// Raw text that should contain a JSON object somewhere.
    Text(String),
    /// The service produced nothing.
    Empty,
}

impl Generation {
    /// Resolves the generation into a JSON value.
    ///
    /// Returns `Ok(None)` for an empty generation (including blank text and
    /// JSON `null`), and `ServiceError::ParseError` when text holds no JSON.
    pub fn into_value(self) -> Result<Option<Value>, ServiceError> {
        match self {
            Generation::Structured(Value::Null) | Generation::Empty => Ok(None),
            Generation::Structured(value) => Ok(Some(value)),
            Generation::Text(text) if text.trim().is_empty() => Ok(None),
            Generation::Text(text) => {
                let json =
                    extract_json(&text).map_err(|e| ServiceError::ParseError(e.to_string()))?;
                let value = serde_json::from_str(&json)
                    .map_err(|e| ServiceError::ParseError(e.to_string()))?;
                Ok(Some(value))
            }
        }
    }
}

/// The generative content service.
#[async_trait]
pub trait GenerativeService: Send + Sync {
    /// Generate output for `prompt` that should satisfy `contract`.
    async fn generate(
        &self,
        prompt: String,
        contract: &OutputContract,
    ) -> Result<Generation, ServiceError>;

    /// Returns the name of this service, used in log fields.
    fn name(&self) -> String {
        std::any::type_name::<Self>()
            .split("::")
            .last()
            .unwrap_or("UnknownService")
            .to_string()
    }
}
