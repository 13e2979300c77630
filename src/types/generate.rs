//! Types for the generation step.

use serde::{Deserialize, Serialize};

/// Prompt handed to a [`GenerationBackend`](crate::providers::GenerationBackend).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// System instructions, if the backend supports a separate channel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// User-facing prompt: context window followed by the question.
    pub prompt: String,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
        }
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Non-streaming generation response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Events emitted during streaming generation.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerateEvent {
    /// Text chunk
    Text(String),
    /// Generation finished normally
    Done,
}
