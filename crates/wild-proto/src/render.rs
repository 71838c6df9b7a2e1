//! Prompt rendering interface and provenance records.

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The kind of prompt being produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptType {
    Exploring,
    Analysis,
    Alert,
    RunEvent,
}

impl PromptType {
    pub fn as_str(self) -> &'static str {
        match self {
            PromptType::Exploring => "exploring",
            PromptType::Analysis => "analysis",
            PromptType::Alert => "alert",
            PromptType::RunEvent => "run_event",
        }
    }
}

/// A structured request for prompt text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderRequest {
    pub prompt_type: PromptType,
    /// The free-text objective the loop was armed with.
    pub goal: String,
    /// Type-specific template variables.
    pub variables: BTreeMap<String, String>,
}

impl RenderRequest {
    pub fn new(prompt_type: PromptType, goal: impl Into<String>) -> Self {
        Self {
            prompt_type,
            goal: goal.into(),
            variables: BTreeMap::new(),
        }
    }

    /// Adds a template variable.
    #[must_use]
    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }
}

/// Record of how a delivered prompt was constructed, for auditability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    /// The final prompt text.
    pub rendered: String,
    /// The user-supplied input (the goal) the prompt was built around.
    pub user_input: String,
    /// Identifier of the rendering skill used, if any.
    pub skill_id: Option<String>,
    /// Display name of the rendering skill, if any.
    pub skill_name: Option<String>,
    /// The template the prompt was rendered from.
    pub template: String,
    /// Variables substituted into the template.
    pub variables: BTreeMap<String, String>,
    pub prompt_type: PromptType,
    /// True when the record was produced by the local fallback rather than
    /// the rendering service, so consumers can distinguish a traced prompt
    /// from a best-effort one.
    pub synthesized: bool,
}

/// Turns a structured request into final prompt text plus provenance.
///
/// Implementations may call out to a remote rendering service; failures are
/// expected and callers fall back to local static templates.
#[async_trait]
pub trait PromptRenderer: Send + Sync {
    async fn render(&self, request: &RenderRequest) -> Result<ProvenanceRecord>;
}
