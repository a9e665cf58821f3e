//! Model Catalog
//!
//! The models offered for selection. The selected model's id is sent as the
//! `model` field of every chat request.

use serde::{Deserialize, Serialize};

/// Information about a selectable model
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model identifier sent to the endpoint
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Short description
    pub description: Option<String>,
}

impl ModelInfo {
    /// Create a model entry
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
        }
    }

    /// Set description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// An entry for an id outside the catalog
    pub fn custom(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: None,
        }
    }
}

/// Built-in models, default first
#[must_use]
pub fn default_models() -> Vec<ModelInfo> {
    vec![
        ModelInfo::new("gpt-4", "GPT-4").with_description("Most capable model"),
        ModelInfo::new("gpt-3.5-turbo", "GPT-3.5 Turbo").with_description("Fast and efficient"),
        ModelInfo::new("claude-3", "Claude 3").with_description("Anthropic's latest model"),
    ]
}

/// Resolve an id against the catalog, falling back to a custom entry
#[must_use]
pub fn resolve_model(id: &str) -> ModelInfo {
    default_models()
        .into_iter()
        .find(|m| m.id == id)
        .unwrap_or_else(|| ModelInfo::custom(id))
}
