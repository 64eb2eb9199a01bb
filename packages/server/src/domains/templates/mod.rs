//! Templates - the content generators behind smart media posts.
//!
//! Each template owns a `TemplateData` variant and a `TemplateHandler` that
//! turns the current data plus this cycle's weighted comments into new
//! content. The refresh orchestrator looks handlers up by `TemplateName`.

pub mod adventure;
pub mod evolving_art;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use typed_builder::TypedBuilder;

use crate::domains::smart_media::models::{SmartMediaPost, TemplateUsage, WeightedComment};
use crate::kernel::llm_request::StructuredOutputError;
use crate::kernel::ServerDeps;

pub use adventure::{AdventureData, AdventureHandler, Chapter};
pub use evolving_art::{EvolvingArtData, EvolvingArtHandler};

// =============================================================================
// Template identity and data
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateName {
    Adventure,
    EvolvingArt,
}

impl TemplateName {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateName::Adventure => "adventure",
            TemplateName::EvolvingArt => "evolving_art",
        }
    }
}

impl std::fmt::Display for TemplateName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Template-specific state stored with the post.
///
/// Serialized as `{"template": "...", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "template", content = "data", rename_all = "snake_case")]
pub enum TemplateData {
    Adventure(AdventureData),
    EvolvingArt(EvolvingArtData),
}

impl TemplateData {
    pub fn name(&self) -> TemplateName {
        match self {
            TemplateData::Adventure(_) => TemplateName::Adventure,
            TemplateData::EvolvingArt(_) => TemplateName::EvolvingArt,
        }
    }
}

// =============================================================================
// Handler contract
// =============================================================================

#[derive(Debug, Error)]
pub enum TemplateHandlerError {
    #[error("template {expected} cannot handle {actual} data")]
    WrongTemplate {
        expected: TemplateName,
        actual: TemplateName,
    },

    #[error("invalid {what} from text generator: {reason}")]
    InvalidOutput { what: &'static str, reason: String },

    #[error(transparent)]
    StructuredOutput(#[from] StructuredOutputError),
}

/// What a handler sees for one refresh.
#[derive(Clone, Copy)]
pub struct TemplateContext<'a> {
    pub deps: &'a ServerDeps,
    pub comments: &'a [WeightedComment],
    pub force_update: bool,
}

/// New content produced by a handler.
#[derive(Debug, Clone, Default, PartialEq, TypedBuilder)]
pub struct TemplateResult {
    /// Rendered metadata for the post (what the social graph displays)
    #[builder(default, setter(strip_option))]
    pub metadata: Option<serde_json::Value>,
    /// URI of a generated asset to keep as a content version
    #[builder(default, setter(strip_option, into))]
    pub persist_version_uri: Option<String>,
    #[builder(default, setter(strip_option))]
    pub updated_template_data: Option<TemplateData>,
    #[builder(default, setter(strip_option))]
    pub total_usage: Option<TemplateUsage>,
}

#[async_trait]
pub trait TemplateHandler: Send + Sync {
    fn name(&self) -> TemplateName;

    /// Produce new content, or `None` when the generator had nothing to say.
    async fn handle(
        &self,
        post: &SmartMediaPost,
        data: &TemplateData,
        ctx: TemplateContext<'_>,
    ) -> Result<Option<TemplateResult>>;
}

// =============================================================================
// Registry
// =============================================================================

#[derive(Clone, Default)]
pub struct TemplateRegistry {
    handlers: HashMap<TemplateName, Arc<dyn TemplateHandler>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in template.
    pub fn with_defaults() -> Self {
        Self::new()
            .register(Arc::new(AdventureHandler))
            .register(Arc::new(EvolvingArtHandler))
    }

    pub fn register(mut self, handler: Arc<dyn TemplateHandler>) -> Self {
        self.handlers.insert(handler.name(), handler);
        self
    }

    pub fn get(&self, name: TemplateName) -> Option<Arc<dyn TemplateHandler>> {
        self.handlers.get(&name).cloned()
    }
}
