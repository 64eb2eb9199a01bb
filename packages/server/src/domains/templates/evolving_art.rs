//! Evolving art: an image whose prompt drifts with the comments.
//!
//! Each refresh folds the weighted comments into the current prompt and
//! renders a new image. Every image is kept as a content version.

use anyhow::Result;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{
    TemplateContext, TemplateData, TemplateHandler, TemplateHandlerError, TemplateName,
    TemplateResult,
};
use crate::domains::smart_media::models::{SmartMediaPost, TemplateUsage, WeightedComment};
use crate::kernel::llm_request::extract;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvolvingArtData {
    /// The creator's original prompt
    pub base_prompt: String,
    /// Prompt the latest image was rendered from
    #[serde(default)]
    pub current_prompt: Option<String>,
    #[serde(default)]
    pub image_uri: Option<String>,
    #[serde(default)]
    pub generation: u32,
}

impl EvolvingArtData {
    pub fn new(base_prompt: impl Into<String>) -> Self {
        Self {
            base_prompt: base_prompt.into(),
            ..Default::default()
        }
    }

    pub fn prompt(&self) -> &str {
        self.current_prompt.as_deref().unwrap_or(&self.base_prompt)
    }
}

// =============================================================================
// LLM Response Types
// =============================================================================

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct EvolvedPrompt {
    /// The new image prompt, one paragraph
    pub prompt: String,
}

// =============================================================================
// LLM Prompt
// =============================================================================

const EVOLVE_PROMPT: &str = r#"You are evolving an image prompt based on what its audience says.

## Rules
- Start from the current prompt and change it according to the comments
- Comments with more votes carry more influence
- Keep the subject recognizable unless the comments overwhelmingly ask for a change
- Ignore comments that are not about the image
- Return a single paragraph suitable for an image generator
"#;

pub struct EvolvingArtHandler;

#[async_trait]
impl TemplateHandler for EvolvingArtHandler {
    fn name(&self) -> TemplateName {
        TemplateName::EvolvingArt
    }

    async fn handle(
        &self,
        post: &SmartMediaPost,
        data: &TemplateData,
        ctx: TemplateContext<'_>,
    ) -> Result<Option<TemplateResult>> {
        let TemplateData::EvolvingArt(data) = data else {
            return Err(TemplateHandlerError::WrongTemplate {
                expected: TemplateName::EvolvingArt,
                actual: data.name(),
            }
            .into());
        };

        let mut usage = TemplateUsage::default();

        let prompt = if ctx.comments.is_empty() {
            data.prompt().to_string()
        } else {
            let evolved = extract::<EvolvedPrompt>(
                ctx.deps.ai.as_ref(),
                EVOLVE_PROMPT,
                &build_user_prompt(data.prompt(), ctx.comments),
            )
            .await
            .map_err(TemplateHandlerError::from)?;
            usage = usage + TemplateUsage::tokens(evolved.prompt_tokens, evolved.completion_tokens);
            evolved.value.prompt
        };

        if prompt.trim().is_empty() {
            debug!(post_id = %post.post_id, "generator returned an empty prompt");
            return Ok(None);
        }

        let image = ctx.deps.media.generate_image(&prompt).await?;
        usage.images += 1;

        let updated = EvolvingArtData {
            base_prompt: data.base_prompt.clone(),
            current_prompt: Some(prompt.clone()),
            image_uri: Some(image.uri.clone()),
            generation: data.generation.saturating_add(1),
        };

        let metadata = serde_json::json!({
            "image": image.uri,
            "prompt": image.revised_prompt.as_deref().unwrap_or(&prompt),
            "generation": updated.generation,
        });

        info!(post_id = %post.post_id, generation = updated.generation, "new artwork rendered");

        Ok(Some(
            TemplateResult::builder()
                .metadata(metadata)
                .persist_version_uri(image.uri)
                .updated_template_data(TemplateData::EvolvingArt(updated))
                .total_usage(usage)
                .build(),
        ))
    }
}

fn build_user_prompt(current: &str, comments: &[WeightedComment]) -> String {
    let mut prompt = format!("## Current prompt\n{}\n\n## Comments\n", current);
    for comment in comments {
        prompt.push_str(&format!("- ({} votes) {}\n", comment.votes, comment.content));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::test_dependencies::{MockAI, MockMediaGenerator, TestDependencies};

    fn post(data: EvolvingArtData) -> SmartMediaPost {
        SmartMediaPost::new("post-1", "0xcreator", TemplateData::EvolvingArt(data), 0, 60)
    }

    #[tokio::test]
    async fn comments_evolve_the_prompt_and_render_a_new_version() {
        let test_deps = TestDependencies::new()
            .mock_ai(MockAI::new().with_response(r#"{"prompt":"a lighthouse in a storm"}"#))
            .mock_media(MockMediaGenerator::new().with_uri("ipfs://image-2"));
        let deps = test_deps.server_deps();
        let post = post(EvolvingArtData::new("a lighthouse"));
        let comments = vec![WeightedComment::new("add a storm", 3)];
        let ctx = TemplateContext {
            deps: &deps,
            comments: &comments,
            force_update: false,
        };

        let result = EvolvingArtHandler
            .handle(&post, &post.template_data, ctx)
            .await
            .unwrap()
            .expect("an image");

        assert_eq!(result.persist_version_uri.as_deref(), Some("ipfs://image-2"));
        assert_eq!(result.total_usage.unwrap().images, 1);
        assert_eq!(test_deps.media.prompts(), vec!["a lighthouse in a storm"]);
        assert!(test_deps.ai.was_called_with("(3 votes) add a storm"));

        let Some(TemplateData::EvolvingArt(updated)) = result.updated_template_data else {
            panic!("evolving art data expected");
        };
        assert_eq!(updated.generation, 1);
        assert_eq!(updated.base_prompt, "a lighthouse");
        assert_eq!(updated.current_prompt.as_deref(), Some("a lighthouse in a storm"));
    }

    #[tokio::test]
    async fn forced_refresh_without_comments_rerenders_the_current_prompt() {
        let test_deps = TestDependencies::new();
        let deps = test_deps.server_deps();
        let mut data = EvolvingArtData::new("a lighthouse");
        data.current_prompt = Some("a lighthouse at dawn".to_string());
        let post = post(data);
        let ctx = TemplateContext {
            deps: &deps,
            comments: &[],
            force_update: true,
        };

        let result = EvolvingArtHandler
            .handle(&post, &post.template_data, ctx)
            .await
            .unwrap();

        assert!(result.is_some());
        assert_eq!(test_deps.ai.call_count(), 0);
        assert_eq!(test_deps.media.prompts(), vec!["a lighthouse at dawn"]);
    }
}
