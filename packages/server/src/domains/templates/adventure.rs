//! Adventure: a choose-your-own-adventure story written one chapter per
//! refresh. Each chapter ends on two decisions; the comments vote on which
//! one the next chapter follows.

use anyhow::Result;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{
    TemplateContext, TemplateData, TemplateHandler, TemplateHandlerError, TemplateName,
    TemplateResult,
};
use crate::domains::smart_media::activities::aggregate_decisions;
use crate::domains::smart_media::models::{SmartMediaPost, TemplateUsage};
use crate::kernel::llm_request::extract;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdventureData {
    /// Setting and tone the story was started with
    pub premise: String,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
}

impl AdventureData {
    pub fn new(premise: impl Into<String>) -> Self {
        Self {
            premise: premise.into(),
            chapters: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub text: String,
    pub decisions: [String; 2],
    /// The decision the next chapter followed
    #[serde(default)]
    pub chosen: Option<String>,
}

// =============================================================================
// LLM Response Types
// =============================================================================

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GeneratedChapter {
    /// The chapter text, a few short paragraphs
    pub text: String,
    /// First decision offered to the readers at the end of the chapter
    pub decision_a: String,
    /// Second decision offered to the readers at the end of the chapter
    pub decision_b: String,
}

// =============================================================================
// LLM Prompt
// =============================================================================

const CHAPTER_PROMPT: &str = r#"You are writing an interactive adventure story, one chapter at a time.

## Rules
- Continue the story from the previous chapters, following the decision the readers chose
- Keep each chapter short: two to four paragraphs
- End the chapter at a moment of choice
- Offer exactly two distinct decisions, each a short imperative sentence
- If there are no previous chapters, open the story from the premise
- If you cannot continue the story, return an empty text
"#;

pub struct AdventureHandler;

#[async_trait]
impl TemplateHandler for AdventureHandler {
    fn name(&self) -> TemplateName {
        TemplateName::Adventure
    }

    async fn handle(
        &self,
        post: &SmartMediaPost,
        data: &TemplateData,
        ctx: TemplateContext<'_>,
    ) -> Result<Option<TemplateResult>> {
        let TemplateData::Adventure(data) = data else {
            return Err(TemplateHandlerError::WrongTemplate {
                expected: TemplateName::Adventure,
                actual: data.name(),
            }
            .into());
        };

        let ai = ctx.deps.ai.as_ref();
        let mut usage = TemplateUsage::default();

        let chosen = match data.chapters.last() {
            Some(chapter) => {
                let tally = aggregate_decisions(ai, &chapter.decisions, ctx.comments).await?;
                usage = usage + tally.usage;
                tally.winner().map(|winner| winner.content.clone())
            }
            None => None,
        };

        let user_prompt = build_user_prompt(data, chosen.as_deref());
        let generated = extract::<GeneratedChapter>(ai, CHAPTER_PROMPT, &user_prompt)
            .await
            .map_err(TemplateHandlerError::from)?;
        usage = usage + TemplateUsage::tokens(generated.prompt_tokens, generated.completion_tokens);

        let chapter = generated.value;
        if chapter.text.trim().is_empty() {
            debug!(post_id = %post.post_id, "generator returned an empty chapter");
            return Ok(None);
        }

        let mut updated = data.clone();
        if let (Some(last), Some(chosen)) = (updated.chapters.last_mut(), chosen) {
            last.chosen = Some(chosen);
        }
        updated.chapters.push(Chapter {
            text: chapter.text,
            decisions: [chapter.decision_a, chapter.decision_b],
            chosen: None,
        });

        let number = updated.chapters.len();
        let latest = &updated.chapters[number - 1];
        let metadata = serde_json::json!({
            "content": latest.text,
            "decisions": latest.decisions,
            "chapter": number,
        });

        info!(post_id = %post.post_id, chapter = number, "adventure chapter written");

        Ok(Some(
            TemplateResult::builder()
                .metadata(metadata)
                .updated_template_data(TemplateData::Adventure(updated))
                .total_usage(usage)
                .build(),
        ))
    }
}

fn build_user_prompt(data: &AdventureData, chosen: Option<&str>) -> String {
    let mut prompt = format!("## Premise\n{}\n", data.premise);

    if !data.chapters.is_empty() {
        prompt.push_str("\n## Previous chapters\n");
        for (i, chapter) in data.chapters.iter().enumerate() {
            prompt.push_str(&format!("\n### Chapter {}\n{}\n", i + 1, chapter.text));
        }
    }

    if let Some(chosen) = chosen {
        prompt.push_str(&format!("\n## The readers chose\n{}\n", chosen));
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::smart_media::models::WeightedComment;
    use crate::kernel::test_dependencies::{MockAI, TestDependencies};

    fn post(data: AdventureData) -> SmartMediaPost {
        SmartMediaPost::new("post-1", "0xcreator", TemplateData::Adventure(data), 0, 60)
    }

    fn chapter_json(text: &str) -> String {
        serde_json::json!({
            "text": text,
            "decision_a": "open the door",
            "decision_b": "run away",
        })
        .to_string()
    }

    #[tokio::test]
    async fn first_chapter_opens_from_the_premise() {
        let test_deps =
            TestDependencies::new().mock_ai(MockAI::new().with_response(chapter_json("It begins.")));
        let deps = test_deps.server_deps();
        let post = post(AdventureData::new("a haunted lighthouse"));
        let ctx = TemplateContext {
            deps: &deps,
            comments: &[],
            force_update: true,
        };

        let result = AdventureHandler
            .handle(&post, &post.template_data, ctx)
            .await
            .unwrap()
            .expect("a chapter");

        let Some(TemplateData::Adventure(updated)) = result.updated_template_data else {
            panic!("adventure data expected");
        };
        assert_eq!(updated.chapters.len(), 1);
        assert_eq!(updated.chapters[0].text, "It begins.");
        assert_eq!(result.metadata.unwrap()["chapter"], 1);
        assert_eq!(test_deps.ai.call_count(), 1);
        assert!(test_deps.ai.was_called_with("a haunted lighthouse"));
    }

    #[tokio::test]
    async fn next_chapter_follows_the_winning_decision() {
        let tally = r#"{"results":[{"content":"open the door","totalVotes":1},{"content":"run away","totalVotes":5}]}"#;
        let test_deps = TestDependencies::new().mock_ai(
            MockAI::new()
                .with_response(tally)
                .with_response(chapter_json("You flee into the night.")),
        );
        let deps = test_deps.server_deps();

        let mut data = AdventureData::new("a haunted lighthouse");
        data.chapters.push(Chapter {
            text: "A door creaks.".to_string(),
            decisions: ["open the door".to_string(), "run away".to_string()],
            chosen: None,
        });
        let post = post(data);
        let comments = vec![WeightedComment::new("run!", 5), WeightedComment::new("open it", 1)];
        let ctx = TemplateContext {
            deps: &deps,
            comments: &comments,
            force_update: false,
        };

        let result = AdventureHandler
            .handle(&post, &post.template_data, ctx)
            .await
            .unwrap()
            .expect("a chapter");

        let Some(TemplateData::Adventure(updated)) = result.updated_template_data else {
            panic!("adventure data expected");
        };
        assert_eq!(updated.chapters[0].chosen.as_deref(), Some("run away"));
        assert_eq!(updated.chapters[1].text, "You flee into the night.");
        assert!(test_deps.ai.was_called_with("The readers chose\nrun away"));
    }

    #[tokio::test]
    async fn empty_chapter_is_no_result() {
        let test_deps =
            TestDependencies::new().mock_ai(MockAI::new().with_response(chapter_json("  ")));
        let deps = test_deps.server_deps();
        let post = post(AdventureData::new("premise"));
        let ctx = TemplateContext {
            deps: &deps,
            comments: &[],
            force_update: true,
        };

        let result = AdventureHandler
            .handle(&post, &post.template_data, ctx)
            .await
            .unwrap();

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn rejects_data_for_another_template() {
        let test_deps = TestDependencies::new();
        let deps = test_deps.server_deps();
        let post = post(AdventureData::default());
        let other = TemplateData::EvolvingArt(super::super::EvolvingArtData::new("art"));
        let ctx = TemplateContext {
            deps: &deps,
            comments: &[],
            force_update: true,
        };

        let err = AdventureHandler.handle(&post, &other, ctx).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<TemplateHandlerError>(),
            Some(TemplateHandlerError::WrongTemplate { .. })
        ));
    }
}
