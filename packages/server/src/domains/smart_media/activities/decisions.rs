//! Decision aggregation: tally weighted comments behind one of two choices.
//!
//! The text generator classifies which candidate each comment supports and
//! sums the votes. Its answer is then normalized: exactly one entry per
//! candidate, in candidate order, stable-sorted by votes (most first).

use schemars::JsonSchema;
use serde::Deserialize;
use tracing::debug;

use crate::domains::smart_media::models::{DecisionResult, TemplateUsage, WeightedComment};
use crate::domains::templates::TemplateHandlerError;
use crate::kernel::llm_request::extract;
use crate::kernel::BaseAI;

// =============================================================================
// LLM Response Types
// =============================================================================

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DecisionTally {
    /// One entry per candidate decision
    pub results: Vec<DecisionResult>,
}

// =============================================================================
// LLM Prompt
// =============================================================================

const DECISION_PROMPT: &str = r#"You are counting votes in a community-driven story.

You are given two candidate decisions and a list of comments. Each comment carries a vote weight.

## Rules
- Decide which candidate decision each comment supports, if any
- A comment supports at most one decision; ignore comments that support neither
- Add the comment's votes to the total of the decision it supports
- Return both decisions with their content copied exactly as given
- A decision nobody supports has totalVotes 0
"#;

/// Tallied decisions plus the generation cost of tallying them.
#[derive(Debug, Clone, PartialEq)]
pub struct Decisions {
    /// Winner first
    pub results: Vec<DecisionResult>,
    pub usage: TemplateUsage,
}

impl Decisions {
    pub fn winner(&self) -> Option<&DecisionResult> {
        self.results.first()
    }
}

/// Tally `comments` behind `decisions`.
///
/// With no comments there is nothing to classify and both candidates score 0.
pub async fn aggregate_decisions(
    ai: &dyn BaseAI,
    decisions: &[String; 2],
    comments: &[WeightedComment],
) -> Result<Decisions, TemplateHandlerError> {
    if comments.is_empty() {
        return Ok(Decisions {
            results: normalize(decisions, Vec::new()),
            usage: TemplateUsage::default(),
        });
    }

    let user_prompt = build_user_prompt(decisions, comments)?;
    let tally = extract::<DecisionTally>(ai, DECISION_PROMPT, &user_prompt).await?;

    let votes_cast = comments
        .iter()
        .fold(0u64, |sum, c| sum.saturating_add(c.votes));
    let tallied = tally
        .value
        .results
        .iter()
        .try_fold(0u64, |sum, r| sum.checked_add(r.total_votes))
        .ok_or_else(|| TemplateHandlerError::InvalidOutput {
            what: "decision tally",
            reason: "tallied votes overflow".to_string(),
        })?;
    if tallied > votes_cast {
        return Err(TemplateHandlerError::InvalidOutput {
            what: "decision tally",
            reason: format!("{} votes tallied but only {} cast", tallied, votes_cast),
        });
    }

    let results = normalize(decisions, tally.value.results);
    debug!(
        winner = %results[0].content,
        votes = results[0].total_votes,
        "decisions tallied"
    );

    Ok(Decisions {
        results,
        usage: TemplateUsage::tokens(tally.prompt_tokens, tally.completion_tokens),
    })
}

fn build_user_prompt(
    decisions: &[String; 2],
    comments: &[WeightedComment],
) -> Result<String, TemplateHandlerError> {
    let comments =
        serde_json::to_string_pretty(comments).map_err(|e| TemplateHandlerError::InvalidOutput {
            what: "comment list",
            reason: e.to_string(),
        })?;

    Ok(format!(
        "## Decisions\n1. {}\n2. {}\n\n## Comments\n{}",
        decisions[0], decisions[1], comments
    ))
}

/// One entry per candidate, missing ones at 0, unknown ones dropped.
fn normalize(decisions: &[String; 2], tallied: Vec<DecisionResult>) -> Vec<DecisionResult> {
    let mut results: Vec<DecisionResult> = decisions
        .iter()
        .map(|decision| DecisionResult {
            content: decision.clone(),
            total_votes: tallied
                .iter()
                .find(|r| r.content.trim().eq_ignore_ascii_case(decision.trim()))
                .map(|r| r.total_votes)
                .unwrap_or(0),
        })
        .collect();

    results.sort_by(|a, b| b.total_votes.cmp(&a.total_votes));
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::llm_request::StructuredOutputError;
    use crate::kernel::test_dependencies::MockAI;

    fn decisions() -> [String; 2] {
        ["go north".to_string(), "go south".to_string()]
    }

    #[tokio::test]
    async fn winner_is_the_decision_with_most_votes() {
        let ai = MockAI::new().with_response(
            r#"{"results":[{"content":"go north","totalVotes":3},{"content":"go south","totalVotes":4}]}"#,
        );
        let comments = vec![
            WeightedComment::new("north!", 3),
            WeightedComment::new("south please", 1),
            WeightedComment::new("south", 3),
        ];

        let tally = aggregate_decisions(&ai, &decisions(), &comments).await.unwrap();

        assert_eq!(
            tally.results,
            vec![
                DecisionResult {
                    content: "go south".into(),
                    total_votes: 4
                },
                DecisionResult {
                    content: "go north".into(),
                    total_votes: 3
                },
            ]
        );
        assert_eq!(tally.winner().unwrap().content, "go south");
        assert_eq!(ai.calls().len(), 1);
    }

    #[tokio::test]
    async fn missing_candidates_score_zero_and_unknown_ones_are_dropped() {
        let ai = MockAI::new().with_response(
            r#"{"results":[{"content":"Go South","totalVotes":2},{"content":"fly away","totalVotes":1}]}"#,
        );
        let comments = vec![WeightedComment::new("south", 2), WeightedComment::new("fly", 1)];

        let tally = aggregate_decisions(&ai, &decisions(), &comments).await.unwrap();

        assert_eq!(tally.results.len(), 2);
        assert_eq!(tally.results[0].content, "go south");
        assert_eq!(tally.results[0].total_votes, 2);
        assert_eq!(tally.results[1].content, "go north");
        assert_eq!(tally.results[1].total_votes, 0);
    }

    #[tokio::test]
    async fn ties_keep_candidate_order() {
        let ai = MockAI::new().with_response(
            r#"{"results":[{"content":"go south","totalVotes":1},{"content":"go north","totalVotes":1}]}"#,
        );
        let comments = vec![WeightedComment::new("north", 1), WeightedComment::new("south", 1)];

        let tally = aggregate_decisions(&ai, &decisions(), &comments).await.unwrap();

        assert_eq!(tally.winner().unwrap().content, "go north");
    }

    #[tokio::test]
    async fn no_comments_skips_the_generator() {
        let ai = MockAI::new();

        let tally = aggregate_decisions(&ai, &decisions(), &[]).await.unwrap();

        assert!(tally.results.iter().all(|r| r.total_votes == 0));
        assert_eq!(tally.winner().unwrap().content, "go north");
        assert!(ai.calls().is_empty());
        assert!(tally.usage.is_empty());
    }

    #[tokio::test]
    async fn unparseable_output_is_a_handler_error() {
        let ai = MockAI::new().with_response("the south wins, obviously");
        let comments = vec![WeightedComment::new("south", 1)];

        let err = aggregate_decisions(&ai, &decisions(), &comments)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            TemplateHandlerError::StructuredOutput(StructuredOutputError::Parse { .. })
        ));
    }

    #[tokio::test]
    async fn tallies_above_the_votes_cast_are_rejected() {
        let ai = MockAI::new().with_response(
            r#"{"results":[{"content":"go north","totalVotes":9},{"content":"go south","totalVotes":0}]}"#,
        );
        let comments = vec![WeightedComment::new("north", 2)];

        let err = aggregate_decisions(&ai, &decisions(), &comments)
            .await
            .unwrap_err();

        assert!(matches!(err, TemplateHandlerError::InvalidOutput { .. }));
    }

    #[tokio::test]
    async fn overflowing_tallies_are_rejected() {
        let ai = MockAI::new().with_response(
            r#"{"results":[{"content":"go north","totalVotes":18446744073709551615},{"content":"go south","totalVotes":1}]}"#,
        );
        let comments = vec![WeightedComment::new("north", 3)];

        let err = aggregate_decisions(&ai, &decisions(), &comments)
            .await
            .unwrap_err();

        assert!(matches!(err, TemplateHandlerError::InvalidOutput { .. }));
    }
}
