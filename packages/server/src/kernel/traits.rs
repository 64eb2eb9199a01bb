// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Refresh decisions live in domains/smart_media; these traits are the narrow
// call-outs it makes to slow, fallible remote systems.
//
// Naming convention: Base* for trait names (e.g., BaseAI, BaseSocialGraph)

use anyhow::Result;
use async_trait::async_trait;

use crate::domains::smart_media::models::{Comment, PostPatch, SmartMediaPost, SmartMediaStatus};

// =============================================================================
// AI Trait (Infrastructure - Generic LLM capabilities)
// =============================================================================

/// Text returned by a completion, with the tokens it cost.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl Completion {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait BaseAI: Send + Sync {
    /// Complete a prompt with an LLM (returns raw text response)
    async fn complete(&self, prompt: &str) -> Result<Completion>;

    /// Generate structured output with a JSON schema
    /// Returns a completion whose content is JSON conforming to the schema
    async fn generate_structured(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema: serde_json::Value,
    ) -> Result<Completion> {
        // Default implementation ignores schema and just prompts for JSON
        let _ = schema;
        let combined = format!(
            "{}\n\nRespond with valid JSON.\n\n{}",
            system_prompt, user_prompt
        );
        self.complete(&combined).await
    }
}

// =============================================================================
// Media Generation Trait (Infrastructure)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedMedia {
    /// Where the generated asset can be fetched from
    pub uri: String,
    pub revised_prompt: Option<String>,
}

#[async_trait]
pub trait BaseMediaGenerator: Send + Sync {
    async fn generate_image(&self, prompt: &str) -> Result<GeneratedMedia>;
}

// =============================================================================
// Social Graph Trait (Infrastructure - comments, collects, upvotes)
// =============================================================================

/// Outcome of asking the social graph to re-render a post's cached metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataRefresh {
    Refreshed,
    Failed,
}

#[async_trait]
pub trait BaseSocialGraph: Send + Sync {
    /// All comments on a post, in the order the social graph returns them
    async fn fetch_comments(&self, post_id: &str) -> Result<Vec<Comment>>;

    /// Accounts that collected the post
    async fn fetch_collectors(&self, post_id: &str) -> Result<Vec<String>>;

    /// Accounts that upvoted a comment
    async fn fetch_upvoters(&self, comment_id: &str) -> Result<Vec<String>>;

    /// Whether the upstream post has been deleted
    async fn is_post_deleted(&self, post_id: &str) -> Result<bool>;

    /// Ask the social graph to refresh its cached rendering of the post
    async fn refresh_metadata(&self, post_id: &str) -> Result<MetadataRefresh>;
}

// =============================================================================
// Token Balance Trait (Infrastructure - ERC-20 balanceOf)
// =============================================================================

#[async_trait]
pub trait BaseBalanceService: Send + Sync {
    /// Batched `balanceOf`; the result is index-aligned with `accounts`
    async fn balance_of(&self, chain_id: u64, accounts: &[String], token: &str)
        -> Result<Vec<u128>>;
}

// =============================================================================
// Credits Trait (Infrastructure - creator usage ledger)
// =============================================================================

#[async_trait]
pub trait BaseCreditsService: Send + Sync {
    async fn has_sufficient_credits(&self, account: &str) -> Result<bool>;

    async fn decrement_credits(&self, account: &str, credits: u64) -> Result<()>;
}

// =============================================================================
// Persistence Traits (Infrastructure - document store + fast-path cache)
// =============================================================================

#[async_trait]
pub trait BasePostStore: Send + Sync {
    async fn load_post(&self, post_id: &str) -> Result<Option<SmartMediaPost>>;

    async fn insert_post(&self, post: &SmartMediaPost) -> Result<()>;

    async fn save_post(&self, post_id: &str, patch: &PostPatch) -> Result<()>;

    async fn list_by_status(&self, status: SmartMediaStatus) -> Result<Vec<SmartMediaPost>>;

    /// Record a new content version URI for the post
    async fn record_version(&self, post_id: &str, uri: &str) -> Result<()>;
}

#[async_trait]
pub trait BasePostCache: Send + Sync {
    async fn get(&self, post_id: &str) -> Option<SmartMediaPost>;

    async fn put(&self, post: SmartMediaPost);

    async fn evict(&self, post_id: &str);
}
