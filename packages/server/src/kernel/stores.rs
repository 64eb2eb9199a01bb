//! Persistence implementations: Postgres document store and credit ledger,
//! plus the in-process fast-path cache.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::RwLock;

use super::{BaseCreditsService, BasePostCache, BasePostStore};
use crate::domains::smart_media::models::{PostPatch, SmartMediaPost, SmartMediaStatus};

/// Credits a creator must hold before a refresh is attempted.
pub const MIN_CREDITS_FOR_REFRESH: i64 = 1;

// =============================================================================
// Post store
// =============================================================================

#[derive(Clone)]
pub struct PostgresPostStore {
    pool: PgPool,
}

impl PostgresPostStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BasePostStore for PostgresPostStore {
    async fn load_post(&self, post_id: &str) -> Result<Option<SmartMediaPost>> {
        SmartMediaPost::find_by_id(post_id, &self.pool).await
    }

    async fn insert_post(&self, post: &SmartMediaPost) -> Result<()> {
        post.upsert(&self.pool).await
    }

    async fn save_post(&self, post_id: &str, patch: &PostPatch) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }
        SmartMediaPost::apply_patch(post_id, patch, &self.pool).await
    }

    async fn list_by_status(&self, status: SmartMediaStatus) -> Result<Vec<SmartMediaPost>> {
        SmartMediaPost::find_by_status(status, &self.pool).await
    }

    async fn record_version(&self, post_id: &str, uri: &str) -> Result<()> {
        SmartMediaPost::record_version(post_id, uri, &self.pool).await?;
        Ok(())
    }
}

// =============================================================================
// Credit ledger
// =============================================================================

#[derive(Clone)]
pub struct PostgresCreditsService {
    pool: PgPool,
}

impl PostgresCreditsService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BaseCreditsService for PostgresCreditsService {
    async fn has_sufficient_credits(&self, account: &str) -> Result<bool> {
        let balance = sqlx::query_scalar::<_, i64>(
            "SELECT balance FROM creator_credits WHERE account = lower($1)",
        )
        .bind(account)
        .fetch_optional(&self.pool)
        .await?;

        Ok(balance.unwrap_or(0) >= MIN_CREDITS_FOR_REFRESH)
    }

    async fn decrement_credits(&self, account: &str, credits: u64) -> Result<()> {
        let credits = i64::try_from(credits).unwrap_or(i64::MAX);
        sqlx::query(
            r#"
            UPDATE creator_credits
            SET balance = GREATEST(balance - $2, 0),
                updated_at = NOW()
            WHERE account = lower($1)
            "#,
        )
        .bind(account)
        .bind(credits)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// =============================================================================
// Fast-path cache
// =============================================================================

/// Process-local read cache for posts, written through on every refresh.
#[derive(Default)]
pub struct InMemoryPostCache {
    posts: RwLock<HashMap<String, SmartMediaPost>>,
}

impl InMemoryPostCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.posts.read().await.len()
    }
}

#[async_trait]
impl BasePostCache for InMemoryPostCache {
    async fn get(&self, post_id: &str) -> Option<SmartMediaPost> {
        self.posts.read().await.get(post_id).cloned()
    }

    async fn put(&self, post: SmartMediaPost) {
        self.posts.write().await.insert(post.post_id.clone(), post);
    }

    async fn evict(&self, post_id: &str) {
        self.posts.write().await.remove(post_id);
    }
}
