//! Server dependencies (using traits for testability)
//!
//! This module provides the central dependency container handed to the
//! refresh orchestrator and the template handlers. Every external service
//! sits behind a trait so tests can swap in the mocks from
//! `test_dependencies`.

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::domains::templates::TemplateRegistry;
use crate::kernel::{
    BaseAI, BaseBalanceService, BaseCreditsService, BaseMediaGenerator, BasePostCache,
    BasePostStore, BaseSocialGraph, InMemoryPostCache, OpenAIClient, PostgresCreditsService,
    PostgresPostStore, RpcBalanceService, SocialApiClient,
};

// =============================================================================
// ServerDeps
// =============================================================================

/// Server dependencies accessible to activities (using traits for testability)
#[derive(Clone)]
pub struct ServerDeps {
    /// Set when running against Postgres; tests run on in-memory stores
    pub db_pool: Option<PgPool>,
    pub store: Arc<dyn BasePostStore>,
    pub cache: Arc<dyn BasePostCache>,
    pub ai: Arc<dyn BaseAI>,
    pub media: Arc<dyn BaseMediaGenerator>,
    pub social: Arc<dyn BaseSocialGraph>,
    pub balances: Arc<dyn BaseBalanceService>,
    pub credits: Arc<dyn BaseCreditsService>,
    pub templates: Arc<TemplateRegistry>,
}

impl ServerDeps {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db_pool: Option<PgPool>,
        store: Arc<dyn BasePostStore>,
        cache: Arc<dyn BasePostCache>,
        ai: Arc<dyn BaseAI>,
        media: Arc<dyn BaseMediaGenerator>,
        social: Arc<dyn BaseSocialGraph>,
        balances: Arc<dyn BaseBalanceService>,
        credits: Arc<dyn BaseCreditsService>,
        templates: Arc<TemplateRegistry>,
    ) -> Self {
        Self {
            db_pool,
            store,
            cache,
            ai,
            media,
            social,
            balances,
            credits,
            templates,
        }
    }

    /// Connect to Postgres, run migrations, and build the production clients.
    pub async fn connect(config: &Config) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("Failed to connect to database")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;
        info!("Database migrations complete");

        let openai = Arc::new(OpenAIClient::new(
            config.openai_api_key.clone(),
            config.openai_model.clone(),
        ));

        Ok(Self::new(
            Some(pool.clone()),
            Arc::new(PostgresPostStore::new(pool.clone())),
            Arc::new(InMemoryPostCache::new()),
            openai.clone(),
            openai,
            Arc::new(SocialApiClient::new(config.social_api_url.clone())?),
            Arc::new(RpcBalanceService::new(config.chain_rpc_urls.clone())?),
            Arc::new(PostgresCreditsService::new(pool)),
            Arc::new(TemplateRegistry::with_defaults()),
        ))
    }

    /// Release pooled connections. Safe to call more than once.
    pub async fn shutdown(&self) {
        if let Some(pool) = &self.db_pool {
            pool.close().await;
            info!("Database pool closed");
        }
    }
}
