//! Test harnesses for integration testing.
//!
//! `TestHarness` wires the refresh orchestrator to the in-memory mocks from
//! `TestDependencies`. `PostgresHarness` runs against a shared Postgres
//! container; tests using it are `#[ignore]`d unless Docker is available.

#![allow(dead_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use smart_media_core::domains::smart_media::activities::{
    RefreshOutcome, RefreshPolicy, RequestOptions, UpdateOrchestrator, UpdateRequest,
};
use smart_media_core::kernel::jobs::{QueueError, TaskQueue, TaskQueueConfig};
use smart_media_core::kernel::test_dependencies::TestDependencies;
use smart_media_core::server::build_app;
use sqlx::PgPool;
use test_context::AsyncTestContext;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

fn init_tracing() {
    // Run tests with: RUST_LOG=debug cargo test -- --nocapture
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// =============================================================================
// In-memory harness
// =============================================================================

/// Orchestrator over mocks.
///
/// # Example using test-context
///
/// ```ignore
/// use test_context::test_context;
///
/// #[test_context(TestHarness)]
/// #[tokio::test]
/// async fn my_test(ctx: &TestHarness) {
///     let app = ctx.app();
///     // ... test code
/// }
/// ```
pub struct TestHarness {
    pub deps: TestDependencies,
    pub orchestrator: UpdateOrchestrator,
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        Self::with_deps(TestDependencies::new())
    }

    async fn teardown(self) {}
}

impl TestHarness {
    pub fn with_deps(deps: TestDependencies) -> Self {
        Self::with_config(deps, TaskQueueConfig::default(), RefreshPolicy::default())
    }

    pub fn with_config(
        deps: TestDependencies,
        queue: TaskQueueConfig,
        policy: RefreshPolicy,
    ) -> Self {
        init_tracing();
        let orchestrator =
            UpdateOrchestrator::new(Arc::new(deps.server_deps()), TaskQueue::new(queue), policy);
        Self { deps, orchestrator }
    }

    pub fn app(&self) -> Router {
        build_app(self.orchestrator.clone())
    }

    /// Request a refresh and wait for the queued work to finish.
    pub async fn refresh(
        &self,
        post_id: &str,
        options: RequestOptions,
    ) -> Result<RefreshOutcome, QueueError> {
        match self.orchestrator.request_update(post_id, options).await {
            Ok(UpdateRequest::Queued(handle)) => handle.await,
            Ok(UpdateRequest::AlreadyProcessing) => panic!("{} is already processing", post_id),
            Err(e) => panic!("refresh of {} was rejected: {}", post_id, e),
        }
    }
}

// =============================================================================
// Postgres harness
// =============================================================================

/// Shared test infrastructure that persists across all tests.
/// The container is started once and reused, migrations run once.
struct SharedTestInfra {
    db_url: String,
    // Keep the container alive for the entire test run
    _postgres: ContainerAsync<Postgres>,
}

static SHARED_INFRA: OnceCell<SharedTestInfra> = OnceCell::const_new();

impl SharedTestInfra {
    async fn init() -> Result<Self> {
        init_tracing();

        let postgres = Postgres::default()
            .with_tag("16")
            .start()
            .await
            .context("Failed to start Postgres container")?;

        let pg_host = postgres.get_host().await?;
        let pg_port = postgres.get_host_port_ipv4(5432).await?;
        let db_url = format!(
            "postgresql://postgres:postgres@{}:{}/postgres",
            pg_host, pg_port
        );

        let pool = PgPool::connect(&db_url)
            .await
            .context("Failed to connect to Postgres for migrations")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self {
            db_url,
            _postgres: postgres,
        })
    }

    async fn get() -> &'static Self {
        SHARED_INFRA
            .get_or_init(|| async {
                Self::init()
                    .await
                    .expect("Failed to initialize shared test infrastructure")
            })
            .await
    }
}

pub struct PostgresHarness {
    /// Database pool - use this for test fixtures.
    pub db_pool: PgPool,
}

impl AsyncTestContext for PostgresHarness {
    async fn setup() -> Self {
        let infra = SharedTestInfra::get().await;
        let db_pool = PgPool::connect(&infra.db_url)
            .await
            .expect("Failed to connect to test database");
        Self { db_pool }
    }

    async fn teardown(self) {
        self.db_pool.close().await;
    }
}
