use axum::{extract::Extension, http::StatusCode, Json};
use serde::Serialize;

use crate::server::app::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    database: DatabaseHealth,
    queue: QueueHealth,
}

#[derive(Debug, Serialize)]
pub struct DatabaseHealth {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QueueHealth {
    pending: usize,
    running: usize,
    max_concurrent: usize,
}

/// Health check endpoint
///
/// Checks database connectivity (when running against Postgres) and reports
/// refresh queue occupancy.
///
/// Returns 200 OK if all systems are healthy, 503 Service Unavailable otherwise.
pub async fn health_handler(
    Extension(state): Extension<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let database = match &state.orchestrator.deps().db_pool {
        Some(pool) => match tokio::time::timeout(
            std::time::Duration::from_secs(5),
            sqlx::query("SELECT 1").execute(pool),
        )
        .await
        {
            Ok(Ok(_)) => DatabaseHealth {
                status: "ok".to_string(),
                error: None,
            },
            Ok(Err(e)) => DatabaseHealth {
                status: "error".to_string(),
                error: Some(format!("Query failed: {}", e)),
            },
            Err(_) => DatabaseHealth {
                status: "error".to_string(),
                error: Some("Query timeout (>5s)".to_string()),
            },
        },
        None => DatabaseHealth {
            status: "in_memory".to_string(),
            error: None,
        },
    };

    let queue = state.orchestrator.queue();
    let queue = QueueHealth {
        pending: queue.pending_len(),
        running: queue.running_len(),
        max_concurrent: queue.config().max_concurrent,
    };

    let is_healthy = database.status != "error";
    let status_code = if is_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status: if is_healthy { "healthy" } else { "unhealthy" }.to_string(),
            database,
            queue,
        }),
    )
}
