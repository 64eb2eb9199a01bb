//! Scheduled background tasks using tokio-cron-scheduler.
//!
//! The refresh sweep runs on `REFRESH_CRON` and feeds every ACTIVE post that
//! is due for a refresh into the same queue user requests go through.
//!
//! ```text
//! Scheduler (REFRESH_CRON)
//!     │
//!     └─► list_by_status(ACTIVE)
//!             └─► stale and not processing → request_update(post_id)
//! ```

use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info, warn};

use crate::common::now_unix;
use crate::domains::smart_media::activities::{
    is_media_stale, RequestOptions, UpdateOrchestrator, UpdateRequest,
};
use crate::domains::smart_media::models::SmartMediaStatus;

/// Start all scheduled tasks
pub async fn start_scheduler(orchestrator: UpdateOrchestrator, cron: &str) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let sweep_job = Job::new_async(cron, move |_uuid, _lock| {
        let orchestrator = orchestrator.clone();
        Box::pin(async move {
            if let Err(e) = run_refresh_sweep(&orchestrator).await {
                error!(error = %e, "Refresh sweep failed");
            }
        })
    })?;

    scheduler.add(sweep_job).await?;
    scheduler.start().await?;

    info!(cron = %cron, "Scheduled tasks started (smart media refresh sweep)");
    Ok(scheduler)
}

/// Queue a refresh for every ACTIVE post that is stale and not already running.
///
/// Returns how many refreshes were queued.
pub async fn run_refresh_sweep(orchestrator: &UpdateOrchestrator) -> Result<usize> {
    let posts = orchestrator
        .deps()
        .store
        .list_by_status(SmartMediaStatus::Active)
        .await?;

    let now = now_unix();
    let mut queued = 0;

    for post in posts {
        if !is_media_stale(&post, now) || orchestrator.is_processing(&post.post_id) {
            continue;
        }

        match orchestrator
            .request_update(&post.post_id, RequestOptions::default())
            .await
        {
            Ok(UpdateRequest::Queued(_)) => queued += 1,
            Ok(UpdateRequest::AlreadyProcessing) => {}
            Err(e) => warn!(post_id = %post.post_id, error = %e, "Sweep could not queue refresh"),
        }
    }

    if queued > 0 {
        info!(queued, "Refresh sweep queued posts");
    } else {
        debug!("Refresh sweep found nothing due");
    }

    Ok(queued)
}
