//! Refresh orchestration.
//!
//! `request_update` is the entry point for both user requests and the cron
//! sweep: it validates the request, then hands the post to the task queue.
//! `handle_refresh` is the queued work: one full refresh cycle for one post.
//!
//! Cycle:
//! 1. Deleted upstream → DISABLED
//! 2. Creator out of credits → skip
//! 3. Not stale (unless forced) → skip
//! 4. Build weighted comments; too few (unless forced) → skip
//! 5. Run the template handler
//! 6. No result → maybe freeze as FAILED; result → persist, charge, refresh metadata

use std::sync::Arc;

use anyhow::{anyhow, Result};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::staleness::is_media_stale;
use super::weighted_comments::build_weighted_comments;
use crate::common::{now_unix, UnixSeconds};
use crate::domains::smart_media::models::{PostPatch, SmartMediaPost, SmartMediaStatus};
use crate::domains::templates::{TemplateContext, TemplateResult};
use crate::kernel::jobs::{TaskHandle, TaskQueue};
use crate::kernel::{MetadataRefresh, ServerDeps};

/// Seconds without content after which a post is frozen as FAILED.
pub const DEFAULT_FREEZE_THRESHOLD_SECS: i64 = 86_400;
pub const DEFAULT_MIN_ENGAGEMENT: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    pub freeze_threshold_secs: i64,
    /// Weighted comments needed before an unforced refresh runs the template
    pub min_engagement: usize,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            freeze_threshold_secs: DEFAULT_FREEZE_THRESHOLD_SECS,
            min_engagement: DEFAULT_MIN_ENGAGEMENT,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    pub requested_by: Option<String>,
    pub force_update: bool,
}

impl RequestOptions {
    pub fn forced_by(account: impl Into<String>) -> Self {
        Self {
            requested_by: Some(account.into()),
            force_update: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("smart media post {0} not found")]
    NotFound(String),

    #[error("only the creator can force an update of post {0}")]
    Unauthorized(String),

    #[error("smart media post {0} is disabled")]
    PostDisabled(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// What `request_update` did with the request.
#[derive(Debug)]
pub enum UpdateRequest {
    Queued(TaskHandle<RefreshOutcome>),
    AlreadyProcessing,
}

/// How one refresh cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The post is gone from the store
    Missing,
    /// Deleted upstream; now DISABLED
    Disabled,
    InsufficientCredits,
    NotStale,
    NotEnoughEngagement { comments: usize },
    /// The template produced nothing; `frozen` when that moved the post to FAILED
    NoResponse { frozen: bool },
    Updated {
        version: Option<String>,
        reactivated: bool,
        metadata_failed: bool,
    },
}

#[derive(Clone)]
pub struct UpdateOrchestrator {
    deps: Arc<ServerDeps>,
    queue: TaskQueue,
    policy: RefreshPolicy,
}

impl UpdateOrchestrator {
    pub fn new(deps: Arc<ServerDeps>, queue: TaskQueue, policy: RefreshPolicy) -> Self {
        Self {
            deps,
            queue,
            policy,
        }
    }

    pub fn deps(&self) -> &ServerDeps {
        &self.deps
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn is_processing(&self, post_id: &str) -> bool {
        self.queue.is_processing(post_id)
    }

    /// Read-through lookup: cache first, then the store.
    pub async fn find_post(&self, post_id: &str) -> Result<Option<SmartMediaPost>> {
        if let Some(post) = self.deps.cache.get(post_id).await {
            return Ok(Some(post));
        }

        let post = self.deps.store.load_post(post_id).await?;
        if let Some(post) = &post {
            self.deps.cache.put(post.clone()).await;
        }
        Ok(post)
    }

    /// Validate a refresh request and queue it.
    pub async fn request_update(
        &self,
        post_id: &str,
        options: RequestOptions,
    ) -> Result<UpdateRequest, RefreshError> {
        if self.queue.is_processing(post_id) {
            debug!(post_id = %post_id, "refresh already in progress");
            return Ok(UpdateRequest::AlreadyProcessing);
        }

        let post = self
            .find_post(post_id)
            .await?
            .ok_or_else(|| RefreshError::NotFound(post_id.to_string()))?;

        if options.force_update {
            let is_creator = options
                .requested_by
                .as_deref()
                .is_some_and(|account| post.is_creator(account));
            if !is_creator {
                warn!(
                    post_id = %post_id,
                    requested_by = ?options.requested_by,
                    "forced update rejected: not the creator"
                );
                return Err(RefreshError::Unauthorized(post_id.to_string()));
            }
        } else if post.status == SmartMediaStatus::Disabled {
            return Err(RefreshError::PostDisabled(post_id.to_string()));
        }

        let force_update = options.force_update;
        let orchestrator = self.clone();
        let key = post_id.to_string();
        let handle = self.queue.add(post_id, move || {
            let orchestrator = orchestrator.clone();
            let key = key.clone();
            async move { orchestrator.handle_refresh(&key, force_update).await }
        });

        info!(post_id = %post_id, force_update, "refresh queued");
        Ok(UpdateRequest::Queued(handle))
    }

    /// One refresh cycle. Errors propagate to the queue, which retries.
    pub async fn handle_refresh(&self, post_id: &str, force_update: bool) -> Result<RefreshOutcome> {
        let deps: &ServerDeps = &self.deps;

        let Some(post) = deps.store.load_post(post_id).await? else {
            warn!(post_id = %post_id, "post vanished before refresh");
            return Ok(RefreshOutcome::Missing);
        };

        if deps.social.is_post_deleted(post_id).await? {
            deps.store
                .save_post(post_id, &PostPatch::status(SmartMediaStatus::Disabled))
                .await?;
            deps.cache.evict(post_id).await;
            info!(post_id = %post_id, "post deleted upstream, disabled");
            return Ok(RefreshOutcome::Disabled);
        }

        if !deps.credits.has_sufficient_credits(&post.creator).await? {
            info!(post_id = %post_id, creator = %post.creator, "creator out of credits, skipping");
            return Ok(RefreshOutcome::InsufficientCredits);
        }

        let now = now_unix();
        if !force_update && !is_media_stale(&post, now) {
            debug!(post_id = %post_id, "post not stale");
            return Ok(RefreshOutcome::NotStale);
        }

        let comments = build_weighted_comments(&post, deps).await?;
        if !force_update && comments.len() < self.policy.min_engagement {
            debug!(post_id = %post_id, comments = comments.len(), "not enough engagement");
            return Ok(RefreshOutcome::NotEnoughEngagement {
                comments: comments.len(),
            });
        }

        let template = post.template();
        let handler = deps
            .templates
            .get(template)
            .ok_or_else(|| anyhow!("no handler registered for template {}", template))?;

        let ctx = TemplateContext {
            deps,
            comments: &comments,
            force_update,
        };
        match handler.handle(&post, &post.template_data, ctx).await? {
            None => self.handle_no_response(&post, now).await,
            Some(result) => self.apply_result(post, result).await,
        }
    }

    async fn handle_no_response(
        &self,
        post: &SmartMediaPost,
        now: UnixSeconds,
    ) -> Result<RefreshOutcome> {
        let silent_for = now.saturating_sub(post.updated_at);
        if silent_for <= self.policy.freeze_threshold_secs {
            info!(post_id = %post.post_id, silent_for, "template produced no content");
            return Ok(RefreshOutcome::NoResponse { frozen: false });
        }

        self.deps
            .store
            .save_post(&post.post_id, &PostPatch::status(SmartMediaStatus::Failed))
            .await?;
        self.deps.cache.evict(&post.post_id).await;
        warn!(post_id = %post.post_id, silent_for, "no content past freeze threshold, post failed");
        Ok(RefreshOutcome::NoResponse { frozen: true })
    }

    async fn apply_result(
        &self,
        mut post: SmartMediaPost,
        result: TemplateResult,
    ) -> Result<RefreshOutcome> {
        let deps: &ServerDeps = &self.deps;
        let post_id = post.post_id.clone();

        if let Some(uri) = &result.persist_version_uri {
            deps.store.record_version(&post_id, uri).await?;
        }

        let reactivated = post.status.is_frozen();
        let has_metadata = result.metadata.is_some();
        let patch = PostPatch {
            status: reactivated.then_some(SmartMediaStatus::Active),
            template_data: result.updated_template_data,
            updated_at: Some(now_unix()),
            metadata: result.metadata,
        };
        deps.store.save_post(&post_id, &patch).await?;
        post.apply(&patch);

        if let Some(usage) = result.total_usage {
            let credits = usage.credits();
            if credits > 0 {
                if let Err(e) = deps.credits.decrement_credits(&post.creator, credits).await {
                    error!(post_id = %post_id, credits, error = %e, "failed to charge credits");
                }
            }
        }

        // Upstream only re-renders when there is new metadata to show.
        let metadata_refresh = if has_metadata {
            Some(deps.social.refresh_metadata(&post_id).await)
        } else {
            None
        };
        let metadata_failed = match metadata_refresh {
            None | Some(Ok(MetadataRefresh::Refreshed)) => false,
            Some(Ok(MetadataRefresh::Failed)) => {
                let failed = PostPatch::status(SmartMediaStatus::Failed);
                deps.store.save_post(&post_id, &failed).await?;
                post.apply(&failed);
                warn!(post_id = %post_id, "metadata refresh failed, post failed");
                true
            }
            Some(Err(e)) => {
                warn!(post_id = %post_id, error = %e, "metadata refresh request failed");
                false
            }
        };

        deps.cache.put(post).await;
        info!(
            post_id = %post_id,
            reactivated,
            metadata_failed,
            version = ?result.persist_version_uri,
            "post refreshed"
        );

        Ok(RefreshOutcome::Updated {
            version: result.persist_version_uri,
            reactivated,
            metadata_failed,
        })
    }
}
