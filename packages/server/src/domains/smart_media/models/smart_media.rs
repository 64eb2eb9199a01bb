use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::common::UnixSeconds;
use crate::domains::templates::{TemplateData, TemplateName};

/// Lifecycle state of a smart media post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmartMediaStatus {
    Active,
    Failed,
    Disabled,
}

impl SmartMediaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SmartMediaStatus::Active => "active",
            SmartMediaStatus::Failed => "failed",
            SmartMediaStatus::Disabled => "disabled",
        }
    }

    /// Whether a creator-forced refresh may bring the post back to `Active`.
    pub fn is_frozen(&self) -> bool {
        matches!(self, SmartMediaStatus::Failed | SmartMediaStatus::Disabled)
    }
}

impl std::fmt::Display for SmartMediaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SmartMediaStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(SmartMediaStatus::Active),
            "failed" => Ok(SmartMediaStatus::Failed),
            "disabled" => Ok(SmartMediaStatus::Disabled),
            other => Err(anyhow::anyhow!("unknown smart media status: {}", other)),
        }
    }
}

/// Token whose balances weight comment votes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGate {
    pub chain_id: u64,
    pub address: String,
}

/// A post whose content evolves with its comments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmartMediaPost {
    pub post_id: String,
    pub creator: String,
    pub template_data: TemplateData,
    pub status: SmartMediaStatus,
    /// Last refresh, unix seconds.
    pub updated_at: UnixSeconds,
    /// Seconds after `updated_at` before the post is due for a refresh.
    pub max_stale_time: i64,
    pub token: Option<TokenGate>,
    /// Only count comments written by accounts that collected the post.
    pub collectors_only: bool,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Partial update written back after a refresh attempt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostPatch {
    pub status: Option<SmartMediaStatus>,
    pub template_data: Option<TemplateData>,
    pub updated_at: Option<UnixSeconds>,
    pub metadata: Option<serde_json::Value>,
}

impl PostPatch {
    pub fn status(status: SmartMediaStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.template_data.is_none()
            && self.updated_at.is_none()
            && self.metadata.is_none()
    }
}

impl SmartMediaPost {
    pub fn new(
        post_id: impl Into<String>,
        creator: impl Into<String>,
        template_data: TemplateData,
        updated_at: UnixSeconds,
        max_stale_time: i64,
    ) -> Self {
        Self {
            post_id: post_id.into(),
            creator: creator.into(),
            template_data,
            status: SmartMediaStatus::Active,
            updated_at,
            max_stale_time,
            token: None,
            collectors_only: false,
            metadata: None,
            created_at: Utc::now(),
        }
    }

    pub fn template(&self) -> TemplateName {
        self.template_data.name()
    }

    /// Addresses are compared case-insensitively.
    pub fn is_creator(&self, account: &str) -> bool {
        self.creator.eq_ignore_ascii_case(account)
    }

    pub fn apply(&mut self, patch: &PostPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(data) = &patch.template_data {
            self.template_data = data.clone();
        }
        if let Some(updated_at) = patch.updated_at {
            self.updated_at = updated_at;
        }
        if let Some(metadata) = &patch.metadata {
            self.metadata = Some(metadata.clone());
        }
    }
}

// =============================================================================
// Row mapping
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct SmartMediaRow {
    post_id: String,
    creator: String,
    template_data: Json<serde_json::Value>,
    status: String,
    updated_at: i64,
    max_stale_time: i64,
    token_chain_id: Option<i64>,
    token_address: Option<String>,
    collectors_only: bool,
    metadata: Option<Json<serde_json::Value>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<SmartMediaRow> for SmartMediaPost {
    type Error = anyhow::Error;

    fn try_from(row: SmartMediaRow) -> Result<Self> {
        let template_data: TemplateData = serde_json::from_value(row.template_data.0)
            .with_context(|| format!("invalid template data for post {}", row.post_id))?;

        let token = match (row.token_chain_id, row.token_address) {
            (Some(chain_id), Some(address)) => Some(TokenGate {
                chain_id: u64::try_from(chain_id).context("negative token chain id")?,
                address,
            }),
            _ => None,
        };

        Ok(Self {
            status: row.status.parse()?,
            post_id: row.post_id,
            creator: row.creator,
            template_data,
            updated_at: row.updated_at,
            max_stale_time: row.max_stale_time,
            token,
            collectors_only: row.collectors_only,
            metadata: row.metadata.map(|m| m.0),
            created_at: row.created_at,
        })
    }
}

// =============================================================================
// Queries
// =============================================================================

impl SmartMediaPost {
    pub async fn find_by_id(post_id: &str, pool: &PgPool) -> Result<Option<Self>> {
        let row = sqlx::query_as::<_, SmartMediaRow>("SELECT * FROM smart_media WHERE post_id = $1")
            .bind(post_id)
            .fetch_optional(pool)
            .await?;

        row.map(Self::try_from).transpose()
    }

    pub async fn find_by_status(status: SmartMediaStatus, pool: &PgPool) -> Result<Vec<Self>> {
        let rows = sqlx::query_as::<_, SmartMediaRow>(
            "SELECT * FROM smart_media WHERE status = $1 ORDER BY updated_at ASC",
        )
        .bind(status.as_str())
        .fetch_all(pool)
        .await?;

        rows.into_iter().map(Self::try_from).collect()
    }

    pub async fn upsert(&self, pool: &PgPool) -> Result<()> {
        let chain_id = self
            .token
            .as_ref()
            .map(|t| i64::try_from(t.chain_id))
            .transpose()
            .context("token chain id out of range")?;

        sqlx::query(
            r#"
            INSERT INTO smart_media (
                post_id, creator, template, template_data, status, updated_at,
                max_stale_time, token_chain_id, token_address, collectors_only,
                metadata, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (post_id) DO UPDATE SET
                creator = EXCLUDED.creator,
                template = EXCLUDED.template,
                template_data = EXCLUDED.template_data,
                status = EXCLUDED.status,
                updated_at = EXCLUDED.updated_at,
                max_stale_time = EXCLUDED.max_stale_time,
                token_chain_id = EXCLUDED.token_chain_id,
                token_address = EXCLUDED.token_address,
                collectors_only = EXCLUDED.collectors_only,
                metadata = EXCLUDED.metadata
            "#,
        )
        .bind(&self.post_id)
        .bind(&self.creator)
        .bind(self.template().as_str())
        .bind(Json(serde_json::to_value(&self.template_data)?))
        .bind(self.status.as_str())
        .bind(self.updated_at)
        .bind(self.max_stale_time)
        .bind(chain_id)
        .bind(self.token.as_ref().map(|t| t.address.as_str()))
        .bind(self.collectors_only)
        .bind(self.metadata.clone().map(Json))
        .bind(self.created_at)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn apply_patch(post_id: &str, patch: &PostPatch, pool: &PgPool) -> Result<()> {
        let template_data = patch
            .template_data
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?
            .map(Json);

        sqlx::query(
            r#"
            UPDATE smart_media
            SET status = COALESCE($2, status),
                template_data = COALESCE($3, template_data),
                updated_at = COALESCE($4, updated_at),
                metadata = COALESCE($5, metadata)
            WHERE post_id = $1
            "#,
        )
        .bind(post_id)
        .bind(patch.status.map(|s| s.as_str()))
        .bind(template_data)
        .bind(patch.updated_at)
        .bind(patch.metadata.clone().map(Json))
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Record a new content version (e.g. a freshly generated image).
    pub async fn record_version(post_id: &str, uri: &str, pool: &PgPool) -> Result<Uuid> {
        let id = Uuid::now_v7();
        sqlx::query("INSERT INTO smart_media_versions (id, post_id, uri) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(post_id)
            .bind(uri)
            .execute(pool)
            .await?;
        Ok(id)
    }

    pub async fn find_versions(post_id: &str, pool: &PgPool) -> Result<Vec<String>> {
        let uris = sqlx::query_scalar::<_, String>(
            "SELECT uri FROM smart_media_versions WHERE post_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(post_id)
        .fetch_all(pool)
        .await?;
        Ok(uris)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::templates::AdventureData;

    fn post() -> SmartMediaPost {
        SmartMediaPost::new(
            "0x01-0x02",
            "0xCreator",
            TemplateData::Adventure(AdventureData::default()),
            1_000,
            1_800,
        )
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            SmartMediaStatus::Active,
            SmartMediaStatus::Failed,
            SmartMediaStatus::Disabled,
        ] {
            assert_eq!(status.as_str().parse::<SmartMediaStatus>().unwrap(), status);
        }
        assert!("paused".parse::<SmartMediaStatus>().is_err());
    }

    #[test]
    fn creator_match_ignores_case() {
        let post = post();
        assert!(post.is_creator("0xcreator"));
        assert!(!post.is_creator("0xsomeone"));
    }

    #[test]
    fn apply_only_touches_patched_fields() {
        let mut post = post();
        post.apply(&PostPatch {
            updated_at: Some(2_000),
            ..Default::default()
        });

        assert_eq!(post.updated_at, 2_000);
        assert_eq!(post.status, SmartMediaStatus::Active);
        assert!(post.metadata.is_none());

        post.apply(&PostPatch::status(SmartMediaStatus::Failed));
        assert_eq!(post.status, SmartMediaStatus::Failed);
        assert_eq!(post.updated_at, 2_000);
    }
}
