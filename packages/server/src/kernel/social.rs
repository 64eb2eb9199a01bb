//! HTTP client for the social graph gateway.
//!
//! The gateway fronts the social protocol API and exposes the handful of
//! reads a refresh needs, plus the metadata refresh call:
//!
//! ```text
//! GET  /posts/{id}                   → 200 { "deleted": bool } | 404
//! GET  /posts/{id}/comments          → [Comment]
//! GET  /posts/{id}/collectors        → { "accounts": [..] }
//! GET  /comments/{id}/upvoters       → { "accounts": [..] }
//! POST /posts/{id}/refresh-metadata  → { "status": "refreshed" | "failed" }
//! ```

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{BaseSocialGraph, MetadataRefresh};
use crate::domains::smart_media::models::Comment;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct Accounts {
    accounts: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PostState {
    #[serde(default)]
    deleted: bool,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    status: String,
}

#[derive(Clone)]
pub struct SocialApiClient {
    http_client: Client,
    base_url: String,
}

impl SocialApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build social graph HTTP client")?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .http_client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .with_context(|| format!("GET {} failed", path))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("GET {} returned {}", path, status));
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", path))
    }
}

#[async_trait]
impl BaseSocialGraph for SocialApiClient {
    async fn fetch_comments(&self, post_id: &str) -> Result<Vec<Comment>> {
        self.get_json(&format!("/posts/{}/comments", post_id)).await
    }

    async fn fetch_collectors(&self, post_id: &str) -> Result<Vec<String>> {
        let accounts: Accounts = self
            .get_json(&format!("/posts/{}/collectors", post_id))
            .await?;
        Ok(accounts.accounts)
    }

    async fn fetch_upvoters(&self, comment_id: &str) -> Result<Vec<String>> {
        let accounts: Accounts = self
            .get_json(&format!("/comments/{}/upvoters", comment_id))
            .await?;
        Ok(accounts.accounts)
    }

    async fn is_post_deleted(&self, post_id: &str) -> Result<bool> {
        let response = self
            .http_client
            .get(format!("{}/posts/{}", self.base_url, post_id))
            .send()
            .await
            .context("Failed to look up post")?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(true),
            status if status.is_success() => {
                let state: PostState = response.json().await?;
                Ok(state.deleted)
            }
            status => Err(anyhow!("post lookup returned {}", status)),
        }
    }

    async fn refresh_metadata(&self, post_id: &str) -> Result<MetadataRefresh> {
        let response = self
            .http_client
            .post(format!("{}/posts/{}/refresh-metadata", self.base_url, post_id))
            .send()
            .await
            .context("Failed to request metadata refresh")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("metadata refresh returned {}", status));
        }

        let body: RefreshResponse = response.json().await?;
        Ok(parse_refresh_status(&body.status))
    }
}

fn parse_refresh_status(status: &str) -> MetadataRefresh {
    if status.eq_ignore_ascii_case("failed") {
        MetadataRefresh::Failed
    } else {
        MetadataRefresh::Refreshed
    }
}
