//! Weighted comments: the latest comments on a post, each scored by the
//! token holdings of its author and upvoters.

use std::collections::{HashMap, HashSet};

use anyhow::{anyhow, Result};
use futures::future::try_join_all;
use tracing::debug;

use super::staleness::latest_comments;
use super::voting::vote_weight;
use crate::domains::smart_media::models::{Comment, SmartMediaPost, WeightedComment};
use crate::kernel::ServerDeps;

/// Build this cycle's weighted comments for `post`.
///
/// Balances for every distinct author and upvoter are fetched in one batch.
/// Posts without a token weigh everyone as a zero balance.
pub async fn build_weighted_comments(
    post: &SmartMediaPost,
    deps: &ServerDeps,
) -> Result<Vec<WeightedComment>> {
    let comments = deps.social.fetch_comments(&post.post_id).await?;
    let mut comments = latest_comments(post, comments);

    if post.collectors_only && !comments.is_empty() {
        let collectors: HashSet<String> = deps
            .social
            .fetch_collectors(&post.post_id)
            .await?
            .iter()
            .map(|account| account.to_lowercase())
            .collect();
        comments.retain(|c| collectors.contains(&c.author.to_lowercase()));
    }

    if comments.is_empty() {
        return Ok(Vec::new());
    }

    let upvoters = try_join_all(comments.iter().map(|c| deps.social.fetch_upvoters(&c.id))).await?;
    let voters: Vec<Vec<String>> = comments
        .iter()
        .zip(upvoters)
        .map(|(comment, upvoters)| distinct_upvoters(comment, upvoters))
        .collect();

    let mut accounts: Vec<String> = Vec::new();
    let mut seen = HashSet::new();
    for (comment, upvoters) in comments.iter().zip(&voters) {
        for account in std::iter::once(comment.author.to_lowercase()).chain(upvoters.iter().cloned())
        {
            if seen.insert(account.clone()) {
                accounts.push(account);
            }
        }
    }

    let weights = account_weights(post, &accounts, deps).await?;
    let weight_of = |account: &str| weights.get(account).copied().unwrap_or(1);

    let weighted: Vec<WeightedComment> = comments
        .into_iter()
        .zip(voters)
        .map(|(comment, upvoters)| {
            let votes = weight_of(&comment.author.to_lowercase())
                + upvoters.iter().map(|u| weight_of(u)).sum::<u64>();
            WeightedComment::new(comment.content, votes)
        })
        .collect();

    debug!(
        post_id = %post.post_id,
        comments = weighted.len(),
        accounts = accounts.len(),
        "weighted comments built"
    );

    Ok(weighted)
}

/// Lowercased upvoters, each counted once, without the comment's author.
fn distinct_upvoters(comment: &Comment, upvoters: Vec<String>) -> Vec<String> {
    let author = comment.author.to_lowercase();
    let mut seen = HashSet::new();
    upvoters
        .into_iter()
        .map(|account| account.to_lowercase())
        .filter(|account| *account != author && seen.insert(account.clone()))
        .collect()
}

async fn account_weights(
    post: &SmartMediaPost,
    accounts: &[String],
    deps: &ServerDeps,
) -> Result<HashMap<String, u64>> {
    let balances = match &post.token {
        Some(token) => {
            let balances = deps
                .balances
                .balance_of(token.chain_id, accounts, &token.address)
                .await?;
            if balances.len() != accounts.len() {
                return Err(anyhow!(
                    "balanceOf returned {} balances for {} accounts",
                    balances.len(),
                    accounts.len()
                ));
            }
            balances
        }
        None => vec![0; accounts.len()],
    };

    Ok(accounts
        .iter()
        .cloned()
        .zip(balances.into_iter().map(vote_weight))
        .collect())
}
