//! When a post is due for a refresh, and which comments count toward it.

use crate::common::UnixSeconds;
use crate::domains::smart_media::models::{Comment, SmartMediaPost};

/// A post is stale once strictly more than `max_stale_time` seconds have
/// passed since its last refresh.
pub fn is_media_stale(post: &SmartMediaPost, now: UnixSeconds) -> bool {
    now.saturating_sub(post.updated_at) > post.max_stale_time
}

/// Comments written strictly after the post's last refresh, in their
/// original order.
pub fn latest_comments(post: &SmartMediaPost, comments: Vec<Comment>) -> Vec<Comment> {
    comments
        .into_iter()
        .filter(|comment| comment.unix_timestamp() > post.updated_at)
        .collect()
}
