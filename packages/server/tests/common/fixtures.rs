//! Test fixtures for creating test data.

#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use smart_media_core::common::{now_unix, UnixSeconds};
use smart_media_core::domains::smart_media::models::{Comment, SmartMediaPost, SmartMediaStatus};
use smart_media_core::domains::templates::{AdventureData, EvolvingArtData, TemplateData};

pub const CREATOR: &str = "0xC0FFEE";

/// An adventure post last refreshed `age` seconds ago with a 60s window.
pub fn adventure_post(post_id: &str, age: i64) -> SmartMediaPost {
    SmartMediaPost::new(
        post_id,
        CREATOR,
        TemplateData::Adventure(AdventureData::new("a haunted lighthouse")),
        now_unix() - age,
        60,
    )
}

/// An evolving art post last refreshed `age` seconds ago with a 60s window.
pub fn art_post(post_id: &str, age: i64) -> SmartMediaPost {
    SmartMediaPost::new(
        post_id,
        CREATOR,
        TemplateData::EvolvingArt(EvolvingArtData::new("a lighthouse")),
        now_unix() - age,
        60,
    )
}

pub fn with_status(mut post: SmartMediaPost, status: SmartMediaStatus) -> SmartMediaPost {
    post.status = status;
    post
}

pub fn comment(id: &str, author: &str, at: UnixSeconds) -> Comment {
    Comment {
        id: id.to_string(),
        author: author.to_string(),
        content: format!("comment {}", id),
        timestamp: Utc.timestamp_opt(at, 0).unwrap(),
        metadata: serde_json::Value::Null,
    }
}

/// Structured chapter output as the text generator returns it.
pub fn chapter_json(text: &str) -> String {
    serde_json::json!({
        "text": text,
        "decision_a": "open the door",
        "decision_b": "run away",
    })
    .to_string()
}
