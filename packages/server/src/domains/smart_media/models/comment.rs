use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::common::UnixSeconds;

/// A comment as returned by the social graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub author: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Comment {
    /// Comment time on the same unix-seconds base as `SmartMediaPost::updated_at`.
    pub fn unix_timestamp(&self) -> UnixSeconds {
        self.timestamp.timestamp()
    }
}

/// A comment with its vote weight for one refresh cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct WeightedComment {
    pub content: String,
    pub votes: u64,
}

impl WeightedComment {
    pub fn new(content: impl Into<String>, votes: u64) -> Self {
        Self {
            content: content.into(),
            votes,
        }
    }
}

/// Summed votes for one candidate decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DecisionResult {
    /// The decision text, exactly as offered
    pub content: String,
    /// Sum of the vote weights of the comments supporting this decision
    pub total_votes: u64,
}
