pub mod decisions;
pub mod refresh;
pub mod staleness;
pub mod voting;
pub mod weighted_comments;

pub use decisions::{aggregate_decisions, DecisionTally, Decisions};
pub use refresh::{
    RefreshError, RefreshOutcome, RefreshPolicy, RequestOptions, UpdateOrchestrator,
    UpdateRequest,
};
pub use staleness::{is_media_stale, latest_comments};
pub use voting::vote_weight;
pub use weighted_comments::build_weighted_comments;
