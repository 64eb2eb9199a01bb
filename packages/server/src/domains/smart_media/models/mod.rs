pub mod comment;
pub mod smart_media;
pub mod usage;

pub use comment::{Comment, DecisionResult, WeightedComment};
pub use smart_media::{PostPatch, SmartMediaPost, SmartMediaStatus, TokenGate};
pub use usage::TemplateUsage;
