//! Kernel module - server infrastructure and dependencies.

pub mod ai;
pub mod balances;
pub mod deps;
pub mod jobs;
pub mod llm_request;
pub mod scheduled_tasks;
pub mod social;
pub mod stores;
pub mod test_dependencies;
pub mod traits;

pub use ai::OpenAIClient;
pub use balances::RpcBalanceService;
pub use deps::ServerDeps;
pub use llm_request::{extract, Structured, StructuredOutput, StructuredOutputError};
pub use social::SocialApiClient;
pub use stores::{InMemoryPostCache, PostgresCreditsService, PostgresPostStore};
pub use test_dependencies::TestDependencies;
pub use traits::*;
