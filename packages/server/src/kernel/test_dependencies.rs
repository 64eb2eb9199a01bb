// TestDependencies - mock implementations for testing
//
// Provides mock services that can be injected into ServerDeps for tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use super::{
    BaseAI, BaseBalanceService, BaseCreditsService, BaseMediaGenerator, BasePostStore,
    BaseSocialGraph, Completion, GeneratedMedia, InMemoryPostCache, MetadataRefresh, ServerDeps,
};
use crate::domains::smart_media::models::{Comment, PostPatch, SmartMediaPost, SmartMediaStatus};
use crate::domains::templates::TemplateRegistry;

// =============================================================================
// Mock AI
// =============================================================================

pub struct MockAI {
    responses: Arc<Mutex<VecDeque<Completion>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockAI {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Add a text response to the queue
    pub fn with_response(self, response: impl Into<String>) -> Self {
        self.with_completion(Completion::text(response))
    }

    /// Add a JSON response to the queue (will be serialized)
    pub fn with_json_response<T: serde::Serialize>(self, data: &T) -> Self {
        let json = serde_json::to_string(data).expect("Failed to serialize mock response");
        self.with_response(json)
    }

    /// Add a response that also reports token usage
    pub fn with_completion(self, completion: Completion) -> Self {
        self.responses.lock().unwrap().push_back(completion);
        self
    }

    /// Get all prompts that were sent to the AI
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Check if a prompt containing the given text was sent
    pub fn was_called_with(&self, text: &str) -> bool {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .any(|p| p.contains(text))
    }

    /// Get the number of times the AI was called
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Default for MockAI {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseAI for MockAI {
    async fn complete(&self, prompt: &str) -> Result<Completion> {
        self.calls.lock().unwrap().push(prompt.to_string());

        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("MockAI has no response queued"))
    }

    async fn generate_structured(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        _schema: serde_json::Value,
    ) -> Result<Completion> {
        self.complete(&format!("{}\n\n{}", system_prompt, user_prompt))
            .await
    }
}

// =============================================================================
// Mock Media Generator
// =============================================================================

pub struct MockMediaGenerator {
    uris: Arc<Mutex<VecDeque<String>>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockMediaGenerator {
    pub fn new() -> Self {
        Self {
            uris: Arc::new(Mutex::new(VecDeque::new())),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue the URI returned by the next generation
    pub fn with_uri(self, uri: impl Into<String>) -> Self {
        self.uris.lock().unwrap().push_back(uri.into());
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl Default for MockMediaGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseMediaGenerator for MockMediaGenerator {
    async fn generate_image(&self, prompt: &str) -> Result<GeneratedMedia> {
        let mut prompts = self.prompts.lock().unwrap();
        prompts.push(prompt.to_string());

        let uri = self
            .uris
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| format!("https://media.test/image-{}.png", prompts.len()));

        Ok(GeneratedMedia {
            uri,
            revised_prompt: None,
        })
    }
}

// =============================================================================
// Mock Social Graph
// =============================================================================

pub struct MockSocialGraph {
    comments: Arc<Mutex<HashMap<String, Vec<Comment>>>>,
    collectors: Arc<Mutex<HashMap<String, Vec<String>>>>,
    upvoters: Arc<Mutex<HashMap<String, Vec<String>>>>,
    deleted: Arc<Mutex<Vec<String>>>,
    metadata_refresh: Arc<Mutex<MetadataRefresh>>,
    upvoter_requests: Arc<Mutex<Vec<String>>>,
    metadata_refreshes: Arc<Mutex<Vec<String>>>,
}

impl MockSocialGraph {
    pub fn new() -> Self {
        Self {
            comments: Arc::new(Mutex::new(HashMap::new())),
            collectors: Arc::new(Mutex::new(HashMap::new())),
            upvoters: Arc::new(Mutex::new(HashMap::new())),
            deleted: Arc::new(Mutex::new(Vec::new())),
            metadata_refresh: Arc::new(Mutex::new(MetadataRefresh::Refreshed)),
            upvoter_requests: Arc::new(Mutex::new(Vec::new())),
            metadata_refreshes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_comments(self, post_id: &str, comments: Vec<Comment>) -> Self {
        self.comments
            .lock()
            .unwrap()
            .insert(post_id.to_string(), comments);
        self
    }

    pub fn with_collectors(self, post_id: &str, accounts: Vec<&str>) -> Self {
        self.collectors.lock().unwrap().insert(
            post_id.to_string(),
            accounts.into_iter().map(String::from).collect(),
        );
        self
    }

    pub fn with_upvoters(self, comment_id: &str, accounts: Vec<&str>) -> Self {
        self.upvoters.lock().unwrap().insert(
            comment_id.to_string(),
            accounts.into_iter().map(String::from).collect(),
        );
        self
    }

    /// Mark a post as deleted upstream
    pub fn with_deleted(self, post_id: &str) -> Self {
        self.deleted.lock().unwrap().push(post_id.to_string());
        self
    }

    /// What every metadata refresh reports
    pub fn with_metadata_refresh(self, outcome: MetadataRefresh) -> Self {
        *self.metadata_refresh.lock().unwrap() = outcome;
        self
    }

    /// Comment ids whose upvoters were requested
    pub fn upvoter_requests(&self) -> Vec<String> {
        self.upvoter_requests.lock().unwrap().clone()
    }

    /// Post ids whose metadata refresh was requested
    pub fn metadata_refreshes(&self) -> Vec<String> {
        self.metadata_refreshes.lock().unwrap().clone()
    }
}

impl Default for MockSocialGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseSocialGraph for MockSocialGraph {
    async fn fetch_comments(&self, post_id: &str) -> Result<Vec<Comment>> {
        Ok(self
            .comments
            .lock()
            .unwrap()
            .get(post_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_collectors(&self, post_id: &str) -> Result<Vec<String>> {
        Ok(self
            .collectors
            .lock()
            .unwrap()
            .get(post_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_upvoters(&self, comment_id: &str) -> Result<Vec<String>> {
        self.upvoter_requests
            .lock()
            .unwrap()
            .push(comment_id.to_string());
        Ok(self
            .upvoters
            .lock()
            .unwrap()
            .get(comment_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn is_post_deleted(&self, post_id: &str) -> Result<bool> {
        Ok(self.deleted.lock().unwrap().iter().any(|id| id == post_id))
    }

    async fn refresh_metadata(&self, post_id: &str) -> Result<MetadataRefresh> {
        self.metadata_refreshes
            .lock()
            .unwrap()
            .push(post_id.to_string());
        Ok(*self.metadata_refresh.lock().unwrap())
    }
}

// =============================================================================
// Mock Balances
// =============================================================================

/// Arguments captured from a balance_of call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceCall {
    pub chain_id: u64,
    pub accounts: Vec<String>,
    pub token: String,
}

pub struct MockBalances {
    balances: Arc<Mutex<HashMap<String, u128>>>,
    calls: Arc<Mutex<Vec<BalanceCall>>>,
}

impl MockBalances {
    pub fn new() -> Self {
        Self {
            balances: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Accounts without a balance hold nothing
    pub fn with_balance(self, account: &str, balance: u128) -> Self {
        self.balances
            .lock()
            .unwrap()
            .insert(account.to_lowercase(), balance);
        self
    }

    pub fn calls(&self) -> Vec<BalanceCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockBalances {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseBalanceService for MockBalances {
    async fn balance_of(
        &self,
        chain_id: u64,
        accounts: &[String],
        token: &str,
    ) -> Result<Vec<u128>> {
        self.calls.lock().unwrap().push(BalanceCall {
            chain_id,
            accounts: accounts.to_vec(),
            token: token.to_string(),
        });

        let balances = self.balances.lock().unwrap();
        Ok(accounts
            .iter()
            .map(|a| balances.get(&a.to_lowercase()).copied().unwrap_or(0))
            .collect())
    }
}

// =============================================================================
// Mock Credits
// =============================================================================

pub struct MockCredits {
    sufficient: Arc<Mutex<bool>>,
    decrements: Arc<Mutex<Vec<(String, u64)>>>,
}

impl MockCredits {
    /// Every creator has credits until told otherwise
    pub fn new() -> Self {
        Self {
            sufficient: Arc::new(Mutex::new(true)),
            decrements: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn insufficient(self) -> Self {
        *self.sufficient.lock().unwrap() = false;
        self
    }

    /// (account, credits) pairs charged so far
    pub fn decrements(&self) -> Vec<(String, u64)> {
        self.decrements.lock().unwrap().clone()
    }
}

impl Default for MockCredits {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseCreditsService for MockCredits {
    async fn has_sufficient_credits(&self, _account: &str) -> Result<bool> {
        Ok(*self.sufficient.lock().unwrap())
    }

    async fn decrement_credits(&self, account: &str, credits: u64) -> Result<()> {
        self.decrements
            .lock()
            .unwrap()
            .push((account.to_string(), credits));
        Ok(())
    }
}

// =============================================================================
// In-memory Post Store
// =============================================================================

pub struct InMemoryPostStore {
    posts: Arc<Mutex<HashMap<String, SmartMediaPost>>>,
    versions: Arc<Mutex<Vec<(String, String)>>>,
    saves: Arc<Mutex<Vec<(String, PostPatch)>>>,
}

impl InMemoryPostStore {
    pub fn new() -> Self {
        Self {
            posts: Arc::new(Mutex::new(HashMap::new())),
            versions: Arc::new(Mutex::new(Vec::new())),
            saves: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_post(self, post: SmartMediaPost) -> Self {
        self.seed(post);
        self
    }

    /// Insert or replace a post directly, bypassing the trait
    pub fn seed(&self, post: SmartMediaPost) {
        self.posts
            .lock()
            .unwrap()
            .insert(post.post_id.clone(), post);
    }

    /// Current stored state of a post
    pub fn post(&self, post_id: &str) -> Option<SmartMediaPost> {
        self.posts.lock().unwrap().get(post_id).cloned()
    }

    /// Version URIs recorded for a post, oldest first
    pub fn versions(&self, post_id: &str) -> Vec<String> {
        self.versions
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == post_id)
            .map(|(_, uri)| uri.clone())
            .collect()
    }

    /// Every patch written, in order
    pub fn saves(&self) -> Vec<(String, PostPatch)> {
        self.saves.lock().unwrap().clone()
    }
}

impl Default for InMemoryPostStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BasePostStore for InMemoryPostStore {
    async fn load_post(&self, post_id: &str) -> Result<Option<SmartMediaPost>> {
        Ok(self.post(post_id))
    }

    async fn insert_post(&self, post: &SmartMediaPost) -> Result<()> {
        self.posts
            .lock()
            .unwrap()
            .insert(post.post_id.clone(), post.clone());
        Ok(())
    }

    async fn save_post(&self, post_id: &str, patch: &PostPatch) -> Result<()> {
        self.saves
            .lock()
            .unwrap()
            .push((post_id.to_string(), patch.clone()));
        if let Some(post) = self.posts.lock().unwrap().get_mut(post_id) {
            post.apply(patch);
        }
        Ok(())
    }

    async fn list_by_status(&self, status: SmartMediaStatus) -> Result<Vec<SmartMediaPost>> {
        let mut posts: Vec<SmartMediaPost> = self
            .posts
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.status == status)
            .cloned()
            .collect();
        posts.sort_by_key(|p| p.updated_at);
        Ok(posts)
    }

    async fn record_version(&self, post_id: &str, uri: &str) -> Result<()> {
        self.versions
            .lock()
            .unwrap()
            .push((post_id.to_string(), uri.to_string()));
        Ok(())
    }
}

// =============================================================================
// TestDependencies
// =============================================================================

pub struct TestDependencies {
    pub ai: Arc<MockAI>,
    pub media: Arc<MockMediaGenerator>,
    pub social: Arc<MockSocialGraph>,
    pub balances: Arc<MockBalances>,
    pub credits: Arc<MockCredits>,
    pub store: Arc<InMemoryPostStore>,
    pub cache: Arc<InMemoryPostCache>,
    pub templates: Arc<TemplateRegistry>,
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            ai: Arc::new(MockAI::new()),
            media: Arc::new(MockMediaGenerator::new()),
            social: Arc::new(MockSocialGraph::new()),
            balances: Arc::new(MockBalances::new()),
            credits: Arc::new(MockCredits::new()),
            store: Arc::new(InMemoryPostStore::new()),
            cache: Arc::new(InMemoryPostCache::new()),
            templates: Arc::new(TemplateRegistry::with_defaults()),
        }
    }

    /// Replace the built-in template handlers
    pub fn with_templates(mut self, templates: TemplateRegistry) -> Self {
        self.templates = Arc::new(templates);
        self
    }

    /// Set a mock AI
    pub fn mock_ai(mut self, ai: MockAI) -> Self {
        self.ai = Arc::new(ai);
        self
    }

    /// Set a mock media generator
    pub fn mock_media(mut self, media: MockMediaGenerator) -> Self {
        self.media = Arc::new(media);
        self
    }

    /// Set a mock social graph
    pub fn mock_social(mut self, social: MockSocialGraph) -> Self {
        self.social = Arc::new(social);
        self
    }

    /// Set mock token balances
    pub fn mock_balances(mut self, balances: MockBalances) -> Self {
        self.balances = Arc::new(balances);
        self
    }

    /// Set a mock credit ledger
    pub fn mock_credits(mut self, credits: MockCredits) -> Self {
        self.credits = Arc::new(credits);
        self
    }

    /// Seed the post store
    pub fn with_post(self, post: SmartMediaPost) -> Self {
        self.store.seed(post);
        self
    }

    /// Build ServerDeps sharing these mocks, so tests can inspect them afterwards
    pub fn server_deps(&self) -> ServerDeps {
        ServerDeps::new(
            None,
            self.store.clone(),
            self.cache.clone(),
            self.ai.clone(),
            self.media.clone(),
            self.social.clone(),
            self.balances.clone(),
            self.credits.clone(),
            self.templates.clone(),
        )
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}
