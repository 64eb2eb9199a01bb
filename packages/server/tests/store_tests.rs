//! Postgres store and credit ledger tests.
//!
//! These need Docker for the Postgres container:
//! `cargo test --test store_tests -- --ignored`

mod common;

use crate::common::*;
use smart_media_core::domains::smart_media::models::{PostPatch, SmartMediaPost, SmartMediaStatus, TokenGate};
use smart_media_core::domains::templates::{AdventureData, Chapter, TemplateData};
use smart_media_core::kernel::{
    BaseCreditsService, BasePostStore, PostgresCreditsService, PostgresPostStore,
};
use test_context::test_context;
use uuid::Uuid;

/// Posts share one database across tests, so every test uses its own ids.
fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::now_v7())
}

#[test_context(PostgresHarness)]
#[tokio::test]
#[ignore = "requires Docker"]
async fn insert_then_load_keeps_the_document(ctx: &PostgresHarness) {
    let store = PostgresPostStore::new(ctx.db_pool.clone());
    let mut post = art_post(&unique("art"), 30);
    post.token = Some(TokenGate {
        chain_id: 8453,
        address: "0xToken".to_string(),
    });
    post.collectors_only = true;

    store.insert_post(&post).await.unwrap();
    let loaded = store.load_post(&post.post_id).await.unwrap().unwrap();

    assert_eq!(loaded.creator, CREATOR);
    assert_eq!(loaded.template_data, post.template_data);
    assert_eq!(loaded.status, SmartMediaStatus::Active);
    assert_eq!(loaded.updated_at, post.updated_at);
    assert_eq!(loaded.token, post.token);
    assert!(loaded.collectors_only);
    assert_eq!(loaded.metadata, None);
}

#[test_context(PostgresHarness)]
#[tokio::test]
#[ignore = "requires Docker"]
async fn loading_an_unknown_post_is_none(ctx: &PostgresHarness) {
    let store = PostgresPostStore::new(ctx.db_pool.clone());

    assert!(store.load_post(&unique("nope")).await.unwrap().is_none());
}

#[test_context(PostgresHarness)]
#[tokio::test]
#[ignore = "requires Docker"]
async fn save_post_only_overwrites_patched_fields(ctx: &PostgresHarness) {
    let store = PostgresPostStore::new(ctx.db_pool.clone());
    let post = adventure_post(&unique("adv"), 120);
    store.insert_post(&post).await.unwrap();

    let mut data = AdventureData::new("a haunted lighthouse");
    data.chapters.push(Chapter {
        text: "The lamp flickers.".to_string(),
        decisions: ["climb".to_string(), "hide".to_string()],
        chosen: None,
    });
    let patch = PostPatch {
        template_data: Some(TemplateData::Adventure(data.clone())),
        updated_at: Some(post.updated_at + 120),
        metadata: Some(serde_json::json!({ "chapter": 1 })),
        ..Default::default()
    };
    store.save_post(&post.post_id, &patch).await.unwrap();

    let loaded = store.load_post(&post.post_id).await.unwrap().unwrap();
    assert_eq!(loaded.template_data, TemplateData::Adventure(data));
    assert_eq!(loaded.updated_at, post.updated_at + 120);
    assert_eq!(loaded.metadata, Some(serde_json::json!({ "chapter": 1 })));
    assert_eq!(loaded.status, SmartMediaStatus::Active);

    store
        .save_post(&post.post_id, &PostPatch::status(SmartMediaStatus::Failed))
        .await
        .unwrap();
    let loaded = store.load_post(&post.post_id).await.unwrap().unwrap();
    assert_eq!(loaded.status, SmartMediaStatus::Failed);
    assert_eq!(loaded.metadata, Some(serde_json::json!({ "chapter": 1 })));
}

#[test_context(PostgresHarness)]
#[tokio::test]
#[ignore = "requires Docker"]
async fn list_by_status_filters_and_orders_oldest_first(ctx: &PostgresHarness) {
    let store = PostgresPostStore::new(ctx.db_pool.clone());
    let newer = adventure_post(&unique("newer"), 10);
    let older = adventure_post(&unique("older"), 500);
    let failed = with_status(adventure_post(&unique("failed"), 900), SmartMediaStatus::Failed);
    for post in [&newer, &older, &failed] {
        store.insert_post(post).await.unwrap();
    }

    let active: Vec<String> = store
        .list_by_status(SmartMediaStatus::Active)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.post_id)
        .collect();

    let older_at = active.iter().position(|id| *id == older.post_id).unwrap();
    let newer_at = active.iter().position(|id| *id == newer.post_id).unwrap();
    assert!(older_at < newer_at);
    assert!(!active.contains(&failed.post_id));
}

#[test_context(PostgresHarness)]
#[tokio::test]
#[ignore = "requires Docker"]
async fn versions_are_recorded_in_order(ctx: &PostgresHarness) {
    let store = PostgresPostStore::new(ctx.db_pool.clone());
    let post = art_post(&unique("art"), 30);
    store.insert_post(&post).await.unwrap();

    store.record_version(&post.post_id, "ipfs://one").await.unwrap();
    store.record_version(&post.post_id, "ipfs://two").await.unwrap();

    let versions = SmartMediaPost::find_versions(&post.post_id, &ctx.db_pool)
        .await
        .unwrap();
    assert_eq!(versions, vec!["ipfs://one", "ipfs://two"]);
}

#[test_context(PostgresHarness)]
#[tokio::test]
#[ignore = "requires Docker"]
async fn credits_gate_and_decrement(ctx: &PostgresHarness) {
    let credits = PostgresCreditsService::new(ctx.db_pool.clone());
    let account = unique("0xcreator");
    sqlx::query("INSERT INTO creator_credits (account, balance) VALUES (lower($1), 5)")
        .bind(&account)
        .execute(&ctx.db_pool)
        .await
        .unwrap();

    // Lookups ignore address case.
    assert!(credits
        .has_sufficient_credits(&account.to_uppercase())
        .await
        .unwrap());

    credits.decrement_credits(&account, 3).await.unwrap();
    credits.decrement_credits(&account, 10).await.unwrap();

    let balance: i64 =
        sqlx::query_scalar("SELECT balance FROM creator_credits WHERE account = lower($1)")
            .bind(&account)
            .fetch_one(&ctx.db_pool)
            .await
            .unwrap();
    assert_eq!(balance, 0);
    assert!(!credits.has_sufficient_credits(&account).await.unwrap());
}

#[test_context(PostgresHarness)]
#[tokio::test]
#[ignore = "requires Docker"]
async fn accounts_without_a_ledger_row_have_no_credits(ctx: &PostgresHarness) {
    let credits = PostgresCreditsService::new(ctx.db_pool.clone());

    assert!(!credits
        .has_sufficient_credits(&unique("0xnobody"))
        .await
        .unwrap());
}
