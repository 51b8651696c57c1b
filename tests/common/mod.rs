//! Shared fixtures for integration tests
#![allow(dead_code)]

use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use std::time::Duration;

use overwatch::authority::{BriefingSettings, CenterSettings, CommandCenter, WorkerProfile};
use overwatch::router::{LocalRouter, Report, RoutedMessage, RouterError};
use overwatch::store::SqliteRecordStore;

pub const SCOPE: &str = "acme";

pub async fn setup_store() -> Arc<SqliteRecordStore> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");

    let store = SqliteRecordStore::new(pool);
    store.migrate().await.expect("Failed to run migrations");
    Arc::new(store)
}

/// Router with `sales` completing, `content` queueing and `reputation` completing
pub async fn setup_router() -> Arc<LocalRouter> {
    let router = Arc::new(LocalRouter::new(Duration::from_millis(500)));
    router
        .register("sales", |msg: RoutedMessage| async move {
            Ok::<_, RouterError>(Report::completed(json!({ "ack": msg.payload["name"] })))
        })
        .await;
    router
        .register("content", |_msg: RoutedMessage| async move {
            Ok::<_, RouterError>(Report::queued())
        })
        .await;
    router
        .register("reputation", |msg: RoutedMessage| async move {
            Ok::<_, RouterError>(Report::completed(json!({ "ack": msg.payload["name"] })))
        })
        .await;
    router
}

pub fn center_settings(workers: &[&str]) -> CenterSettings {
    CenterSettings {
        scope: SCOPE.to_string(),
        briefing: BriefingSettings {
            workers: workers.iter().map(|w| WorkerProfile::for_worker(w)).collect(),
            ..BriefingSettings::default()
        },
        ..CenterSettings::default()
    }
}

pub async fn setup_center(workers: &[&str]) -> (CommandCenter, Arc<SqliteRecordStore>) {
    let store = setup_store().await;
    let center = CommandCenter::new(store.clone(), setup_router().await, center_settings(workers));
    (center, store)
}
