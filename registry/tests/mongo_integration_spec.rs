//! Integration tests for the MongoDB application store
//!
//! These tests require a running MongoDB server.
//! Run with: MONGO_URL=127.0.0.1:27017 MS_USERNAME= cargo test -p apps-registry -- --ignored

use anyhow::Result;
use apps_registry::model::NewApp;
use apps_registry::store::MongoStore;
use apps_registry::{AppId, AppPayload, ApplicationStore, MongoSettings, StoreError};

async fn new_isolated_store() -> Result<MongoStore> {
    let defaults = MongoSettings::default();
    let settings = MongoSettings {
        mongo_url: std::env::var("MONGO_URL").unwrap_or(defaults.mongo_url),
        username: std::env::var("MS_USERNAME").unwrap_or(defaults.username),
        password: std::env::var("MS_PASSWORD").unwrap_or(defaults.password),
        database: std::env::var("MS_DBNAME").unwrap_or(defaults.database),
        collection: format!("apps_test_{}", uuid::Uuid::new_v4()),
    };

    Ok(MongoStore::connect(&settings).await?)
}

fn new_app(name: &str, domain: Option<&str>, registered_at: i64) -> NewApp {
    NewApp {
        name: name.to_string(),
        description: None,
        domain: domain.map(str::to_string),
        owner: "user-1".to_string(),
        secret: "s3cr3t".to_string(),
        registered_at,
    }
}

#[tokio::test]
#[ignore] // Requires MongoDB running
async fn given_inserted_app_when_retrieved_then_data_matches() -> Result<()> {
    // Arrange
    let store = new_isolated_store().await?;

    // Act
    let inserted = store.insert_app(new_app("mongo-app", Some("example.com"), 10)).await?;
    let retrieved = store.get_app(&inserted.id).await?;

    // Assert
    assert_eq!(retrieved, inserted);
    Ok(())
}

#[tokio::test]
#[ignore] // Requires MongoDB running
async fn given_prepared_collection_when_preparing_again_then_succeeds() -> Result<()> {
    let store = new_isolated_store().await?;

    store.prepare().await?;

    Ok(())
}

#[tokio::test]
#[ignore] // Requires MongoDB running
async fn given_unique_indexes_when_inserting_duplicates_then_already_exists() -> Result<()> {
    let store = new_isolated_store().await?;
    store.insert_app(new_app("dup", Some("example.com"), 10)).await?;

    let by_name = store.insert_app(new_app("dup", None, 11)).await.unwrap_err();
    let by_domain = store
        .insert_app(new_app("fresh", Some("example.com"), 12))
        .await
        .unwrap_err();

    assert!(matches!(by_name, StoreError::AlreadyExists { field: "name" }));
    assert!(matches!(by_domain, StoreError::AlreadyExists { field: "domain" }));
    Ok(())
}

#[tokio::test]
#[ignore] // Requires MongoDB running
async fn given_apps_without_domain_when_inserting_then_sparse_index_allows_them() -> Result<()> {
    let store = new_isolated_store().await?;

    store.insert_app(new_app("first", None, 10)).await?;
    store.insert_app(new_app("second", None, 11)).await?;

    let apps = store.find_by_owner("user-1").await?;
    let names: Vec<&str> = apps.iter().map(|app| app.name.as_str()).collect();
    assert_eq!(names, vec!["first", "second"]);
    Ok(())
}

#[tokio::test]
#[ignore] // Requires MongoDB running
async fn given_update_without_domain_when_applied_then_domain_is_removed() -> Result<()> {
    let store = new_isolated_store().await?;
    let app = store.insert_app(new_app("app", Some("example.com"), 10)).await?;

    let updated = store
        .update_app(&app.id, &AppPayload::new("renamed").with_description("desc"))
        .await?;

    assert_eq!(updated.name, "renamed");
    assert_eq!(updated.domain, None);
    assert_eq!(updated.secret, app.secret);
    assert_eq!(updated.registered_at, app.registered_at);
    Ok(())
}

#[tokio::test]
#[ignore] // Requires MongoDB running
async fn given_unknown_id_when_mutating_then_not_found() -> Result<()> {
    let store = new_isolated_store().await?;
    let id = AppId::generate();

    assert!(store.get_app(&id).await.unwrap_err().is_not_found());
    assert!(store
        .update_app(&id, &AppPayload::new("x"))
        .await
        .unwrap_err()
        .is_not_found());
    assert!(store.delete_app(&id).await.unwrap_err().is_not_found());
    assert!(store.replace_secret(&id, "x").await.unwrap_err().is_not_found());
    Ok(())
}
