//! MongoDB application store
//!
//! Records live in a single collection keyed by `_id`. Uniqueness of `name`
//! and `domain` is enforced by unique sparse indexes created at connect time.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{ClientOptions, Credential, IndexOptions};
use mongodb::{Client, Collection, IndexModel};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::ApplicationStore;
use crate::config::MongoSettings;
use crate::error::{StoreError, StoreResult};
use crate::model::{AppId, AppPayload, ClientApp, NewApp};

const DUPLICATE_KEY: i32 = 11000;

/// Indexed fields that must be unique when present.
const UNIQUE_FIELDS: [&str; 2] = ["domain", "name"];

/// Collection schema; absent optionals are left out so the sparse indexes skip them.
#[derive(Debug, Serialize, Deserialize)]
struct AppDocument {
    #[serde(rename = "_id")]
    id: ObjectId,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    domain: Option<String>,
    owner: String,
    secret: String,
    #[serde(rename = "registeredAt")]
    registered_at: i64,
}

impl From<AppDocument> for ClientApp {
    fn from(doc: AppDocument) -> Self {
        ClientApp {
            id: AppId::from_object_id(doc.id),
            name: doc.name,
            description: doc.description,
            domain: doc.domain,
            owner: doc.owner,
            secret: doc.secret,
            registered_at: doc.registered_at,
        }
    }
}

impl From<&ClientApp> for AppDocument {
    fn from(app: &ClientApp) -> Self {
        AppDocument {
            id: app.id.object_id(),
            name: app.name.clone(),
            description: app.description.clone(),
            domain: app.domain.clone(),
            owner: app.owner.clone(),
            secret: app.secret.clone(),
            registered_at: app.registered_at,
        }
    }
}

#[derive(Clone)]
pub struct MongoStore {
    collection: Collection<AppDocument>,
}

impl MongoStore {
    /// Connects with the given settings and ensures the unique indexes exist.
    pub async fn connect(settings: &MongoSettings) -> Result<Self> {
        info!(
            "Connecting to MongoDB at {} (database: {}, collection: {})",
            settings.mongo_url, settings.database, settings.collection
        );

        let mut options = ClientOptions::parse(settings.connection_uri())
            .await
            .with_context(|| format!("Invalid MongoDB address: {}", settings.mongo_url))?;
        options.app_name = Some("apps-registry".to_string());
        options.connect_timeout = Some(Duration::from_secs(30));
        options.server_selection_timeout = Some(Duration::from_secs(30));
        if !settings.username.is_empty() {
            options.credential = Some(
                Credential::builder()
                    .username(settings.username.clone())
                    .password(settings.password.clone())
                    .source(settings.database.clone())
                    .build(),
            );
        }

        let client = Client::with_options(options).context("Failed to create MongoDB client")?;
        let collection = client
            .database(&settings.database)
            .collection::<AppDocument>(&settings.collection);

        let store = Self { collection };
        store.prepare().await?;
        Ok(store)
    }

    /// Creates the unique sparse indexes on `name` and `domain`. Idempotent.
    pub async fn prepare(&self) -> Result<()> {
        for field in UNIQUE_FIELDS {
            let mut keys = Document::new();
            keys.insert(field, 1);
            let index = IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().unique(true).sparse(true).build())
                .build();
            self.collection
                .create_index(index)
                .await
                .with_context(|| format!("Failed to ensure unique index on {}", field))?;
            debug!("Ensured unique index on {}", field);
        }
        Ok(())
    }

    async fn fetch(&self, oid: ObjectId) -> StoreResult<Option<ClientApp>> {
        let found = self
            .collection
            .find_one(doc! { "_id": oid })
            .await
            .map_err(StoreError::backend)?;
        Ok(found.map(ClientApp::from))
    }
}

/// Classifies a write failure, turning duplicate-key errors into `AlreadyExists`.
fn write_error(err: mongodb::error::Error) -> StoreError {
    let duplicate = match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY,
        ErrorKind::Command(e) => e.code == DUPLICATE_KEY,
        _ => false,
    };

    if duplicate {
        let message = err.to_string();
        let field = UNIQUE_FIELDS
            .into_iter()
            .find(|f| message.contains(&format!("{}_1", f)))
            .unwrap_or("name");
        StoreError::AlreadyExists { field }
    } else {
        StoreError::backend(err)
    }
}

/// `$set` for present optionals, `$unset` for absent ones.
fn update_document(changes: &AppPayload) -> Document {
    let mut set = doc! { "name": changes.name.as_str() };
    let mut unset = Document::new();

    match &changes.description {
        Some(description) => set.insert("description", description.as_str()),
        None => unset.insert("description", ""),
    };
    match &changes.domain {
        Some(domain) => set.insert("domain", domain.as_str()),
        None => unset.insert("domain", ""),
    };

    let mut update = doc! { "$set": set };
    if !unset.is_empty() {
        update.insert("$unset", unset);
    }
    update
}

#[async_trait]
impl ApplicationStore for MongoStore {
    fn backend(&self) -> &'static str {
        "mongo"
    }

    async fn get_app(&self, id: &AppId) -> StoreResult<ClientApp> {
        debug!(%id, "Fetching app from MongoDB");
        self.fetch(id.object_id())
            .await?
            .ok_or_else(|| StoreError::not_found("app not found."))
    }

    async fn find_by_owner(&self, owner: &str) -> StoreResult<Vec<ClientApp>> {
        let cursor = self
            .collection
            .find(doc! { "owner": owner })
            .sort(doc! { "registeredAt": 1, "_id": 1 })
            .await
            .map_err(StoreError::backend)?;

        let docs: Vec<AppDocument> = cursor.try_collect().await.map_err(StoreError::backend)?;
        debug!(owner, count = docs.len(), "Listed apps from MongoDB");
        Ok(docs.into_iter().map(ClientApp::from).collect())
    }

    async fn insert_app(&self, app: NewApp) -> StoreResult<ClientApp> {
        let record = app.into_record(AppId::generate());
        self.collection
            .insert_one(AppDocument::from(&record))
            .await
            .map_err(write_error)?;
        Ok(record)
    }

    async fn update_app(&self, id: &AppId, changes: &AppPayload) -> StoreResult<ClientApp> {
        let oid = id.object_id();
        let result = self
            .collection
            .update_one(doc! { "_id": oid }, update_document(changes))
            .await
            .map_err(write_error)?;

        if result.matched_count == 0 {
            return Err(StoreError::not_found("application not found."));
        }

        self.fetch(oid)
            .await?
            .ok_or_else(|| StoreError::not_found("application not found."))
    }

    async fn delete_app(&self, id: &AppId) -> StoreResult<()> {
        let result = self
            .collection
            .delete_one(doc! { "_id": id.object_id() })
            .await
            .map_err(StoreError::backend)?;

        if result.deleted_count == 0 {
            return Err(StoreError::not_found("no apps found!"));
        }
        Ok(())
    }

    async fn replace_secret(&self, id: &AppId, secret: &str) -> StoreResult<ClientApp> {
        let oid = id.object_id();
        let result = self
            .collection
            .update_one(doc! { "_id": oid }, doc! { "$set": { "secret": secret } })
            .await
            .map_err(StoreError::backend)?;

        if result.matched_count == 0 {
            return Err(StoreError::not_found("application not found"));
        }

        self.fetch(oid)
            .await?
            .ok_or_else(|| StoreError::not_found("application not found"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_document_unsets_absent_fields() {
        let update = update_document(&AppPayload::new("renamed"));
        assert_eq!(
            update,
            doc! {
                "$set": { "name": "renamed" },
                "$unset": { "description": "", "domain": "" },
            }
        );
    }

    #[test]
    fn test_update_document_sets_present_fields() {
        let update = update_document(
            &AppPayload::new("renamed")
                .with_description("desc")
                .with_domain("example.com"),
        );
        assert_eq!(
            update,
            doc! {
                "$set": { "name": "renamed", "description": "desc", "domain": "example.com" },
            }
        );
    }

    #[test]
    fn test_document_omits_absent_optionals() {
        let app = NewApp {
            name: "app".to_string(),
            description: None,
            domain: None,
            owner: "u1".to_string(),
            secret: "s".to_string(),
            registered_at: 7,
        }
        .into_record(AppId::generate());

        let bson = mongodb::bson::to_document(&AppDocument::from(&app)).unwrap();
        assert!(!bson.contains_key("domain"));
        assert!(!bson.contains_key("description"));
        assert_eq!(bson.get_i64("registeredAt").unwrap(), 7);
        let decoded: AppDocument = mongodb::bson::from_document(bson).unwrap();
        assert_eq!(ClientApp::from(decoded), app);
    }
}
