//! Persistence contract for client applications and its backends

pub mod filter;
pub mod kv;
pub mod memory;
pub mod mongo;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::StoreSettings;
use crate::error::StoreResult;
use crate::model::{AppId, AppPayload, ClientApp, NewApp};

pub use filter::Filter;
pub use kv::KvStore;
pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// Storage backend for [`ClientApp`] records.
///
/// Implementations must enforce uniqueness of `name`, and of `domain` when
/// present, reporting collisions as `StoreError::AlreadyExists`. Lookups by id
/// report a missing record as `StoreError::NotFound`.
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    async fn get_app(&self, id: &AppId) -> StoreResult<ClientApp>;

    /// All apps of `owner`, ascending by `registered_at` then id. May be empty.
    async fn find_by_owner(&self, owner: &str) -> StoreResult<Vec<ClientApp>>;

    /// Persists a new record under a freshly generated id.
    async fn insert_app(&self, app: NewApp) -> StoreResult<ClientApp>;

    /// Overwrites name, description and domain; other fields are untouched.
    async fn update_app(&self, id: &AppId, changes: &AppPayload) -> StoreResult<ClientApp>;

    async fn delete_app(&self, id: &AppId) -> StoreResult<()>;

    /// Replaces the stored secret and returns the updated record.
    async fn replace_secret(&self, id: &AppId, secret: &str) -> StoreResult<ClientApp>;
}

/// Which [`ApplicationStore`] implementation to open at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Memory,
    Mongo,
    Kv,
}

/// Connects the configured backend and prepares it for use.
pub async fn open_store(settings: &StoreSettings) -> Result<Arc<dyn ApplicationStore>> {
    let store: Arc<dyn ApplicationStore> = match settings.backend {
        Backend::Memory => Arc::new(MemoryStore::new()),
        Backend::Mongo => Arc::new(MongoStore::connect(&settings.mongo).await?),
        Backend::Kv => Arc::new(KvStore::connect(&settings.kv).await?),
    };
    info!(backend = store.backend(), "Application store ready");
    Ok(store)
}

/// Listing order shared by every backend.
pub(crate) fn sort_for_listing(apps: &mut [ClientApp]) {
    apps.sort_by(|a, b| {
        a.registered_at
            .cmp(&b.registered_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(id: &str, registered_at: i64) -> ClientApp {
        ClientApp {
            id: id.parse().unwrap(),
            name: id.to_string(),
            description: None,
            domain: None,
            owner: "owner".to_string(),
            secret: "secret".to_string(),
            registered_at,
        }
    }

    #[test]
    fn test_listing_orders_by_time_then_id() {
        let mut apps = vec![
            app("5975c461f9f8eb02aae053f3", 20),
            app("5975c461f9f8eb02aae053f2", 20),
            app("5975c461f9f8eb02aae053f9", 10),
        ];
        sort_for_listing(&mut apps);

        let ids: Vec<String> = apps.iter().map(|a| a.id.to_hex()).collect();
        assert_eq!(
            ids,
            vec![
                "5975c461f9f8eb02aae053f9",
                "5975c461f9f8eb02aae053f2",
                "5975c461f9f8eb02aae053f3",
            ]
        );
    }
}
