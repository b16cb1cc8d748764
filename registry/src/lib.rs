//! Client Application Registry
//!
//! Registers OAuth-style client applications, issues and verifies their
//! secrets, and persists them through a pluggable [`ApplicationStore`]
//! (in-memory, MongoDB, or NATS JetStream KV).

pub mod config;
pub mod domain;
pub mod error;
pub mod model;
pub mod secret;
pub mod service;
pub mod store;

use anyhow::Result;
use tracing::info;

pub use config::{KvSettings, MongoSettings, RegistrySettings, StoreSettings};
pub use error::{RegistryError, RegistryResult, StoreError, StoreResult};
pub use model::{AppId, AppPayload, AppView, ClientApp, NewApp, RegisteredApp};
pub use service::AppRegistry;
pub use store::{ApplicationStore, Backend};

/// Opens the configured store and builds a registry on top of it.
pub async fn build_registry(
    store_settings: &StoreSettings,
    registry_settings: &RegistrySettings,
) -> Result<AppRegistry> {
    let store = store::open_store(store_settings).await?;
    info!(
        secret_policy = ?registry_settings.secret_policy,
        domain_policy = ?registry_settings.domain_policy,
        "Initialized application registry"
    );
    Ok(AppRegistry::new(store, registry_settings))
}
