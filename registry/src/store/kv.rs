//! JetStream KV application store
//!
//! Key layout:
//! - `apps.<id>` holds the JSON record
//! - `names.<sha256(name)>` and `domains.<sha256(domain)>` are claim keys
//!   whose value is the owning app id
//!
//! Claim keys are written with create-if-absent, which makes the uniqueness
//! check atomic across writers. Listing scans `apps.` keys through a [`Filter`].

use anyhow::Result;
use async_nats::jetstream::{
    self,
    kv::{Operation, Store},
};
use async_trait::async_trait;
use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::filter::Filter;
use super::{sort_for_listing, ApplicationStore};
use crate::config::KvSettings;
use crate::error::{StoreError, StoreResult};
use crate::model::{AppId, AppPayload, ClientApp, NewApp};

const APP_PREFIX: &str = "apps.";
const CREATE_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct KvStore {
    kv_store: Store,
}

fn app_key(id: &AppId) -> String {
    format!("{}{}", APP_PREFIX, id)
}

fn claim_key(field: &str, value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    format!("{}s.{}", field, hex::encode(digest))
}

/// Revision a create must be written against, or `None` while the key holds a live value.
fn vacant_revision(operation: &Operation, revision: u64) -> Option<u64> {
    match operation {
        Operation::Put => None,
        Operation::Delete | Operation::Purge => Some(revision),
    }
}

/// A claim already held by `id` itself is not a conflict.
fn claim_outcome(field: &'static str, holder: &[u8], id: &AppId) -> StoreResult<()> {
    if holder == id.to_hex().as_bytes() {
        Ok(())
    } else {
        Err(StoreError::AlreadyExists { field })
    }
}

impl KvStore {
    /// Connects to NATS and opens (or creates) the configured bucket.
    pub async fn connect(settings: &KvSettings) -> Result<Self> {
        info!(
            "Connecting to NATS at {} for KV operations (bucket: {})",
            settings.nats_url, settings.bucket
        );

        let client = if let Some(creds_path) = &settings.nats_creds_path {
            info!("Using credentials file: {}", creds_path);
            async_nats::ConnectOptions::new()
                .credentials_file(creds_path)
                .await?
                .connect(&settings.nats_url)
                .await?
        } else {
            warn!("No NATS credentials provided, connecting without auth");
            async_nats::connect(&settings.nats_url).await?
        };

        let jetstream = jetstream::new(client);

        let kv_store = match jetstream.get_key_value(&settings.bucket).await {
            Ok(store) => {
                info!("Using existing KV bucket: {}", settings.bucket);
                store
            }
            Err(_) => {
                info!("Creating new KV bucket: {}", settings.bucket);
                let config = jetstream::kv::Config {
                    bucket: settings.bucket.clone(),
                    description: "Client application registry".to_string(),
                    ..Default::default()
                };
                jetstream.create_key_value(config).await?
            }
        };

        Ok(Self { kv_store })
    }

    /// Reads a record together with its revision.
    async fn load(&self, id: &AppId) -> StoreResult<Option<(ClientApp, u64)>> {
        let key = app_key(id);
        let entry = self
            .kv_store
            .entry(&key)
            .await
            .map_err(StoreError::backend)?;

        match entry {
            Some(entry) if matches!(entry.operation, Operation::Put) => {
                let app = serde_json::from_slice::<ClientApp>(&entry.value)?;
                Ok(Some((app, entry.revision)))
            }
            _ => Ok(None),
        }
    }

    async fn save(&self, app: &ClientApp, revision: u64) -> StoreResult<()> {
        let value = serde_json::to_vec(app)?;
        self.kv_store
            .update(app_key(&app.id), value.into(), revision)
            .await
            .map_err(StoreError::backend)?;
        Ok(())
    }

    /// Writes `value` under `key` unless a live value is already there.
    ///
    /// Returns the live value when the key is taken. Deleted and purged keys
    /// count as absent and are overwritten against their tombstone revision.
    async fn create_if_absent(&self, key: &str, value: Vec<u8>) -> StoreResult<Option<Vec<u8>>> {
        let mut expected = 0;
        for _ in 0..CREATE_ATTEMPTS {
            let err = match self.kv_store.update(key, value.clone().into(), expected).await {
                Ok(_) => return Ok(None),
                Err(err) => err,
            };

            let Some(entry) = self.kv_store.entry(key).await.map_err(StoreError::backend)? else {
                return Err(StoreError::backend(err));
            };
            match vacant_revision(&entry.operation, entry.revision) {
                None => return Ok(Some(entry.value.to_vec())),
                Some(revision) => {
                    debug!(key, revision, "Key was written concurrently, retrying");
                    expected = revision;
                }
            }
        }

        Err(StoreError::backend(format!(
            "gave up writing {} after {} attempts",
            key, CREATE_ATTEMPTS
        )))
    }

    /// Reserves `value` for `id`. Fails with `AlreadyExists` if another app holds it.
    async fn claim(&self, field: &'static str, value: &str, id: &AppId) -> StoreResult<()> {
        let key = claim_key(field, value);
        match self.create_if_absent(&key, id.to_hex().into_bytes()).await? {
            None => Ok(()),
            Some(holder) => claim_outcome(field, &holder, id),
        }
    }

    async fn release(&self, field: &str, value: &str) {
        let key = claim_key(field, value);
        if let Err(e) = self.kv_store.delete(&key).await {
            warn!("Failed to release claim key {}: {}", key, e);
        }
    }

    async fn release_claims(&self, name: Option<&str>, domain: Option<&str>) {
        if let Some(name) = name {
            self.release("name", name).await;
        }
        if let Some(domain) = domain {
            self.release("domain", domain).await;
        }
    }

    /// Claims name and domain, releasing whatever was claimed if a later step fails.
    async fn claim_all(&self, name: &str, domain: Option<&str>, id: &AppId) -> StoreResult<()> {
        self.claim("name", name, id).await?;
        if let Some(domain) = domain {
            if let Err(e) = self.claim("domain", domain, id).await {
                self.release("name", name).await;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Records matching `filter` among all `apps.` entries.
    pub async fn scan(&self, filter: &Filter) -> StoreResult<Vec<ClientApp>> {
        let mut apps = Vec::new();
        let mut keys = self
            .kv_store
            .keys()
            .await
            .map_err(StoreError::backend)?
            .boxed();

        while let Some(key_result) = keys.next().await {
            let key = key_result.map_err(StoreError::backend)?;
            if !key.starts_with(APP_PREFIX) {
                continue;
            }
            let Some(bytes) = self.kv_store.get(&key).await.map_err(StoreError::backend)? else {
                continue;
            };
            let doc = match serde_json::from_slice::<serde_json::Value>(&bytes) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!("Failed to parse app record for key {}: {}", key, e);
                    continue;
                }
            };
            if filter.matches(&doc) {
                apps.push(serde_json::from_value::<ClientApp>(doc)?);
            }
        }

        Ok(apps)
    }
}

#[async_trait]
impl ApplicationStore for KvStore {
    fn backend(&self) -> &'static str {
        "kv"
    }

    async fn get_app(&self, id: &AppId) -> StoreResult<ClientApp> {
        debug!("Fetching app from KV: {}", app_key(id));
        self.load(id)
            .await?
            .map(|(app, _)| app)
            .ok_or_else(|| StoreError::not_found("app not found."))
    }

    async fn find_by_owner(&self, owner: &str) -> StoreResult<Vec<ClientApp>> {
        let mut apps = self.scan(&Filter::new().eq("owner", owner)).await?;
        sort_for_listing(&mut apps);
        debug!(owner, count = apps.len(), "Listed apps from KV");
        Ok(apps)
    }

    async fn insert_app(&self, app: NewApp) -> StoreResult<ClientApp> {
        let record = app.into_record(AppId::generate());
        self.claim_all(&record.name, record.domain.as_deref(), &record.id)
            .await?;

        let value = serde_json::to_vec(&record)?;
        let written = match self.create_if_absent(&app_key(&record.id), value).await {
            Ok(None) => Ok(()),
            Ok(Some(_)) => Err(StoreError::backend(format!(
                "record {} already exists",
                record.id
            ))),
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            self.release_claims(Some(&record.name), record.domain.as_deref()).await;
            return Err(e);
        }

        Ok(record)
    }

    async fn update_app(&self, id: &AppId, changes: &AppPayload) -> StoreResult<ClientApp> {
        let (app, revision) = self
            .load(id)
            .await?
            .ok_or_else(|| StoreError::not_found("application not found."))?;

        let new_name = Some(changes.name.as_str()).filter(|n| *n != app.name);
        let new_domain = changes.domain.as_deref().filter(|d| app.domain.as_deref() != Some(*d));
        if let Some(name) = new_name {
            self.claim("name", name, id).await?;
        }
        if let Some(domain) = new_domain {
            if let Err(e) = self.claim("domain", domain, id).await {
                if let Some(name) = new_name {
                    self.release("name", name).await;
                }
                return Err(e);
            }
        }

        let mut updated = app.clone();
        updated.name = changes.name.clone();
        updated.description = changes.description.clone();
        updated.domain = changes.domain.clone();
        if let Err(e) = self.save(&updated, revision).await {
            self.release_claims(new_name, new_domain).await;
            return Err(e);
        }

        let stale_name = Some(app.name.as_str()).filter(|n| *n != updated.name);
        let stale_domain = app.domain.as_deref().filter(|d| updated.domain.as_deref() != Some(*d));
        self.release_claims(stale_name, stale_domain).await;

        Ok(updated)
    }

    async fn delete_app(&self, id: &AppId) -> StoreResult<()> {
        let (app, _) = self
            .load(id)
            .await?
            .ok_or_else(|| StoreError::not_found("no apps found!"))?;

        self.kv_store
            .delete(app_key(id))
            .await
            .map_err(StoreError::backend)?;
        self.release_claims(Some(&app.name), app.domain.as_deref()).await;

        info!("Deleted app {}", id);
        Ok(())
    }

    async fn replace_secret(&self, id: &AppId, secret: &str) -> StoreResult<ClientApp> {
        let (mut app, revision) = self
            .load(id)
            .await?
            .ok_or_else(|| StoreError::not_found("application not found"))?;

        app.secret = secret.to_string();
        self.save(&app, revision).await?;
        Ok(app)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_keys_are_valid_kv_keys() {
        let key = claim_key("name", "My App / with spaces");
        assert!(key.starts_with("names."));
        assert_eq!(key.len(), "names.".len() + 64);
        assert!(key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.'));
    }

    #[test]
    fn test_claim_keys_distinguish_fields() {
        assert_ne!(claim_key("name", "x"), claim_key("domain", "x"));
        assert_eq!(claim_key("domain", "x"), claim_key("domain", "x"));
    }

    #[test]
    fn test_live_key_is_not_vacant() {
        assert_eq!(vacant_revision(&Operation::Put, 7), None);
    }

    #[test]
    fn test_released_claim_can_be_taken_again() {
        // delete and purge leave a tombstone that the next create overwrites
        assert_eq!(vacant_revision(&Operation::Delete, 12), Some(12));
        assert_eq!(vacant_revision(&Operation::Purge, 13), Some(13));
    }

    #[test]
    fn test_claim_held_by_same_app_is_not_a_conflict() {
        let id: AppId = "5975c461f9f8eb02aae053f3".parse().unwrap();
        assert!(claim_outcome("name", id.to_hex().as_bytes(), &id).is_ok());
    }

    #[test]
    fn test_claim_held_by_other_app_reports_field() {
        let id: AppId = "5975c461f9f8eb02aae053f3".parse().unwrap();
        let other = AppId::generate();

        let err = claim_outcome("domain", other.to_hex().as_bytes(), &id).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { field: "domain" }));
    }

    #[test]
    fn test_app_key_uses_hex_id() {
        let id: AppId = "5975c461f9f8eb02aae053f3".parse().unwrap();
        assert_eq!(app_key(&id), "apps.5975c461f9f8eb02aae053f3");
    }
}
