//! In-process application store
//!
//! Every operation takes the same mutex, so calls are applied one at a time.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::filter::Filter;
use super::{sort_for_listing, ApplicationStore};
use crate::error::{StoreError, StoreResult};
use crate::model::{AppId, AppPayload, ClientApp, NewApp};

#[derive(Debug, Default)]
pub struct MemoryStore {
    apps: Mutex<HashMap<AppId, ClientApp>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store with existing records, keyed by their ids.
    pub fn with_apps(apps: impl IntoIterator<Item = ClientApp>) -> Self {
        let apps = apps.into_iter().map(|app| (app.id, app)).collect();
        Self {
            apps: Mutex::new(apps),
        }
    }

    pub async fn len(&self) -> usize {
        self.apps.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.apps.lock().await.is_empty()
    }
}

/// Fails with `AlreadyExists` when another record already holds `name` or `domain`.
fn ensure_unique(
    apps: &HashMap<AppId, ClientApp>,
    name: &str,
    domain: Option<&str>,
    exclude: Option<&AppId>,
) -> StoreResult<()> {
    let mut checks = vec![("name", Filter::new().eq("name", name))];
    if let Some(domain) = domain {
        checks.push(("domain", Filter::new().eq("domain", domain)));
    }

    for (field, filter) in checks {
        for app in apps.values() {
            if exclude == Some(&app.id) {
                continue;
            }
            if filter.matches_record(app)? {
                return Err(StoreError::AlreadyExists { field });
            }
        }
    }
    Ok(())
}

fn app_not_found() -> StoreError {
    StoreError::not_found("app not found")
}

#[async_trait]
impl ApplicationStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get_app(&self, id: &AppId) -> StoreResult<ClientApp> {
        debug!(%id, "Fetching app from memory store");
        self.apps
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(app_not_found)
    }

    async fn find_by_owner(&self, owner: &str) -> StoreResult<Vec<ClientApp>> {
        let filter = Filter::new().eq("owner", owner);
        let guard = self.apps.lock().await;

        let mut apps = Vec::new();
        for app in guard.values() {
            if filter.matches_record(app)? {
                apps.push(app.clone());
            }
        }
        drop(guard);

        sort_for_listing(&mut apps);
        debug!(owner, count = apps.len(), "Listed apps from memory store");
        Ok(apps)
    }

    async fn insert_app(&self, app: NewApp) -> StoreResult<ClientApp> {
        let mut guard = self.apps.lock().await;
        ensure_unique(&guard, &app.name, app.domain.as_deref(), None)?;

        let mut id = AppId::generate();
        while guard.contains_key(&id) {
            id = AppId::generate();
        }

        let record = app.into_record(id);
        guard.insert(id, record.clone());
        Ok(record)
    }

    async fn update_app(&self, id: &AppId, changes: &AppPayload) -> StoreResult<ClientApp> {
        let mut guard = self.apps.lock().await;
        if !guard.contains_key(id) {
            return Err(StoreError::not_found("application not found."));
        }
        ensure_unique(&guard, &changes.name, changes.domain.as_deref(), Some(id))?;

        let record = guard
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("application not found."))?;
        record.name = changes.name.clone();
        record.description = changes.description.clone();
        record.domain = changes.domain.clone();
        Ok(record.clone())
    }

    async fn delete_app(&self, id: &AppId) -> StoreResult<()> {
        match self.apps.lock().await.remove(id) {
            Some(_) => Ok(()),
            None => Err(StoreError::not_found("no apps found!")),
        }
    }

    async fn replace_secret(&self, id: &AppId, secret: &str) -> StoreResult<ClientApp> {
        let mut guard = self.apps.lock().await;
        let record = guard
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("application not found"))?;
        record.secret = secret.to_string();
        Ok(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_app(name: &str, owner: &str, registered_at: i64) -> NewApp {
        NewApp {
            name: name.to_string(),
            description: None,
            domain: Some(format!("{}.example.com", name)),
            owner: owner.to_string(),
            secret: "secret".to_string(),
            registered_at,
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_id_and_keeps_fields() {
        let store = MemoryStore::new();
        let app = store.insert_app(new_app("alpha", "u1", 100)).await.unwrap();

        let fetched = store.get_app(&app.id).await.unwrap();
        assert_eq!(fetched, app);
        assert_eq!(fetched.registered_at, 100);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_duplicate_name_and_domain_rejected() {
        let store = MemoryStore::new();
        store.insert_app(new_app("alpha", "u1", 1)).await.unwrap();

        let err = store.insert_app(new_app("alpha", "u2", 2)).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { field: "name" }));

        let mut same_domain = new_app("beta", "u2", 2);
        same_domain.domain = Some("alpha.example.com".to_string());
        let err = store.insert_app(same_domain).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { field: "domain" }));
    }

    #[tokio::test]
    async fn test_absent_domains_do_not_collide() {
        let store = MemoryStore::new();
        let mut a = new_app("a", "u1", 1);
        a.domain = None;
        let mut b = new_app("b", "u1", 2);
        b.domain = None;

        store.insert_app(a).await.unwrap();
        store.insert_app(b).await.unwrap();
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_update_may_keep_own_name() {
        let store = MemoryStore::new();
        let app = store.insert_app(new_app("alpha", "u1", 1)).await.unwrap();

        let changes = AppPayload::new("alpha").with_description("now described");
        let updated = store.update_app(&app.id, &changes).await.unwrap();
        assert_eq!(updated.description.as_deref(), Some("now described"));
        assert_eq!(updated.domain, None);
        assert_eq!(updated.secret, app.secret);
    }

    #[tokio::test]
    async fn test_missing_ids_are_not_found() {
        let store = MemoryStore::new();
        let id = AppId::generate();

        assert!(store.get_app(&id).await.unwrap_err().is_not_found());
        assert!(store.delete_app(&id).await.unwrap_err().is_not_found());
        assert!(store
            .replace_secret(&id, "x")
            .await
            .unwrap_err()
            .is_not_found());
        assert!(store
            .update_app(&id, &AppPayload::new("x"))
            .await
            .unwrap_err()
            .is_not_found());
    }
}
