//! Application registry service
//!
//! Validates payloads, issues secrets and delegates to the injected
//! [`ApplicationStore`]. Every failure comes back as a [`RegistryError`].

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info};

use crate::config::RegistrySettings;
use crate::domain::DomainPolicy;
use crate::error::{RegistryError, RegistryResult, StoreError};
use crate::model::{AppId, AppPayload, AppView, ClientApp, NewApp, RegisteredApp};
use crate::secret::SecretIssuer;
use crate::store::ApplicationStore;

#[derive(Clone)]
pub struct AppRegistry {
    store: Arc<dyn ApplicationStore>,
    secrets: SecretIssuer,
    domain_policy: DomainPolicy,
}

impl AppRegistry {
    pub fn new(store: Arc<dyn ApplicationStore>, settings: &RegistrySettings) -> Self {
        Self::with_dependencies(
            store,
            SecretIssuer::new(settings.secret_policy, settings.secret_length),
            settings.domain_policy,
        )
    }

    pub fn with_dependencies(
        store: Arc<dyn ApplicationStore>,
        secrets: SecretIssuer,
        domain_policy: DomainPolicy,
    ) -> Self {
        Self {
            store,
            secrets,
            domain_policy,
        }
    }

    /// Looks up an app by id.
    pub async fn get_app(&self, app_id: &str) -> RegistryResult<AppView> {
        let id = parse_id(app_id)?;
        let app = self.store.get_app(&id).await.map_err(|e| self.fail("get app", e))?;
        Ok(app.view())
    }

    /// Apps of the calling user, without secrets.
    pub async fn get_my_apps(&self, owner: &str) -> RegistryResult<Vec<AppView>> {
        let owner = require_owner(owner)?;
        let apps = self.list_owned(owner).await?;
        Ok(apps.iter().map(ClientApp::view).collect())
    }

    /// Apps of any user, secrets included. Meant for administrators.
    pub async fn get_user_apps(&self, owner: &str) -> RegistryResult<Vec<ClientApp>> {
        self.list_owned(owner).await
    }

    /// Registers a new app for `owner` and returns its id with the plaintext secret.
    pub async fn register_app(
        &self,
        payload: AppPayload,
        owner: &str,
    ) -> RegistryResult<RegisteredApp> {
        let owner = require_owner(owner)?;
        let payload = payload.normalized();
        payload.validate()?;
        if let Some(domain) = &payload.domain {
            self.domain_policy.check(domain).map_err(StoreError::from)?;
        }

        let secret = self
            .secrets
            .issue()
            .await
            .map_err(|e| self.fail("issue secret", e.into()))?;

        let new_app = NewApp {
            name: payload.name,
            description: payload.description,
            domain: payload.domain,
            owner: owner.to_string(),
            secret: secret.stored,
            registered_at: Utc::now().timestamp(),
        };

        let app = self
            .store
            .insert_app(new_app)
            .await
            .map_err(|e| self.fail("register app", e))?;

        info!(app_id = %app.id, owner = %app.owner, "Registered app {}", app.name);
        Ok(RegisteredApp {
            id: app.id,
            secret: secret.plaintext,
        })
    }

    /// Replaces name, description and domain of an app.
    pub async fn update_app(&self, payload: AppPayload, app_id: &str) -> RegistryResult<AppView> {
        let id = parse_id(app_id)?;
        let payload = payload.normalized();
        payload.validate()?;

        let app = self
            .store
            .update_app(&id, &payload)
            .await
            .map_err(|e| self.fail("update app", e))?;

        info!(app_id = %id, "Updated app {}", app.name);
        Ok(app.view())
    }

    pub async fn delete_app(&self, app_id: &str) -> RegistryResult<()> {
        let id = parse_id(app_id)?;
        self.store
            .delete_app(&id)
            .await
            .map_err(|e| self.fail("delete app", e))?;
        info!(app_id = %id, "Deleted app");
        Ok(())
    }

    /// Issues a new secret. The returned record carries the new plaintext secret.
    pub async fn regenerate_secret(&self, app_id: &str) -> RegistryResult<ClientApp> {
        let id = parse_id(app_id)?;
        let secret = self
            .secrets
            .issue()
            .await
            .map_err(|e| self.fail("issue secret", e.into()))?;

        let mut app = self
            .store
            .replace_secret(&id, &secret.stored)
            .await
            .map_err(|e| self.fail("regenerate secret", e))?;

        info!(app_id = %id, "Regenerated client secret");
        app.secret = secret.plaintext;
        Ok(app)
    }

    /// Returns the app when `secret` matches it, `None` when there is no match.
    ///
    /// Ids that are malformed or unknown never match.
    pub async fn find_app(&self, app_id: &str, secret: &str) -> RegistryResult<Option<ClientApp>> {
        let Ok(id) = app_id.parse::<AppId>() else {
            debug!(app_id, "Malformed app id in verification request");
            return Ok(None);
        };

        let app = match self.store.get_app(&id).await {
            Ok(app) => app,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(self.fail("find app", e)),
        };

        let matched = self
            .secrets
            .verify(secret, &app.secret)
            .await
            .map_err(|e| self.fail("verify secret", e.into()))?;
        if matched {
            Ok(Some(app))
        } else {
            debug!(app_id = %id, "Client secret mismatch");
            Ok(None)
        }
    }

    /// [`find_app`](Self::find_app) with "no match" reported as `NotFound`.
    pub async fn verify_app(&self, app_id: &str, secret: &str) -> RegistryResult<AppView> {
        self.find_app(app_id, secret)
            .await?
            .map(|app| app.view())
            .ok_or_else(|| RegistryError::NotFound("not-found".to_string()))
    }

    async fn list_owned(&self, owner: &str) -> RegistryResult<Vec<ClientApp>> {
        let apps = self
            .store
            .find_by_owner(owner)
            .await
            .map_err(|e| self.fail("list apps", e))?;

        if apps.is_empty() {
            return Err(RegistryError::NotFound("no apps found!".to_string()));
        }
        Ok(apps)
    }

    /// Maps a store failure to its outcome, logging the ones that are our fault.
    fn fail(&self, action: &str, err: StoreError) -> RegistryError {
        let outcome = RegistryError::from(err);
        if let RegistryError::Internal(message) = &outcome {
            error!(backend = self.store.backend(), "Failed to {}: {}", action, message);
        } else {
            debug!("Could not {}: {}", action, outcome);
        }
        outcome
    }
}

fn parse_id(app_id: &str) -> RegistryResult<AppId> {
    Ok(app_id.parse::<AppId>()?)
}

/// The caller's identity must have been established before reaching the registry.
fn require_owner(owner: &str) -> RegistryResult<&str> {
    if owner.is_empty() {
        return Err(RegistryError::Internal("Auth has not been set".to_string()));
    }
    Ok(owner)
}
