//! Client application records and the views handed back to callers

use std::fmt;
use std::str::FromStr;

use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub const MAX_NAME_LENGTH: usize = 50;
pub const MAX_DESCRIPTION_LENGTH: usize = 300;

/// Store-assigned identifier: a 12-byte object id rendered as 24 hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AppId(ObjectId);

impl AppId {
    pub fn generate() -> Self {
        AppId(ObjectId::new())
    }

    pub fn from_object_id(oid: ObjectId) -> Self {
        AppId(oid)
    }

    pub fn object_id(&self) -> ObjectId {
        self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }
}

impl FromStr for AppId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ObjectId::parse_str(s)
            .map(AppId)
            .map_err(|_| StoreError::validation("invalid ID"))
    }
}

impl TryFrom<String> for AppId {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AppId> for String {
    fn from(id: AppId) -> Self {
        id.to_hex()
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_hex())
    }
}

/// A registered client application as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientApp {
    pub id: AppId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    pub owner: String,
    pub secret: String,
    #[serde(rename = "registeredAt")]
    pub registered_at: i64,
}

impl ClientApp {
    pub fn view(&self) -> AppView {
        AppView {
            id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
            domain: self.domain.clone(),
            owner: self.owner.clone(),
            registered_at: self.registered_at,
        }
    }
}

/// Everything a store needs to create a record; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewApp {
    pub name: String,
    pub description: Option<String>,
    pub domain: Option<String>,
    pub owner: String,
    pub secret: String,
    pub registered_at: i64,
}

impl NewApp {
    pub fn into_record(self, id: AppId) -> ClientApp {
        ClientApp {
            id,
            name: self.name,
            description: self.description,
            domain: self.domain,
            owner: self.owner,
            secret: self.secret,
            registered_at: self.registered_at,
        }
    }
}

/// Default view of an application. Never carries the secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppView {
    pub id: AppId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    pub owner: String,
    #[serde(rename = "registeredAt")]
    pub registered_at: i64,
}

/// Answer to a successful registration; the only time the plaintext secret is shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredApp {
    pub id: AppId,
    pub secret: String,
}

/// Caller-supplied fields for registration and update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppPayload {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

impl AppPayload {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Checks shape and length limits. Lengths count characters, not bytes.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.name.trim().is_empty() {
            return Err(StoreError::validation("name is required"));
        }
        if self.name.chars().count() > MAX_NAME_LENGTH {
            return Err(StoreError::validation(format!(
                "name must be at most {} characters",
                MAX_NAME_LENGTH
            )));
        }
        if let Some(description) = &self.description {
            if description.chars().count() > MAX_DESCRIPTION_LENGTH {
                return Err(StoreError::validation(format!(
                    "description must be at most {} characters",
                    MAX_DESCRIPTION_LENGTH
                )));
            }
        }
        Ok(())
    }

    /// Empty optional strings are stored as absent.
    pub fn normalized(mut self) -> Self {
        self.description = self.description.filter(|d| !d.is_empty());
        self.domain = self.domain.filter(|d| !d.is_empty());
        self
    }
}
