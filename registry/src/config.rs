//! Configuration for the application registry
//!
//! Every setting can come from a command-line flag or its environment variable.

use clap::Args;

use crate::domain::DomainPolicy;
use crate::secret::{SecretPolicy, DEFAULT_SECRET_LENGTH, MIN_SECRET_LENGTH};
use crate::store::Backend;

/// Backend selection plus the connection settings of every backend.
#[derive(Debug, Clone, Args)]
pub struct StoreSettings {
    /// Storage backend for application records
    #[arg(long, env = "APPS_BACKEND", value_enum, default_value_t = Backend::Memory)]
    pub backend: Backend,

    #[command(flatten)]
    pub mongo: MongoSettings,

    #[command(flatten)]
    pub kv: KvSettings,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: Backend::Memory,
            mongo: MongoSettings::default(),
            kv: KvSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct MongoSettings {
    /// MongoDB host (with or without the mongodb:// scheme)
    #[arg(long, env = "MONGO_URL", default_value = "127.0.0.1:27017")]
    pub mongo_url: String,

    /// MongoDB user
    #[arg(long = "mongo-username", env = "MS_USERNAME", default_value = "restapi")]
    pub username: String,

    /// MongoDB password
    #[arg(
        long = "mongo-password",
        env = "MS_PASSWORD",
        default_value = "restapi",
        hide_env_values = true
    )]
    pub password: String,

    /// MongoDB database name
    #[arg(long = "mongo-database", env = "MS_DBNAME", default_value = "apps-management")]
    pub database: String,

    /// Collection holding application records
    #[arg(long = "mongo-collection", env = "MONGO_COLLECTION", default_value = "apps")]
    pub collection: String,
}

impl MongoSettings {
    /// Connection string for the driver.
    pub fn connection_uri(&self) -> String {
        if self.mongo_url.starts_with("mongodb://") || self.mongo_url.starts_with("mongodb+srv://")
        {
            self.mongo_url.clone()
        } else {
            format!("mongodb://{}", self.mongo_url)
        }
    }
}

impl Default for MongoSettings {
    fn default() -> Self {
        Self {
            mongo_url: "127.0.0.1:27017".to_string(),
            username: "restapi".to_string(),
            password: "restapi".to_string(),
            database: "apps-management".to_string(),
            collection: "apps".to_string(),
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct KvSettings {
    /// NATS server URL
    #[arg(long, env = "NATS_URL", default_value = "nats://127.0.0.1:4222")]
    pub nats_url: String,

    /// Path to NATS credentials file
    #[arg(long, env = "NATS_CREDS_PATH")]
    pub nats_creds_path: Option<String>,

    /// JetStream KV bucket for application records
    #[arg(long = "kv-bucket", env = "APPS_KV_BUCKET", default_value = "apps")]
    pub bucket: String,
}

impl Default for KvSettings {
    fn default() -> Self {
        Self {
            nats_url: "nats://127.0.0.1:4222".to_string(),
            nats_creds_path: None,
            bucket: "apps".to_string(),
        }
    }
}

/// Policies the registry service applies on top of the store.
#[derive(Debug, Clone, Args)]
pub struct RegistrySettings {
    /// How client secrets are kept at rest
    #[arg(long, env = "SECRET_POLICY", value_enum, default_value_t = SecretPolicy::Plaintext)]
    pub secret_policy: SecretPolicy,

    /// Bytes of entropy in each issued secret
    #[arg(
        long,
        env = "SECRET_LENGTH",
        default_value_t = DEFAULT_SECRET_LENGTH,
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(MIN_SECRET_LENGTH as u64..)
    )]
    pub secret_length: usize,

    /// Whether the domain is validated at registration
    #[arg(long, env = "DOMAIN_POLICY", value_enum, default_value_t = DomainPolicy::Strict)]
    pub domain_policy: DomainPolicy,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            secret_policy: SecretPolicy::Plaintext,
            secret_length: DEFAULT_SECRET_LENGTH,
            domain_policy: DomainPolicy::Strict,
        }
    }
}
