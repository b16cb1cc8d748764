//! Client secret issuance and verification
//!
//! Secrets are URL-safe base64 strings built from OS entropy. How they are
//! kept at rest is decided once per deployment by [`SecretPolicy`].

use argon2::password_hash::{rand_core::OsRng as SaltRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use clap::ValueEnum;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Bytes of entropy in a freshly issued client secret.
pub const DEFAULT_SECRET_LENGTH: usize = 42;

/// Shortest secret the issuer will hand out, in bytes of entropy.
pub const MIN_SECRET_LENGTH: usize = 16;

#[derive(Error, Debug)]
pub enum SecretError {
    #[error("Random source failed: {message}")]
    RandomSource { message: String },

    #[error("Secret hashing failed: {message}")]
    Hashing { message: String },

    #[error("Secret task failed: {message}")]
    Task { message: String },
}

/// Returns `n` bytes from the operating system's secure random source.
pub fn generate_random_bytes(n: usize) -> Result<Vec<u8>, SecretError> {
    let mut bytes = vec![0u8; n];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| SecretError::RandomSource {
            message: e.to_string(),
        })?;
    Ok(bytes)
}

/// Returns the URL-safe base64 encoding of `n` random bytes.
pub fn generate_random_string(n: usize) -> Result<String, SecretError> {
    let bytes = generate_random_bytes(n)?;
    Ok(URL_SAFE.encode(bytes))
}

/// How a client secret is kept in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SecretPolicy {
    /// Stored as issued.
    #[default]
    Plaintext,
    /// Stored as an Argon2id PHC string; the plaintext is only ever handed back once.
    Hashed,
}

impl SecretPolicy {
    /// Turns an issued secret into the value that gets persisted.
    pub fn seal(&self, secret: &str) -> Result<String, SecretError> {
        match self {
            SecretPolicy::Plaintext => Ok(secret.to_string()),
            SecretPolicy::Hashed => {
                let salt = SaltString::generate(&mut SaltRng);
                Argon2::default()
                    .hash_password(secret.as_bytes(), &salt)
                    .map(|hash| hash.to_string())
                    .map_err(|e| SecretError::Hashing {
                        message: e.to_string(),
                    })
            }
        }
    }

    /// Checks a presented secret against the persisted value.
    ///
    /// A stored value that cannot be parsed under the hashed policy never matches.
    pub fn verify(&self, presented: &str, stored: &str) -> bool {
        match self {
            SecretPolicy::Plaintext => presented.as_bytes().ct_eq(stored.as_bytes()).into(),
            SecretPolicy::Hashed => match PasswordHash::new(stored) {
                Ok(parsed) => Argon2::default()
                    .verify_password(presented.as_bytes(), &parsed)
                    .is_ok(),
                Err(_) => false,
            },
        }
    }
}

/// Issues client secrets and seals them according to the configured policy.
#[derive(Debug, Clone, Copy)]
pub struct SecretIssuer {
    policy: SecretPolicy,
    length: usize,
}

/// A freshly issued secret: `plaintext` goes back to the caller, `stored` to the store.
pub struct IssuedSecret {
    pub plaintext: String,
    pub stored: String,
}

impl SecretIssuer {
    /// Lengths below [`MIN_SECRET_LENGTH`] are raised to it.
    pub fn new(policy: SecretPolicy, length: usize) -> Self {
        Self {
            policy,
            length: length.max(MIN_SECRET_LENGTH),
        }
    }

    pub fn policy(&self) -> SecretPolicy {
        self.policy
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Draws a new secret and seals it. Hashing runs on the blocking pool.
    pub async fn issue(&self) -> Result<IssuedSecret, SecretError> {
        let plaintext = generate_random_string(self.length)?;
        let policy = self.policy;
        let sealing = plaintext.clone();
        let stored = tokio::task::spawn_blocking(move || policy.seal(&sealing))
            .await
            .map_err(|e| SecretError::Task {
                message: e.to_string(),
            })??;
        Ok(IssuedSecret { plaintext, stored })
    }

    pub async fn verify(&self, presented: &str, stored: &str) -> Result<bool, SecretError> {
        let policy = self.policy;
        let presented = presented.to_string();
        let stored = stored.to_string();
        tokio::task::spawn_blocking(move || policy.verify(&presented, &stored))
            .await
            .map_err(|e| SecretError::Task {
                message: e.to_string(),
            })
    }
}

impl Default for SecretIssuer {
    fn default() -> Self {
        Self::new(SecretPolicy::default(), DEFAULT_SECRET_LENGTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_bytes_have_requested_length() {
        let bytes = generate_random_bytes(16).unwrap();
        assert_eq!(bytes.len(), 16);
        assert_ne!(generate_random_bytes(16).unwrap(), bytes);
    }

    #[test]
    fn test_default_secret_is_url_safe() {
        let secret = generate_random_string(DEFAULT_SECRET_LENGTH).unwrap();
        // 42 bytes encode to exactly 56 characters with no padding
        assert_eq!(secret.len(), 56);
        assert!(secret
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[tokio::test]
    async fn test_plaintext_policy_stores_secret_as_issued() {
        let issued = SecretIssuer::default().issue().await.unwrap();
        assert_eq!(issued.plaintext, issued.stored);
        assert!(SecretPolicy::Plaintext.verify(&issued.plaintext, &issued.stored));
        assert!(!SecretPolicy::Plaintext.verify("nope", &issued.stored));
    }

    #[tokio::test]
    async fn test_hashed_policy_never_stores_plaintext() {
        let issuer = SecretIssuer::new(SecretPolicy::Hashed, DEFAULT_SECRET_LENGTH);
        let issued = issuer.issue().await.unwrap();

        assert_ne!(issued.plaintext, issued.stored);
        assert!(issued.stored.starts_with("$argon2"));
        assert!(issuer.verify(&issued.plaintext, &issued.stored).await.unwrap());
        assert!(!issuer.verify("wrong-secret", &issued.stored).await.unwrap());
    }

    #[test]
    fn test_hashed_policy_rejects_plaintext_stored_value() {
        assert!(!SecretPolicy::Hashed.verify("abc", "abc"));
    }

    #[test]
    fn test_plaintext_verify_handles_length_mismatch() {
        assert!(SecretPolicy::Plaintext.verify("same", "same"));
        assert!(!SecretPolicy::Plaintext.verify("same", "samey"));
        assert!(!SecretPolicy::Plaintext.verify("same", "sane"));
        assert!(!SecretPolicy::Plaintext.verify("", "same"));
    }

    #[tokio::test]
    async fn test_zero_length_is_raised_to_minimum() {
        let issuer = SecretIssuer::new(SecretPolicy::Plaintext, 0);
        assert_eq!(issuer.length(), MIN_SECRET_LENGTH);

        let issued = issuer.issue().await.unwrap();
        assert!(!issued.plaintext.is_empty());
        assert!(!issuer.verify("", &issued.stored).await.unwrap());
    }
}
