//! Domain validation for registered applications

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::{Host, Url};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid domain name")]
    InvalidDomain { domain: String },
}

/// Whether registration checks the `domain` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DomainPolicy {
    #[default]
    Strict,
    Skip,
}

impl DomainPolicy {
    pub fn check(&self, domain: &str) -> Result<(), DomainError> {
        match self {
            DomainPolicy::Strict => validate_domain(domain),
            DomainPolicy::Skip => Ok(()),
        }
    }
}

/// Accepts absolute URLs (`https://app.example.com/cb`) and bare hosts
/// (`example.com`, `localhost:8080`).
pub fn validate_domain(domain: &str) -> Result<(), DomainError> {
    let invalid = || DomainError::InvalidDomain {
        domain: domain.to_string(),
    };

    let trimmed = domain.trim();
    if trimmed.is_empty() || trimmed.len() != domain.len() || trimmed.contains(char::is_whitespace)
    {
        return Err(invalid());
    }

    let url = match Url::parse(trimmed) {
        Ok(url) if url.has_host() => url,
        // "example.com" parses as a relative URL and "localhost:8080" as scheme "localhost"
        _ => Url::parse(&format!("http://{}", trimmed)).map_err(|_| invalid())?,
    };

    match url.host() {
        Some(Host::Domain(host)) if host == "localhost" || is_dotted_host(host) => Ok(()),
        Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => Ok(()),
        _ => Err(invalid()),
    }
}

fn is_dotted_host(host: &str) -> bool {
    let labels: Vec<&str> = host.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        })
}
