//! Service registry announcement.
//!
//! On startup the server may publish its identity to a Consul-compatible
//! catalog with a single `PUT /v1/catalog/register` call. There is no
//! re-registration, deregistration or health checking.
//!
//! Two policies are supported, selected by [`RegistryConfig::required`]:
//! - optional: announce only when a URL is configured; failures are logged
//!   and startup continues
//! - mandatory: failures are returned to the caller, which stops the process

use crate::config::{RegistryConfig, ServiceIdentity};
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Catalog registration path, relative to the registry base URL.
const REGISTER_PATH: &str = "/v1/catalog/register";

/// Header carrying the registry ACL token.
const TOKEN_HEADER: &str = "X-Consul-Token";

/// A catalog entry describing this node and the service it hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationRecord {
    pub node_name: String,
    pub service_id: String,
    pub service_name: String,
    pub address: String,
    pub port: u16,
    pub skip_node_update: bool,
}

impl From<&ServiceIdentity> for RegistrationRecord {
    fn from(identity: &ServiceIdentity) -> Self {
        Self {
            node_name: identity.name.clone(),
            service_id: identity.name.clone(),
            service_name: identity.name.clone(),
            address: identity.host.clone(),
            port: identity.port,
            skip_node_update: true,
        }
    }
}

/// Wire form of the catalog register request body.
#[derive(Serialize)]
struct CatalogRegistration<'a> {
    #[serde(rename = "Node")]
    node: &'a str,
    #[serde(rename = "SkipNodeUpdate")]
    skip_node_update: bool,
    #[serde(rename = "Service")]
    service: CatalogService<'a>,
}

#[derive(Serialize)]
struct CatalogService<'a> {
    #[serde(rename = "ID")]
    id: &'a str,
    #[serde(rename = "Service")]
    service: &'a str,
    #[serde(rename = "Address")]
    address: &'a str,
    #[serde(rename = "Port")]
    port: u16,
}

impl<'a> From<&'a RegistrationRecord> for CatalogRegistration<'a> {
    fn from(record: &'a RegistrationRecord) -> Self {
        Self {
            node: &record.node_name,
            skip_node_update: record.skip_node_update,
            service: CatalogService {
                id: &record.service_id,
                service: &record.service_name,
                address: &record.address,
                port: record.port,
            },
        }
    }
}

/// HTTP client for the registry catalog API.
pub struct RegistryClient {
    http: Client,
    base_url: String,
    token: Option<String>,
    datacenter: Option<String>,
}

impl RegistryClient {
    /// Create a client for the registry at `url`.
    ///
    /// A URL without a scheme is treated as plain HTTP.
    pub fn new(
        url: &str,
        token: Option<String>,
        datacenter: Option<String>,
    ) -> Result<Self, RegistryError> {
        let base_url = normalize_url(url);
        Url::parse(&base_url).map_err(|e| RegistryError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        // Registry traffic bypasses any system proxy
        let http = Client::builder()
            .no_proxy()
            .build()
            .map_err(RegistryError::Client)?;

        Ok(Self {
            http,
            base_url,
            token,
            datacenter,
        })
    }

    /// Base URL requests are sent to.
    #[cfg(test)]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Submit a single catalog registration.
    pub async fn register(&self, record: &RegistrationRecord) -> Result<(), RegistryError> {
        let url = format!("{}{}", self.base_url, REGISTER_PATH);

        let mut request = self
            .http
            .put(&url)
            .json(&CatalogRegistration::from(record));

        if let Some(ref dc) = self.datacenter {
            request = request.query(&[("dc", dc)]);
        }
        if let Some(ref token) = self.token {
            request = request.header(TOKEN_HEADER, token);
        }

        debug!(url = %url, node = %record.node_name, "Sending catalog registration");

        let response = request.send().await.map_err(RegistryError::Request)?;
        let status = response.status();
        let body = response.text().await.map_err(RegistryError::Request)?;

        if !status.is_success() {
            return Err(RegistryError::Status(status, body.trim().to_string()));
        }
        // The catalog answers with a JSON boolean
        if body.trim() == "false" {
            return Err(RegistryError::Rejected);
        }

        Ok(())
    }
}

/// Result of the startup announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnounceOutcome {
    /// No registry configured.
    Skipped,
    /// The registry accepted the entry.
    Registered,
    /// Registration failed and the policy allowed startup to continue.
    Failed,
}

impl AnnounceOutcome {
    pub fn is_registered(self) -> bool {
        self == AnnounceOutcome::Registered
    }
}

/// Announce `identity` to the configured registry, applying the policy.
///
/// Returns `Err` only when registration is required.
pub async fn announce(
    config: &RegistryConfig,
    identity: &ServiceIdentity,
) -> Result<AnnounceOutcome, RegistryError> {
    let Some(ref url) = config.url else {
        debug!("No registry configured, skipping announcement");
        return Ok(AnnounceOutcome::Skipped);
    };

    match register(url, config, identity).await {
        Ok(()) => {
            info!(
                registry = %url,
                service = %identity.name,
                host = %identity.host,
                port = identity.port,
                "Registered with service registry"
            );
            Ok(AnnounceOutcome::Registered)
        }
        Err(e) if config.required => Err(e),
        Err(e) => {
            warn!(registry = %url, error = %e, "Registry announcement failed, continuing without it");
            Ok(AnnounceOutcome::Failed)
        }
    }
}

async fn register(
    url: &str,
    config: &RegistryConfig,
    identity: &ServiceIdentity,
) -> Result<(), RegistryError> {
    let client = RegistryClient::new(url, config.token.clone(), config.datacenter.clone())?;
    client.register(&RegistrationRecord::from(identity)).await
}

fn normalize_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("http://{url}")
    }
}

/// Registry errors
#[derive(Debug)]
pub enum RegistryError {
    InvalidUrl { url: String, reason: String },
    Client(reqwest::Error),
    Request(reqwest::Error),
    Status(StatusCode, String),
    Rejected,
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::InvalidUrl { url, reason } => {
                write!(f, "Invalid registry URL '{url}': {reason}")
            }
            RegistryError::Client(e) => write!(f, "Failed to create registry client: {e}"),
            RegistryError::Request(e) => write!(f, "Registry request failed: {e}"),
            RegistryError::Status(status, body) => {
                write!(f, "Registry returned {status}: {body}")
            }
            RegistryError::Rejected => write!(f, "Registry rejected the registration"),
        }
    }
}

impl std::error::Error for RegistryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegistryError::Client(e) | RegistryError::Request(e) => Some(e),
            _ => None,
        }
    }
}
