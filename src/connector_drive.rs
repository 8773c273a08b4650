//! Google Drive backend.
//!
//! Device files sit flat inside one Drive folder. Lookup is a `files.list`
//! call filtered by exact name, parent folder and `trashed = false`; the
//! first match wins. Content is then streamed with `files.get?alt=media`
//! chunk by chunk into a single buffer, so callers only ever see a complete
//! download or an error.
//!
//! # Configuration
//!
//! ```toml
//! [storage.remote]
//! folder_id = "1AbCdEf"
//! credentials_file = "./credentials.json"   # service account key
//! # access_token_env = "DRIVE_ACCESS_TOKEN" # or a ready bearer token
//! # api_base = "http://127.0.0.1:9000"      # test double
//! ```
//!
//! # Authentication
//!
//! With a service account key an RS256 JWT assertion is signed with the
//! key's private key and exchanged at its `token_uri` for a short-lived
//! bearer token (scope `drive.readonly`). Every HTTP call made by the
//! backend carries the configured request timeout.

use anyhow::{anyhow, bail, Context, Result as AnyResult};
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::RemoteStorageConfig;
use crate::error::{ExportError, Result};
use crate::models::{Backend, DeviceId, Locator, Reference};
use crate::traits::{backend_failure, StorageBackend};

const DRIVE_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";
const JWT_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Reads device files from one cloud-drive folder over the Drive v3 API.
pub struct DriveBackend {
    /// Folder id, API endpoint and credential settings from `[storage.remote]`.
    config: RemoteStorageConfig,
    /// Produces the bearer token for each request.
    tokens: TokenSource,
    /// Shared HTTP client carrying the per-request timeout.
    client: reqwest::Client,
}

impl DriveBackend {
    pub fn new(
        config: RemoteStorageConfig,
        tokens: TokenSource,
        timeout: Duration,
    ) -> AnyResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client for drive backend")?;
        Ok(Self {
            config,
            tokens,
            client,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
    }

    async fn list_matching(&self, token: &str, file_name: &str) -> AnyResult<Vec<DriveFile>> {
        let query = format!(
            "name = '{}' and '{}' in parents and trashed = false",
            file_name, self.config.folder_id
        );
        let resp = self
            .client
            .get(self.api_url("/drive/v3/files"))
            .bearer_auth(token)
            .query(&[
                ("q", query.as_str()),
                ("fields", "files(id,name,trashed)"),
                ("pageSize", "10"),
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
            ])
            .send()
            .await
            .map_err(|e| anyhow!("Drive files.list request failed: {}", e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!(
                "Drive files.list failed (HTTP {}): {}",
                status,
                body.chars().take(500).collect::<String>()
            );
        }

        let listing: FileList = resp.json().await.context("Malformed files.list response")?;
        Ok(listing.files)
    }

    async fn download(&self, token: &str, file_id: &str) -> AnyResult<Vec<u8>> {
        let mut resp = self
            .client
            .get(self.api_url(&format!("/drive/v3/files/{}", file_id)))
            .bearer_auth(token)
            .query(&[("alt", "media"), ("supportsAllDrives", "true")])
            .send()
            .await
            .map_err(|e| anyhow!("Drive download of {} failed: {}", file_id, e))?;

        if !resp.status().is_success() {
            bail!(
                "Drive files.get failed (HTTP {}) for file '{}'",
                resp.status(),
                file_id
            );
        }

        let mut buf = Vec::with_capacity(resp.content_length().unwrap_or(0) as usize);
        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| anyhow!("Drive download of {} interrupted: {}", file_id, e))?
        {
            buf.extend_from_slice(&chunk);
        }
        Ok(buf)
    }
}

#[async_trait]
impl StorageBackend for DriveBackend {
    fn kind(&self) -> Backend {
        Backend::Remote
    }

    async fn resolve(&self, device_id: &DeviceId) -> Result<Locator> {
        let file_name = device_id.data_file_name();
        let token = self
            .tokens
            .bearer(&self.client)
            .await
            .map_err(|e| backend_failure(device_id, e))?;
        let files = self
            .list_matching(&token, &file_name)
            .await
            .map_err(|e| backend_failure(device_id, e))?;

        let hit = files
            .into_iter()
            .find(|f| f.name == file_name && !f.trashed)
            .ok_or_else(|| ExportError::NotFound(device_id.to_string()))?;

        tracing::debug!(device = %device_id, file_id = %hit.id, "resolved drive file");
        Ok(Locator {
            device_id: device_id.clone(),
            reference: Reference::RemoteFile(hit.id),
        })
    }

    async fn fetch(&self, locator: &Locator) -> Result<Vec<u8>> {
        let Reference::RemoteFile(file_id) = &locator.reference else {
            return Err(backend_failure(
                &locator.device_id,
                anyhow!("drive backend cannot fetch a local locator"),
            ));
        };
        let token = self
            .tokens
            .bearer(&self.client)
            .await
            .map_err(|e| backend_failure(&locator.device_id, e))?;
        let bytes = self
            .download(&token, file_id)
            .await
            .map_err(|e| backend_failure(&locator.device_id, e))?;
        tracing::debug!(device = %locator.device_id, bytes = bytes.len(), "downloaded drive file");
        Ok(bytes)
    }
}

// ============ Drive API payloads ============

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
    name: String,
    #[serde(default)]
    trashed: bool,
}

// ============ Credentials ============

/// Where bearer tokens come from.
pub enum TokenSource {
    /// A token supplied out of band (env var), used as-is.
    Static(String),
    ServiceAccount(ServiceAccountKey),
}

/// The fields of a Google service-account JSON key that signing needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl TokenSource {
    pub fn from_config(config: &RemoteStorageConfig) -> AnyResult<Self> {
        if let Some(var) = &config.access_token_env {
            let token = std::env::var(var)
                .with_context(|| format!("{} environment variable not set", var))?;
            return Ok(TokenSource::Static(token));
        }
        let path = config
            .credentials_file
            .as_ref()
            .context("storage.remote.credentials_file is not set")?;
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read credentials file: {}", path.display()))?;
        let key: ServiceAccountKey =
            serde_json::from_str(&raw).context("Credentials file is not a service account key")?;
        // Fail at startup rather than on the first request.
        EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .context("Service account private_key is not a valid RSA PEM key")?;
        Ok(TokenSource::ServiceAccount(key))
    }

    async fn bearer(&self, client: &reqwest::Client) -> AnyResult<String> {
        match self {
            TokenSource::Static(token) => Ok(token.clone()),
            TokenSource::ServiceAccount(key) => exchange_assertion(client, key).await,
        }
    }
}

fn sign_assertion(key: &ServiceAccountKey, now: i64) -> AnyResult<String> {
    let claims = AssertionClaims {
        iss: &key.client_email,
        scope: DRIVE_READONLY_SCOPE,
        aud: &key.token_uri,
        iat: now,
        exp: now + 3600,
    };
    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
    Ok(jsonwebtoken::encode(
        &Header::new(Algorithm::RS256),
        &claims,
        &encoding_key,
    )?)
}

async fn exchange_assertion(client: &reqwest::Client, key: &ServiceAccountKey) -> AnyResult<String> {
    let assertion = sign_assertion(key, chrono::Utc::now().timestamp())?;
    let resp = client
        .post(&key.token_uri)
        .form(&[("grant_type", JWT_GRANT_TYPE), ("assertion", assertion.as_str())])
        .send()
        .await
        .map_err(|e| anyhow!("Token exchange with {} failed: {}", key.token_uri, e))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        bail!(
            "Token exchange rejected (HTTP {}): {}",
            status,
            body.chars().take(500).collect::<String>()
        );
    }
    let token: TokenResponse = resp.json().await.context("Malformed token response")?;
    Ok(token.access_token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_list_trashed_defaults_false() {
        let list: FileList =
            serde_json::from_str(r#"{"files":[{"id":"f1","name":"A_enriched.csv"}]}"#).unwrap();
        assert_eq!(list.files.len(), 1);
        assert!(!list.files[0].trashed);
    }

    #[test]
    fn test_empty_listing() {
        let list: FileList = serde_json::from_str("{}").unwrap();
        assert!(list.files.is_empty());
    }

    #[test]
    fn test_invalid_private_key_rejected() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            r#"{"client_email":"svc@example.iam.gserviceaccount.com","private_key":"not a key"}"#,
        )
        .unwrap();
        let config = RemoteStorageConfig {
            folder_id: "folder".to_string(),
            credentials_file: Some(tmp.path().to_path_buf()),
            access_token_env: None,
            api_base: "http://127.0.0.1:1".to_string(),
        };
        assert!(TokenSource::from_config(&config).is_err());
    }

    #[test]
    fn test_api_url_joins_base() {
        let backend = DriveBackend::new(
            RemoteStorageConfig {
                folder_id: "folder".to_string(),
                credentials_file: None,
                access_token_env: None,
                api_base: "http://127.0.0.1:9000/".to_string(),
            },
            TokenSource::Static("t".to_string()),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            backend.api_url("/drive/v3/files"),
            "http://127.0.0.1:9000/drive/v3/files"
        );
    }
}
