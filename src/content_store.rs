//! IPFS pinning through the Pinata API

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

pub const DEFAULT_JSON_NAME: &str = "idea-metadata.json";
pub const DEFAULT_FILE_NAME: &str = "uploaded-file";

#[derive(Debug, Clone, Error)]
pub enum ContentStoreError {
    #[error("Pinata credentials missing: set PINATA_JWT or PINATA_API_KEY and PINATA_SECRET_API_KEY")]
    MissingCredentials,
    #[error("Too many requests (rate limited). Please wait a minute and try again. ({attempts} attempts)")]
    RateLimited { attempts: u32 },
    #[error("Pinata upload failed with status {status}: {body}")]
    Upload { status: u16, body: String },
    #[error("Pinata transport error: {0}")]
    Transport(String),
    #[error("Pinata response decode error: {0}")]
    Decode(String),
}

impl ContentStoreError {
    /// Exhausted 429 retries, or an upload rejected with a rate-limit message.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            ContentStoreError::RateLimited { .. } => true,
            ContentStoreError::Upload { body, .. } => {
                let lowered = body.to_lowercase();
                lowered.contains("rate limit") || lowered.contains("too many requests")
            }
            _ => false,
        }
    }
}

/// How requests authenticate with Pinata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Jwt(String),
    ApiKey { key: String, secret: String },
}

impl Credentials {
    /// Picks the bearer JWT when present, else a complete key/secret pair.
    pub fn resolve(
        jwt: Option<&str>,
        api_key: Option<&str>,
        secret: Option<&str>,
    ) -> Option<Credentials> {
        let present = |v: Option<&str>| v.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
        if let Some(jwt) = present(jwt) {
            return Some(Credentials::Jwt(jwt));
        }
        match (present(api_key), present(secret)) {
            (Some(key), Some(secret)) => Some(Credentials::ApiKey { key, secret }),
            _ => None,
        }
    }

    fn apply(&self, builder: RequestBuilder) -> RequestBuilder {
        match self {
            Credentials::Jwt(token) => builder.bearer_auth(token),
            Credentials::ApiKey { key, secret } => builder
                .header("pinata_api_key", key)
                .header("pinata_secret_api_key", secret),
        }
    }
}

/// Backoff applied when Pinata answers 429.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based): base * 2^retry.
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(retry)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub cid: String,
    pub url: String,
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn upload_json(&self, value: Value, name: &str) -> Result<UploadResult, ContentStoreError>;

    async fn upload_file(&self, bytes: Vec<u8>, filename: &str) -> Result<UploadResult, ContentStoreError>;

    fn gateway_url(&self, cid: &str) -> String;

    /// Whether credentials are configured at all.
    fn is_configured(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct PinataConfig {
    pub api_url: String,
    pub gateway_url: String,
    pub credentials: Option<Credentials>,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
}

impl Default for PinataConfig {
    fn default() -> Self {
        PinataConfig {
            api_url: "https://api.pinata.cloud".to_string(),
            gateway_url: "https://gateway.pinata.cloud".to_string(),
            credentials: None,
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

pub struct PinataClient {
    config: PinataConfig,
    client: reqwest::Client,
}

impl PinataClient {
    pub fn new(config: PinataConfig) -> Result<Self, ContentStoreError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ContentStoreError::Transport(e.to_string()))?;
        Ok(PinataClient { config, client })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url.trim_end_matches('/'), path)
    }

    fn credentials(&self) -> Result<&Credentials, ContentStoreError> {
        self.config
            .credentials
            .as_ref()
            .ok_or(ContentStoreError::MissingCredentials)
    }

    /// Sends the request built by `build`, retrying on 429 per the policy.
    /// `build` runs once per attempt so multipart bodies are recreated.
    async fn send_with_retry<F>(&self, build: F) -> Result<UploadResult, ContentStoreError>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let (response, attempts) = retry_on_rate_limit(self.config.retry, || {
            let request = build();
            async move {
                request
                    .send()
                    .await
                    .map_err(|e| ContentStoreError::Transport(e.to_string()))
            }
        })
        .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ContentStoreError::Upload {
                status: status.as_u16(),
                body,
            });
        }

        let pinned: PinResponse = response
            .json()
            .await
            .map_err(|e| ContentStoreError::Decode(e.to_string()))?;
        debug!("Pinned {} after {} attempt(s)", pinned.ipfs_hash, attempts);
        Ok(UploadResult {
            url: self.gateway_url(&pinned.ipfs_hash),
            cid: pinned.ipfs_hash,
        })
    }
}

/// Calls `send` until it answers something other than 429, sleeping
/// `policy.delay_for(n)` before retry `n`. Returns the final response and
/// how many attempts it took.
async fn retry_on_rate_limit<F, Fut>(
    policy: RetryPolicy,
    mut send: F,
) -> Result<(Response, u32), ContentStoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Response, ContentStoreError>>,
{
    let mut attempt: u32 = 0;
    loop {
        let response = send().await?;
        if response.status() != StatusCode::TOO_MANY_REQUESTS {
            return Ok((response, attempt + 1));
        }
        if attempt >= policy.max_retries {
            return Err(ContentStoreError::RateLimited {
                attempts: attempt + 1,
            });
        }

        let delay = policy.delay_for(attempt);
        warn!(
            "Pinata rate limited (attempt {}/{}). Retrying in {:?}",
            attempt + 1,
            policy.max_retries + 1,
            delay
        );
        sleep(delay).await;
        attempt += 1;
    }
}

#[async_trait]
impl ContentStore for PinataClient {
    async fn upload_json(&self, value: Value, name: &str) -> Result<UploadResult, ContentStoreError> {
        let credentials = self.credentials()?;
        let content = if value.is_object() {
            value
        } else {
            json!({ "content": value })
        };
        let name = if name.is_empty() { DEFAULT_JSON_NAME } else { name };
        let body = json!({
            "pinataContent": content,
            "pinataMetadata": { "name": name },
            "pinataOptions": { "cidVersion": 0 },
        });
        let url = self.endpoint("/pinning/pinJSONToIPFS");

        let result = self
            .send_with_retry(|| credentials.apply(self.client.post(&url)).json(&body))
            .await?;
        info!(cid = %result.cid, name, "content_store.json_pinned");
        Ok(result)
    }

    async fn upload_file(&self, bytes: Vec<u8>, filename: &str) -> Result<UploadResult, ContentStoreError> {
        let credentials = self.credentials()?;
        let filename = if filename.is_empty() {
            DEFAULT_FILE_NAME
        } else {
            filename
        };
        let metadata = json!({ "name": filename }).to_string();
        let options = json!({ "cidVersion": 0 }).to_string();
        let url = self.endpoint("/pinning/pinFileToIPFS");

        let result = self
            .send_with_retry(|| {
                let form = Form::new()
                    .part("file", Part::bytes(bytes.clone()).file_name(filename.to_string()))
                    .text("pinataMetadata", metadata.clone())
                    .text("pinataOptions", options.clone());
                credentials.apply(self.client.post(&url)).multipart(form)
            })
            .await?;
        info!(cid = %result.cid, filename, size = bytes.len(), "content_store.file_pinned");
        Ok(result)
    }

    fn gateway_url(&self, cid: &str) -> String {
        format!("{}/ipfs/{}", self.config.gateway_url.trim_end_matches('/'), cid)
    }

    fn is_configured(&self) -> bool {
        self.config.credentials.is_some()
    }
}
