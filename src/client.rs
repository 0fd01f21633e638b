use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{header::AUTHORIZATION, Client, Url};
use serde_json::Value;
use tracing::debug;

use crate::error::{ReportError, Result};
use crate::query::QueryRequest;

pub const DEFAULT_API_URL: &str = "https://mixpanel.com/api/2.0/";

/// Source of raw export API responses.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, request: &QueryRequest) -> Result<Value>;
}

/// HTTP client for the Mixpanel data export API.
///
/// Authenticates with the project API secret sent as Basic credentials.
pub struct MixpanelClient {
    client: Client,
    base_url: Url,
    authorization: String,
}

impl MixpanelClient {
    pub fn new(base_url: &str, api_secret: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReportError::Transport(format!("http client build failed: {e}")))?;

        Ok(Self {
            client,
            base_url: parse_base_url(base_url)?,
            authorization: basic_auth_header(api_secret),
        })
    }
}

#[async_trait]
impl Fetch for MixpanelClient {
    async fn fetch(&self, request: &QueryRequest) -> Result<Value> {
        let url = request_url(&self.base_url, request)?;
        debug!(endpoint = request.endpoint, %url, "querying export api");

        let resp = self
            .client
            .get(url)
            .header(AUTHORIZATION, &self.authorization)
            .send()
            .await
            .map_err(|e| ReportError::Transport(format!("request to {} failed: {e}", request.endpoint)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ReportError::Transport(format!(
                "{} responded with {status}: {}",
                request.endpoint,
                snippet(&body)
            )));
        }

        resp.json::<Value>()
            .await
            .map_err(|e| ReportError::Transport(format!("{} returned invalid JSON: {e}", request.endpoint)))
    }
}

pub fn parse_base_url(base_url: &str) -> Result<Url> {
    let mut normalized = base_url.trim().to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    Url::parse(&normalized)
        .map_err(|e| ReportError::Transport(format!("invalid API URL {base_url:?}: {e}")))
}

/// Full request URL with URL-encoded query parameters.
pub fn request_url(base_url: &Url, request: &QueryRequest) -> Result<Url> {
    let mut url = base_url
        .join(request.endpoint)
        .map_err(|e| ReportError::Transport(format!("invalid endpoint {}: {e}", request.endpoint)))?;
    {
        let mut qs = url.query_pairs_mut();
        for (key, value) in &request.params {
            qs.append_pair(key, value);
        }
    }
    Ok(url)
}

pub fn basic_auth_header(api_secret: &str) -> String {
    format!("Basic {}", STANDARD.encode(api_secret))
}

fn snippet(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((end, _)) => &body[..end],
        None => body,
    }
}
