use std::time::Duration;

use async_trait::async_trait;
use reqwest::header;
use url::Url;

use super::client::{IdentityClient, IdentityClientError, IdentityResult};
use super::types::UserDetails;

const VALIDATE_TOKEN: &str = "validate-token";
const EXTRACT_EMAIL: &str = "extract-email";
const EXTRACT_USER_ID: &str = "extract-user-id";

/// HTTP client for the downstream identity (user) service.
///
/// Deadlines are enforced by the circuit breaker around each call, so the
/// reqwest client carries no timeout of its own.
#[derive(Clone, Debug)]
pub struct HttpIdentityClient {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpIdentityClient {
    pub fn new(base_url: Url) -> IdentityResult<Self> {
        let client = reqwest::Client::builder()
            .tcp_keepalive(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| IdentityClientError::Transport {
                endpoint: base_url.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, mut base_url: Url) -> Self {
        // `Url::join` drops the last path segment unless the base ends in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self { client, base_url }
    }

    fn endpoint(&self, path: &str) -> IdentityResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| IdentityClientError::Url(e.to_string()))
    }

    /// GET `url`; returns the body for 2xx, `None` for 4xx, an error otherwise.
    async fn get_body(&self, url: Url, authorization: Option<&str>) -> IdentityResult<Option<String>> {
        let endpoint = url.path().to_string();

        let mut request = self.client.get(url);
        if let Some(value) = authorization {
            request = request.header(header::AUTHORIZATION, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| IdentityClientError::Transport {
                endpoint: endpoint.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.is_client_error() {
            tracing::debug!(%endpoint, status = status.as_u16(), "identity service answered with client error");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(IdentityClientError::Status {
                endpoint,
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| IdentityClientError::Transport {
                endpoint: endpoint.clone(),
                message: e.to_string(),
            })?;
        Ok(Some(body))
    }
}

// Bodies may be raw text or JSON scalars; empty and `null` mean absent.
fn scalar(body: &str) -> Option<&str> {
    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed == "null" {
        None
    } else {
        Some(trimmed)
    }
}

fn decode_error(endpoint: &str, message: impl ToString) -> IdentityClientError {
    IdentityClientError::Decode {
        endpoint: endpoint.to_string(),
        message: message.to_string(),
    }
}

#[async_trait]
impl IdentityClient for HttpIdentityClient {
    fn backend_name(&self) -> &'static str {
        "user-service"
    }

    async fn validate_token(&self, authorization: &str) -> IdentityResult<bool> {
        let url = self.endpoint(VALIDATE_TOKEN)?;
        let Some(body) = self.get_body(url, Some(authorization)).await? else {
            return Ok(false);
        };

        match scalar(&body) {
            Some(value) => serde_json::from_str::<bool>(value)
                .map_err(|e| decode_error(VALIDATE_TOKEN, e)),
            None => Err(decode_error(VALIDATE_TOKEN, "empty body")),
        }
    }

    async fn extract_email(&self, authorization: &str) -> IdentityResult<Option<String>> {
        let url = self.endpoint(EXTRACT_EMAIL)?;
        let Some(body) = self.get_body(url, Some(authorization)).await? else {
            return Ok(None);
        };

        let Some(value) = scalar(&body) else {
            return Ok(None);
        };
        let email = if value.starts_with('"') {
            serde_json::from_str::<String>(value).map_err(|e| decode_error(EXTRACT_EMAIL, e))?
        } else {
            value.to_string()
        };

        Ok(Some(email).filter(|e| !e.trim().is_empty()))
    }

    async fn extract_user_id(&self, authorization: &str) -> IdentityResult<Option<i64>> {
        let url = self.endpoint(EXTRACT_USER_ID)?;
        let Some(body) = self.get_body(url, Some(authorization)).await? else {
            return Ok(None);
        };

        scalar(&body)
            .map(|value| {
                value
                    .trim_matches('"')
                    .parse::<i64>()
                    .map_err(|e| decode_error(EXTRACT_USER_ID, e))
            })
            .transpose()
    }

    async fn user_details(&self, email: &str) -> IdentityResult<Option<UserDetails>> {
        let mut url = self.endpoint("api/users/details")?;
        url.path_segments_mut()
            .map_err(|_| IdentityClientError::Url(self.base_url.to_string()))?
            .push(email);

        let Some(body) = self.get_body(url, None).await? else {
            return Ok(None);
        };

        serde_json::from_str::<UserDetails>(&body)
            .map(Some)
            .map_err(|e| decode_error("api/users/details", e))
    }
}

