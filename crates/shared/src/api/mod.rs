use crate::models::NodeMode;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

const API_PREFIX: &str = "api/v1/";
const TOKEN_HEADER: &str = "api-token";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid server url {0}")]
    InvalidUrl(String),
    #[error("Request to {endpoint} failed: {message}")]
    Request { endpoint: String, message: String },
    #[error("{endpoint} responded with {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },
    #[error("Unexpected response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },
    #[error("Not authenticated")]
    Unauthenticated,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuthTokens {
    pub token: String,
    #[serde(rename = "expires_on")]
    pub token_expiration_date: DateTime<Utc>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default, rename = "refresh_expires_on")]
    pub refresh_token_expiration_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NodeRegistration {
    pub id: i64,
    pub access_token: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelInfo {
    pub id: i64,
    pub name: String,
}

/// The subset of the platform REST API the node tooling depends on.
#[async_trait]
pub trait PlatformApi: Send + Sync {
    async fn authenticate(&self, username: &str, password: &str) -> Result<AuthTokens, ApiError>;

    async fn refresh(&self, refresh_token: &str) -> Result<AuthTokens, ApiError>;

    async fn register_node(&self, name: &str, mode: NodeMode)
        -> Result<NodeRegistration, ApiError>;

    async fn get_model(&self, id: i64) -> Result<ModelInfo, ApiError>;

    async fn deactivate_node(&self, id: i64) -> Result<(), ApiError>;
}

#[derive(Clone)]
pub struct PlatformClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl PlatformClient {
    pub fn new(server_url: &str) -> Result<Self, ApiError> {
        let normalized = if server_url.ends_with('/') {
            server_url.to_string()
        } else {
            format!("{server_url}/")
        };
        let base_url = Url::parse(&normalized)
            .and_then(|url| url.join(API_PREFIX))
            .map_err(|_| ApiError::InvalidUrl(server_url.to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("coretex-cli")
            .build()
            .map_err(|e| ApiError::Request {
                endpoint: base_url.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url,
            token: None,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn url(&self, endpoint: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(endpoint)
            .map_err(|_| ApiError::InvalidUrl(format!("{}{endpoint}", self.base_url)))
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, ApiError> {
        let token = self.token.as_ref().ok_or(ApiError::Unauthenticated)?;
        Ok(request.header(TOKEN_HEADER, token))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = self.execute(endpoint, request).await?;
        response.json::<T>().await.map_err(|e| ApiError::Decode {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })
    }

    async fn execute(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> Result<Response, ApiError> {
        debug!("Sending request to {endpoint}");
        let response = request.send().await.map_err(|e| ApiError::Request {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "No error message".to_string());
            return Err(ApiError::Status {
                endpoint: endpoint.to_string(),
                status,
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl PlatformApi for PlatformClient {
    async fn authenticate(&self, username: &str, password: &str) -> Result<AuthTokens, ApiError> {
        let endpoint = "user/login";
        let request = self
            .client
            .post(self.url(endpoint)?)
            .basic_auth(username, Some(password));
        self.send(endpoint, request).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthTokens, ApiError> {
        let endpoint = "user/refresh";
        let request = self
            .client
            .post(self.url(endpoint)?)
            .header(TOKEN_HEADER, refresh_token);
        self.send(endpoint, request).await
    }

    async fn register_node(
        &self,
        name: &str,
        mode: NodeMode,
    ) -> Result<NodeRegistration, ApiError> {
        let endpoint = "service";
        let request = self.authorized(self.client.post(self.url(endpoint)?))?.json(
            &serde_json::json!({
                "machine_name": name,
                "mode": mode.code(),
            }),
        );
        self.send(endpoint, request).await
    }

    async fn get_model(&self, id: i64) -> Result<ModelInfo, ApiError> {
        let endpoint = "model";
        let request = self
            .authorized(self.client.get(self.url(endpoint)?))?
            .query(&[("id", id)]);
        self.send(endpoint, request).await
    }

    async fn deactivate_node(&self, id: i64) -> Result<(), ApiError> {
        let endpoint = "service/deactivate";
        let request = self
            .authorized(self.client.post(self.url(endpoint)?))?
            .json(&serde_json::json!({ "id": id }));
        self.execute(endpoint, request).await.map(|_| ())
    }
}
