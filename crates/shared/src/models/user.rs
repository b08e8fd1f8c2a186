use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SERVER_URL: &str = "https://api.coretex.ai/";

/// Credentials and tokens of the operator. The password is stored as given
/// so the session can be re-established once the refresh token expires.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserConfiguration {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub token_expiration_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub refresh_token_expiration_date: Option<DateTime<Utc>>,
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default)]
    pub project_id: Option<i64>,
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

impl Default for UserConfiguration {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            token: None,
            token_expiration_date: None,
            refresh_token: None,
            refresh_token_expiration_date: None,
            server_url: default_server_url(),
            project_id: None,
        }
    }
}

impl UserConfiguration {
    pub fn has_credentials(&self) -> bool {
        matches!((&self.username, &self.password), (Some(u), Some(p)) if !u.is_empty() && !p.is_empty())
    }

    pub fn is_token_valid(&self, now: DateTime<Utc>) -> bool {
        Self::still_valid(&self.token, self.token_expiration_date, now)
    }

    pub fn is_refresh_token_valid(&self, now: DateTime<Utc>) -> bool {
        Self::still_valid(
            &self.refresh_token,
            self.refresh_token_expiration_date,
            now,
        )
    }

    fn still_valid(
        token: &Option<String>,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        match (token, expires_at) {
            (Some(token), Some(expires_at)) => !token.is_empty() && expires_at > now,
            _ => false,
        }
    }

    /// Drops every token, keeping the credentials and server settings.
    pub fn clear_tokens(&mut self) {
        self.token = None;
        self.token_expiration_date = None;
        self.refresh_token = None;
        self.refresh_token_expiration_date = None;
    }
}
