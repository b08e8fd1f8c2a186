use super::NodeError;
use chrono::{DateTime, Utc};
use log::{debug, info};
use shared::api::{AuthTokens, PlatformApi};
use shared::config::ConfigStore;
use shared::models::UserConfiguration;

fn apply_tokens(user: &mut UserConfiguration, tokens: AuthTokens) {
    user.token = Some(tokens.token);
    user.token_expiration_date = Some(tokens.token_expiration_date);
    if let Some(refresh_token) = tokens.refresh_token {
        user.refresh_token = Some(refresh_token);
        user.refresh_token_expiration_date = tokens.refresh_token_expiration_date;
    }
}

/// Authenticates with fresh credentials and persists them with the tokens.
pub(crate) async fn login(
    store: &ConfigStore,
    api: &dyn PlatformApi,
    username: &str,
    password: &str,
) -> Result<UserConfiguration, NodeError> {
    let mut user = store.load_user()?;
    let tokens = api
        .authenticate(username, password)
        .await
        .map_err(|e| {
            debug!("Login failed: {e}");
            NodeError::Session("Login failed, check your username and password".to_string())
        })?;

    user.username = Some(username.to_string());
    user.password = Some(password.to_string());
    apply_tokens(&mut user, tokens);

    store.ensure_dir()?;
    store.save_user(&user)?;
    info!("Logged in as {username}");
    Ok(user)
}

/// Returns a user configuration holding a usable API token, refreshing or
/// re-authenticating with the stored credentials when needed.
pub(crate) async fn initialize(
    store: &ConfigStore,
    api: &dyn PlatformApi,
    now: DateTime<Utc>,
) -> Result<UserConfiguration, NodeError> {
    let mut user = store.load_user()?;
    if user.is_token_valid(now) {
        return Ok(user);
    }

    if user.is_refresh_token_valid(now) {
        if let Some(refresh_token) = user.refresh_token.clone() {
            match api.refresh(&refresh_token).await {
                Ok(tokens) => {
                    debug!("Session refreshed");
                    apply_tokens(&mut user, tokens);
                    store.save_user(&user)?;
                    return Ok(user);
                }
                Err(e) => debug!("Token refresh failed, logging in again: {e}"),
            }
        }
    }

    if !user.has_credentials() {
        return Err(NodeError::Session(
            "You are not logged in, run `coretex login` first".to_string(),
        ));
    }
    let username = user.username.clone().unwrap_or_default();
    let password = user.password.clone().unwrap_or_default();

    let tokens = api.authenticate(&username, &password).await.map_err(|e| {
        debug!("Re-authentication failed: {e}");
        NodeError::Session(
            "Stored credentials were rejected, run `coretex login` again".to_string(),
        )
    })?;
    apply_tokens(&mut user, tokens);
    store.save_user(&user)?;
    Ok(user)
}

#[cfg(test)]
pub(crate) mod fake {
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use shared::api::{ApiError, AuthTokens, ModelInfo, NodeRegistration, PlatformApi};
    use shared::models::NodeMode;
    use std::sync::Mutex;

    /// Platform double: accepts `user`/`pass`, knows model 7 and records calls.
    #[derive(Default)]
    pub(crate) struct FakePlatform {
        pub(crate) calls: Mutex<Vec<String>>,
        pub(crate) reject_registration: bool,
        pub(crate) reject_refresh: bool,
    }

    impl FakePlatform {
        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn tokens(prefix: &str) -> AuthTokens {
            AuthTokens {
                token: format!("{prefix}-token"),
                token_expiration_date: Utc::now() + Duration::hours(1),
                refresh_token: Some(format!("{prefix}-refresh")),
                refresh_token_expiration_date: Some(Utc::now() + Duration::days(7)),
            }
        }

        fn rejected(endpoint: &str) -> ApiError {
            ApiError::Status {
                endpoint: endpoint.to_string(),
                status: 401,
                body: "unauthorized".to_string(),
            }
        }
    }

    #[async_trait]
    impl PlatformApi for FakePlatform {
        async fn authenticate(&self, username: &str, password: &str) -> Result<AuthTokens, ApiError> {
            self.record(format!("authenticate {username}"));
            if username == "user" && password == "pass" {
                Ok(Self::tokens("login"))
            } else {
                Err(Self::rejected("user/login"))
            }
        }

        async fn refresh(&self, refresh_token: &str) -> Result<AuthTokens, ApiError> {
            self.record(format!("refresh {refresh_token}"));
            if self.reject_refresh {
                return Err(Self::rejected("user/refresh"));
            }
            Ok(Self::tokens("refreshed"))
        }

        async fn register_node(
            &self,
            name: &str,
            mode: NodeMode,
        ) -> Result<NodeRegistration, ApiError> {
            self.record(format!("register {name} {}", mode.code()));
            if self.reject_registration {
                return Err(ApiError::Status {
                    endpoint: "service".to_string(),
                    status: 409,
                    body: "name taken".to_string(),
                });
            }
            Ok(NodeRegistration {
                id: 11,
                access_token: "node-access".to_string(),
            })
        }

        async fn get_model(&self, id: i64) -> Result<ModelInfo, ApiError> {
            self.record(format!("model {id}"));
            if id == 7 {
                Ok(ModelInfo {
                    id,
                    name: "classifier".to_string(),
                })
            } else {
                Err(ApiError::Status {
                    endpoint: "model".to_string(),
                    status: 404,
                    body: "not found".to_string(),
                })
            }
        }

        async fn deactivate_node(&self, id: i64) -> Result<(), ApiError> {
            self.record(format!("deactivate {id}"));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakePlatform;
    use super::*;
    use chrono::Duration;
    use serial_test::serial;
    use tempfile::TempDir;

    fn store() -> (TempDir, ConfigStore) {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    #[serial]
    async fn test_login_persists_credentials_and_tokens() {
        let (_dir, store) = store();
        let api = FakePlatform::default();

        login(&store, &api, "user", "pass").await.unwrap();

        let user = store.load_user().unwrap();
        assert_eq!(user.username.as_deref(), Some("user"));
        assert_eq!(user.password.as_deref(), Some("pass"));
        assert_eq!(user.token.as_deref(), Some("login-token"));
        assert_eq!(user.refresh_token.as_deref(), Some("login-refresh"));
    }

    #[tokio::test]
    #[serial]
    async fn test_login_rejected() {
        let (_dir, store) = store();
        let api = FakePlatform::default();

        let result = login(&store, &api, "user", "wrong").await;
        assert!(matches!(result, Err(NodeError::Session(_))));
        assert!(store.load_user().unwrap().token.is_none());
    }

    #[tokio::test]
    #[serial]
    async fn test_valid_token_is_used_as_is() {
        let (_dir, store) = store();
        let now = Utc::now();
        let user = UserConfiguration {
            token: Some("current".to_string()),
            token_expiration_date: Some(now + Duration::minutes(5)),
            ..Default::default()
        };
        store.save_user(&user).unwrap();
        let api = FakePlatform::default();

        let session = initialize(&store, &api, now).await.unwrap();
        assert_eq!(session.token.as_deref(), Some("current"));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    #[serial]
    async fn test_expired_token_is_refreshed() {
        let (_dir, store) = store();
        let now = Utc::now();
        let user = UserConfiguration {
            token: Some("stale".to_string()),
            token_expiration_date: Some(now - Duration::minutes(5)),
            refresh_token: Some("refresh".to_string()),
            refresh_token_expiration_date: Some(now + Duration::days(1)),
            ..Default::default()
        };
        store.save_user(&user).unwrap();
        let api = FakePlatform::default();

        let session = initialize(&store, &api, now).await.unwrap();
        assert_eq!(session.token.as_deref(), Some("refreshed-token"));
        assert_eq!(api.calls(), vec!["refresh refresh"]);
        assert_eq!(
            store.load_user().unwrap().token.as_deref(),
            Some("refreshed-token")
        );
    }

    #[tokio::test]
    #[serial]
    async fn test_failed_refresh_falls_back_to_credentials() {
        let (_dir, store) = store();
        let now = Utc::now();
        let user = UserConfiguration {
            username: Some("user".to_string()),
            password: Some("pass".to_string()),
            refresh_token: Some("refresh".to_string()),
            refresh_token_expiration_date: Some(now + Duration::days(1)),
            ..Default::default()
        };
        store.save_user(&user).unwrap();
        let api = FakePlatform {
            reject_refresh: true,
            ..Default::default()
        };

        let session = initialize(&store, &api, now).await.unwrap();
        assert_eq!(session.token.as_deref(), Some("login-token"));
        assert_eq!(api.calls(), vec!["refresh refresh", "authenticate user"]);
    }

    #[tokio::test]
    #[serial]
    async fn test_no_credentials_requires_login() {
        let (_dir, store) = store();
        let api = FakePlatform::default();

        let result = initialize(&store, &api, Utc::now()).await;
        assert!(matches!(result, Err(NodeError::Session(_))));
        assert!(api.calls().is_empty());
    }
}
