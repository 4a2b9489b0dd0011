use std::time::Duration;

use berner_core::{AuthorizationFlow, CoreError, Credentials};
use tracing::{info, warn};

use crate::credentials::CredentialStore;

/// How long to wait for the user to finish authorizing in the browser
/// before giving up.
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// One-time authorization: open the provider's authorization page in a
/// browser, wait for the tokens, and persist the resulting credentials.
///
/// The wait is bounded by `timeout`; expiry fails with
/// `CoreError::Timeout` and leaves the store untouched.
pub async fn authorize<F: AuthorizationFlow>(
    flow: &mut F,
    store: &CredentialStore,
    app_id: &str,
    timeout: Duration,
) -> Result<Credentials, CoreError> {
    let url = flow.authorization_url()?;

    info!("Opening web browser for Reddit authorization");
    if open::that(&url).is_err() {
        warn!("Could not launch a browser automatically");
        println!("Open this URL in your browser to authorize the bot:");
        println!("  {url}");
    }

    let tokens = tokio::time::timeout(timeout, flow.await_tokens())
        .await
        .map_err(|_| CoreError::Timeout {
            seconds: timeout.as_secs(),
        })??;

    let credentials = Credentials {
        app_id: app_id.to_string(),
        access_token: Some(tokens.access_token),
        refresh_token: tokens.refresh_token,
    };
    store.save(&credentials)?;
    info!("Reddit authorization successful");

    Ok(credentials)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use berner_core::{ConfigError, TokenPair};
    use tempfile::tempdir;

    struct InstantFlow;

    #[async_trait]
    impl AuthorizationFlow for InstantFlow {
        fn authorization_url(&mut self) -> Result<String, CoreError> {
            // A scheme no browser handler claims, so `open` cannot actually
            // launch anything during tests.
            Ok("test-authorize://app".to_string())
        }

        async fn await_tokens(&mut self) -> Result<TokenPair, CoreError> {
            Ok(TokenPair {
                access_token: "access-abc".to_string(),
                refresh_token: Some("refresh-def".to_string()),
            })
        }
    }

    struct NeverCompletesFlow;

    #[async_trait]
    impl AuthorizationFlow for NeverCompletesFlow {
        fn authorization_url(&mut self) -> Result<String, CoreError> {
            Ok("test-authorize://app".to_string())
        }

        async fn await_tokens(&mut self) -> Result<TokenPair, CoreError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn successful_flow_persists_credentials() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("bot.config.json"));

        let credentials = authorize(
            &mut InstantFlow,
            &store,
            "app-id",
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert_eq!(credentials.app_id, "app-id");
        assert_eq!(credentials.access_token.as_deref(), Some("access-abc"));
        assert_eq!(credentials.refresh_token.as_deref(), Some("refresh-def"));
        assert_eq!(store.load().unwrap(), credentials);
    }

    #[tokio::test]
    async fn timing_out_fails_and_saves_nothing() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("bot.config.json"));

        let result = authorize(
            &mut NeverCompletesFlow,
            &store,
            "app-id",
            Duration::from_millis(50),
        )
        .await;

        assert!(matches!(result, Err(CoreError::Timeout { .. })));
        assert!(matches!(
            store.load(),
            Err(CoreError::Config(ConfigError::CredentialsNotFound { .. }))
        ));
    }
}
