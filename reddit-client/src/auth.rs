use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use berner_core::{
    AuthorizationFlow, ConfigError, CoreError, Credentials, RedditApiError, TokenPair,
};
use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl, RefreshToken,
    Scope, TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing::{debug, info};
use url::Url;

const REDDIT_AUTH_URL: &str = "https://www.reddit.com/api/v1/authorize";
const REDDIT_TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

// Fallback when the token endpoint omits expires_in.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub struct RedditOAuth2Config {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub user_agent: String,
}

impl RedditOAuth2Config {
    pub fn new(
        client_id: String,
        client_secret: String,
        redirect_uri: String,
        user_agent: String,
    ) -> Self {
        Self {
            client_id,
            client_secret,
            redirect_uri,
            user_agent,
        }
    }

    /// Config for an installed app, which authenticates with its app id
    /// alone (Reddit expects an empty secret for this app type).
    pub fn installed_app(app_id: &str, redirect_uri: &str, user_agent: &str) -> Self {
        Self::new(
            app_id.to_string(),
            String::new(),
            redirect_uri.to_string(),
            user_agent.to_string(),
        )
    }

    fn redirect_port(&self) -> Result<u16, CoreError> {
        let url = Url::parse(&self.redirect_uri).map_err(|e| ConfigError::InvalidFormat {
            details: format!("invalid redirect URI: {e}"),
        })?;
        Ok(url.port().unwrap_or(80))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: SystemTime,
    pub scope: Vec<String>,
}

impl RedditToken {
    pub fn is_expired(&self) -> bool {
        SystemTime::now() >= self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    NotAuthenticated,
    PendingAuthorization { since: SystemTime },
    Authenticated { expires_at: SystemTime },
    TokenExpired { expired_at: SystemTime },
}

/// OAuth2 state for a single Reddit account: authorization URL generation,
/// the code exchange, and token refresh.
pub struct RedditClient {
    config: RedditOAuth2Config,
    oauth: BasicClient,
    token: Option<RedditToken>,
    pending_since: Option<SystemTime>,
    pending_csrf: Option<CsrfToken>,
}

impl RedditClient {
    pub fn new(config: RedditOAuth2Config) -> Result<Self, CoreError> {
        let auth_url =
            AuthUrl::new(REDDIT_AUTH_URL.to_string()).map_err(|e| ConfigError::InvalidFormat {
                details: format!("invalid authorization URL: {e}"),
            })?;
        let token_url =
            TokenUrl::new(REDDIT_TOKEN_URL.to_string()).map_err(|e| ConfigError::InvalidFormat {
                details: format!("invalid token URL: {e}"),
            })?;
        let redirect_url = RedirectUrl::new(config.redirect_uri.clone()).map_err(|e| {
            ConfigError::InvalidFormat {
                details: format!("invalid redirect URI: {e}"),
            }
        })?;

        let oauth = BasicClient::new(
            ClientId::new(config.client_id.clone()),
            Some(ClientSecret::new(config.client_secret.clone())),
            auth_url,
            Some(token_url),
        )
        .set_redirect_uri(redirect_url);

        Ok(Self {
            config,
            oauth,
            token: None,
            pending_since: None,
            pending_csrf: None,
        })
    }

    /// Rehydrate a client from stored credentials. Stored tokens have
    /// unknown age, so they are marked expired and refreshed on first use.
    pub fn from_credentials(
        config: RedditOAuth2Config,
        credentials: &Credentials,
    ) -> Result<Self, CoreError> {
        let mut client = Self::new(config)?;
        if credentials.is_authorized() {
            client.token = Some(RedditToken {
                access_token: credentials.access_token.clone().unwrap_or_default(),
                refresh_token: credentials.refresh_token.clone(),
                expires_at: SystemTime::UNIX_EPOCH,
                scope: Vec::new(),
            });
        }
        Ok(client)
    }

    pub fn get_required_scopes() -> Vec<&'static str> {
        vec!["identity", "read", "submit"]
    }

    /// Authorization URL for the user to open, plus the CSRF state that the
    /// eventual callback must echo. Requests a permanent grant so a refresh
    /// token is issued.
    pub fn generate_auth_url(
        &mut self,
        scopes: &[&str],
    ) -> Result<(String, CsrfToken), CoreError> {
        let mut request = self.oauth.authorize_url(CsrfToken::new_random);
        for scope in scopes {
            request = request.add_scope(Scope::new((*scope).to_string()));
        }
        let (url, csrf_token) = request.add_extra_param("duration", "permanent").url();

        self.pending_since = Some(SystemTime::now());
        self.pending_csrf = Some(csrf_token.clone());
        debug!("Generated Reddit authorization URL");
        Ok((url.to_string(), csrf_token))
    }

    /// Validate the OAuth callback and exchange its code for tokens.
    pub async fn handle_callback(
        &mut self,
        callback_url: &str,
        expected_csrf: &CsrfToken,
    ) -> Result<RedditToken, CoreError> {
        let url = Url::parse(callback_url).map_err(|e| RedditApiError::AuthenticationFailed {
            reason: format!("invalid callback URL: {e}"),
        })?;

        let mut code = None;
        let mut state = None;
        let mut error = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                _ => {}
            }
        }

        if let Some(reason) = error {
            return Err(RedditApiError::AuthenticationFailed { reason }.into());
        }
        let state = state.ok_or_else(|| RedditApiError::AuthenticationFailed {
            reason: "missing state parameter".to_string(),
        })?;
        if state != *expected_csrf.secret() {
            return Err(RedditApiError::AuthenticationFailed {
                reason: "CSRF token mismatch".to_string(),
            }
            .into());
        }
        let code = code.ok_or_else(|| RedditApiError::AuthenticationFailed {
            reason: "missing authorization code".to_string(),
        })?;

        let response = self
            .oauth
            .exchange_code(AuthorizationCode::new(code))
            .request_async(async_http_client)
            .await
            .map_err(|e| RedditApiError::AuthenticationFailed {
                reason: e.to_string(),
            })?;

        let token = RedditToken {
            access_token: response.access_token().secret().clone(),
            refresh_token: response.refresh_token().map(|t| t.secret().clone()),
            expires_at: SystemTime::now()
                + response.expires_in().unwrap_or(DEFAULT_TOKEN_LIFETIME),
            scope: response
                .scopes()
                .map(|scopes| scopes.iter().map(|s| s.as_str().to_string()).collect())
                .unwrap_or_default(),
        };

        self.pending_since = None;
        self.pending_csrf = None;
        self.token = Some(token.clone());
        info!("Reddit token exchange completed");
        Ok(token)
    }

    /// Exchange the stored refresh token for a fresh access token.
    pub async fn refresh(&mut self) -> Result<(), CoreError> {
        let refresh_token = self
            .token
            .as_ref()
            .and_then(|t| t.refresh_token.clone())
            .ok_or(RedditApiError::InvalidToken)?;

        let response = self
            .oauth
            .exchange_refresh_token(&RefreshToken::new(refresh_token.clone()))
            .request_async(async_http_client)
            .await
            .map_err(|e| RedditApiError::AuthenticationFailed {
                reason: format!("token refresh failed: {e}"),
            })?;

        // Reddit does not rotate the refresh token on every exchange.
        let token = RedditToken {
            access_token: response.access_token().secret().clone(),
            refresh_token: response
                .refresh_token()
                .map(|t| t.secret().clone())
                .or(Some(refresh_token)),
            expires_at: SystemTime::now()
                + response.expires_in().unwrap_or(DEFAULT_TOKEN_LIFETIME),
            scope: response
                .scopes()
                .map(|scopes| scopes.iter().map(|s| s.as_str().to_string()).collect())
                .unwrap_or_default(),
        };
        self.token = Some(token);
        debug!("Access token refreshed");
        Ok(())
    }

    pub fn set_token(&mut self, token: RedditToken) {
        self.token = Some(token);
    }

    pub fn token(&self) -> Option<&RedditToken> {
        self.token.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.token.as_ref(), Some(token) if !token.is_expired())
    }

    pub fn needs_refresh(&self) -> bool {
        matches!(
            self.token.as_ref(),
            Some(token) if token.is_expired() && token.refresh_token.is_some()
        )
    }

    pub fn get_auth_state(&self) -> AuthState {
        match &self.token {
            Some(token) if !token.is_expired() => AuthState::Authenticated {
                expires_at: token.expires_at,
            },
            Some(token) => AuthState::TokenExpired {
                expired_at: token.expires_at,
            },
            None => match self.pending_since {
                Some(since) => AuthState::PendingAuthorization { since },
                None => AuthState::NotAuthenticated,
            },
        }
    }

    /// A valid access token, refreshing the stored one first if it has
    /// expired.
    pub async fn ensure_authenticated(&mut self) -> Result<String, CoreError> {
        match self.get_auth_state() {
            AuthState::Authenticated { .. } => {}
            AuthState::TokenExpired { .. } => {
                if self.needs_refresh() {
                    self.refresh().await?;
                } else {
                    return Err(RedditApiError::AuthenticationFailed {
                        reason: "Token expired and no refresh token is available".to_string(),
                    }
                    .into());
                }
            }
            AuthState::PendingAuthorization { .. } => {
                return Err(RedditApiError::AuthenticationFailed {
                    reason: "Authentication pending; complete the browser authorization"
                        .to_string(),
                }
                .into());
            }
            AuthState::NotAuthenticated => {
                return Err(RedditApiError::AuthenticationFailed {
                    reason: "Not authenticated; run the authorization flow first".to_string(),
                }
                .into());
            }
        }

        self.token
            .as_ref()
            .map(|token| token.access_token.clone())
            .ok_or_else(|| {
                RedditApiError::AuthenticationFailed {
                    reason: "Not authenticated; run the authorization flow first".to_string(),
                }
                .into()
            })
    }
}

#[async_trait]
impl AuthorizationFlow for RedditClient {
    fn authorization_url(&mut self) -> Result<String, CoreError> {
        let scopes = Self::get_required_scopes();
        let (url, _csrf_token) = self.generate_auth_url(&scopes)?;
        Ok(url)
    }

    async fn await_tokens(&mut self) -> Result<TokenPair, CoreError> {
        let expected_csrf = self.pending_csrf.clone().ok_or_else(|| {
            RedditApiError::AuthenticationFailed {
                reason: "no authorization in progress".to_string(),
            }
        })?;

        let port = self.config.redirect_port()?;
        let callback_url = await_callback(port).await?;
        let token = self.handle_callback(&callback_url, &expected_csrf).await?;
        Ok(TokenPair {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
        })
    }
}

/// Accept a single HTTP request on the redirect port and hand back the full
/// callback URL from its request line. Stray requests (browser favicon
/// probes and the like) get a 404 and the wait continues.
pub async fn await_callback(port: u16) -> Result<String, CoreError> {
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    debug!("Waiting for the OAuth redirect on port {}", port);

    loop {
        let (stream, _addr) = listener.accept().await?;
        let (read_half, mut write_half) = stream.into_split();

        let mut request_line = String::new();
        BufReader::new(read_half).read_line(&mut request_line).await?;
        let path = request_line.split_whitespace().nth(1).unwrap_or("/");

        if !path.starts_with("/callback") {
            let _ = write_half
                .write_all(b"HTTP/1.1 404 Not Found\r\nConnection: close\r\n\r\n")
                .await;
            continue;
        }

        let body = "<html><body><p>Authorization complete. You can close this tab \
                    and return to the terminal.</p></body></html>";
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\n\
             Connection: close\r\n\r\n{}",
            body.len(),
            body
        );
        write_half.write_all(response.as_bytes()).await?;
        let _ = write_half.shutdown().await;

        return Ok(format!("http://localhost:{}{}", port, path));
    }
}
