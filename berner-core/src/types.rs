use serde::{Deserialize, Serialize};

/// Stored application credentials. The app id is always present; the tokens
/// are absent until the first successful authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Credentials {
    pub app_id: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl Credentials {
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            access_token: None,
            refresh_token: None,
        }
    }

    pub fn is_authorized(&self) -> bool {
        self.access_token.is_some() || self.refresh_token.is_some()
    }
}

/// A monitored subreddit, resolved to its live metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Forum {
    pub name: String,
    pub title: Option<String>,
    pub subscribers: Option<u64>,
}

impl Forum {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: None,
            subscribers: None,
        }
    }
}

/// A newly detected post in a monitored forum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostEvent {
    pub subreddit: String,
    pub id: String,
    pub fullname: String,
    pub title: String,
}

/// Handle of a submitted comment, used only for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyHandle {
    pub id: String,
    pub fullname: String,
}

/// Tokens obtained from a completed authorization.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: Option<String>,
}
