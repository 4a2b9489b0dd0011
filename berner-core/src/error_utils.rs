use crate::error::*;
use std::time::Duration;

pub trait ErrorExt {
    fn is_retryable(&self) -> bool;
    fn retry_after(&self) -> Option<Duration>;
    fn user_friendly_message(&self) -> String;
    fn error_code(&self) -> &'static str;
}

impl ErrorExt for CoreError {
    fn is_retryable(&self) -> bool {
        match self {
            CoreError::RedditApi(e) => e.is_retryable(),
            CoreError::Network(_) => true,
            CoreError::Timeout { .. } => true,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            CoreError::RedditApi(e) => e.retry_after(),
            CoreError::Timeout { seconds } => Some(Duration::from_secs(*seconds)),
            _ if self.is_retryable() => Some(Duration::from_secs(5)),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::RedditApi(e) => e.user_friendly_message(),
            CoreError::Config(e) => e.user_friendly_message(),
            CoreError::Network(_) => {
                "Network connection error. Please check your internet connection.".to_string()
            }
            CoreError::Io(_) => "A file could not be read or written.".to_string(),
            CoreError::Serialization(_) => {
                "A stored configuration file could not be parsed.".to_string()
            }
            CoreError::Timeout { .. } => {
                "The operation took too long to complete. Please try again.".to_string()
            }
            CoreError::Internal { message } => format!("Internal error: {}", message),
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            CoreError::RedditApi(_) => "REDDIT_API",
            CoreError::Config(_) => "CONFIG",
            CoreError::Io(_) => "IO",
            CoreError::Serialization(_) => "SERIALIZATION",
            CoreError::Network(_) => "NETWORK",
            CoreError::Timeout { .. } => "TIMEOUT",
            CoreError::Internal { .. } => "INTERNAL",
        }
    }
}

impl ErrorExt for RedditApiError {
    fn is_retryable(&self) -> bool {
        match self {
            RedditApiError::RateLimitExceeded { .. } => true,
            RedditApiError::RequestTimeout => true,
            RedditApiError::ServerError { status_code } => *status_code >= 500,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            RedditApiError::RateLimitExceeded { retry_after } => {
                Some(Duration::from_secs(*retry_after))
            }
            _ if self.is_retryable() => Some(Duration::from_secs(30)),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            RedditApiError::AuthenticationFailed { .. } => {
                "Reddit authentication failed. Please check your credentials.".to_string()
            }
            RedditApiError::RateLimitExceeded { retry_after } => format!(
                "Reddit is rate limiting requests. Try again in {} seconds.",
                retry_after
            ),
            RedditApiError::Forbidden { resource } => {
                format!("Access to {} is forbidden.", resource)
            }
            RedditApiError::SubredditNotFound { subreddit } => {
                format!("The subreddit r/{} could not be found.", subreddit)
            }
            RedditApiError::InvalidToken => {
                "Your Reddit authentication token is invalid. Please re-authorize the bot."
                    .to_string()
            }
            RedditApiError::RequestTimeout => {
                "The request to Reddit timed out. Please try again.".to_string()
            }
            RedditApiError::InvalidResponse { .. } => {
                "Reddit returned an unexpected response.".to_string()
            }
            RedditApiError::ServerError { .. } => {
                "Reddit is having server problems. Please try again later.".to_string()
            }
            RedditApiError::CommentRejected { details } => {
                format!("Reddit rejected the comment: {}", details)
            }
        }
    }

    fn error_code(&self) -> &'static str {
        "REDDIT_API"
    }
}

impl ErrorExt for ConfigError {
    fn is_retryable(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::CredentialsNotFound { path } => format!(
                "No saved credentials were found at {}. Run the bot once to authorize it.",
                path
            ),
            ConfigError::NoTemplates { path } => format!(
                "No comment templates were found in {}. Add at least one text file \
                 under 10 K to serve as a comment template.",
                path
            ),
            ConfigError::InvalidFormat { details } => {
                format!("A configuration file is malformed: {}", details)
            }
            ConfigError::ValidationFailed { reason } => {
                format!("Configuration check failed: {}", reason)
            }
        }
    }

    fn error_code(&self) -> &'static str {
        "CONFIG"
    }
}
