use berner_core::{CoreError, PostEvent, RedditApiError, ReplyHandle};
use reqwest::{Client, Method, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

const REDDIT_API_BASE: &str = "https://oauth.reddit.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListing<T> {
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingData<T> {
    pub children: Vec<RedditListingChild<T>>,
    pub after: Option<String>,
    pub before: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditPostData {
    pub id: String,
    pub name: Option<String>,
    pub title: String,
    pub author: String,
    pub subreddit: String,
    pub permalink: String,
    pub created_utc: f64,
    pub stickied: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditSubredditData {
    pub id: String,
    pub display_name: String,
    pub title: String,
    pub subscribers: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditUserData {
    pub id: String,
    pub name: String,
    pub link_karma: i32,
    pub comment_karma: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentSubmissionResponse {
    pub json: CommentSubmissionBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentSubmissionBody {
    #[serde(default)]
    pub errors: Vec<Vec<serde_json::Value>>,
    pub data: Option<CommentSubmissionData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentSubmissionData {
    #[serde(default)]
    pub things: Vec<RedditListingChild<CommentData>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentData {
    pub id: String,
    pub name: Option<String>,
}

#[derive(Debug)]
pub struct RedditApiClient {
    http_client: Client,
    user_agent: String,
}

impl RedditApiClient {
    pub fn new(user_agent: String) -> Result<Self, CoreError> {
        let http_client = Client::builder()
            .user_agent(&user_agent)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http_client,
            user_agent,
        })
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    async fn make_request(
        &self,
        method: Method,
        endpoint: &str,
        access_token: &str,
        query_params: Option<&[(&str, &str)]>,
        form_params: Option<&[(&str, &str)]>,
    ) -> Result<Response, CoreError> {
        let url = format!("{}{}", REDDIT_API_BASE, endpoint);

        let mut request_builder = self
            .http_client
            .request(method.clone(), &url)
            .bearer_auth(access_token)
            .header("User-Agent", &self.user_agent);

        if let Some(params) = query_params {
            request_builder = request_builder.query(params);
        }
        if let Some(fields) = form_params {
            request_builder = request_builder.form(fields);
        }

        debug!("Making Reddit API request: {} {}", method, endpoint);
        let response = match request_builder.send().await {
            Ok(response) => response,
            Err(e) => {
                error!("Network error for {} {}: {}", method, endpoint, e);
                if e.is_timeout() {
                    return Err(RedditApiError::RequestTimeout.into());
                }
                return Err(CoreError::Network(e));
            }
        };

        let status = response.status();
        if status.is_success() {
            debug!("Request successful: {} {}", status, endpoint);
            return Ok(response);
        }

        error!("Request failed with status: {} for {}", status, endpoint);
        match status.as_u16() {
            429 => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.parse().ok())
                    .unwrap_or(60);
                Err(RedditApiError::RateLimitExceeded { retry_after }.into())
            }
            401 => Err(RedditApiError::InvalidToken.into()),
            403 => Err(RedditApiError::Forbidden {
                resource: endpoint.to_string(),
            }
            .into()),
            404 => Err(RedditApiError::InvalidResponse {
                details: "Resource not found".to_string(),
            }
            .into()),
            code if status.is_server_error() => {
                Err(RedditApiError::ServerError { status_code: code }.into())
            }
            _ => Err(RedditApiError::InvalidResponse {
                details: format!("unexpected status {}", status),
            }
            .into()),
        }
    }

    pub async fn get_user_info(&self, access_token: &str) -> Result<RedditUserData, CoreError> {
        let response = self
            .make_request(Method::GET, "/api/v1/me", access_token, None, None)
            .await?;

        let user_data: RedditUserData = response.json().await.map_err(|e| {
            error!("Failed to parse user data: {}", e);
            RedditApiError::InvalidResponse {
                details: "Failed to parse user data".to_string(),
            }
        })?;

        debug!("Retrieved user info for: {}", user_data.name);
        Ok(user_data)
    }

    pub async fn get_subreddit_info(
        &self,
        access_token: &str,
        subreddit: &str,
    ) -> Result<RedditSubredditData, CoreError> {
        let endpoint = format!("/r/{}/about", subreddit);

        let response = match self
            .make_request(Method::GET, &endpoint, access_token, None, None)
            .await
        {
            Ok(response) => response,
            Err(CoreError::RedditApi(RedditApiError::InvalidResponse { .. })) => {
                return Err(RedditApiError::SubredditNotFound {
                    subreddit: subreddit.to_string(),
                }
                .into());
            }
            Err(e) => return Err(e),
        };

        let subreddit_response: RedditListingChild<RedditSubredditData> =
            response.json().await.map_err(|e| {
                error!("Failed to parse subreddit info: {}", e);
                RedditApiError::InvalidResponse {
                    details: format!("Failed to parse info for r/{}", subreddit),
                }
            })?;

        debug!("Retrieved info for r/{}", subreddit);
        Ok(subreddit_response.data)
    }

    /// The subreddit's current new-post listing, in Reddit's order (newest
    /// first).
    pub async fn get_new_posts(
        &self,
        access_token: &str,
        subreddit: &str,
        limit: Option<u32>,
    ) -> Result<Vec<PostEvent>, CoreError> {
        let endpoint = format!("/r/{}/new", subreddit);
        let limit_str = limit.unwrap_or(100).to_string();
        let params = [("limit", limit_str.as_str())];

        let response = self
            .make_request(Method::GET, &endpoint, access_token, Some(&params), None)
            .await?;

        let listing: RedditListing<RedditPostData> = response.json().await.map_err(|e| {
            error!("Failed to parse subreddit posts: {}", e);
            RedditApiError::InvalidResponse {
                details: format!("Failed to parse posts for r/{}", subreddit),
            }
        })?;

        debug!(
            "Retrieved {} new posts from r/{}",
            listing.data.children.len(),
            subreddit
        );
        Ok(listing
            .data
            .children
            .into_iter()
            .map(post_event_from_child)
            .collect())
    }

    /// Submit `text` as a comment on the thing named by `parent_fullname`.
    pub async fn submit_comment(
        &self,
        access_token: &str,
        parent_fullname: &str,
        text: &str,
    ) -> Result<ReplyHandle, CoreError> {
        let form = [
            ("api_type", "json"),
            ("thing_id", parent_fullname),
            ("text", text),
        ];

        let response = self
            .make_request(Method::POST, "/api/comment", access_token, None, Some(&form))
            .await?;

        let submission: CommentSubmissionResponse = response.json().await.map_err(|e| {
            error!("Failed to parse comment response: {}", e);
            RedditApiError::InvalidResponse {
                details: "Failed to parse comment response".to_string(),
            }
        })?;

        if !submission.json.errors.is_empty() {
            let details = submission
                .json
                .errors
                .iter()
                .flatten()
                .map(|value| {
                    value
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| value.to_string())
                })
                .collect::<Vec<_>>()
                .join(" ");
            return Err(RedditApiError::CommentRejected { details }.into());
        }

        let thing = submission
            .json
            .data
            .and_then(|data| data.things.into_iter().next())
            .ok_or_else(|| RedditApiError::InvalidResponse {
                details: "Comment response contained no comment".to_string(),
            })?;

        let fullname = thing
            .data
            .name
            .clone()
            .unwrap_or_else(|| format!("{}_{}", thing.kind, thing.data.id));
        info!("Submitted comment {} on {}", fullname, parent_fullname);
        Ok(ReplyHandle {
            id: thing.data.id,
            fullname,
        })
    }
}

pub(crate) fn post_event_from_child(child: RedditListingChild<RedditPostData>) -> PostEvent {
    let RedditListingChild { kind, data } = child;
    let fullname = data
        .name
        .unwrap_or_else(|| format!("{}_{}", kind, data.id));
    PostEvent {
        subreddit: data.subreddit,
        id: data.id,
        fullname,
        title: data.title,
    }
}
