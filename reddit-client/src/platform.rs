use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use berner_core::{CoreError, Forum, Platform, PostEvent, PostFeed, ReplyHandle};
use tokio::sync::Mutex;
use tracing::info;

use crate::api::RedditApiClient;
use crate::auth::RedditClient;
use crate::feed::spawn_new_post_feed;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
const NEW_POSTS_PAGE: u32 = 100;

pub(crate) struct Shared {
    api: RedditApiClient,
    auth: Mutex<RedditClient>,
}

impl Shared {
    pub(crate) async fn access_token(&self) -> Result<String, CoreError> {
        self.auth.lock().await.ensure_authenticated().await
    }

    pub(crate) async fn new_posts(&self, subreddit: &str) -> Result<Vec<PostEvent>, CoreError> {
        let token = self.access_token().await?;
        self.api
            .get_new_posts(&token, subreddit, Some(NEW_POSTS_PAGE))
            .await
    }
}

/// Live Reddit implementation of the platform capability.
pub struct RedditPlatform {
    shared: Arc<Shared>,
    poll_interval: Duration,
}

impl RedditPlatform {
    pub fn new(auth: RedditClient, api: RedditApiClient) -> Self {
        Self {
            shared: Arc::new(Shared {
                api,
                auth: Mutex::new(auth),
            }),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Fetch and log the account the bot is running as. Doubles as the
    /// startup check that the stored tokens still work.
    pub async fn identity(&self) -> Result<String, CoreError> {
        let token = self.shared.access_token().await?;
        let user = self.shared.api.get_user_info(&token).await?;
        info!(
            "Authenticated as u/{} ({} link karma, {} comment karma)",
            user.name, user.link_karma, user.comment_karma
        );
        Ok(user.name)
    }
}

#[async_trait]
impl Platform for RedditPlatform {
    async fn resolve_forum(&self, name: &str) -> Result<Forum, CoreError> {
        let token = self.shared.access_token().await?;
        let info = self.shared.api.get_subreddit_info(&token, name).await?;
        Ok(Forum {
            name: info.display_name,
            title: Some(info.title),
            subscribers: info.subscribers,
        })
    }

    async fn recent_posts(&self, forum: &Forum) -> Result<Vec<PostEvent>, CoreError> {
        self.shared.new_posts(&forum.name).await
    }

    async fn subscribe(
        &self,
        forum: &Forum,
        baseline: Vec<PostEvent>,
    ) -> Result<PostFeed, CoreError> {
        Ok(spawn_new_post_feed(
            Arc::clone(&self.shared),
            forum.clone(),
            baseline,
            self.poll_interval,
        ))
    }

    async fn submit_reply(
        &self,
        post: &PostEvent,
        body: &str,
    ) -> Result<ReplyHandle, CoreError> {
        let token = self.shared.access_token().await?;
        self.shared
            .api
            .submit_comment(&token, &post.fullname, body)
            .await
    }
}
