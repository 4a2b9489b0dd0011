use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::CoreError;
use crate::types::{Forum, PostEvent, ReplyHandle, TokenPair};

/// Stream of new-post batches for a single monitored forum.
pub struct PostFeed {
    receiver: mpsc::Receiver<Vec<PostEvent>>,
}

impl PostFeed {
    pub fn new(receiver: mpsc::Receiver<Vec<PostEvent>>) -> Self {
        Self { receiver }
    }

    /// Connected sender/feed pair. Implementations push detected batches
    /// through the sender; tests can feed synthetic batches the same way.
    pub fn channel(capacity: usize) -> (mpsc::Sender<Vec<PostEvent>>, PostFeed) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, PostFeed::new(rx))
    }

    /// Next batch of detected posts, or `None` once the producer is gone.
    pub async fn next_batch(&mut self) -> Option<Vec<PostEvent>> {
        self.receiver.recv().await
    }
}

/// Everything the monitoring workflow needs from the platform: forum
/// resolution, the new-post change feed, and comment submission.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Resolve a forum name to a live handle.
    async fn resolve_forum(&self, name: &str) -> Result<Forum, CoreError>;

    /// Currently visible new posts. Fetched once per forum at startup to
    /// establish the monitoring baseline.
    async fn recent_posts(&self, forum: &Forum) -> Result<Vec<PostEvent>, CoreError>;

    /// Subscribe to the forum's new-post feed. Posts in `baseline` count as
    /// already seen and are never delivered.
    async fn subscribe(
        &self,
        forum: &Forum,
        baseline: Vec<PostEvent>,
    ) -> Result<PostFeed, CoreError>;

    /// Submit `body` as a comment replying to `post`.
    async fn submit_reply(&self, post: &PostEvent, body: &str)
        -> Result<ReplyHandle, CoreError>;
}

/// One-time interactive authorization against the identity provider.
#[async_trait]
pub trait AuthorizationFlow: Send {
    /// URL the user must open to authorize the application.
    fn authorization_url(&mut self) -> Result<String, CoreError>;

    /// Wait for the user to complete authorization and return the tokens.
    /// Callers bound the wait with their own timeout.
    async fn await_tokens(&mut self) -> Result<TokenPair, CoreError>;
}
