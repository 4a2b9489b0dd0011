use std::sync::Arc;

use berner_core::{CoreError, ErrorExt, Forum, Platform, PostEvent};
use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::templates::TemplatePool;

/// Lifecycle state of the monitoring engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Monitoring,
    Stopping,
}

/// A forum that could not be brought under monitoring during `start`.
#[derive(Debug)]
pub struct ForumFailure {
    pub forum: String,
    pub error: CoreError,
}

struct ForumTask {
    forum: String,
    handle: JoinHandle<()>,
}

/// Subscribes to each monitored forum's new-post feed and comments on every
/// detected post with a rendered template.
pub struct MonitorEngine {
    platform: Arc<dyn Platform>,
    templates: Arc<TemplatePool>,
    state: EngineState,
    cancel: CancellationToken,
    tasks: Vec<ForumTask>,
}

impl MonitorEngine {
    pub fn new(platform: Arc<dyn Platform>, templates: Arc<TemplatePool>) -> Self {
        Self {
            platform,
            templates,
            state: EngineState::Idle,
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Number of forums currently under monitoring.
    pub fn monitored_count(&self) -> usize {
        self.tasks.len()
    }

    /// Begin monitoring every forum in `forums`. Each forum is set up
    /// independently: a failure on one is reported in the returned list and
    /// does not block subscribing the others.
    pub async fn start(&mut self, forums: &[Forum]) -> Result<Vec<ForumFailure>, CoreError> {
        if self.state != EngineState::Idle {
            return Err(CoreError::Internal {
                message: "monitoring already started".to_string(),
            });
        }

        self.cancel = CancellationToken::new();
        let mut failures = Vec::new();

        for forum in forums {
            match self.subscribe_forum(forum).await {
                Ok(task) => self.tasks.push(task),
                Err(error) => {
                    warn!("Failed to start monitoring r/{}: {}", forum.name, error);
                    failures.push(ForumFailure {
                        forum: forum.name.clone(),
                        error,
                    });
                }
            }
        }

        self.state = EngineState::Monitoring;
        Ok(failures)
    }

    async fn subscribe_forum(&self, forum: &Forum) -> Result<ForumTask, CoreError> {
        info!("Monitoring r/{} for new posts", forum.name);

        // Catch-up fetch: posts that already exist form the baseline and
        // are never replied to.
        let baseline = self.platform.recent_posts(forum).await?;
        debug!(
            "r/{}: {} existing post(s) form the baseline",
            forum.name,
            baseline.len()
        );

        let mut feed = self.platform.subscribe(forum, baseline).await?;

        let platform = Arc::clone(&self.platform);
        let templates = Arc::clone(&self.templates);
        let cancel = self.cancel.clone();
        let name = forum.name.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    batch = feed.next_batch() => match batch {
                        Some(batch) => {
                            respond_to_batch(platform.as_ref(), &templates, &name, batch).await;
                        }
                        None => {
                            warn!("r/{}: new-post feed closed", name);
                            break;
                        }
                    }
                }
            }
            debug!("r/{}: monitor task finished", name);
        });

        Ok(ForumTask {
            forum: forum.name.clone(),
            handle,
        })
    }

    /// Stop monitoring. Safe to call at any time: stopping an `Idle` engine,
    /// or stopping twice, is a no-op. Every forum task has completed before
    /// this returns, so no reaction callback fires afterwards.
    pub async fn stop(&mut self) {
        if self.state != EngineState::Monitoring {
            return;
        }
        self.state = EngineState::Stopping;
        self.cancel.cancel();

        let tasks = std::mem::take(&mut self.tasks);
        for task in &tasks {
            info!("Terminating monitoring of r/{}", task.forum);
        }
        for result in join_all(tasks.into_iter().map(|t| t.handle)).await {
            if let Err(e) = result {
                warn!("Monitor task ended abnormally: {}", e);
            }
        }

        self.state = EngineState::Idle;
        info!("Monitoring stopped");
    }

    /// Full monitoring lifecycle: start, report per-forum setup failures,
    /// block until `shutdown` fires, then stop.
    pub async fn run(
        &mut self,
        forums: &[Forum],
        shutdown: CancellationToken,
    ) -> Result<(), CoreError> {
        let failures = self.start(forums).await?;
        for failure in &failures {
            warn!(
                "r/{} is not being monitored: {}",
                failure.forum, failure.error
            );
        }
        if self.tasks.is_empty() {
            self.stop().await;
            return Err(CoreError::Internal {
                message: "no subreddit could be brought under monitoring".to_string(),
            });
        }
        info!("Monitoring {} subreddit(s)", self.tasks.len());

        shutdown.cancelled().await;
        info!("Shutdown requested");
        self.stop().await;
        Ok(())
    }
}

/// React to one batch of detected posts: comment on each, in delivery
/// order. A failed submission is logged and skipped so the rest of the
/// batch still gets replies.
async fn respond_to_batch(
    platform: &dyn Platform,
    templates: &TemplatePool,
    forum: &str,
    batch: Vec<PostEvent>,
) {
    for post in batch {
        let body = templates.sample().render(&post);
        match platform.submit_reply(&post, &body).await {
            Ok(reply) => {
                info!("Added comment {} to post {}", reply.fullname, post.fullname);
            }
            Err(e) => {
                warn!(
                    "r/{}: failed to comment on post {} ({}): {}",
                    forum,
                    post.id,
                    e.error_code(),
                    e
                );
            }
        }
    }
}
