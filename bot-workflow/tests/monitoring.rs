use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use berner_core::{
    CoreError, Forum, Platform, PostEvent, PostFeed, RedditApiError, ReplyHandle,
};
use bot_workflow::{EngineState, MonitorEngine, Template, TemplatePool};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// In-memory platform double. Batches are pushed through the senders the
/// engine subscribed to; replies and baseline requests are recorded.
#[derive(Default)]
struct FakePlatform {
    baseline: Mutex<Vec<PostEvent>>,
    broken_forums: HashSet<String>,
    failing_posts: HashSet<String>,
    feeds: Mutex<Vec<(String, mpsc::Sender<Vec<PostEvent>>)>>,
    replies: Mutex<Vec<(String, String)>>,
}

impl FakePlatform {
    fn with_baseline(posts: Vec<PostEvent>) -> Self {
        Self {
            baseline: Mutex::new(posts),
            ..Self::default()
        }
    }

    fn feed_for(&self, forum: &str) -> mpsc::Sender<Vec<PostEvent>> {
        self.feeds
            .lock()
            .unwrap()
            .iter()
            .find(|(name, _)| name == forum)
            .map(|(_, tx)| tx.clone())
            .expect("no feed registered for forum")
    }

    fn replies(&self) -> Vec<(String, String)> {
        self.replies.lock().unwrap().clone()
    }

    fn replied_posts(&self) -> Vec<String> {
        self.replies().into_iter().map(|(post, _)| post).collect()
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn resolve_forum(&self, name: &str) -> Result<Forum, CoreError> {
        Ok(Forum::named(name))
    }

    async fn recent_posts(&self, forum: &Forum) -> Result<Vec<PostEvent>, CoreError> {
        if self.broken_forums.contains(&forum.name) {
            return Err(RedditApiError::SubredditNotFound {
                subreddit: forum.name.clone(),
            }
            .into());
        }
        Ok(self.baseline.lock().unwrap().clone())
    }

    async fn subscribe(
        &self,
        forum: &Forum,
        _baseline: Vec<PostEvent>,
    ) -> Result<PostFeed, CoreError> {
        let (tx, feed) = PostFeed::channel(8);
        self.feeds.lock().unwrap().push((forum.name.clone(), tx));
        Ok(feed)
    }

    async fn submit_reply(
        &self,
        post: &PostEvent,
        body: &str,
    ) -> Result<ReplyHandle, CoreError> {
        if self.failing_posts.contains(&post.id) {
            return Err(RedditApiError::ServerError { status_code: 503 }.into());
        }
        self.replies
            .lock()
            .unwrap()
            .push((post.fullname.clone(), body.to_string()));
        Ok(ReplyHandle {
            id: format!("c_{}", post.id),
            fullname: format!("t1_c_{}", post.id),
        })
    }
}

fn post(subreddit: &str, id: &str) -> PostEvent {
    PostEvent {
        subreddit: subreddit.to_string(),
        id: id.to_string(),
        fullname: format!("t3_{}", id),
        title: format!("post {}", id),
    }
}

fn pool(text: &str) -> Arc<TemplatePool> {
    Arc::new(TemplatePool::from_templates(vec![Template::new(text)]).unwrap())
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within one second");
}

#[tokio::test]
async fn replies_to_detected_posts_but_not_the_baseline() {
    let platform = Arc::new(FakePlatform::with_baseline(vec![post("WayOfTheBern", "old1")]));
    let mut engine = MonitorEngine::new(platform.clone(), pool("hello"));

    let failures = engine
        .start(&[Forum::named("WayOfTheBern")])
        .await
        .unwrap();
    assert!(failures.is_empty());
    assert_eq!(engine.state(), EngineState::Monitoring);

    let feed = platform.feed_for("WayOfTheBern");
    feed.send(vec![post("WayOfTheBern", "new1")]).await.unwrap();

    let platform_check = platform.clone();
    wait_until(move || platform_check.replies().len() == 1).await;

    assert_eq!(platform.replied_posts(), vec!["t3_new1"]);
    engine.stop().await;
}

#[tokio::test]
async fn rendered_template_reaches_the_reply() {
    let platform = Arc::new(FakePlatform::default());
    let mut engine = MonitorEngine::new(
        platform.clone(),
        pool("Posted in {subreddit} as {post} ({postid})"),
    );

    engine.start(&[Forum::named("BernieSanders")]).await.unwrap();
    let feed = platform.feed_for("BernieSanders");
    feed.send(vec![post("BernieSanders", "d0vw1j")]).await.unwrap();

    let platform_check = platform.clone();
    wait_until(move || platform_check.replies().len() == 1).await;

    let (_, body) = platform.replies().pop().unwrap();
    assert_eq!(body, "Posted in BernieSanders as t3_d0vw1j (d0vw1j)");
    engine.stop().await;
}

#[tokio::test]
async fn one_failed_submission_does_not_silence_the_batch() {
    let mut platform = FakePlatform::default();
    platform.failing_posts.insert("p2".to_string());
    let platform = Arc::new(platform);

    let mut engine = MonitorEngine::new(platform.clone(), pool("hi"));
    engine.start(&[Forum::named("WayOfTheBern")]).await.unwrap();

    let feed = platform.feed_for("WayOfTheBern");
    feed.send(vec![
        post("WayOfTheBern", "p1"),
        post("WayOfTheBern", "p2"),
        post("WayOfTheBern", "p3"),
    ])
    .await
    .unwrap();

    let platform_check = platform.clone();
    wait_until(move || platform_check.replies().len() == 2).await;

    assert_eq!(platform.replied_posts(), vec!["t3_p1", "t3_p3"]);
    engine.stop().await;
}

#[tokio::test]
async fn batch_is_processed_in_delivery_order() {
    let platform = Arc::new(FakePlatform::default());
    let mut engine = MonitorEngine::new(platform.clone(), pool("hi"));
    engine.start(&[Forum::named("WayOfTheBern")]).await.unwrap();

    let feed = platform.feed_for("WayOfTheBern");
    feed.send(vec![
        post("WayOfTheBern", "a"),
        post("WayOfTheBern", "b"),
        post("WayOfTheBern", "c"),
    ])
    .await
    .unwrap();

    let platform_check = platform.clone();
    wait_until(move || platform_check.replies().len() == 3).await;

    assert_eq!(platform.replied_posts(), vec!["t3_a", "t3_b", "t3_c"]);
    engine.stop().await;
}

#[tokio::test]
async fn stop_is_idempotent() {
    let platform = Arc::new(FakePlatform::default());
    let mut engine = MonitorEngine::new(platform.clone(), pool("hi"));

    // Stopping an engine that never started is a no-op.
    engine.stop().await;
    assert_eq!(engine.state(), EngineState::Idle);

    engine.start(&[Forum::named("WayOfTheBern")]).await.unwrap();
    assert_eq!(engine.state(), EngineState::Monitoring);

    engine.stop().await;
    assert_eq!(engine.state(), EngineState::Idle);
    engine.stop().await;
    assert_eq!(engine.state(), EngineState::Idle);
}

#[tokio::test]
async fn no_replies_after_stop_returns() {
    let platform = Arc::new(FakePlatform::default());
    let mut engine = MonitorEngine::new(platform.clone(), pool("hi"));
    engine.start(&[Forum::named("WayOfTheBern")]).await.unwrap();

    let feed = platform.feed_for("WayOfTheBern");
    engine.stop().await;

    // The consumer task is gone, so the batch is either rejected outright
    // or dropped without ever reaching the reply path.
    let _ = feed.send(vec![post("WayOfTheBern", "late")]).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(platform.replies().is_empty());
}

#[tokio::test]
async fn one_broken_forum_does_not_block_the_others() {
    let mut platform = FakePlatform::default();
    platform.broken_forums.insert("Banned".to_string());
    let platform = Arc::new(platform);

    let mut engine = MonitorEngine::new(platform.clone(), pool("hi"));
    let failures = engine
        .start(&[Forum::named("Banned"), Forum::named("WayOfTheBern")])
        .await
        .unwrap();

    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].forum, "Banned");
    assert_eq!(engine.monitored_count(), 1);

    let feed = platform.feed_for("WayOfTheBern");
    feed.send(vec![post("WayOfTheBern", "ok")]).await.unwrap();

    let platform_check = platform.clone();
    wait_until(move || platform_check.replies().len() == 1).await;
    engine.stop().await;
}

#[tokio::test]
async fn starting_twice_is_an_error() {
    let platform = Arc::new(FakePlatform::default());
    let mut engine = MonitorEngine::new(platform.clone(), pool("hi"));
    engine.start(&[Forum::named("WayOfTheBern")]).await.unwrap();

    let result = engine.start(&[Forum::named("BernieSanders")]).await;
    assert!(matches!(result, Err(CoreError::Internal { .. })));
    engine.stop().await;
}

#[tokio::test]
async fn run_stops_cleanly_on_shutdown_signal() {
    let platform = Arc::new(FakePlatform::default());
    let mut engine = MonitorEngine::new(platform.clone(), pool("hi"));

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    engine
        .run(&[Forum::named("WayOfTheBern")], shutdown)
        .await
        .unwrap();
    assert_eq!(engine.state(), EngineState::Idle);
}

#[tokio::test]
async fn run_fails_when_nothing_can_be_monitored() {
    let mut platform = FakePlatform::default();
    platform.broken_forums.insert("Banned".to_string());
    let platform = Arc::new(platform);

    let mut engine = MonitorEngine::new(platform.clone(), pool("hi"));
    let result = engine
        .run(&[Forum::named("Banned")], CancellationToken::new())
        .await;

    assert!(matches!(result, Err(CoreError::Internal { .. })));
    assert_eq!(engine.state(), EngineState::Idle);
}

#[tokio::test]
async fn forums_are_processed_independently() {
    let platform = Arc::new(FakePlatform::default());
    let mut engine = MonitorEngine::new(platform.clone(), pool("hi"));
    engine
        .start(&[Forum::named("WayOfTheBern"), Forum::named("BernieSanders")])
        .await
        .unwrap();
    assert_eq!(engine.monitored_count(), 2);

    platform
        .feed_for("WayOfTheBern")
        .send(vec![post("WayOfTheBern", "w1")])
        .await
        .unwrap();
    platform
        .feed_for("BernieSanders")
        .send(vec![post("BernieSanders", "b1")])
        .await
        .unwrap();

    let platform_check = platform.clone();
    wait_until(move || platform_check.replies().len() == 2).await;

    let replied: HashSet<String> = platform.replied_posts().into_iter().collect();
    assert!(replied.contains("t3_w1"));
    assert!(replied.contains("t3_b1"));
    engine.stop().await;
}
