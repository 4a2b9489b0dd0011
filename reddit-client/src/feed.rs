use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use berner_core::{Forum, PostEvent, PostFeed};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::platform::Shared;

const FEED_CHANNEL_CAPACITY: usize = 16;

// Well above the 100-post listing window, so pruning can never forget an
// id that is still visible in the listing.
const SEEN_PRUNE_THRESHOLD: usize = 4096;

/// Spawn the polling task behind one forum's new-post feed. The task diffs
/// each `/new` listing against the ids it has already seen (seeded from the
/// startup baseline), delivers fresh posts oldest-first, and winds down when
/// the returned feed is dropped.
pub(crate) fn spawn_new_post_feed(
    shared: Arc<Shared>,
    forum: Forum,
    baseline: Vec<PostEvent>,
    poll_interval: Duration,
) -> PostFeed {
    let (tx, feed) = PostFeed::channel(FEED_CHANNEL_CAPACITY);
    let mut seen: HashSet<String> = baseline.into_iter().map(|post| post.fullname).collect();

    tokio::spawn(async move {
        debug!("r/{}: new-post poller started", forum.name);
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                _ = sleep(poll_interval) => {}
            }

            let posts = match shared.new_posts(&forum.name).await {
                Ok(posts) => posts,
                Err(e) => {
                    warn!("r/{}: poll for new posts failed: {}", forum.name, e);
                    continue;
                }
            };

            if seen.len() > SEEN_PRUNE_THRESHOLD {
                seen.retain(|fullname| posts.iter().any(|post| &post.fullname == fullname));
            }

            // Listings are newest-first; deliver detection batches
            // oldest-first so replies follow posting order.
            let fresh: Vec<PostEvent> = posts
                .into_iter()
                .rev()
                .filter(|post| seen.insert(post.fullname.clone()))
                .collect();
            if fresh.is_empty() {
                continue;
            }

            debug!("r/{}: {} new post(s) detected", forum.name, fresh.len());
            if tx.send(fresh).await.is_err() {
                break;
            }
        }
        debug!("r/{}: new-post poller stopped", forum.name);
    });

    feed
}
