use crate::error::{PagerError, Result};
use crate::services::source::VerseSource;
use crate::types::{ChapterId, Verse};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub type VerseBatch = Arc<[Verse]>;

/// Result of a chapter fetch as seen by callers that waited on it.
type Shared = Option<std::result::Result<VerseBatch, String>>;

enum Slot {
    Ready(VerseBatch),
    Pending(watch::Receiver<Shared>),
}

enum Role {
    Leader(watch::Sender<Shared>, watch::Receiver<Shared>),
    Follower(watch::Receiver<Shared>),
}

/// What the cache holds for a chapter right now.
#[derive(Debug, Clone)]
pub enum CacheLookup {
    Ready(VerseBatch),
    Pending,
    Absent,
}

/// Per-chapter verse batches with single-flight fetching.
///
/// The first caller for an uncached chapter fetches it; everyone arriving
/// while that fetch runs receives its outcome, success or failure. Entries live
/// until [`VerseCache::clear`]. A failed fetch leaves no entry behind, so the
/// next `get` tries again.
pub struct VerseCache {
    source: Arc<dyn VerseSource>,
    slots: Mutex<HashMap<ChapterId, Slot>>,
}

/// Clears a pending slot if its leader is dropped before finishing.
struct PendingGuard<'a> {
    cache: &'a VerseCache,
    chapter: ChapterId,
    channel: watch::Receiver<Shared>,
    armed: bool,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.cache.settle_slot(self.chapter, &self.channel, None);
        }
    }
}

impl VerseCache {
    pub fn new(source: Arc<dyn VerseSource>) -> Self {
        Self {
            source,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn lookup(&self, chapter: ChapterId) -> CacheLookup {
        match self.slots.lock().get(&chapter) {
            Some(Slot::Ready(batch)) => CacheLookup::Ready(batch.clone()),
            Some(Slot::Pending(_)) => CacheLookup::Pending,
            None => CacheLookup::Absent,
        }
    }

    pub fn contains(&self, chapter: ChapterId) -> bool {
        matches!(self.lookup(chapter), CacheLookup::Ready(_))
    }

    /// Number of chapters with a stored batch.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn put(&self, chapter: ChapterId, verses: Vec<Verse>) {
        self.slots
            .lock()
            .insert(chapter, Slot::Ready(Arc::from(verses)));
    }

    /// Returns the chapter's verses, fetching them at most once across
    /// concurrent callers.
    pub async fn get(&self, chapter: ChapterId) -> Result<VerseBatch> {
        loop {
            let role = {
                let mut slots = self.slots.lock();
                match slots.get(&chapter) {
                    Some(Slot::Ready(batch)) => return Ok(batch.clone()),
                    Some(Slot::Pending(channel)) => Role::Follower(channel.clone()),
                    None => {
                        let (sender, channel) = watch::channel(None);
                        slots.insert(chapter, Slot::Pending(channel.clone()));
                        Role::Leader(sender, channel)
                    }
                }
            };

            match role {
                Role::Leader(sender, channel) => return self.lead(chapter, sender, channel).await,
                Role::Follower(mut channel) => {
                    let outcome = match channel.wait_for(|shared| shared.is_some()).await {
                        Ok(shared) => (*shared).clone(),
                        Err(_) => None,
                    };

                    match outcome {
                        Some(Ok(batch)) => return Ok(batch),
                        Some(Err(reason)) => {
                            return Err(PagerError::fetch(format!("chapter {}", chapter), reason))
                        }
                        // The leader went away without an answer; start over.
                        None => continue,
                    }
                }
            }
        }
    }

    async fn lead(
        &self,
        chapter: ChapterId,
        sender: watch::Sender<Shared>,
        channel: watch::Receiver<Shared>,
    ) -> Result<VerseBatch> {
        let mut guard = PendingGuard {
            cache: self,
            chapter,
            channel,
            armed: true,
        };

        debug!("Fetching chapter {}", chapter);
        let fetched = self
            .source
            .fetch_chapter(chapter)
            .await
            .map(VerseBatch::from)
            .map_err(|err| err.into_fetch_failure(format!("chapter {}", chapter)));

        guard.armed = false;
        match &fetched {
            Ok(batch) => {
                debug!("Fetched {} verses for chapter {}", batch.len(), chapter);
                self.settle_slot(chapter, &guard.channel, Some(batch.clone()));
                sender.send_replace(Some(Ok(batch.clone())));
            }
            Err(err) => {
                self.settle_slot(chapter, &guard.channel, None);
                let reason = match err {
                    PagerError::FetchFailure { reason, .. } => reason.clone(),
                    other => other.to_string(),
                };
                sender.send_replace(Some(Err(reason)));
            }
        }

        fetched
    }

    /// Replaces the pending slot opened on `channel` with `batch`, or removes it.
    /// Slots replaced in the meantime (by `put` or `clear`) are left alone.
    fn settle_slot(
        &self,
        chapter: ChapterId,
        channel: &watch::Receiver<Shared>,
        batch: Option<VerseBatch>,
    ) {
        let mut slots = self.slots.lock();
        let ours = matches!(
            slots.get(&chapter),
            Some(Slot::Pending(current)) if current.same_channel(channel)
        );
        if !ours {
            return;
        }

        match batch {
            Some(batch) => {
                slots.insert(chapter, Slot::Ready(batch));
            }
            None => {
                slots.remove(&chapter);
            }
        }
    }

    /// Starts a background fetch of `chapter` unless it is cached or already in flight.
    /// Failures are logged and dropped.
    pub fn spawn_prefetch(self: &Arc<Self>, chapter: ChapterId) -> Option<JoinHandle<()>> {
        if !matches!(self.lookup(chapter), CacheLookup::Absent) {
            return None;
        }

        let cache = Arc::clone(self);
        Some(tokio::spawn(async move {
            match cache.get(chapter).await {
                Ok(_) => debug!("Prefetched chapter {}", chapter),
                Err(err) => warn!("Prefetch of chapter {} failed: {}", chapter, err),
            }
        }))
    }

    /// Uncached passthrough for global range addressing.
    pub async fn fetch_range(&self, start: u32, end: u32) -> Result<Vec<Verse>> {
        if start == 0 || start > end {
            return Err(PagerError::invalid_target(format!(
                "verse range {}..={} is empty",
                start, end
            )));
        }

        self.source
            .fetch_range(start, end)
            .await
            .map_err(|err| err.into_fetch_failure(format!("verses {}..={}", start, end)))
    }

    pub fn clear(&self) {
        self.slots.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{corpus, ScriptedSource};

    fn cache_over(source: &Arc<ScriptedSource>) -> VerseCache {
        VerseCache::new(source.clone())
    }

    #[tokio::test]
    async fn second_get_is_served_from_cache() {
        let source = ScriptedSource::new(corpus(&[&[10, 10], &[10]]));
        let cache = cache_over(&source);

        assert!(matches!(cache.lookup(1), CacheLookup::Absent));
        let first = cache.get(1).await.unwrap();
        let second = cache.get(1).await.unwrap();

        assert_eq!(first.len(), 2);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(source.calls(1), 1);
        assert!(cache.contains(1));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_gets_share_one_fetch() {
        let source = ScriptedSource::new(corpus(&[&[10, 10]]));
        source.gate(1);
        let cache = cache_over(&source);

        let (a, b, _) = tokio::join!(cache.get(1), cache.get(1), async {
            source.wait_for_calls(1, 1).await;
            assert!(matches!(cache.lookup(1), CacheLookup::Pending));
            source.open(1);
        });

        assert_eq!(a.unwrap().len(), 2);
        assert_eq!(b.unwrap().len(), 2);
        assert_eq!(source.calls(1), 1);
    }

    #[tokio::test]
    async fn failed_fetch_is_not_cached_and_can_be_retried() {
        let source = ScriptedSource::new(corpus(&[&[10]]));
        source.fail(1);
        let cache = cache_over(&source);

        let err = cache.get(1).await.unwrap_err();
        assert!(err.is_fetch_failure());
        assert!(matches!(cache.lookup(1), CacheLookup::Absent));

        source.heal(1);
        assert_eq!(cache.get(1).await.unwrap().len(), 1);
        assert_eq!(source.calls(1), 2);
    }

    #[tokio::test]
    async fn waiters_on_a_failed_fetch_share_its_error() {
        let source = ScriptedSource::new(corpus(&[&[10, 10]]));
        source.gate(1);
        source.fail_once(1);
        let cache = cache_over(&source);

        let (a, b, _) = tokio::join!(cache.get(1), cache.get(1), async {
            source.wait_for_calls(1, 1).await;
            source.open(1);
        });

        assert!(a.unwrap_err().is_fetch_failure());
        assert!(b.unwrap_err().is_fetch_failure());
        assert_eq!(source.calls(1), 1);
        assert!(matches!(cache.lookup(1), CacheLookup::Absent));

        assert_eq!(cache.get(1).await.unwrap().len(), 2);
        assert!(cache.contains(1));
        cache.get(1).await.unwrap();
        assert_eq!(source.calls(1), 2);
    }

    #[tokio::test]
    async fn put_short_circuits_the_source() {
        let source = ScriptedSource::new(corpus(&[&[10]]));
        let cache = cache_over(&source);
        let verses = source.fetch_chapter(1).await.unwrap();

        cache.put(1, verses);
        cache.get(1).await.unwrap();
        assert_eq!(source.calls(1), 1);
    }

    #[tokio::test]
    async fn clear_forgets_everything() {
        let source = ScriptedSource::new(corpus(&[&[10]]));
        let cache = cache_over(&source);
        cache.get(1).await.unwrap();

        cache.clear();
        assert!(cache.is_empty());
        cache.get(1).await.unwrap();
        assert_eq!(source.calls(1), 2);
    }

    #[tokio::test]
    async fn prefetch_failures_are_swallowed() {
        let source = ScriptedSource::new(corpus(&[&[10], &[10]]));
        source.fail(2);
        let cache = Arc::new(cache_over(&source));

        let handle = cache.spawn_prefetch(2).unwrap();
        handle.await.unwrap();
        assert!(!cache.contains(2));

        cache.get(1).await.unwrap();
        assert!(cache.spawn_prefetch(1).is_none());
    }

    #[tokio::test]
    async fn empty_range_is_rejected_before_fetching() {
        let source = ScriptedSource::new(corpus(&[&[10, 10, 10]]));
        let cache = cache_over(&source);

        let err = cache.fetch_range(3, 1).await.unwrap_err();
        assert!(matches!(err, PagerError::InvalidTarget { .. }));
        assert_eq!(cache.fetch_range(1, 2).await.unwrap().len(), 2);
    }
}
