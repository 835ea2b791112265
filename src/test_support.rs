//! Fixtures shared by the unit tests.

use crate::error::{PagerError, Result};
use crate::services::source::{ChapterDirectory, InMemoryCorpus, VerseSource};
use crate::types::{ChapterId, ChapterMeta, Verse};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Notify;

/// Builds a corpus where `weights[c][v]` is the character length of verse `v + 1`
/// in chapter `c + 1`.
pub fn corpus(weights: &[&[usize]]) -> InMemoryCorpus {
    let mut chapters = Vec::new();
    let mut verses = Vec::new();
    let mut global = 0;

    for (c, chapter_weights) in weights.iter().enumerate() {
        let id = c as ChapterId + 1;
        chapters.push(ChapterMeta {
            id,
            name_primary: format!("Chapter {}", id),
            name_secondary: format!("Secondary {}", id),
            verse_count: chapter_weights.len() as u32,
            revelation_order: Some(id),
            place_of_origin: None,
        });

        for (v, weight) in chapter_weights.iter().enumerate() {
            global += 1;
            verses.push(Verse {
                chapter: id,
                number: v as u32 + 1,
                global_index: global,
                text_primary: "a".repeat(*weight),
                text_secondary: None,
                chapter_name: (v == 0).then(|| format!("Chapter {}", id)),
            });
        }
    }

    InMemoryCorpus::new(chapters, verses)
}

/// A source over a fixed corpus that records calls, can fail chapters and can
/// hold a chapter's fetch until its gate is opened.
pub struct ScriptedSource {
    corpus: InMemoryCorpus,
    calls: Mutex<HashMap<ChapterId, usize>>,
    failing: Mutex<HashSet<ChapterId>>,
    fail_next: Mutex<HashSet<ChapterId>>,
    gates: Mutex<HashMap<ChapterId, Arc<Notify>>>,
    overrides: Mutex<HashMap<ChapterId, Vec<Verse>>>,
    directory_down: Mutex<bool>,
}

impl ScriptedSource {
    pub fn new(corpus: InMemoryCorpus) -> Arc<Self> {
        Arc::new(Self {
            corpus,
            calls: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            fail_next: Mutex::new(HashSet::new()),
            gates: Mutex::new(HashMap::new()),
            overrides: Mutex::new(HashMap::new()),
            directory_down: Mutex::new(false),
        })
    }

    pub fn calls(&self, chapter: ChapterId) -> usize {
        self.calls.lock().get(&chapter).copied().unwrap_or(0)
    }

    pub fn fail(&self, chapter: ChapterId) {
        self.failing.lock().insert(chapter);
    }

    /// Fails only the next fetch of `chapter`.
    pub fn fail_once(&self, chapter: ChapterId) {
        self.fail_next.lock().insert(chapter);
    }

    pub fn heal(&self, chapter: ChapterId) {
        self.failing.lock().remove(&chapter);
    }

    pub fn set_directory_down(&self, down: bool) {
        *self.directory_down.lock() = down;
    }

    /// Serve `verses` for `chapter` instead of the corpus content.
    pub fn override_chapter(&self, chapter: ChapterId, verses: Vec<Verse>) {
        self.overrides.lock().insert(chapter, verses);
    }

    /// Holds every fetch of `chapter` until `open` is called.
    pub fn gate(&self, chapter: ChapterId) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.gates.lock().insert(chapter, notify.clone());
        notify
    }

    pub fn open(&self, chapter: ChapterId) {
        if let Some(gate) = self.gates.lock().remove(&chapter) {
            gate.notify_waiters();
            gate.notify_one();
        }
    }

    /// Yields until `chapter` has been requested at least `count` times.
    pub async fn wait_for_calls(&self, chapter: ChapterId, count: usize) {
        while self.calls(chapter) < count {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl VerseSource for ScriptedSource {
    async fn fetch_chapter(&self, chapter: ChapterId) -> Result<Vec<Verse>> {
        *self.calls.lock().entry(chapter).or_insert(0) += 1;

        let gate = self.gates.lock().get(&chapter).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.fail_next.lock().remove(&chapter) || self.failing.lock().contains(&chapter) {
            return Err(PagerError::HttpStatus { status: 503 });
        }

        if let Some(verses) = self.overrides.lock().get(&chapter).cloned() {
            return Ok(verses);
        }

        self.corpus.fetch_chapter(chapter).await
    }

    async fn fetch_range(&self, start: u32, end: u32) -> Result<Vec<Verse>> {
        self.corpus.fetch_range(start, end).await
    }
}

#[async_trait]
impl ChapterDirectory for ScriptedSource {
    async fn list_chapters(&self) -> Result<Vec<ChapterMeta>> {
        if *self.directory_down.lock() {
            return Err(PagerError::HttpStatus { status: 502 });
        }
        self.corpus.list_chapters().await
    }
}
