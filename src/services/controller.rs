use crate::error::{PagerError, Result};
use crate::services::builder::{page_containing, PageBuilder};
use crate::services::cache::{VerseBatch, VerseCache};
use crate::services::source::ChapterDirectory;
use crate::types::{ChapterId, ChapterMeta, Page, PagerConfig, ReaderPosition};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

type PageSet = Arc<Vec<Page>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerStatus {
    Idle,
    Loading,
    Ready,
    Error(String),
}

/// Outcome of a navigation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Moved(ReaderPosition),
    /// Nothing to do: already at a corpus boundary or the request changed nothing.
    Unchanged,
    /// A newer request was issued while this one was fetching; its result was dropped.
    Superseded,
}

/// Where to land once a chapter's pages exist.
#[derive(Debug, Clone, Copy)]
enum Landing {
    First,
    Last,
    /// The given page if it exists, else the first page.
    PageOrFirst(usize),
    /// The page holding this global verse index.
    Verse(u32),
}

#[derive(Debug, Clone, Copy)]
enum Target {
    Chapter(ChapterId, Landing),
    /// 1-based page index across the whole corpus.
    GlobalPage(usize),
}

enum Step {
    Fetch(ChapterId),
    Land(usize),
    OutOfRange(usize),
}

struct ControllerState {
    status: ControllerStatus,
    /// Flat 1-based page index; chapter and page are derived from it.
    page_index: Option<usize>,
    /// Capacity whose layouts `page_index` counts through.
    page_capacity: usize,
    /// Capacity the next layouts are built at.
    capacity: usize,
    latest_token: u64,
    layouts: HashMap<(ChapterId, usize), PageSet>,
}

impl ControllerState {
    fn new(capacity: usize) -> Self {
        Self {
            status: ControllerStatus::Idle,
            page_index: None,
            page_capacity: capacity,
            capacity,
            latest_token: 0,
            layouts: HashMap::new(),
        }
    }

    fn issue_token(&mut self) -> u64 {
        self.latest_token += 1;
        self.latest_token
    }

    fn layout(&self, chapter: ChapterId, capacity: usize) -> Option<&PageSet> {
        self.layouts.get(&(chapter, capacity))
    }
}

/// Owns the reading position and drives fetch, cache, build and navigate.
///
/// The canonical position is a single page index counted across every chapter
/// in directory order. Chapter and in-chapter page are derived from it using
/// the page counts of the chapters laid out so far, so every chapter up to the
/// current one is always laid out at the current page capacity.
///
/// Every request takes a fresh token; a fetch that completes after a newer
/// request was issued is discarded.
pub struct PaginationController {
    cache: Arc<VerseCache>,
    chapters: Vec<ChapterMeta>,
    config: PagerConfig,
    state: Mutex<ControllerState>,
}

impl PaginationController {
    pub async fn new(
        cache: Arc<VerseCache>,
        directory: &dyn ChapterDirectory,
        config: PagerConfig,
    ) -> Result<Self> {
        config.validate()?;

        let mut chapters = directory
            .list_chapters()
            .await
            .map_err(|err| err.into_fetch_failure("chapter directory"))?;
        chapters.sort_by_key(|c| c.id);

        if chapters.is_empty() {
            return Err(PagerError::Config {
                reason: "Chapter directory is empty".to_string(),
            });
        }

        info!("Pagination controller ready with {} chapters", chapters.len());

        let capacity = config.base_capacity;
        Ok(Self {
            cache,
            chapters,
            config,
            state: Mutex::new(ControllerState::new(capacity)),
        })
    }

    pub fn status(&self) -> ControllerStatus {
        self.state.lock().status.clone()
    }

    /// Flat 1-based page index of the current page.
    pub fn page_index(&self) -> Option<usize> {
        self.state.lock().page_index
    }

    pub fn position(&self) -> Option<ReaderPosition> {
        let state = self.state.lock();
        self.current_in(&state).map(|(position, _)| position)
    }

    /// Pages of the current chapter.
    pub fn pages(&self) -> Option<PageSet> {
        let state = self.state.lock();
        self.current_in(&state).map(|(_, pages)| pages)
    }

    pub fn total_pages(&self) -> Option<usize> {
        self.pages().map(|p| p.len())
    }

    pub fn current_page(&self) -> Option<Page> {
        let state = self.state.lock();
        let (position, pages) = self.current_in(&state)?;
        pages.get(position.page - 1).cloned()
    }

    /// Global index of the first verse on the current page.
    pub fn anchor_verse(&self) -> Option<u32> {
        let state = self.state.lock();
        self.anchor_in(&state)
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().capacity
    }

    /// Chapter and page of a flat page index, if the chapters up to it are laid out.
    pub fn locate_page(&self, index: usize) -> Option<ReaderPosition> {
        let state = self.state.lock();
        self.locate_in(&state, index).map(|(position, _)| position)
    }

    /// Flat page index of `position`, if the chapters up to it are laid out.
    pub fn page_index_of(&self, position: ReaderPosition) -> Option<usize> {
        let state = self.state.lock();
        let mut offset = 0;
        for meta in &self.chapters {
            let pages = state.layout(meta.id, state.page_capacity)?;
            if meta.id == position.chapter {
                return (1..=pages.len())
                    .contains(&position.page)
                    .then_some(offset + position.page);
            }
            offset += pages.len();
        }
        None
    }

    /// Number of pages in the whole corpus; known once every chapter is laid out.
    pub fn total_global_pages(&self) -> Option<usize> {
        let state = self.state.lock();
        self.counted_pages(&state, state.page_capacity)
    }

    pub fn chapters(&self) -> &[ChapterMeta] {
        &self.chapters
    }

    pub fn chapter(&self, id: ChapterId) -> Option<&ChapterMeta> {
        self.chapters.iter().find(|c| c.id == id)
    }

    pub fn config(&self) -> &PagerConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<VerseCache> {
        &self.cache
    }

    /// Chapter and in-chapter verse number of a global index, from directory counts.
    pub fn locate_verse(&self, global_index: u32) -> Option<(ChapterId, u32)> {
        if global_index == 0 {
            return None;
        }

        let mut preceding = 0u32;
        for chapter in &self.chapters {
            if global_index <= preceding + chapter.verse_count {
                return Some((chapter.id, global_index - preceding));
            }
            preceding += chapter.verse_count;
        }
        None
    }

    /// Inverse of [`Self::locate_verse`].
    pub fn global_index_of(&self, chapter: ChapterId, verse: u32) -> Option<u32> {
        let mut preceding = 0u32;
        for meta in &self.chapters {
            if meta.id == chapter {
                return (1..=meta.verse_count)
                    .contains(&verse)
                    .then_some(preceding + verse);
            }
            preceding += meta.verse_count;
        }
        None
    }

    pub async fn jump_to_chapter(&self, chapter: ChapterId) -> Result<Navigation> {
        self.ensure_chapter(chapter)?;
        self.load(Target::Chapter(chapter, Landing::First)).await
    }

    /// Opens `chapter` at `page`, falling back to the first page when `page`
    /// is outside the chapter's page set.
    pub async fn open_at(&self, chapter: ChapterId, page: usize) -> Result<Navigation> {
        self.ensure_chapter(chapter)?;
        self.load(Target::Chapter(chapter, Landing::PageOrFirst(page)))
            .await
    }

    pub async fn jump_to_verse(&self, global_index: u32) -> Result<Navigation> {
        let (chapter, _) = self.locate_verse(global_index).ok_or_else(|| {
            PagerError::invalid_target(format!("verse {} is outside the corpus", global_index))
        })?;
        self.load(Target::Chapter(chapter, Landing::Verse(global_index)))
            .await
    }

    /// Moves to page `index` counted across the whole corpus, fetching the
    /// chapters needed to find it. An index past the last page is rejected and
    /// leaves the position alone.
    pub async fn go_to_global_page(&self, index: usize) -> Result<Navigation> {
        {
            let state = self.state.lock();
            let total = self.counted_pages(&state, state.capacity);
            if index == 0 || total.map_or(false, |total| index > total) {
                return Err(PagerError::invalid_target(format!(
                    "page {} is outside the corpus",
                    index
                )));
            }
        }

        self.load(Target::GlobalPage(index)).await
    }

    pub async fn next_page(&self) -> Result<Navigation> {
        let (index, position, total) = self.current_bounds()?;

        if position.page < total {
            return Ok(self.settle(index + 1));
        }

        match self.neighbour(position.chapter, 1) {
            Some(next) => self.load(Target::Chapter(next, Landing::First)).await,
            None => {
                debug!("Already on the last page of the last chapter");
                Ok(Navigation::Unchanged)
            }
        }
    }

    pub async fn previous_page(&self) -> Result<Navigation> {
        let (index, position, _) = self.current_bounds()?;

        if position.page > 1 {
            return Ok(self.settle(index - 1));
        }

        match self.neighbour(position.chapter, -1) {
            Some(previous) => self.load(Target::Chapter(previous, Landing::Last)).await,
            None => {
                debug!("Already on the first page of the first chapter");
                Ok(Navigation::Unchanged)
            }
        }
    }

    /// Moves to page `page` of the current chapter. Out-of-range pages are
    /// rejected without touching state.
    pub fn go_to_page(&self, page: usize) -> Result<Navigation> {
        let (index, position, total) = self.current_bounds()?;

        if page < 1 || page > total {
            return Err(PagerError::invalid_target(format!(
                "page {} is outside 1..={}",
                page, total
            )));
        }

        Ok(self.settle(index - position.page + page))
    }

    /// Repaginates at `capacity`, keeping the anchor verse in view.
    ///
    /// While a load is pending only the capacity is recorded; that load builds
    /// its pages at the new capacity when its fetch completes.
    pub async fn set_capacity(&self, capacity: usize) -> Result<Navigation> {
        let capacity = capacity.max(1);

        let (chapter, anchor) = {
            let mut state = self.state.lock();
            if state.status == ControllerStatus::Loading {
                debug!("Capacity {} will apply to the pending load", capacity);
                state.capacity = capacity;
                return Ok(Navigation::Unchanged);
            }

            if state.capacity == capacity && state.page_capacity == capacity {
                return Ok(Navigation::Unchanged);
            }

            let open = self
                .current_in(&state)
                .map(|(position, _)| position.chapter)
                .zip(self.anchor_in(&state));
            state.capacity = capacity;
            match open {
                Some(open) => open,
                None => {
                    state.page_capacity = capacity;
                    return Ok(Navigation::Unchanged);
                }
            }
        };

        info!(
            "Repaginating chapter {} at capacity {} around verse {}",
            chapter, capacity, anchor
        );
        self.load(Target::Chapter(chapter, Landing::Verse(anchor)))
            .await
    }

    /// Drops the cache and position, keeping the current capacity.
    pub fn reset(&self) {
        let capacity = self.capacity();
        self.reset_with_capacity(capacity);
    }

    /// Drops the cache and position and lays out later pages at `capacity`.
    /// In-flight results are discarded on arrival.
    pub fn reset_with_capacity(&self, capacity: usize) {
        self.cache.clear();

        let mut state = self.state.lock();
        let token = state.latest_token + 1;
        *state = ControllerState::new(capacity.max(1));
        state.latest_token = token;

        info!("Reader state reset at capacity {}", state.capacity);
    }

    fn ensure_chapter(&self, chapter: ChapterId) -> Result<()> {
        if self.chapter(chapter).is_none() {
            return Err(PagerError::invalid_target(format!(
                "chapter {} does not exist",
                chapter
            )));
        }
        Ok(())
    }

    fn current_bounds(&self) -> Result<(usize, ReaderPosition, usize)> {
        let state = self.state.lock();
        match (state.page_index, self.current_in(&state)) {
            (Some(index), Some((position, pages))) => Ok((index, position, pages.len())),
            _ => Err(PagerError::invalid_target("no chapter is open")),
        }
    }

    fn neighbour(&self, chapter: ChapterId, step: isize) -> Option<ChapterId> {
        let index = self.chapters.iter().position(|c| c.id == chapter)?;
        let target = index.checked_add_signed(step)?;
        self.chapters.get(target).map(|c| c.id)
    }

    fn locate_in(
        &self,
        state: &ControllerState,
        index: usize,
    ) -> Option<(ReaderPosition, PageSet)> {
        if index == 0 {
            return None;
        }

        let mut offset = 0;
        for meta in &self.chapters {
            let pages = state.layout(meta.id, state.page_capacity)?;
            if index <= offset + pages.len() {
                let position = ReaderPosition {
                    chapter: meta.id,
                    page: index - offset,
                };
                return Some((position, pages.clone()));
            }
            offset += pages.len();
        }
        None
    }

    fn current_in(&self, state: &ControllerState) -> Option<(ReaderPosition, PageSet)> {
        self.locate_in(state, state.page_index?)
    }

    fn anchor_in(&self, state: &ControllerState) -> Option<u32> {
        let (position, pages) = self.current_in(state)?;
        let page = pages.get(position.page - 1)?;
        page.first_verse().map(|v| v.global_index)
    }

    fn counted_pages(&self, state: &ControllerState, capacity: usize) -> Option<usize> {
        self.chapters
            .iter()
            .map(|meta| state.layout(meta.id, capacity).map(|pages| pages.len()))
            .sum()
    }

    /// Move to an already laid out page; no fetch needed.
    fn settle(&self, index: usize) -> Navigation {
        let mut state = self.state.lock();
        state.issue_token();
        state.page_index = Some(index);
        state.status = ControllerStatus::Ready;

        match self.current_in(&state) {
            Some((position, _)) => {
                debug!(
                    "Moved to chapter {} page {} (page {} overall)",
                    position.chapter, position.page, index
                );
                Navigation::Moved(position)
            }
            None => Navigation::Unchanged,
        }
    }

    /// What `target` still needs at the capacity pages are being built at.
    fn next_step(&self, state: &ControllerState, target: Target) -> Step {
        let capacity = state.capacity;
        let mut offset = 0;

        match target {
            Target::Chapter(chapter, landing) => {
                if state.layout(chapter, capacity).is_none() {
                    return Step::Fetch(chapter);
                }
                for meta in &self.chapters {
                    let pages = match state.layout(meta.id, capacity) {
                        Some(pages) => pages,
                        None => return Step::Fetch(meta.id),
                    };
                    if meta.id == chapter {
                        return Step::Land(offset + Self::resolve(pages, landing));
                    }
                    offset += pages.len();
                }
            }
            Target::GlobalPage(index) => {
                for meta in &self.chapters {
                    let pages = match state.layout(meta.id, capacity) {
                        Some(pages) => pages,
                        None => return Step::Fetch(meta.id),
                    };
                    if index <= offset + pages.len() {
                        return Step::Land(index);
                    }
                    offset += pages.len();
                }
            }
        }

        Step::OutOfRange(offset)
    }

    async fn load(&self, target: Target) -> Result<Navigation> {
        let (token, previous) = {
            let mut state = self.state.lock();
            let previous = state.status.clone();
            state.status = ControllerStatus::Loading;
            (state.issue_token(), previous)
        };

        debug!("Request {} loading {:?}", token, target);
        loop {
            let chapter = {
                let mut state = self.state.lock();
                if state.latest_token != token {
                    return Ok(Navigation::Superseded);
                }

                match self.next_step(&state, target) {
                    Step::Fetch(chapter) => chapter,
                    Step::Land(index) => {
                        state.page_index = Some(index);
                        state.page_capacity = state.capacity;
                        state.status = ControllerStatus::Ready;
                        let position = self.current_in(&state).map(|(position, _)| position);
                        drop(state);

                        return match position {
                            Some(position) => {
                                info!(
                                    "Showing chapter {} page {} (page {} overall)",
                                    position.chapter, position.page, index
                                );
                                self.prefetch_neighbours(position.chapter);
                                Ok(Navigation::Moved(position))
                            }
                            None => Ok(Navigation::Unchanged),
                        };
                    }
                    Step::OutOfRange(total) => {
                        state.status = match previous {
                            ControllerStatus::Loading if state.page_index.is_some() => {
                                ControllerStatus::Ready
                            }
                            ControllerStatus::Loading => ControllerStatus::Idle,
                            other => other,
                        };
                        return Err(PagerError::invalid_target(format!(
                            "{:?} is outside the corpus of {} pages",
                            target, total
                        )));
                    }
                }
            };

            let fetched = self.cache.get(chapter).await;

            let mut state = self.state.lock();
            if state.latest_token != token {
                debug!(
                    "Dropping result of request {} for chapter {}; request {} is newer",
                    token, chapter, state.latest_token
                );
                return Ok(Navigation::Superseded);
            }

            let capacity = state.capacity;
            match fetched.and_then(|verses| self.build(chapter, capacity, &verses)) {
                Ok(pages) => {
                    state.layouts.insert((chapter, capacity), pages);
                }
                Err(err) => {
                    warn!("Loading chapter {} failed: {}", chapter, err);
                    state.status = ControllerStatus::Error(err.to_string());
                    return Err(err);
                }
            }
        }
    }

    fn build(
        &self,
        chapter: ChapterId,
        capacity: usize,
        verses: &VerseBatch,
    ) -> Result<PageSet> {
        let pages = PageBuilder::new(capacity, self.config.weight_metric)
            .with_directory(&self.chapters)
            .build_chapter(chapter, verses)?;
        Ok(Arc::new(pages))
    }

    fn resolve(pages: &[Page], landing: Landing) -> usize {
        let total = pages.len().max(1);
        match landing {
            Landing::First => 1,
            Landing::Last => total,
            Landing::PageOrFirst(page) if (1..=total).contains(&page) => page,
            Landing::PageOrFirst(_) => 1,
            Landing::Verse(global_index) => page_containing(pages, global_index).unwrap_or(1),
        }
    }

    fn prefetch_neighbours(&self, chapter: ChapterId) {
        if !self.config.prefetch {
            return;
        }

        for step in [-1, 1] {
            if let Some(neighbour) = self.neighbour(chapter, step) {
                self.cache.spawn_prefetch(neighbour);
            }
        }
    }
}
