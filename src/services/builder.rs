use crate::error::{PagerError, Result};
use crate::types::{ChapterHeader, ChapterId, ChapterMeta, Page, Verse, WeightMetric};
use std::collections::HashMap;
use tracing::debug;

/// Greedy page packer. Verses are laid out in order; a page closes as soon as
/// the next verse would push it over `capacity`. A verse heavier than
/// `capacity` gets a page to itself and is never split.
#[derive(Debug, Clone)]
pub struct PageBuilder {
    capacity: usize,
    metric: WeightMetric,
    chapter_names: HashMap<u32, String>,
}

impl PageBuilder {
    pub fn new(capacity: usize, metric: WeightMetric) -> Self {
        Self {
            capacity: capacity.max(1),
            metric,
            chapter_names: HashMap::new(),
        }
    }

    /// Fallback header names for chapters whose first verse carries none.
    pub fn with_directory(mut self, chapters: &[ChapterMeta]) -> Self {
        self.chapter_names = chapters
            .iter()
            .map(|c| (c.id, c.name_primary.clone()))
            .collect();
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn metric(&self) -> WeightMetric {
        self.metric
    }

    pub fn build_pages(&self, verses: &[Verse]) -> Vec<Page> {
        let mut pages = Vec::new();
        let mut current: Vec<Verse> = Vec::new();
        let mut running = 0usize;

        for verse in verses {
            let weight = self.metric.weigh(verse);

            if !current.is_empty() && running + weight > self.capacity {
                let closed = std::mem::take(&mut current);
                pages.push(self.close_page(pages.len() + 1, closed));
                running = 0;
            }

            current.push(verse.clone());
            running += weight;
        }

        if !current.is_empty() {
            pages.push(self.close_page(pages.len() + 1, current));
        }

        pages
    }

    /// Validates that `verses` is the complete batch of `chapter` and paginates it.
    pub fn build_chapter(&self, chapter: ChapterId, verses: &[Verse]) -> Result<Vec<Page>> {
        validate_sequence(verses)?;
        if let Some(first) = verses.first().filter(|first| first.chapter != chapter) {
            return Err(PagerError::corrupt(format!(
                "batch for chapter {} holds chapter {}",
                chapter, first.chapter
            )));
        }
        let pages = self.build_pages(verses);

        debug!(
            "Built {} pages from {} verses at capacity {}",
            pages.len(),
            verses.len(),
            self.capacity
        );

        Ok(pages)
    }

    /// Validates a global range batch and paginates it.
    pub fn build_range(&self, verses: &[Verse], start: u32, end: u32) -> Result<Vec<Page>> {
        validate_range(verses, start, end)?;
        Ok(self.build_pages(verses))
    }

    fn close_page(&self, number: usize, verses: Vec<Verse>) -> Page {
        let chapter_header = verses
            .first()
            .filter(|first| first.opens_chapter())
            .map(|first| ChapterHeader {
                chapter: first.chapter,
                name: first
                    .chapter_name
                    .clone()
                    .or_else(|| self.chapter_names.get(&first.chapter).cloned())
                    .unwrap_or_else(|| format!("Chapter {}", first.chapter)),
            });

        Page {
            number,
            verses,
            chapter_header,
        }
    }
}

pub fn build_pages(verses: &[Verse], capacity: usize, metric: WeightMetric) -> Vec<Page> {
    PageBuilder::new(capacity, metric).build_pages(verses)
}

/// A chapter batch must be non-empty, belong to one chapter, and number its
/// verses and global indices without gaps or repeats.
pub fn validate_sequence(verses: &[Verse]) -> Result<()> {
    let first = verses
        .first()
        .ok_or_else(|| PagerError::corrupt("chapter has no verses"))?;

    if first.number != 1 {
        return Err(PagerError::corrupt(format!(
            "chapter {} starts at verse {}",
            first.chapter, first.number
        )));
    }

    for pair in verses.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);

        if next.chapter != first.chapter {
            return Err(PagerError::corrupt(format!(
                "verse {} of chapter {} found in chapter {} batch",
                next.number, next.chapter, first.chapter
            )));
        }

        if next.number != prev.number + 1 {
            return Err(PagerError::corrupt(format!(
                "chapter {}: verse {} follows verse {}",
                first.chapter, next.number, prev.number
            )));
        }

        if next.global_index != prev.global_index + 1 {
            return Err(PagerError::corrupt(format!(
                "chapter {}: global index {} follows {}",
                first.chapter, next.global_index, prev.global_index
            )));
        }
    }

    Ok(())
}

/// A range batch must cover exactly `start..=end` in global order.
pub fn validate_range(verses: &[Verse], start: u32, end: u32) -> Result<()> {
    if start == 0 || start > end {
        return Err(PagerError::invalid_target(format!(
            "verse range {}..={} is empty",
            start, end
        )));
    }

    let expected = (end - start + 1) as usize;
    if verses.len() != expected {
        return Err(PagerError::corrupt(format!(
            "range {}..={} returned {} verses, expected {}",
            start,
            end,
            verses.len(),
            expected
        )));
    }

    for (offset, verse) in verses.iter().enumerate() {
        let wanted = start + offset as u32;
        if verse.global_index != wanted {
            return Err(PagerError::corrupt(format!(
                "range {}..={}: expected global index {}, found {}",
                start, end, wanted, verse.global_index
            )));
        }
    }

    Ok(())
}

/// 1-based number of the page holding `global_index`.
pub fn page_containing(pages: &[Page], global_index: u32) -> Option<usize> {
    pages
        .iter()
        .find(|p| p.contains_global(global_index))
        .map(|p| p.number)
}
