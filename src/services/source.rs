use crate::error::{PagerError, Result};
use crate::types::{ChapterId, ChapterMeta, Verse};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};
use url::Url;

/// Supplies verses, either a whole chapter or an inclusive global range.
#[async_trait]
pub trait VerseSource: Send + Sync {
    /// Verses of `chapter`, ascending by verse number.
    async fn fetch_chapter(&self, chapter: ChapterId) -> Result<Vec<Verse>>;

    /// Verses with `start <= global_index <= end`, ascending by global index.
    async fn fetch_range(&self, start: u32, end: u32) -> Result<Vec<Verse>>;
}

#[async_trait]
pub trait ChapterDirectory: Send + Sync {
    /// All chapters, ascending by id.
    async fn list_chapters(&self) -> Result<Vec<ChapterMeta>>;
}

/// The pair of collaborators a reader needs.
#[derive(Clone)]
pub struct Backend {
    pub verses: Arc<dyn VerseSource>,
    pub directory: Arc<dyn ChapterDirectory>,
}

/// Opens `source` as an HTTP backend when it looks like a URL, otherwise as a corpus file.
pub async fn open_backend(source: &str) -> Result<Backend> {
    if is_url(source) {
        let http = Arc::new(HttpVerseSource::new(source)?);
        Ok(Backend {
            verses: http.clone(),
            directory: http,
        })
    } else {
        let corpus = Arc::new(InMemoryCorpus::load(source).await?);
        Ok(Backend {
            verses: corpus.clone(),
            directory: corpus,
        })
    }
}

pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryCorpus {
    pub chapters: Vec<ChapterMeta>,
    pub verses: Vec<Verse>,
}

impl InMemoryCorpus {
    pub fn new(mut chapters: Vec<ChapterMeta>, mut verses: Vec<Verse>) -> Self {
        chapters.sort_by_key(|c| c.id);
        verses.sort_by_key(|v| v.global_index);
        Self { chapters, verses }
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let corpus: InMemoryCorpus = serde_json::from_str(content)?;
        Ok(Self::new(corpus.chapters, corpus.verses))
    }

    pub async fn load(file_path: &str) -> Result<Self> {
        info!("Reading corpus file: {}", file_path);

        let path = Path::new(file_path);
        if !path.exists() {
            return Err(PagerError::FileNotFound {
                path: file_path.to_string(),
            });
        }

        let content = fs::read_to_string(path).await?;
        let corpus = Self::from_json_str(&content)?;
        debug!(
            "Loaded {} chapters and {} verses from {}",
            corpus.chapters.len(),
            corpus.verses.len(),
            file_path
        );
        Ok(corpus)
    }

    /// Checks the corpus-wide numbering: global indices run 1..=N without gaps,
    /// each chapter numbers its verses 1..=k, and the directory counts agree.
    pub fn validate(&self) -> Result<()> {
        for (expected, verse) in (1u32..).zip(&self.verses) {
            if verse.global_index != expected {
                return Err(PagerError::corrupt(format!(
                    "expected global index {}, found {}",
                    expected, verse.global_index
                )));
            }
        }

        for chapter in &self.chapters {
            let verses: Vec<&Verse> = self
                .verses
                .iter()
                .filter(|v| v.chapter == chapter.id)
                .collect();

            for (expected, verse) in (1u32..).zip(&verses) {
                if verse.number != expected {
                    return Err(PagerError::corrupt(format!(
                        "chapter {}: expected verse {}, found {}",
                        chapter.id, expected, verse.number
                    )));
                }
            }

            if verses.len() as u32 != chapter.verse_count {
                return Err(PagerError::corrupt(format!(
                    "chapter {} lists {} verses but the corpus holds {}",
                    chapter.id,
                    chapter.verse_count,
                    verses.len()
                )));
            }
        }

        let orphans = self
            .verses
            .iter()
            .filter(|v| !self.chapters.iter().any(|c| c.id == v.chapter))
            .count();
        if orphans > 0 {
            return Err(PagerError::corrupt(format!(
                "{} verses belong to chapters missing from the directory",
                orphans
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl VerseSource for InMemoryCorpus {
    async fn fetch_chapter(&self, chapter: ChapterId) -> Result<Vec<Verse>> {
        if !self.chapters.iter().any(|c| c.id == chapter) {
            return Err(PagerError::fetch(
                format!("chapter {}", chapter),
                "chapter not found",
            ));
        }

        let mut verses: Vec<Verse> = self
            .verses
            .iter()
            .filter(|v| v.chapter == chapter)
            .cloned()
            .collect();
        verses.sort_by_key(|v| v.number);
        Ok(verses)
    }

    async fn fetch_range(&self, start: u32, end: u32) -> Result<Vec<Verse>> {
        if start == 0 || start > end {
            return Err(PagerError::invalid_target(format!(
                "verse range {}..={} is empty",
                start, end
            )));
        }

        Ok(self
            .verses
            .iter()
            .filter(|v| start <= v.global_index && v.global_index <= end)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ChapterDirectory for InMemoryCorpus {
    async fn list_chapters(&self) -> Result<Vec<ChapterMeta>> {
        Ok(self.chapters.clone())
    }
}

/// Reads verses from a JSON HTTP backend.
pub struct HttpVerseSource {
    base: Url,
    client: reqwest::Client,
}

impl HttpVerseSource {
    pub fn new(base: &str) -> Result<Self> {
        let mut base = Url::parse(base)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            base,
            client: reqwest::Client::new(),
        })
    }

    pub fn chapters_url(&self) -> Result<Url> {
        Ok(self.base.join("chapters")?)
    }

    pub fn chapter_url(&self, chapter: ChapterId) -> Result<Url> {
        Ok(self.base.join(&format!("chapters/{}/verses", chapter))?)
    }

    pub fn range_url(&self, start: u32, end: u32) -> Result<Url> {
        let mut url = self.base.join("verses")?;
        url.query_pairs_mut()
            .append_pair("start", &start.to_string())
            .append_pair("end", &end.to_string());
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T> {
        debug!("GET {}", url);

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(PagerError::HttpStatus {
                status: response.status().as_u16(),
            });
        }

        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl VerseSource for HttpVerseSource {
    async fn fetch_chapter(&self, chapter: ChapterId) -> Result<Vec<Verse>> {
        let url = self.chapter_url(chapter)?;
        let mut verses: Vec<Verse> = self.get_json(url).await?;
        verses.sort_by_key(|v| v.number);
        Ok(verses)
    }

    async fn fetch_range(&self, start: u32, end: u32) -> Result<Vec<Verse>> {
        let url = self.range_url(start, end)?;
        let mut verses: Vec<Verse> = self.get_json(url).await?;
        verses.sort_by_key(|v| v.global_index);
        Ok(verses)
    }
}

#[async_trait]
impl ChapterDirectory for HttpVerseSource {
    async fn list_chapters(&self) -> Result<Vec<ChapterMeta>> {
        let url = self.chapters_url()?;
        let mut chapters: Vec<ChapterMeta> = self.get_json(url).await?;
        chapters.sort_by_key(|c| c.id);
        Ok(chapters)
    }
}
