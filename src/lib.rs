//! # Scripture Pager
//!
//! Splits an ordered stream of verses into capacity-bounded pages and lets a
//! reader move through them chapter by chapter while verses are fetched on
//! demand and cached per chapter.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use scripture_pager::{
//!     open_backend, MemoryPositionStore, PagerConfig, PaginationController, ReaderSession,
//!     VerseCache,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = open_backend("corpus.json").await?;
//!     let cache = Arc::new(VerseCache::new(backend.verses.clone()));
//!     let controller =
//!         PaginationController::new(cache, backend.directory.as_ref(), PagerConfig::default())
//!             .await?;
//!
//!     let session =
//!         ReaderSession::open(Arc::new(controller), Arc::new(MemoryPositionStore::new())).await?;
//!     session.next_page().await?;
//!
//!     println!("Now at {:?}", session.position());
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod services;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{PagerError, Result};
pub use services::{
    build_pages, open_backend, Backend, CacheLookup, ChapterDirectory, ControllerStatus,
    FilePositionStore, HttpVerseSource, InMemoryCorpus, MemoryPositionStore, Navigation,
    PageBuilder, PaginationController, PositionStore, ReaderSession, VerseCache, VerseSource,
};
pub use types::{
    ChapterHeader, ChapterId, ChapterMeta, Page, PagerConfig, ReaderPosition, Theme, Verse,
    WeightMetric,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
