pub mod builder;
pub mod cache;
pub mod controller;
pub mod session;
pub mod source;
pub mod store;

pub use builder::{build_pages, page_containing, validate_range, validate_sequence, PageBuilder};
pub use cache::{CacheLookup, VerseBatch, VerseCache};
pub use controller::{ControllerStatus, Navigation, PaginationController};
pub use session::ReaderSession;
pub use source::{open_backend, Backend, ChapterDirectory, HttpVerseSource, InMemoryCorpus, VerseSource};
pub use store::{FilePositionStore, MemoryPositionStore, PositionStore};
