use crate::error::{PagerError, Result};
use crate::services::controller::{Navigation, PaginationController};
use crate::services::store::PositionStore;
use crate::types::{ChapterId, ReaderPosition, Theme};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Flat page index across the corpus at the persisted font scale.
pub const PAGE_INDEX_KEY: &str = "reader.page_index";
pub const FONT_SCALE_KEY: &str = "reader.font_scale_pct";
pub const THEME_KEY: &str = "reader.theme";

#[derive(Debug, Clone, Copy, PartialEq)]
struct DisplayPrefs {
    font_scale: f32,
    theme: Theme,
}

/// A reader's session: the controller plus durable position and display
/// preferences.
pub struct ReaderSession {
    controller: Arc<PaginationController>,
    store: Arc<dyn PositionStore>,
    display: Mutex<DisplayPrefs>,
}

impl ReaderSession {
    /// Restores the last position and preferences from `store` and opens it.
    pub async fn open(
        controller: Arc<PaginationController>,
        store: Arc<dyn PositionStore>,
    ) -> Result<Self> {
        let config = controller.config().clone();

        let font_scale = read_key(store.as_ref(), FONT_SCALE_KEY)
            .await
            .map(|pct| config.clamp_font_scale(pct as f32 / 100.0))
            .unwrap_or_else(|| config.clamp_font_scale(1.0));
        let theme = read_key(store.as_ref(), THEME_KEY)
            .await
            .and_then(Theme::from_stored)
            .unwrap_or_default();

        controller
            .set_capacity(config.capacity_for_scale(font_scale))
            .await?;

        let page_index = read_key(store.as_ref(), PAGE_INDEX_KEY)
            .await
            .and_then(|index| usize::try_from(index).ok())
            .filter(|index| *index >= 1);

        info!(
            "Restoring reader at page {} (scale {:.2}, {:?} theme)",
            page_index.unwrap_or(1),
            font_scale,
            theme
        );

        let session = Self {
            controller,
            store,
            display: Mutex::new(DisplayPrefs { font_scale, theme }),
        };

        let restored = session
            .controller
            .go_to_global_page(page_index.unwrap_or(1))
            .await;
        let navigation = match restored {
            Err(PagerError::InvalidTarget { reason }) => {
                warn!("Stored page is gone ({}), starting from the beginning", reason);
                session.controller.go_to_global_page(1).await?
            }
            other => other?,
        };
        session.record(navigation).await;
        Ok(session)
    }

    pub fn controller(&self) -> &Arc<PaginationController> {
        &self.controller
    }

    pub fn position(&self) -> Option<ReaderPosition> {
        self.controller.position()
    }

    pub fn font_scale(&self) -> f32 {
        self.display.lock().font_scale
    }

    pub fn theme(&self) -> Theme {
        self.display.lock().theme
    }

    pub async fn next_page(&self) -> Result<Navigation> {
        let navigation = self.controller.next_page().await?;
        self.record(navigation).await;
        Ok(navigation)
    }

    pub async fn previous_page(&self) -> Result<Navigation> {
        let navigation = self.controller.previous_page().await?;
        self.record(navigation).await;
        Ok(navigation)
    }

    pub async fn go_to_page(&self, page: usize) -> Result<Navigation> {
        let navigation = self.controller.go_to_page(page)?;
        self.record(navigation).await;
        Ok(navigation)
    }

    pub async fn jump_to_chapter(&self, chapter: ChapterId) -> Result<Navigation> {
        let navigation = self.controller.jump_to_chapter(chapter).await?;
        self.record(navigation).await;
        Ok(navigation)
    }

    pub async fn jump_to_verse(&self, global_index: u32) -> Result<Navigation> {
        let navigation = self.controller.jump_to_verse(global_index).await?;
        self.record(navigation).await;
        Ok(navigation)
    }

    pub async fn go_to_global_page(&self, index: usize) -> Result<Navigation> {
        let navigation = self.controller.go_to_global_page(index).await?;
        self.record(navigation).await;
        Ok(navigation)
    }

    /// Clamps `scale` into the configured bounds and repaginates around the
    /// verse currently at the top of the page.
    pub async fn set_font_scale(&self, scale: f32) -> Result<Navigation> {
        let config = self.controller.config();
        let scale = config.clamp_font_scale(scale);
        self.display.lock().font_scale = scale;

        let pct = (scale * 100.0).round() as i64;
        if let Err(err) = self.store.set(FONT_SCALE_KEY, pct).await {
            warn!("Could not persist font scale: {}", err);
        }

        let navigation = self
            .controller
            .set_capacity(config.capacity_for_scale(scale))
            .await?;
        self.record(navigation).await;
        Ok(navigation)
    }

    pub async fn set_theme(&self, theme: Theme) {
        self.display.lock().theme = theme;
        if let Err(err) = self.store.set(THEME_KEY, theme.as_stored()).await {
            warn!("Could not persist theme: {}", err);
        }
    }

    pub async fn toggle_theme(&self) -> Theme {
        let theme = self.theme().toggled();
        self.set_theme(theme).await;
        theme
    }

    /// Forgets cached verses and the open chapter. Stored preferences stay,
    /// and later pages are laid out at the current font scale.
    pub fn reset(&self) {
        let capacity = self
            .controller
            .config()
            .capacity_for_scale(self.font_scale());
        self.controller.reset_with_capacity(capacity);
    }

    async fn record(&self, navigation: Navigation) {
        let Navigation::Moved(position) = navigation else {
            return;
        };
        let Some(index) = self.controller.page_index() else {
            return;
        };

        if let Err(err) = self.store.set(PAGE_INDEX_KEY, index as i64).await {
            warn!("Could not persist {}: {}", PAGE_INDEX_KEY, err);
            return;
        }

        debug!(
            "Persisted page {} (chapter {} page {})",
            index, position.chapter, position.page
        );
    }
}

async fn read_key(store: &dyn PositionStore, key: &str) -> Option<i64> {
    match store.get(key).await {
        Ok(value) => value,
        Err(err) => {
            warn!("Could not read {}: {}", key, err);
            None
        }
    }
}
