use crate::error::{PagerError, Result};
use serde::{Deserialize, Serialize};

pub type ChapterId = u32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verse {
    pub chapter: ChapterId,
    pub number: u32,
    pub global_index: u32,
    pub text_primary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_secondary: Option<String>,
    /// Chapter name, only carried by the first verse of a chapter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_name: Option<String>,
}

impl Verse {
    pub fn opens_chapter(&self) -> bool {
        self.number == 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterMeta {
    pub id: ChapterId,
    pub name_primary: String,
    pub name_secondary: String,
    pub verse_count: u32,
    #[serde(default)]
    pub revelation_order: Option<u32>,
    #[serde(default)]
    pub place_of_origin: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterHeader {
    pub chapter: ChapterId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub number: usize,
    pub verses: Vec<Verse>,
    pub chapter_header: Option<ChapterHeader>,
}

impl Page {
    pub fn first_verse(&self) -> Option<&Verse> {
        self.verses.first()
    }

    pub fn contains_global(&self, global_index: u32) -> bool {
        match (self.verses.first(), self.verses.last()) {
            (Some(first), Some(last)) => {
                first.global_index <= global_index && global_index <= last.global_index
            }
            _ => false,
        }
    }

    pub fn weight(&self, metric: WeightMetric) -> usize {
        self.verses.iter().map(|v| metric.weigh(v)).sum()
    }
}

/// Where the reader is: a page number inside a chapter's page set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderPosition {
    pub chapter: ChapterId,
    pub page: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }

    pub fn as_stored(self) -> i64 {
        match self {
            Theme::Light => 0,
            Theme::Dark => 1,
        }
    }

    pub fn from_stored(value: i64) -> Option<Self> {
        match value {
            0 => Some(Theme::Light),
            1 => Some(Theme::Dark),
            _ => None,
        }
    }
}

/// How much room a verse takes on a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WeightMetric {
    /// Unicode scalar count of the primary text.
    #[default]
    Chars,
    /// UTF-8 byte length of the primary text.
    Bytes,
    /// Whitespace-separated tokens of the primary text.
    Words,
}

impl WeightMetric {
    pub fn weigh(self, verse: &Verse) -> usize {
        let text = verse.text_primary.as_str();
        match self {
            WeightMetric::Chars => text.chars().count(),
            WeightMetric::Bytes => text.len(),
            WeightMetric::Words => text.split_whitespace().count(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PagerConfig {
    pub base_capacity: usize,
    pub weight_metric: WeightMetric,
    pub prefetch: bool,
    pub min_font_scale: f32,
    pub max_font_scale: f32,
}

impl Default for PagerConfig {
    fn default() -> Self {
        Self {
            base_capacity: 1000,
            weight_metric: WeightMetric::Chars,
            prefetch: true,
            min_font_scale: 0.8,
            max_font_scale: 1.5,
        }
    }
}

impl PagerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.base_capacity == 0 {
            return Err(PagerError::Config {
                reason: "Base capacity must be greater than 0".to_string(),
            });
        }

        if !(self.min_font_scale > 0.0) || self.min_font_scale > self.max_font_scale {
            return Err(PagerError::Config {
                reason: format!(
                    "Font scale bounds [{}, {}] are not a positive range",
                    self.min_font_scale, self.max_font_scale
                ),
            });
        }

        Ok(())
    }

    pub fn clamp_font_scale(&self, scale: f32) -> f32 {
        if scale.is_nan() {
            return 1.0_f32.clamp(self.min_font_scale, self.max_font_scale);
        }
        scale.clamp(self.min_font_scale, self.max_font_scale)
    }

    /// Larger text means fewer characters per page.
    pub fn capacity_for_scale(&self, scale: f32) -> usize {
        let scale = self.clamp_font_scale(scale);
        let capacity = (self.base_capacity as f32 / scale).round() as usize;
        capacity.max(1)
    }
}
