use pagefold::{Chapter, KeyedUnit, UnitKind};
use serde::{Deserialize, Serialize};

use crate::render_layout::LayoutConfig;

/// Namespace prefix for every cache key written by this crate.
pub const CACHE_KEY_PREFIX: &str = "pagefold";

/// Bumped whenever layout output changes for identical inputs.
pub const LAYOUT_REVISION: u8 = 1;

/// Style context handed to the measurement oracle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeasureStyle {
    /// Font size in px.
    pub font_size_px: f32,
    /// Width of one page in px.
    pub page_width_px: f32,
    /// Height of one page (column length) in px.
    pub page_height_px: f32,
    /// Category of the unit being measured.
    pub kind: UnitKind,
}

impl MeasureStyle {
    /// Same context for another unit category.
    pub fn with_kind(self, kind: UnitKind) -> Self {
        Self { kind, ..self }
    }
}

/// A unit together with the page it was assigned to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlacedUnit {
    /// 0-based page index.
    pub page: usize,
    /// The unit (possibly a split fragment).
    pub unit: KeyedUnit,
}

/// Pagination output: serialized markup per page.
///
/// `pages.len() == page_count` always holds. An empty result means the
/// content could not be measured yet, not that it has no pages.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutResult {
    pub pages: Vec<String>,
    pub page_count: usize,
}

impl LayoutResult {
    /// The "not yet measurable" result.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Fold placements into per-page markup, preserving processing order.
    pub fn from_placements(placements: &[PlacedUnit], page_count: usize, page_height: u32) -> Self {
        let mut pages = vec![String::new(); page_count];
        for placed in placements {
            if let Some(page) = pages.get_mut(placed.page) {
                placed.unit.write_markup(page_height, page);
            }
        }
        Self { pages, page_count }
    }

    /// Whether the layout produced no pages.
    pub fn is_empty(&self) -> bool {
        self.page_count == 0
    }

    /// Markup of page `index`, if present.
    pub fn page(&self, index: usize) -> Option<&str> {
        self.pages.get(index).map(String::as_str)
    }
}

/// Content-derived identity of a chapter list.
///
/// Two chapter lists with identical titles and paragraph texts always map to
/// the same id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContentId(pub [u8; 32]);

impl ContentId {
    /// Build a deterministic id from arbitrary payload bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut hasher = ContentHasher::new();
        hasher.update(bytes);
        hasher.finish()
    }

    /// Id of the chapter texts.
    ///
    /// Every field is length-prefixed so that moving text across a field
    /// boundary changes the id.
    pub fn from_chapters(chapters: &[Chapter]) -> Self {
        let mut hasher = ContentHasher::new();
        hasher.update(&(chapters.len() as u64).to_le_bytes());
        for chapter in chapters {
            hasher.update_field(chapter.title.as_bytes());
            hasher.update(&(chapter.paragraphs.len() as u64).to_le_bytes());
            for paragraph in &chapter.paragraphs {
                hasher.update_field(paragraph.as_bytes());
            }
        }
        hasher.finish()
    }

    /// Lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        let mut out = String::with_capacity(64);
        for byte in self.0 {
            out.push(HEX[(byte >> 4) as usize] as char);
            out.push(HEX[(byte & 0x0f) as usize] as char);
        }
        out
    }
}

/// Four independently seeded FNV-1a lanes.
struct ContentHasher {
    lanes: [u64; 4],
}

impl ContentHasher {
    const SEEDS: [u64; 4] = [
        0xcbf29ce484222325,
        0x9e3779b97f4a7c15,
        0xd6e8feb86659fd93,
        0xa0761d6478bd642f,
    ];

    fn new() -> Self {
        Self { lanes: Self::SEEDS }
    }

    fn update(&mut self, payload: &[u8]) {
        for lane in &mut self.lanes {
            for b in payload {
                *lane ^= *b as u64;
                *lane = lane.wrapping_mul(0x100000001b3);
            }
        }
    }

    fn update_field(&mut self, field: &[u8]) {
        self.update(&(field.len() as u64).to_le_bytes());
        self.update(field);
    }

    fn finish(self) -> ContentId {
        let mut out = [0u8; 32];
        for (idx, lane) in self.lanes.iter().enumerate() {
            out[idx * 8..idx * 8 + 8].copy_from_slice(&lane.to_le_bytes());
        }
        ContentId(out)
    }
}

/// Content-addressed cache key.
///
/// Derived from the chapter texts plus page geometry and font size:
/// `pagefold:v<rev>:<content-hex>:<width>x<height>:<padding>:<font_size>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for a chapter list laid out with `cfg` at `font_size`.
    pub fn new(chapters: &[Chapter], cfg: &LayoutConfig, font_size: u32) -> Self {
        Self::for_content(ContentId::from_chapters(chapters), cfg, font_size)
    }

    /// Key for a precomputed content id.
    pub fn for_content(content: ContentId, cfg: &LayoutConfig, font_size: u32) -> Self {
        Self(format!(
            "{}:v{}:{}:{}x{}:{}:{}",
            CACHE_KEY_PREFIX,
            LAYOUT_REVISION,
            content.to_hex(),
            cfg.page_width,
            cfg.page_height,
            cfg.padding,
            font_size
        ))
    }

    /// Key text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
