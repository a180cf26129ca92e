use pagefold::{flatten_chapters, Chapter, ContentUnit, KeyedUnit, UnitKind};
use std::sync::Arc;

use crate::render_ir::{LayoutResult, MeasureStyle, PlacedUnit};

/// Carry added after a split line, in em of the layout font size.
pub const DEFAULT_SPLIT_CARRY_EM: f32 = 1.5;

/// Upper bound on pages a single layout may span.
///
/// Widths that push the cursor past it make the layout unmeasurable.
pub const MAX_PAGES: usize = 1 << 16;

/// Measurement oracle for rendered unit widths.
///
/// Width is the extent a unit consumes along the folded page axis. For
/// vertical text that is the number of columns times the column advance.
/// Implementations must be deterministic and must wrap exactly like the
/// presentation surface that later displays the pages.
pub trait TextMeasurer: Send + Sync {
    /// Measure rendered text width for the provided style.
    fn measure_text_px(&self, text: &str, style: &MeasureStyle) -> f32;

    /// Measure a whole unit.
    ///
    /// Default measures the unit's visible text (divider glyphs for dividers).
    fn measure_unit_px(&self, unit: &ContentUnit, style: &MeasureStyle) -> f32 {
        self.measure_text_px(unit.text(), style)
    }

    /// Whether the measuring surface is mounted.
    ///
    /// Layout yields an empty result while this is `false`.
    fn is_ready(&self) -> bool {
        true
    }
}

/// Page geometry for pagination.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayoutConfig {
    /// Width of one page along the folding axis, in px.
    pub page_width: u32,
    /// Page height (column length), in px.
    pub page_height: u32,
    /// Overlap between adjacent pages in the viewport, in px.
    ///
    /// Does not move page boundaries; it is part of the cache identity because
    /// the presentation layer renders pages with it.
    pub padding: u32,
    /// Leading margin seeded on the page after a split line, in em.
    pub split_carry_em: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            page_width: 450,
            page_height: 600,
            padding: 30,
            split_carry_em: DEFAULT_SPLIT_CARRY_EM,
        }
    }
}

impl LayoutConfig {
    /// Convenience for a page size with default padding and carry.
    pub fn for_page(width: u32, height: u32) -> Self {
        Self {
            page_width: width,
            page_height: height,
            ..Self::default()
        }
    }

    /// Set the viewport padding.
    pub fn with_padding(mut self, padding: u32) -> Self {
        self.padding = padding;
        self
    }

    /// Set the split carry; negative or non-finite values become zero.
    pub fn with_split_carry_em(mut self, carry_em: f32) -> Self {
        self.split_carry_em = if carry_em.is_finite() {
            carry_em.max(0.0)
        } else {
            0.0
        };
        self
    }

    fn split_carry_px(self, font_size: u32) -> f32 {
        self.split_carry_em * font_size as f32
    }

    fn base_style(self, font_size: u32) -> MeasureStyle {
        MeasureStyle {
            font_size_px: font_size as f32,
            page_width_px: self.page_width as f32,
            page_height_px: self.page_height as f32,
            kind: UnitKind::Line,
        }
    }
}

/// Per-unit page assignment for one layout pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PagePlan {
    /// Units in processing order with their pages.
    pub placements: Vec<PlacedUnit>,
    /// Number of pages spanned.
    pub page_count: usize,
}

/// Deterministic pagination engine.
#[derive(Clone)]
pub struct LayoutEngine {
    cfg: LayoutConfig,
    text_measurer: Option<Arc<dyn TextMeasurer>>,
}

impl core::fmt::Debug for LayoutEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LayoutEngine")
            .field("cfg", &self.cfg)
            .field("has_text_measurer", &self.text_measurer.is_some())
            .finish()
    }
}

impl LayoutEngine {
    /// Create a layout engine using [`HeuristicMeasurer`] until a measurer is installed.
    pub fn new(cfg: LayoutConfig) -> Self {
        Self {
            cfg,
            text_measurer: None,
        }
    }

    /// Install the measurement oracle.
    pub fn with_text_measurer(mut self, measurer: Arc<dyn TextMeasurer>) -> Self {
        self.text_measurer = Some(measurer);
        self
    }

    /// Page geometry.
    pub fn config(&self) -> &LayoutConfig {
        &self.cfg
    }

    /// Paginate chapters at `font_size` into page markup.
    ///
    /// Returns [`LayoutResult::empty`] when the content is not measurable yet.
    pub fn layout(&self, chapters: &[Chapter], font_size: u32) -> LayoutResult {
        match self.place_units(chapters, font_size) {
            Some(plan) => {
                LayoutResult::from_placements(&plan.placements, plan.page_count, self.cfg.page_height)
            }
            None => LayoutResult::empty(),
        }
    }

    /// Assign every unit to a page.
    ///
    /// Returns `None` when there is nothing to measure or the measurer cannot
    /// resolve a width.
    pub fn place_units(&self, chapters: &[Chapter], font_size: u32) -> Option<PagePlan> {
        match &self.text_measurer {
            Some(measurer) => plan_pages(chapters, &self.cfg, font_size, measurer.as_ref()),
            None => plan_pages(chapters, &self.cfg, font_size, &HeuristicMeasurer::default()),
        }
    }
}

/// Paginate with an explicit measurer.
pub fn paginate(
    chapters: &[Chapter],
    cfg: &LayoutConfig,
    font_size: u32,
    measurer: &dyn TextMeasurer,
) -> LayoutResult {
    match plan_pages(chapters, cfg, font_size, measurer) {
        Some(plan) => LayoutResult::from_placements(&plan.placements, plan.page_count, cfg.page_height),
        None => LayoutResult::empty(),
    }
}

/// Running position along the single logical column folded into pages.
#[derive(Clone, Copy, Debug)]
struct PageCursor {
    page_width: f64,
    distance: f64,
}

impl PageCursor {
    fn new(page_width: u32) -> Self {
        Self {
            page_width: page_width as f64,
            distance: 0.0,
        }
    }

    fn page(self) -> usize {
        (self.distance / self.page_width).floor() as usize
    }

    fn offset(self) -> f64 {
        self.distance - self.page() as f64 * self.page_width
    }

    fn available(self) -> f32 {
        (self.page_width - self.offset()) as f32
    }

    fn limit(self) -> f64 {
        self.page_width * MAX_PAGES as f64
    }

    /// Move `width` px along the column; `None` past [`MAX_PAGES`].
    fn advance(&mut self, width: f32) -> Option<()> {
        let distance = self.distance + width as f64;
        if distance > self.limit() {
            return None;
        }
        self.distance = distance;
        Some(())
    }

    /// Consume the rest of the current page.
    fn break_page(&mut self) -> Option<()> {
        let next = self.page().checked_add(1)?;
        if next > MAX_PAGES {
            return None;
        }
        self.distance = next as f64 * self.page_width;
        Some(())
    }

    /// Move to the next page boundary unless already on one.
    fn start_fresh_page(&mut self) -> Option<()> {
        if self.offset() > 0.0 {
            self.break_page()?;
        }
        Some(())
    }
}

fn plan_pages(
    chapters: &[Chapter],
    cfg: &LayoutConfig,
    font_size: u32,
    measurer: &dyn TextMeasurer,
) -> Option<PagePlan> {
    if chapters.is_empty() {
        return None;
    }
    if cfg.page_width == 0 || !measurer.is_ready() {
        log::debug!("layout deferred: measuring surface not ready");
        return None;
    }

    let base = cfg.base_style(font_size);
    let carry = cfg.split_carry_px(font_size);
    let units = flatten_chapters(chapters);
    let mut cursor = PageCursor::new(cfg.page_width);
    let mut placements = Vec::with_capacity(units.len() + 8);

    for keyed in units {
        let style = base.with_kind(keyed.unit.kind());
        let Some(used) = checked_width(measurer.measure_unit_px(&keyed.unit, &style)) else {
            log::debug!("unit {} has no measurable width; layout deferred", keyed.key);
            return None;
        };
        match keyed.unit {
            ContentUnit::Title(_) => {
                // Titles own their page.
                let shares_page = placements
                    .last()
                    .is_some_and(|placed: &PlacedUnit| placed.page >= cursor.page());
                if shares_page {
                    cursor.break_page()?;
                } else {
                    cursor.start_fresh_page()?;
                }
                let page = cursor.page();
                placements.push(PlacedUnit { page, unit: keyed });
                cursor.advance(used)?;
                if cursor.page() == page {
                    cursor.break_page()?;
                } else {
                    cursor.start_fresh_page()?;
                }
            }
            ContentUnit::Divider => {
                if used > cursor.available() {
                    cursor.break_page()?;
                }
                placements.push(PlacedUnit {
                    page: cursor.page(),
                    unit: keyed,
                });
                cursor.advance(used)?;
            }
            ContentUnit::Line(_) | ContentUnit::LineTail(_) => {
                place_line(
                    &mut cursor,
                    keyed,
                    used,
                    &style,
                    carry,
                    measurer,
                    &mut placements,
                )?;
            }
        }
    }

    // Placements are page-monotonic, so the last one holds the highest page.
    let page_count = match placements.last() {
        Some(placed) => placed.page.checked_add(1)?,
        None => 1,
    };
    Some(PagePlan {
        placements,
        page_count,
    })
}

fn place_line(
    cursor: &mut PageCursor,
    keyed: KeyedUnit,
    used: f32,
    style: &MeasureStyle,
    carry: f32,
    measurer: &dyn TextMeasurer,
    out: &mut Vec<PlacedUnit>,
) -> Option<()> {
    if used <= cursor.available() {
        out.push(PlacedUnit {
            page: cursor.page(),
            unit: keyed,
        });
        return cursor.advance(used);
    }

    let text = keyed.unit.text();
    let mut fit = fitting_prefix_chars(measurer, text, cursor.available(), style)?;
    if fit == 0 && cursor.offset() > 0.0 {
        // Nothing fits in the remainder: retry on a fresh page.
        cursor.break_page()?;
        if used <= cursor.available() {
            out.push(PlacedUnit {
                page: cursor.page(),
                unit: keyed,
            });
            return cursor.advance(used);
        }
        fit = fitting_prefix_chars(measurer, text, cursor.available(), style)?;
    }
    if fit == 0 {
        // Not even one character fits an empty page; let the line overflow.
        out.push(PlacedUnit {
            page: cursor.page(),
            unit: keyed,
        });
        return cursor.advance(used);
    }

    let Some((head, tail)) = split_at_char(text, fit) else {
        out.push(PlacedUnit {
            page: cursor.page(),
            unit: keyed,
        });
        return cursor.advance(used);
    };
    out.push(PlacedUnit {
        page: cursor.page(),
        unit: KeyedUnit::new(keyed.key, ContentUnit::Line(head.to_string())),
    });
    cursor.break_page()?;
    out.push(PlacedUnit {
        page: cursor.page(),
        unit: KeyedUnit::new(keyed.key, ContentUnit::LineTail(tail.to_string())),
    });
    cursor.advance(carry)
}

/// Largest character count whose prefix fits in `avail`.
///
/// The full text is known not to fit, so the search tops out one short of it.
fn fitting_prefix_chars(
    measurer: &dyn TextMeasurer,
    text: &str,
    avail: f32,
    style: &MeasureStyle,
) -> Option<usize> {
    let ends: Vec<usize> = text
        .char_indices()
        .skip(1)
        .map(|(byte, _)| byte)
        .chain(core::iter::once(text.len()))
        .collect();
    let mut lo = 0usize;
    let mut hi = ends.len().saturating_sub(1);
    while lo < hi {
        let mid = lo + (hi - lo).div_ceil(2);
        let width = checked_width(measurer.measure_text_px(&text[..ends[mid - 1]], style))?;
        if width <= avail {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    Some(lo)
}

fn split_at_char(text: &str, chars: usize) -> Option<(&str, &str)> {
    let (byte, _) = text.char_indices().nth(chars)?;
    Some(text.split_at(byte))
}

fn checked_width(width: f32) -> Option<f32> {
    (width.is_finite() && width >= 0.0).then_some(width)
}

/// Synthetic oracle: every character advances a fixed number of em.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FixedAdvanceMeasurer {
    pub advance_em: f32,
}

impl Default for FixedAdvanceMeasurer {
    fn default() -> Self {
        Self { advance_em: 1.0 }
    }
}

impl TextMeasurer for FixedAdvanceMeasurer {
    fn measure_text_px(&self, text: &str, style: &MeasureStyle) -> f32 {
        text.chars().count() as f32 * self.advance_em * style.font_size_px
    }
}

/// Glyph-class estimate of vertical-rl column usage.
///
/// Text runs down columns of `page_height_px`; the measured width is the
/// number of columns used times the line advance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HeuristicMeasurer {
    /// Column advance in em.
    pub line_height: f32,
}

impl Default for HeuristicMeasurer {
    fn default() -> Self {
        Self { line_height: 1.5 }
    }
}

impl HeuristicMeasurer {
    fn columns_px(&self, run_em: f32, style: &MeasureStyle) -> f32 {
        let column_len = style.page_height_px.max(style.font_size_px).max(1.0);
        let run_px = run_em * style.font_size_px;
        let columns = (run_px / column_len).ceil().max(1.0);
        columns * style.font_size_px * self.line_height
    }
}

impl TextMeasurer for HeuristicMeasurer {
    fn measure_text_px(&self, text: &str, style: &MeasureStyle) -> f32 {
        if text.is_empty() {
            return 0.0;
        }
        let run_em: f32 = text.chars().map(vertical_glyph_em).sum();
        self.columns_px(run_em, style)
    }

    fn measure_unit_px(&self, unit: &ContentUnit, style: &MeasureStyle) -> f32 {
        match unit {
            // Centered divider with 1em padding at each end of the column.
            ContentUnit::Divider => {
                let run_em: f32 = unit.text().chars().map(vertical_glyph_em).sum();
                self.columns_px(run_em + 2.0, style)
            }
            // A bare line break still occupies one column.
            ContentUnit::Line(text) if text.is_empty() => self.columns_px(0.0, style),
            _ => self.measure_text_px(unit.text(), style),
        }
    }
}

/// Advance of one glyph along a vertical column, in em.
fn vertical_glyph_em(ch: char) -> f32 {
    match ch {
        c if is_full_width(c) => 1.0,
        ' ' | '\u{00A0}' => 0.32,
        '\t' => 1.28,
        'i' | 'l' | 'I' | '|' | '!' => 0.24,
        '.' | ',' | ':' | ';' | '\'' | '"' | '`' => 0.23,
        '-' | '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}' => 0.34,
        '(' | ')' | '[' | ']' | '{' | '}' => 0.30,
        'f' | 't' | 'j' | 'r' => 0.34,
        'm' | 'w' | 'M' | 'W' | '@' | '%' | '&' | '#' => 0.74,
        c if c.is_ascii_digit() => 0.52,
        c if c.is_ascii_uppercase() => 0.64,
        c if c.is_ascii_lowercase() => 0.52,
        c if c.is_whitespace() => 0.32,
        c if c.is_ascii_punctuation() => 0.42,
        _ => 0.56,
    }
}

fn is_full_width(ch: char) -> bool {
    matches!(
        ch,
        '\u{1100}'..='\u{115F}'
            | '\u{2E80}'..='\u{A4CF}'
            | '\u{AC00}'..='\u{D7A3}'
            | '\u{F900}'..='\u{FAFF}'
            | '\u{FE30}'..='\u{FE4F}'
            | '\u{FF00}'..='\u{FF60}'
            | '\u{FFE0}'..='\u{FFE6}'
    )
}
