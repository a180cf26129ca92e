use pagefold::{leading_sample, locate, Chapter, FontSizeSet, ReaderPosition};
use std::fmt;
use std::sync::Arc;

use crate::render_engine::PageCache;
use crate::render_layout::LayoutEngine;

/// Animation state of the page strip.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AnimationPhase {
    #[default]
    Idle,
    SlidingForward,
    SlidingBackward,
}

/// Visual offset of the three-page strip (previous, current, next).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SlideOffset {
    /// Strip shifted to show the previous page.
    Previous,
    /// Neutral position showing the current page.
    #[default]
    Centered,
    /// Strip shifted to show the next page.
    Next,
}

/// Snapshot of navigation state for the presentation layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NavigationState {
    /// 0-based page index, always `< page_count`.
    pub page_index: usize,
    /// Exposed page count, at least 1.
    pub page_count: usize,
    pub font_size: u32,
    pub phase: AnimationPhase,
}

/// Token returned when a page turn commits.
///
/// The offset reset it stands for must run on the next scheduling tick via
/// [`NavigationController::on_tick`], after the committed page has painted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[must_use = "schedule on_tick() for the next turn of the event loop"]
pub struct ScheduledReset;

/// Outcome of relocating the reading position after a relayout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Relocation {
    /// The fingerprint was found on this page.
    Resolved(usize),
    /// No fingerprint match; the previous index was kept (clamped).
    Unresolved,
    /// The new layout is not measurable yet; relocation waits for
    /// [`NavigationController::refresh`].
    Pending,
}

/// Controller construction options.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NavigationOptions {
    /// Allowed font sizes; all of them are laid out together on a cache miss.
    pub font_sizes: FontSizeSet,
    /// Starting position, e.g. from a query string.
    pub initial: Option<ReaderPosition>,
}

impl NavigationOptions {
    /// Set the allowed font sizes.
    pub fn with_font_sizes(mut self, font_sizes: FontSizeSet) -> Self {
        self.font_sizes = font_sizes;
        self
    }

    /// Set the starting position.
    pub fn with_initial(mut self, position: ReaderPosition) -> Self {
        self.initial = Some(position);
        self
    }
}

/// Owns the reading position, page-turn animation, and font-size relayout.
///
/// All methods are synchronous reactions to discrete events. At most one page
/// turn is in flight; requests arriving meanwhile are dropped.
pub struct NavigationController {
    chapters: Arc<[Chapter]>,
    engine: LayoutEngine,
    cache: PageCache,
    font_sizes: FontSizeSet,
    font_size: u32,
    pages: Vec<String>,
    page_index: usize,
    phase: AnimationPhase,
    offset: SlideOffset,
    reset_pending: bool,
    pending_fingerprint: Option<String>,
    pending_page: Option<usize>,
}

impl fmt::Debug for NavigationController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavigationController")
            .field("chapters", &self.chapters.len())
            .field("engine", &self.engine)
            .field("state", &self.state())
            .field("offset", &self.offset)
            .field("reset_pending", &self.reset_pending)
            .field("pending_fingerprint", &self.pending_fingerprint)
            .finish_non_exhaustive()
    }
}

impl NavigationController {
    /// Load pages for the initial font size and position.
    ///
    /// When the content is not measurable yet, the requested page is kept and
    /// applied by the first successful [`refresh`](Self::refresh).
    pub fn new(
        chapters: impl Into<Arc<[Chapter]>>,
        engine: LayoutEngine,
        cache: PageCache,
        options: NavigationOptions,
    ) -> Self {
        let NavigationOptions {
            font_sizes,
            initial,
        } = options;
        let initial = initial.unwrap_or(ReaderPosition {
            page_index: 0,
            font_size: font_sizes.default_size(),
        });
        let mut controller = Self {
            chapters: chapters.into(),
            engine,
            cache,
            font_size: font_sizes.snap(initial.font_size),
            font_sizes,
            pages: Vec::new(),
            page_index: 0,
            phase: AnimationPhase::Idle,
            offset: SlideOffset::Centered,
            reset_pending: false,
            pending_fingerprint: None,
            pending_page: Some(initial.page_index),
        };
        controller.reload_pages();
        controller
    }

    /// Fetch or build pages for the current font size.
    ///
    /// Called once the measuring surface is mounted. Applies a fingerprint
    /// left by an earlier unmeasurable relayout.
    pub fn refresh(&mut self) -> Relocation {
        self.reload_pages();
        if self.pages.is_empty() {
            return Relocation::Pending;
        }
        match self.pending_fingerprint.take() {
            Some(sample) => self.relocate(&sample),
            None => Relocation::Unresolved,
        }
    }

    fn reload_pages(&mut self) {
        let result = self.cache.get_or_build(
            &self.chapters,
            &self.engine,
            self.font_size,
            self.font_sizes.sizes(),
        );
        self.pages = result.pages;
        if self.pages.is_empty() {
            log::debug!("pages not measurable at font size {}", self.font_size);
            if self.pending_page.is_none() {
                self.pending_page = Some(self.page_index);
            }
            self.page_index = 0;
            return;
        }
        if let Some(page) = self.pending_page.take() {
            self.page_index = page;
        }
        self.clamp_index();
    }

    fn clamp_index(&mut self) {
        self.page_index = self.page_index.min(self.page_count() - 1);
    }

    fn relocate(&mut self, sample: &str) -> Relocation {
        match locate(sample, &self.pages) {
            Some(page) => {
                log::debug!("relocated reading position to page {}", page);
                self.page_index = page;
                self.clamp_index();
                Relocation::Resolved(self.page_index)
            }
            None => Relocation::Unresolved,
        }
    }

    /// Change the font size: fingerprint, relayout, relocate.
    ///
    /// The size is snapped to the allowed set. Any in-flight page turn is
    /// cancelled.
    pub fn set_font_size(&mut self, font_size: u32) -> Relocation {
        self.phase = AnimationPhase::Idle;
        self.offset = SlideOffset::Centered;
        self.reset_pending = false;

        let sample = self.current_page().and_then(leading_sample);
        let sample = sample.or_else(|| self.pending_fingerprint.take());
        self.font_size = self.font_sizes.snap(font_size);
        self.reload_pages();
        if self.pages.is_empty() {
            self.pending_fingerprint = sample;
            return Relocation::Pending;
        }
        match sample {
            Some(sample) => self.relocate(&sample),
            None => Relocation::Unresolved,
        }
    }

    /// Start a forward page turn.
    ///
    /// Returns `false` when a turn is in flight or this is the last page.
    pub fn request_forward(&mut self) -> bool {
        if !self.accepts_request() {
            log::trace!("forward request dropped during {:?}", self.phase);
            return false;
        }
        if self.page_index + 1 >= self.page_count() {
            return false;
        }
        self.phase = AnimationPhase::SlidingForward;
        self.offset = SlideOffset::Next;
        true
    }

    /// Start a backward page turn.
    ///
    /// Returns `false` when a turn is in flight or this is the first page.
    pub fn request_backward(&mut self) -> bool {
        if !self.accepts_request() {
            log::trace!("backward request dropped during {:?}", self.phase);
            return false;
        }
        if self.page_index == 0 {
            return false;
        }
        self.phase = AnimationPhase::SlidingBackward;
        self.offset = SlideOffset::Previous;
        true
    }

    fn accepts_request(&mut self) -> bool {
        if self.phase != AnimationPhase::Idle {
            return false;
        }
        // A request before the tick lands resets the strip first.
        self.on_tick();
        true
    }

    /// Commit a finished page turn.
    ///
    /// The offset reset is deferred; schedule [`on_tick`](Self::on_tick) when
    /// `Some` is returned.
    pub fn on_transition_end(&mut self) -> Option<ScheduledReset> {
        match self.phase {
            AnimationPhase::Idle => None,
            AnimationPhase::SlidingForward => {
                self.page_index += 1;
                Some(self.commit())
            }
            AnimationPhase::SlidingBackward => {
                self.page_index = self.page_index.saturating_sub(1);
                Some(self.commit())
            }
        }
    }

    fn commit(&mut self) -> ScheduledReset {
        self.clamp_index();
        self.phase = AnimationPhase::Idle;
        self.reset_pending = true;
        ScheduledReset
    }

    /// Apply a deferred offset reset. Returns whether one was pending.
    pub fn on_tick(&mut self) -> bool {
        if !self.reset_pending {
            return false;
        }
        self.reset_pending = false;
        self.offset = SlideOffset::Centered;
        true
    }

    /// Jump directly to `page_index`, clamped. Ignored while a turn is in flight.
    pub fn go_to_page(&mut self, page_index: usize) -> bool {
        if !self.accepts_request() {
            log::trace!("jump to page {} dropped during {:?}", page_index, self.phase);
            return false;
        }
        if self.pages.is_empty() {
            self.pending_page = Some(page_index);
        }
        self.page_index = page_index;
        self.clamp_index();
        true
    }

    /// Whether the strip should animate offset changes.
    ///
    /// `false` between a commit and its deferred reset.
    pub fn transition_enabled(&self) -> bool {
        !self.reset_pending
    }

    /// Exposed page count; at least 1 even while no layout is available.
    pub fn page_count(&self) -> usize {
        self.pages.len().max(1)
    }

    /// 0-based current page.
    pub fn page_index(&self) -> usize {
        self.page_index
    }

    /// Active font size.
    pub fn font_size(&self) -> u32 {
        self.font_size
    }

    /// Allowed font sizes.
    pub fn font_sizes(&self) -> &FontSizeSet {
        &self.font_sizes
    }

    /// All page markup for the active font size.
    pub fn pages(&self) -> &[String] {
        &self.pages
    }

    pub fn current_page(&self) -> Option<&str> {
        self.pages.get(self.page_index).map(String::as_str)
    }

    pub fn previous_page(&self) -> Option<&str> {
        let index = self.page_index.checked_sub(1)?;
        self.pages.get(index).map(String::as_str)
    }

    pub fn next_page(&self) -> Option<&str> {
        self.pages.get(self.page_index + 1).map(String::as_str)
    }

    pub fn phase(&self) -> AnimationPhase {
        self.phase
    }

    pub fn offset(&self) -> SlideOffset {
        self.offset
    }

    pub fn state(&self) -> NavigationState {
        NavigationState {
            page_index: self.page_index,
            page_count: self.page_count(),
            font_size: self.font_size,
            phase: self.phase,
        }
    }

    /// Position for the external page/font-size parameters.
    pub fn position(&self) -> ReaderPosition {
        ReaderPosition {
            page_index: self.page_index,
            font_size: self.font_size,
        }
    }

    /// `"N / M"` with a 1-based page number.
    pub fn page_label(&self) -> String {
        format!("{} / {}", self.page_index + 1, self.page_count())
    }

    /// Fingerprint waiting for a measurable layout.
    pub fn pending_fingerprint(&self) -> Option<&str> {
        self.pending_fingerprint.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_engine::MemoryCacheStore;
    use crate::render_ir::MeasureStyle;
    use crate::render_layout::{FixedAdvanceMeasurer, LayoutConfig, TextMeasurer};

    /// Ten chapters of one short line each: 20 pages at font size 10.
    fn chapters() -> Vec<Chapter> {
        (0..10)
            .map(|idx| Chapter::new(format!("第{}章", idx + 1), [format!("本文{}", idx)]))
            .collect()
    }

    fn controller() -> NavigationController {
        let engine = LayoutEngine::new(LayoutConfig::for_page(100, 600))
            .with_text_measurer(Arc::new(FixedAdvanceMeasurer::default()));
        let options = NavigationOptions::default()
            .with_font_sizes(FontSizeSet::new([10, 20], 10));
        NavigationController::new(
            chapters(),
            engine,
            PageCache::new(MemoryCacheStore::new()),
            options,
        )
    }

    #[test]
    fn second_forward_request_during_animation_is_dropped() {
        let mut nav = controller();
        assert_eq!(nav.page_count(), 20);
        assert!(nav.request_forward());
        assert!(!nav.request_forward());
        assert_eq!(nav.phase(), AnimationPhase::SlidingForward);
        assert_eq!(nav.on_transition_end(), Some(ScheduledReset));
        assert_eq!(nav.page_index(), 1);
        assert_eq!(nav.on_transition_end(), None);
        assert_eq!(nav.page_index(), 1);
    }

    #[test]
    fn offset_resets_on_tick_after_commit() {
        let mut nav = controller();
        assert!(nav.request_forward());
        assert_eq!(nav.offset(), SlideOffset::Next);
        assert!(nav.transition_enabled());

        let _reset = nav.on_transition_end();
        assert_eq!(nav.phase(), AnimationPhase::Idle);
        assert_eq!(nav.offset(), SlideOffset::Next);
        assert!(!nav.transition_enabled());

        assert!(nav.on_tick());
        assert_eq!(nav.offset(), SlideOffset::Centered);
        assert!(nav.transition_enabled());
        assert!(!nav.on_tick());
    }

    #[test]
    fn request_before_tick_flushes_pending_reset() {
        let mut nav = controller();
        assert!(nav.request_forward());
        let _reset = nav.on_transition_end();
        assert!(nav.request_backward());
        assert!(nav.transition_enabled());
        assert_eq!(nav.offset(), SlideOffset::Previous);
        let _reset = nav.on_transition_end();
        assert_eq!(nav.page_index(), 0);
    }

    #[test]
    fn requests_at_bounds_are_ignored() {
        let mut nav = controller();
        assert!(!nav.request_backward());
        assert_eq!(nav.phase(), AnimationPhase::Idle);

        assert!(nav.go_to_page(500));
        assert_eq!(nav.page_index(), 19);
        assert!(!nav.request_forward());
        assert_eq!(nav.page_label(), "20 / 20");
        assert_eq!(nav.next_page(), None);
        assert!(nav.previous_page().is_some());
    }

    #[test]
    fn jumps_are_ignored_while_animating() {
        let mut nav = controller();
        assert!(nav.request_forward());
        assert!(!nav.go_to_page(5));
        let _reset = nav.on_transition_end();
        assert!(nav.go_to_page(5));
        assert_eq!(nav.page_index(), 5);
    }

    #[test]
    fn page_index_stays_in_range_over_request_sequences() {
        let mut nav = controller();
        for step in 0..60 {
            let accepted = if step % 7 < 5 {
                nav.request_forward()
            } else {
                nav.request_backward()
            };
            if accepted && step % 3 != 0 {
                let _reset = nav.on_transition_end();
            }
            if step % 4 == 0 {
                nav.on_tick();
            }
            assert!(nav.page_index() < nav.page_count());
        }
    }

    #[test]
    fn font_size_change_cancels_animation_and_relocates() {
        let mut nav = controller();
        assert!(nav.go_to_page(6));
        let before = nav.current_page().map(str::to_owned).expect("page");
        assert!(nav.request_forward());

        let relocation = nav.set_font_size(20);
        assert_eq!(nav.phase(), AnimationPhase::Idle);
        assert_eq!(nav.offset(), SlideOffset::Centered);
        assert_eq!(nav.font_size(), 20);
        let Relocation::Resolved(page) = relocation else {
            panic!("expected a resolved relocation, got {relocation:?}");
        };
        assert_eq!(nav.page_index(), page);
        let sample = leading_sample(&before).expect("sample");
        assert!(nav.current_page().is_some_and(|p| p.contains(&sample)));
    }

    /// 250px glyphs below 20px font, 1px glyphs from 20px up.
    struct CollapsingMeasurer;

    impl TextMeasurer for CollapsingMeasurer {
        fn measure_text_px(&self, text: &str, style: &MeasureStyle) -> f32 {
            let advance = if style.font_size_px < 20.0 { 250.0 } else { 1.0 };
            text.chars().count() as f32 * advance
        }
    }

    #[test]
    fn unresolved_relocation_keeps_index_clamped_to_smaller_layout() {
        let engine = LayoutEngine::new(LayoutConfig::for_page(100, 600))
            .with_text_measurer(Arc::new(CollapsingMeasurer));
        // Each unit overflows on a fresh page: title on 0, "WW" on 3, "x" on 8.
        let mut nav = NavigationController::new(
            vec![Chapter::new("T", ["WW\nx"])],
            engine,
            PageCache::new(MemoryCacheStore::new()),
            NavigationOptions::default().with_font_sizes(FontSizeSet::new([10, 20], 10)),
        );
        assert_eq!(nav.page_count(), 9);
        assert!(nav.go_to_page(4));
        assert_eq!(nav.current_page(), Some(""));

        assert_eq!(nav.set_font_size(20), Relocation::Unresolved);
        assert_eq!(nav.page_count(), 2);
        assert_eq!(nav.page_index(), nav.page_count() - 1);
        assert!(nav.pending_fingerprint().is_none());
    }

    #[test]
    fn font_size_is_snapped_to_allowed_sizes() {
        let mut nav = controller();
        let _ = nav.set_font_size(19);
        assert_eq!(nav.font_size(), 20);
        assert_eq!(nav.position().to_query(), format!("page={}&fontSize=20", nav.page_index() + 1));
    }

    #[test]
    fn initial_position_is_clamped() {
        let engine = LayoutEngine::new(LayoutConfig::for_page(100, 600))
            .with_text_measurer(Arc::new(FixedAdvanceMeasurer::default()));
        let sizes = FontSizeSet::new([10, 20], 10);
        let initial = ReaderPosition::from_query(Some("999"), Some("10"), &sizes);
        let nav = NavigationController::new(
            chapters(),
            engine,
            PageCache::new(MemoryCacheStore::new()),
            NavigationOptions::default()
                .with_font_sizes(sizes)
                .with_initial(initial),
        );
        assert_eq!(nav.page_index(), 19);
        assert_eq!(nav.state().page_count, 20);
    }

    #[test]
    fn empty_content_exposes_one_page() {
        let engine = LayoutEngine::new(LayoutConfig::for_page(100, 600))
            .with_text_measurer(Arc::new(FixedAdvanceMeasurer::default()));
        let mut nav = NavigationController::new(
            Vec::<Chapter>::new(),
            engine,
            PageCache::new(MemoryCacheStore::new()),
            NavigationOptions::default(),
        );
        assert_eq!(nav.page_count(), 1);
        assert_eq!(nav.page_index(), 0);
        assert_eq!(nav.current_page(), None);
        assert!(!nav.request_forward());
        assert_eq!(nav.page_label(), "1 / 1");
        assert_eq!(nav.refresh(), Relocation::Pending);
    }
}
