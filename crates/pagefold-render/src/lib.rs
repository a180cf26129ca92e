//! Pagination engine, page cache, and navigation for `pagefold`.

#![cfg_attr(
    not(test),
    deny(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::panic_in_result_fn,
        clippy::todo,
        clippy::unimplemented
    )
)]

mod render_engine;
mod render_ir;
mod render_layout;
mod render_navigation;

pub use render_engine::{
    CacheStoreError, FileRenderCacheStore, MemoryCacheStore, PageCache, RenderCacheStore,
    RenderDiagnostic,
};
pub use render_ir::{
    CacheKey, ContentId, LayoutResult, MeasureStyle, PlacedUnit, CACHE_KEY_PREFIX,
    LAYOUT_REVISION,
};
pub use render_layout::{
    paginate, FixedAdvanceMeasurer, HeuristicMeasurer, LayoutConfig, LayoutEngine, PagePlan,
    TextMeasurer, DEFAULT_SPLIT_CARRY_EM, MAX_PAGES,
};
pub use render_navigation::{
    AnimationPhase, NavigationController, NavigationOptions, NavigationState, Relocation,
    ScheduledReset, SlideOffset,
};
