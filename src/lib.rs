//! Content model for paginated vertical-script reading.
//!
//! `pagefold` owns the parts of the reader that do not need a measuring
//! surface: the chapter input, its flattening into keyed content units, unit
//! markup, position fingerprints, and reading-position validation. Pagination,
//! caching, and navigation live in `pagefold-render`.

#![cfg_attr(
    not(test),
    deny(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::todo,
        clippy::unimplemented
    )
)]

pub mod book;
pub mod fingerprint;
pub mod position;

pub use book::{
    classify_line, flatten_chapters, Chapter, ContentUnit, KeyedUnit, LineClass, UnitKey,
    UnitKind, UnitSlot, DIVIDER_GLYPHS,
};
pub use fingerprint::{leading_sample, locate, FINGERPRINT_CHARS};
pub use position::{
    FontSizeSet, ReaderPosition, DEFAULT_FONT_SIZE, DEFAULT_FONT_SIZES, FONT_SIZE_PARAM,
    PAGE_PARAM,
};
