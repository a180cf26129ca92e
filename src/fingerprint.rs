//! Reading-position fingerprints across a relayout.
//!
//! Before pagination changes, the leading characters of the visible page are
//! captured; afterwards the first page containing that sample is the new
//! position. Not finding the sample is an expected outcome, and callers keep
//! their current page in that case.

/// Number of leading characters captured from a page.
pub const FINGERPRINT_CHARS: usize = 50;

/// Capture the leading sample of a page's serialized content.
///
/// Returns `None` for an empty page.
pub fn leading_sample(page: &str) -> Option<String> {
    if page.is_empty() {
        return None;
    }
    let end = page
        .char_indices()
        .nth(FINGERPRINT_CHARS)
        .map_or(page.len(), |(byte, _)| byte);
    Some(page[..end].into())
}

/// Index of the first page containing `sample`.
pub fn locate<S: AsRef<str>>(sample: &str, pages: &[S]) -> Option<usize> {
    if sample.is_empty() {
        return None;
    }
    let hit = pages
        .iter()
        .position(|page| page.as_ref().contains(sample));
    if hit.is_none() {
        log::debug!(
            "fingerprint not found in {} relaid pages; keeping position",
            pages.len()
        );
    }
    hit
}
