//! Validation of the externally visible reading position.
//!
//! The presentation layer carries the current page and font size as two
//! independent integer parameters (for example `?page=3&fontSize=18`). This
//! module only interprets and clamps them; persisting them is the caller's job.

/// Font sizes offered by the reader, in px.
pub const DEFAULT_FONT_SIZES: [u32; 7] = [12, 14, 16, 18, 20, 22, 24];

/// Font size used when none is requested.
pub const DEFAULT_FONT_SIZE: u32 = 18;

/// Query parameter carrying the 1-based page number.
pub const PAGE_PARAM: &str = "page";

/// Query parameter carrying the font size.
pub const FONT_SIZE_PARAM: &str = "fontSize";

/// Ordered set of selectable font sizes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FontSizeSet {
    sizes: Vec<u32>,
    default_size: u32,
}

impl Default for FontSizeSet {
    fn default() -> Self {
        Self {
            sizes: DEFAULT_FONT_SIZES.to_vec(),
            default_size: DEFAULT_FONT_SIZE,
        }
    }
}

impl FontSizeSet {
    /// Build a set from arbitrary sizes.
    ///
    /// Sizes are sorted and deduplicated; zero is dropped. An empty input falls
    /// back to [`DEFAULT_FONT_SIZES`]. The default is snapped into the set.
    pub fn new(sizes: impl IntoIterator<Item = u32>, default_size: u32) -> Self {
        let mut sizes: Vec<u32> = sizes.into_iter().filter(|s| *s > 0).collect();
        sizes.sort_unstable();
        sizes.dedup();
        if sizes.is_empty() {
            sizes = DEFAULT_FONT_SIZES.to_vec();
        }
        let mut set = Self {
            sizes,
            default_size,
        };
        set.default_size = set.snap(default_size);
        set
    }

    /// Allowed sizes in ascending order.
    pub fn sizes(&self) -> &[u32] {
        &self.sizes
    }

    /// Size used when the parameter is absent or invalid.
    pub fn default_size(&self) -> u32 {
        self.default_size
    }

    /// Whether `size` is one of the allowed sizes.
    pub fn contains(&self, size: u32) -> bool {
        self.sizes.binary_search(&size).is_ok()
    }

    /// Nearest allowed size; ties resolve to the smaller size.
    pub fn snap(&self, size: u32) -> u32 {
        let mut best = self.sizes[0];
        for &candidate in &self.sizes {
            if candidate.abs_diff(size) < best.abs_diff(size) {
                best = candidate;
            }
        }
        best
    }
}

/// Current page and font size as seen by the presentation layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReaderPosition {
    /// 0-based page index.
    pub page_index: usize,
    /// Font size in px.
    pub font_size: u32,
}

impl ReaderPosition {
    /// Interpret raw query values.
    ///
    /// `page` is 1-based; absent, unparsable, or zero values select the first
    /// page. Font sizes are snapped into `sizes`.
    pub fn from_query(page: Option<&str>, font_size: Option<&str>, sizes: &FontSizeSet) -> Self {
        let page_index = page
            .and_then(|raw| raw.trim().parse::<usize>().ok())
            .map_or(0, |page_number| page_number.saturating_sub(1));
        let font_size = font_size
            .and_then(|raw| raw.trim().parse::<u32>().ok())
            .map_or(sizes.default_size(), |size| sizes.snap(size));
        Self {
            page_index,
            font_size,
        }
    }

    /// Parse a `key=value&key=value` query string.
    ///
    /// Unknown keys are ignored; a leading `?` is accepted. The first occurrence
    /// of each key wins.
    pub fn from_query_string(query: &str, sizes: &FontSizeSet) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut page = None;
        let mut font_size = None;
        for pair in query.split('&') {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            if key == PAGE_PARAM && page.is_none() {
                page = Some(value);
            } else if key == FONT_SIZE_PARAM && font_size.is_none() {
                font_size = Some(value);
            }
        }
        Self::from_query(page, font_size, sizes)
    }

    /// Clamp the page index into `[0, page_count - 1]`.
    ///
    /// A zero page count clamps to the first page.
    pub fn clamp_page(self, page_count: usize) -> Self {
        Self {
            page_index: self.page_index.min(page_count.saturating_sub(1)),
            ..self
        }
    }

    /// Render as a query string with a 1-based page number.
    pub fn to_query(&self) -> String {
        format!(
            "{}={}&{}={}",
            PAGE_PARAM,
            self.page_index + 1,
            FONT_SIZE_PARAM,
            self.font_size
        )
    }
}
