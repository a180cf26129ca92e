//! Chapter input and the flattened content-unit sequence used by layout.
//!
//! A [`Chapter`] is flattened into [`KeyedUnit`]s in chapter → paragraph → line
//! order: the chapter title, every `\n`-separated line of each paragraph, and a
//! divider between paragraphs (never after the last one).
//!
//! # Usage
//!
//! ```rust
//! use pagefold::book::{flatten_chapters, Chapter, ContentUnit};
//!
//! let chapters = vec![Chapter::new("Ch1", ["first\nsecond", "third"])];
//! let units = flatten_chapters(&chapters);
//! assert_eq!(units.len(), 5);
//! assert_eq!(units[0].key.to_string(), "0_title");
//! assert_eq!(units[3].unit, ContentUnit::Divider);
//! ```

use std::fmt::{self, Write};

/// Glyphs rendered for a section divider.
pub const DIVIDER_GLYPHS: &str = "＊＊＊";

/// Leading characters that mark a line as dialogue.
const CONVERSATION_OPENERS: [char; 2] = ['「', '（'];

/// One chapter of source text.
///
/// Owned by the loading collaborator; the core only borrows it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Chapter {
    /// Chapter heading.
    pub title: String,
    /// Body paragraphs; each may contain `\n`-separated lines.
    pub paragraphs: Vec<String>,
}

impl Chapter {
    /// Build a chapter from a title and paragraph texts.
    pub fn new<T, I, P>(title: T, paragraphs: I) -> Self
    where
        T: Into<String>,
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self {
            title: title.into(),
            paragraphs: paragraphs.into_iter().map(Into::into).collect(),
        }
    }
}

/// Position of a unit inside its chapter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UnitSlot {
    /// The chapter heading.
    Title,
    /// Line `line` of paragraph `paragraph`.
    Line { paragraph: usize, line: usize },
    /// Divider following paragraph `paragraph`.
    Divider { paragraph: usize },
}

/// Stable address of a content unit.
///
/// Keys depend only on the chapter text, never on font size or page geometry,
/// so they survive a relayout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitKey {
    /// Chapter index (0-based).
    pub chapter: usize,
    /// Slot within the chapter.
    pub slot: UnitSlot,
}

impl UnitKey {
    /// Key for a chapter title.
    pub fn title(chapter: usize) -> Self {
        Self {
            chapter,
            slot: UnitSlot::Title,
        }
    }

    /// Key for a body line.
    pub fn line(chapter: usize, paragraph: usize, line: usize) -> Self {
        Self {
            chapter,
            slot: UnitSlot::Line { paragraph, line },
        }
    }

    /// Key for a paragraph divider.
    pub fn divider(chapter: usize, paragraph: usize) -> Self {
        Self {
            chapter,
            slot: UnitSlot::Divider { paragraph },
        }
    }
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.slot {
            UnitSlot::Title => write!(f, "{}_title", self.chapter),
            UnitSlot::Line { paragraph, line } => {
                write!(f, "{}_{}_{}", self.chapter, paragraph, line)
            }
            UnitSlot::Divider { paragraph } => write!(f, "{}_{}_sep", self.chapter, paragraph),
        }
    }
}

/// Measurement/styling category of a unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnitKind {
    Title,
    Line,
    LineTail,
    Divider,
}

/// Atomic layout item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentUnit {
    /// Chapter heading text.
    Title(String),
    /// A full body line, or the leading fragment of a split line.
    Line(String),
    /// Continuation of a line split across a page boundary.
    LineTail(String),
    /// Section divider between paragraphs.
    Divider,
}

impl ContentUnit {
    /// Styling category.
    pub fn kind(&self) -> UnitKind {
        match self {
            Self::Title(_) => UnitKind::Title,
            Self::Line(_) => UnitKind::Line,
            Self::LineTail(_) => UnitKind::LineTail,
            Self::Divider => UnitKind::Divider,
        }
    }

    /// Text the unit displays.
    pub fn text(&self) -> &str {
        match self {
            Self::Title(text) | Self::Line(text) | Self::LineTail(text) => text,
            Self::Divider => DIVIDER_GLYPHS,
        }
    }

    /// Paragraph class used when rendering, if any.
    ///
    /// Tails are continuations and always render as dialogue blocks.
    pub fn line_class(&self) -> Option<LineClass> {
        match self {
            Self::Line(text) => classify_line(text),
            Self::LineTail(_) => Some(LineClass::Conversation),
            Self::Title(_) | Self::Divider => None,
        }
    }
}

/// Paragraph style class of a body line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LineClass {
    Conversation,
    Descriptive,
}

impl LineClass {
    /// CSS class name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Conversation => "conversation",
            Self::Descriptive => "descriptive",
        }
    }
}

/// Classify a body line by its first visible character.
///
/// Empty lines have no class and render as a bare line break.
pub fn classify_line(text: &str) -> Option<LineClass> {
    if text.is_empty() {
        return None;
    }
    let starts_dialogue = text
        .trim()
        .chars()
        .next()
        .is_some_and(|ch| CONVERSATION_OPENERS.contains(&ch));
    if starts_dialogue {
        Some(LineClass::Conversation)
    } else {
        Some(LineClass::Descriptive)
    }
}

/// A content unit paired with its stable key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyedUnit {
    pub key: UnitKey,
    pub unit: ContentUnit,
}

impl KeyedUnit {
    /// Pair a unit with its key.
    pub fn new(key: UnitKey, unit: ContentUnit) -> Self {
        Self { key, unit }
    }

    /// Append the unit's page markup to `out`.
    ///
    /// The `data-key` attribute leads so that a page's first characters name its
    /// first unit regardless of font size.
    pub fn write_markup(&self, page_height: u32, out: &mut String) {
        // Writing into a String cannot fail.
        let _ = write!(
            out,
            "<div data-key=\"{}\" style=\"height:{}px\">",
            self.key, page_height
        );
        match &self.unit {
            ContentUnit::Title(text) => {
                out.push_str("<h4>");
                out.push_str(text);
                out.push_str("</h4>");
            }
            ContentUnit::Divider => {
                out.push_str("<p class=\"divider\">");
                out.push_str(DIVIDER_GLYPHS);
                out.push_str("</p>");
            }
            unit => match unit.line_class() {
                None => out.push_str("<br>"),
                Some(class) => {
                    let _ = write!(out, "<p class=\"{}\">{}</p>", class.as_str(), unit.text());
                }
            },
        }
        out.push_str("</div>");
    }

    /// Markup of this unit alone.
    pub fn to_markup(&self, page_height: u32) -> String {
        let mut out = String::with_capacity(self.unit.text().len() + 64);
        self.write_markup(page_height, &mut out);
        out
    }
}

/// Flatten chapters into layout order.
pub fn flatten_chapters(chapters: &[Chapter]) -> Vec<KeyedUnit> {
    let mut units = Vec::with_capacity(chapters.len() * 8);
    for (chapter_idx, chapter) in chapters.iter().enumerate() {
        units.push(KeyedUnit::new(
            UnitKey::title(chapter_idx),
            ContentUnit::Title(chapter.title.clone()),
        ));
        let last_paragraph = chapter.paragraphs.len().saturating_sub(1);
        for (para_idx, paragraph) in chapter.paragraphs.iter().enumerate() {
            for (line_idx, line) in paragraph.split('\n').enumerate() {
                units.push(KeyedUnit::new(
                    UnitKey::line(chapter_idx, para_idx, line_idx),
                    ContentUnit::Line(line.into()),
                ));
            }
            if para_idx < last_paragraph {
                units.push(KeyedUnit::new(
                    UnitKey::divider(chapter_idx, para_idx),
                    ContentUnit::Divider,
                ));
            }
        }
    }
    units
}
