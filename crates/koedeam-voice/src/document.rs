//! Host editor boundary and an in-memory document.
//!
//! All positions are character offsets, never byte offsets.

use serde::{Deserialize, Serialize};

/// A selection range; `start == end` is a caret.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRange {
    pub start: usize,
    pub end: usize,
}

impl TextRange {
    pub fn new(start: usize, end: usize) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    pub fn caret(at: usize) -> Self {
        Self { start: at, end: at }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrollPosition {
    pub top: u32,
    pub left: u32,
}

/// Why the host content changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeReason {
    VoiceFinal,
}

/// The editor the transcripts are written into.
pub trait HostEditor {
    fn text(&self) -> &str;

    fn char_len(&self) -> usize {
        self.text().chars().count()
    }

    fn selection(&self) -> TextRange;

    fn scroll(&self) -> ScrollPosition;

    fn has_focus(&self) -> bool;

    /// Replace `range` with `text`. Selection offsets past the range shift
    /// with the edit; offsets inside it collapse to its start.
    fn replace_range(&mut self, range: TextRange, text: &str);

    fn set_selection(&mut self, range: TextRange);

    fn set_scroll(&mut self, scroll: ScrollPosition);

    /// Called once per committed transcript.
    fn content_changed(&mut self, reason: ChangeReason);
}

/// Plain in-memory [`HostEditor`].
#[derive(Debug, Clone, Default)]
pub struct TextBuffer {
    text: String,
    selection: TextRange,
    scroll: ScrollPosition,
    focused: bool,
    changes: Vec<ChangeReason>,
}

impl TextBuffer {
    /// A buffer holding `text` with the caret at the end.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let end = text.chars().count();
        Self {
            text,
            selection: TextRange::caret(end),
            ..Self::default()
        }
    }

    pub fn with_focus(mut self, focused: bool) -> Self {
        self.focused = focused;
        self
    }

    /// Change notifications received so far.
    pub fn changes(&self) -> &[ChangeReason] {
        &self.changes
    }

    pub fn into_text(self) -> String {
        self.text
    }

    fn byte_offset(&self, chars: usize) -> usize {
        self.text
            .char_indices()
            .nth(chars)
            .map_or(self.text.len(), |(byte, _)| byte)
    }

    fn clamp(&self, range: TextRange) -> TextRange {
        let len = self.char_len();
        TextRange::new(range.start.min(len), range.end.min(len))
    }
}

impl HostEditor for TextBuffer {
    fn text(&self) -> &str {
        &self.text
    }

    fn selection(&self) -> TextRange {
        self.selection
    }

    fn scroll(&self) -> ScrollPosition {
        self.scroll
    }

    fn has_focus(&self) -> bool {
        self.focused
    }

    fn replace_range(&mut self, range: TextRange, text: &str) {
        let range = self.clamp(range);
        let start = self.byte_offset(range.start);
        let end = self.byte_offset(range.end);
        self.text.replace_range(start..end, text);

        let inserted = text.chars().count();
        let adjust = |offset: usize| {
            if offset > range.end {
                offset - range.len() + inserted
            } else if offset > range.start {
                range.start
            } else {
                offset
            }
        };
        self.selection = TextRange::new(adjust(self.selection.start), adjust(self.selection.end));
    }

    fn set_selection(&mut self, range: TextRange) {
        self.selection = self.clamp(range);
    }

    fn set_scroll(&mut self, scroll: ScrollPosition) {
        self.scroll = scroll;
    }

    fn content_changed(&mut self, reason: ChangeReason) {
        self.changes.push(reason);
    }
}
