//! Writes committed transcripts into the host document.

use koedeam_core::types::InsertMode;

use crate::document::{ChangeReason, HostEditor, TextRange};

/// Where a transcript landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insertion {
    pub mode: InsertMode,
    /// Character offset the inserted text starts at.
    pub at: usize,
    /// Inserted text, including any separator.
    pub inserted: String,
}

#[derive(Debug, Clone, Copy)]
pub struct TranscriptInserter {
    mode: InsertMode,
}

impl TranscriptInserter {
    pub fn new(mode: InsertMode) -> Self {
        Self { mode }
    }

    pub fn set_mode(&mut self, mode: InsertMode) {
        self.mode = mode;
    }

    /// Commit `text` into `host` and notify it once.
    ///
    /// Returns `None` for empty text, which leaves the host untouched.
    pub fn insert<H: HostEditor + ?Sized>(&self, host: &mut H, text: &str) -> Option<Insertion> {
        if text.is_empty() {
            return None;
        }
        let insertion = match self.mode {
            InsertMode::Cursor => insert_at_cursor(host, text),
            InsertMode::Append => append_to_end(host, text),
        };
        host.content_changed(ChangeReason::VoiceFinal);
        Some(insertion)
    }
}

fn insert_at_cursor<H: HostEditor + ?Sized>(host: &mut H, text: &str) -> Insertion {
    let selection = host.selection();
    host.replace_range(selection, text);
    host.set_selection(TextRange::caret(selection.start + text.chars().count()));
    Insertion {
        mode: InsertMode::Cursor,
        at: selection.start,
        inserted: text.to_string(),
    }
}

fn append_to_end<H: HostEditor + ?Sized>(host: &mut H, text: &str) -> Insertion {
    let had_focus = host.has_focus();
    let selection = host.selection();
    let scroll = host.scroll();

    let current = host.text();
    let at = current.chars().count();
    let separator = if !current.is_empty() && !current.ends_with('\n') {
        "\n"
    } else {
        ""
    };
    let inserted = format!("{separator}{text}");
    host.replace_range(TextRange::caret(at), &inserted);

    // Leave a user editing elsewhere exactly where they were.
    if had_focus {
        host.set_selection(selection);
        host.set_scroll(scroll);
    }
    Insertion {
        mode: InsertMode::Append,
        at,
        inserted,
    }
}
