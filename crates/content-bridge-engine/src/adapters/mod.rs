//! # Editor adapters
//!
//! One [`EditorAdapter`] implementation per backend surface:
//!
//! - **`textarea`**: linear buffer, native offsets are plain-text offsets
//! - **`tiptap`**: node-tree document, native positions count node tokens
//! - **`novel`**: block-JSON document, native coordinates are `(block id, offset)`
//!
//! The trait speaks plain-text character offsets only. Each adapter owns the
//! translation to and from its native position space; nothing outside the
//! adapter ever sees native positions unless it calls the adapter's inherent
//! native-space methods explicitly.
//!
//! Shared behavior lives in [`base`].

pub mod base;
pub mod novel;
pub mod textarea;
pub mod tiptap;

use std::time::{Duration, Instant};

pub use base::AdapterCore;
pub use novel::NovelAdapter;
pub use textarea::TextareaAdapter;
pub use tiptap::TiptapAdapter;

use crate::events::Subscription;
use crate::parser::ConversionError;
use crate::types::{
    ContentInput, EditorCapabilities, EditorState, EditorType, StructuredContent, TextChange,
    TextSelection,
};

/// Default radius for selection context windows, in characters.
pub const DEFAULT_CONTEXT_RADIUS: usize = 100;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AdapterError {
    #[error("Change range {start}..{end} is outside content bounds (length {len})")]
    Validation { start: usize, end: usize, len: usize },
    #[error("No editor instance is available")]
    Unavailable,
    #[error("Block not found: {0}")]
    UnknownBlock(String),
    #[error("Content conversion failed: {0}")]
    Conversion(#[from] ConversionError),
}

/// Construction options shared by all adapters.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterOptions {
    /// Snapshot-poll interval; `None` uses the backend default.
    pub poll_interval: Option<Duration>,
    pub context_radius: usize,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            poll_interval: None,
            context_radius: DEFAULT_CONTEXT_RADIUS,
        }
    }
}

impl AdapterOptions {
    pub fn poll_interval_for(&self, editor_type: EditorType) -> Duration {
        self.poll_interval
            .unwrap_or_else(|| default_poll_interval(editor_type))
    }
}

/// Fallback poll interval per backend.
pub fn default_poll_interval(editor_type: EditorType) -> Duration {
    match editor_type {
        EditorType::Textarea | EditorType::Tiptap => Duration::from_millis(100),
        EditorType::Novel => Duration::from_millis(200),
    }
}

/// Unified capability interface over heterogeneous editing surfaces.
///
/// Offsets are character offsets into [`EditorAdapter::get_text_content`].
pub trait EditorAdapter {
    fn editor_type(&self) -> EditorType;

    fn capabilities(&self) -> &'static EditorCapabilities;

    /// Shared per-instance state (listeners, dirty tracker, poller).
    fn core(&self) -> &AdapterCore;

    /// Whether a backing surface is attached.
    fn is_ready(&self) -> bool;

    fn get_text_content(&self) -> Result<String, AdapterError>;

    fn get_structured_content(&self) -> Result<StructuredContent, AdapterError>;

    fn get_html(&self) -> Result<String, AdapterError> {
        Ok(crate::parser::structured_to_html(
            &self.get_structured_content()?,
        ))
    }

    fn set_content(&mut self, content: ContentInput<'_>) -> Result<(), AdapterError>;

    /// Current selection, or `None` when the surface has no selection.
    fn get_selection(&self) -> Result<Option<TextSelection>, AdapterError>;

    fn set_selection(&mut self, start: usize, end: usize) -> Result<(), AdapterError>;

    fn apply_change(&mut self, change: &TextChange) -> Result<(), AdapterError>;

    /// Apply a batch, highest `start` first, so offsets stay valid throughout.
    fn apply_changes(&mut self, changes: &[TextChange]) -> Result<(), AdapterError> {
        for change in base::sort_changes_descending(changes) {
            self.apply_change(&change)?;
        }
        Ok(())
    }

    fn focus(&mut self) -> Result<(), AdapterError>;

    fn can_undo(&self) -> bool {
        false
    }

    fn can_redo(&self) -> bool {
        false
    }

    /// Returns `true` when something was undone.
    fn undo(&mut self) -> Result<bool, AdapterError> {
        Ok(false)
    }

    fn redo(&mut self) -> Result<bool, AdapterError> {
        Ok(false)
    }

    fn is_dirty(&self) -> bool;

    /// Treat the current content as the saved baseline.
    fn mark_clean(&mut self);

    fn get_state(&self) -> Result<EditorState, AdapterError> {
        Ok(EditorState {
            content: self.get_text_content()?,
            selection: self.get_selection()?,
            can_undo: self.can_undo(),
            can_redo: self.can_redo(),
            is_dirty: self.is_dirty(),
        })
    }

    /// The current selection with `±radius` characters of surrounding text.
    fn create_selection_context(&self, radius: usize) -> Result<Option<TextSelection>, AdapterError> {
        let Some(mut selection) = self.get_selection()? else {
            return Ok(None);
        };
        let text = self.get_text_content()?;
        selection.context = Some(base::create_selection_context(
            &text,
            selection.start,
            selection.end,
            radius,
        ));
        Ok(Some(selection))
    }

    fn get_text_in_range(&self, start: usize, end: usize) -> Result<String, AdapterError> {
        let text = self.get_text_content()?;
        base::validate_range(start, end, base::char_len(&text))?;
        Ok(base::slice_chars(&text, start, end).to_string())
    }

    /// First occurrence of `needle` at or after `from`.
    fn find_text(&self, needle: &str, from: usize) -> Result<Option<TextSelection>, AdapterError> {
        let text = self.get_text_content()?;
        Ok(base::find_chars(&text, needle, from)
            .map(|(start, end)| base::selection_in(&text, start, end)))
    }

    fn on_selection_change(&self, callback: Box<dyn FnMut(&TextSelection)>) -> Subscription {
        self.core().subscribe_selection(callback)
    }

    fn on_content_change(&self, callback: Box<dyn FnMut(&String)>) -> Subscription {
        self.core().subscribe_content(callback)
    }

    fn on_error(&self, callback: Box<dyn FnMut(&AdapterError)>) -> Subscription {
        self.core().subscribe_error(callback)
    }

    /// Drain native events and, when the poll interval elapsed, compare
    /// snapshots and notify on differences.
    fn poll(&mut self, now: Instant);

    /// Release the surface, stop polling, drop listeners. Idempotent.
    fn destroy(&mut self);
}
