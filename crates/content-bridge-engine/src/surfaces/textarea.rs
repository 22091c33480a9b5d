use xi_rope::{Delta, Interval, Rope};

use crate::adapters::base::{byte_offset, char_len};
use crate::events::{ListenerSet, Subscription};

/// An `input` event as seen by the host framework.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputEvent {
    pub value: String,
    /// True when dispatched programmatically rather than by user input.
    pub synthetic: bool,
}

/// A plain `<textarea>`: a rope buffer plus a character-offset selection.
///
/// There is no selection-change event on this surface; observers poll
/// [`TextareaSurface::selection`].
pub struct TextareaSurface {
    buffer: Rope,
    selection_start: usize,
    selection_end: usize,
    focused: bool,
    input_listeners: ListenerSet<InputEvent>,
}

impl TextareaSurface {
    pub fn new(value: &str) -> Self {
        let len = char_len(value);
        Self {
            buffer: Rope::from(value),
            selection_start: len,
            selection_end: len,
            focused: false,
            input_listeners: ListenerSet::new(),
        }
    }

    pub fn value(&self) -> String {
        self.buffer.to_string()
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        char_len(&self.value())
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.len() == 0
    }

    /// Replace the whole value without dispatching anything, like assigning
    /// `.value` from script. The caret moves to the end.
    pub fn set_value(&mut self, value: &str) {
        self.buffer = Rope::from(value);
        let len = char_len(value);
        self.selection_start = len;
        self.selection_end = len;
    }

    /// Replace the characters in `start..end`; offsets are clamped.
    pub fn replace_range(&mut self, start: usize, end: usize, text: &str) {
        let value = self.value();
        let len = char_len(&value);
        let end = end.min(len);
        let start = start.min(end);

        let from = byte_offset(&value, start);
        let to = byte_offset(&value, end);
        let delta = Delta::simple_edit(Interval::new(from, to), Rope::from(text), self.buffer.len());
        self.buffer = delta.apply(&self.buffer);
    }

    /// `(selectionStart, selectionEnd)` in characters.
    pub fn selection(&self) -> (usize, usize) {
        (self.selection_start, self.selection_end)
    }

    /// Like `setSelectionRange`: clamps to the value and orders the ends.
    pub fn set_selection_range(&mut self, start: usize, end: usize) {
        let len = self.len();
        let (start, end) = if start <= end { (start, end) } else { (end, start) };
        self.selection_start = start.min(len);
        self.selection_end = end.min(len);
    }

    /// Simulate the user typing `text` over the current selection.
    pub fn type_text(&mut self, text: &str) {
        let (start, end) = self.selection();
        self.replace_range(start, end, text);
        let caret = start + char_len(text);
        self.set_selection_range(caret, caret);
        self.dispatch_input(false);
    }

    pub fn focus(&mut self) {
        self.focused = true;
    }

    pub fn blur(&mut self) {
        self.focused = false;
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    /// Fire an `input` event carrying the current value.
    pub fn dispatch_input(&self, synthetic: bool) {
        self.input_listeners.emit(&InputEvent {
            value: self.value(),
            synthetic,
        });
    }

    pub fn add_input_listener(&self, listener: impl FnMut(&InputEvent) + 'static) -> Subscription {
        self.input_listeners.subscribe(listener)
    }
}

impl Default for TextareaSurface {
    fn default() -> Self {
        Self::new("")
    }
}

impl std::fmt::Debug for TextareaSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextareaSurface")
            .field("value", &self.value())
            .field("selection", &self.selection())
            .field("focused", &self.focused)
            .finish()
    }
}
