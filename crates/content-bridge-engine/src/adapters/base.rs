//! Behavior shared by every adapter: text extraction, change ordering, dirty
//! tracking, context windowing, polling and undo history.

use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::adapters::AdapterError;
use crate::events::{ListenerSet, Subscription};
use crate::types::{
    BlockType, ContentBlock, ContentStats, SelectionContext, StructuredContent, TextChange, TextSelection,
};

/// Characters per token used by the rough token estimator.
pub const CHARS_PER_TOKEN: usize = 4;

// ---------------------------------------------------------------------------
// Character-offset helpers
// ---------------------------------------------------------------------------

pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Byte index of the `char_idx`-th character, or `s.len()` past the end.
pub fn byte_offset(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(byte, _)| byte)
        .unwrap_or(s.len())
}

/// Character index of a byte offset that lies on a char boundary.
pub fn char_offset(s: &str, byte_idx: usize) -> usize {
    s[..byte_idx.min(s.len())].chars().count()
}

/// Slice by character offsets, clamped to the string.
pub fn slice_chars(s: &str, start: usize, end: usize) -> &str {
    let from = byte_offset(s, start);
    let to = byte_offset(s, end.max(start));
    &s[from..to]
}

/// Replace the characters in `start..end` with `insert`.
pub fn splice_chars(s: &str, start: usize, end: usize, insert: &str) -> String {
    let from = byte_offset(s, start);
    let to = byte_offset(s, end.max(start));
    let mut out = String::with_capacity(s.len() - (to - from) + insert.len());
    out.push_str(&s[..from]);
    out.push_str(insert);
    out.push_str(&s[to..]);
    out
}

/// Find `needle` at or after character offset `from`, returning character offsets.
pub fn find_chars(haystack: &str, needle: &str, from: usize) -> Option<(usize, usize)> {
    if needle.is_empty() {
        return None;
    }
    let from_byte = byte_offset(haystack, from);
    let found = haystack[from_byte..].find(needle)? + from_byte;
    let start = char_offset(haystack, found);
    Some((start, start + char_len(needle)))
}

// ---------------------------------------------------------------------------
// Structured content → plain text
// ---------------------------------------------------------------------------

/// Blocks that contribute a line to the plain-text projection, depth first.
///
/// Container blocks with empty content contribute only their children.
/// Images contribute nothing.
pub fn text_blocks(content: &StructuredContent) -> Vec<&ContentBlock> {
    content
        .walk()
        .filter(|block| block.block_type != BlockType::Image)
        .filter(|block| !block.content.is_empty() || block.children().is_empty())
        .collect()
}

/// Plain-text projection of a block tree: one line per text block.
pub fn extract_plain_text(content: &StructuredContent) -> String {
    text_blocks(content)
        .iter()
        .map(|block| block.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Changes
// ---------------------------------------------------------------------------

/// Copy of `changes` ordered by `start` descending.
///
/// Applying in this order means no change shifts the offsets of one that
/// has not been applied yet.
pub fn sort_changes_descending(changes: &[TextChange]) -> Vec<TextChange> {
    let mut sorted = changes.to_vec();
    sorted.sort_by(|a, b| b.start.cmp(&a.start).then(b.end.cmp(&a.end)));
    sorted
}

pub fn validate_change(change: &TextChange, len: usize) -> Result<(), AdapterError> {
    validate_range(change.start, change.end, len)
}

pub fn validate_range(start: usize, end: usize, len: usize) -> Result<(), AdapterError> {
    if start > end || end > len {
        return Err(AdapterError::Validation { start, end, len });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Estimators
// ---------------------------------------------------------------------------

pub fn estimate_tokens(text: &str) -> usize {
    char_len(text).div_ceil(CHARS_PER_TOKEN)
}

pub fn count_chars(text: &str) -> usize {
    char_len(text)
}

pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

pub fn count_paragraphs(text: &str) -> usize {
    text.split("\n\n").filter(|p| !p.trim().is_empty()).count()
}

pub fn content_stats(text: &str) -> ContentStats {
    ContentStats {
        characters: count_chars(text),
        words: count_words(text),
        tokens: estimate_tokens(text),
        lines: text.lines().count(),
        paragraphs: count_paragraphs(text),
    }
}

/// Before/after windows of at most `radius` characters around `start..end`.
pub fn create_selection_context(
    text: &str,
    start: usize,
    end: usize,
    radius: usize,
) -> SelectionContext {
    let len = char_len(text);
    let start = start.min(len);
    let end = end.clamp(start, len);
    SelectionContext {
        before: slice_chars(text, start.saturating_sub(radius), start).to_string(),
        after: slice_chars(text, end, (end + radius).min(len)).to_string(),
    }
}

/// Build a selection over `text` for the character range `start..end`.
pub fn selection_in(text: &str, start: usize, end: usize) -> TextSelection {
    TextSelection {
        text: slice_chars(text, start, end).to_string(),
        start,
        end,
        context: None,
    }
}

// ---------------------------------------------------------------------------
// Dirty tracking
// ---------------------------------------------------------------------------

/// JSON snapshot of any serializable content.
pub fn snapshot_of<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

/// Compares serialized content snapshots.
#[derive(Debug, Default, Clone)]
pub struct DirtyTracker {
    clean: Option<String>,
    last_seen: Option<String>,
}

impl DirtyTracker {
    pub fn mark_clean(&mut self, snapshot: String) {
        self.last_seen = Some(snapshot.clone());
        self.clean = Some(snapshot);
    }

    pub fn is_dirty(&self, current: &str) -> bool {
        self.clean.as_deref() != Some(current)
    }

    /// Record `current`, reporting whether it differs from the last snapshot seen.
    pub fn observe(&mut self, current: String) -> bool {
        let changed = self.last_seen.as_deref() != Some(current.as_str());
        self.last_seen = Some(current);
        changed
    }
}

// ---------------------------------------------------------------------------
// Polling
// ---------------------------------------------------------------------------

/// Interval gate for the snapshot-polling fallback.
#[derive(Debug, Clone)]
pub struct Poller {
    interval: Duration,
    last_run: Option<Instant>,
    running: bool,
}

impl Poller {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_run: None,
            running: false,
        }
    }

    pub fn start(&mut self) {
        self.running = true;
        self.last_run = None;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// True when a poll should run at `now`; records the run.
    pub fn due(&mut self, now: Instant) -> bool {
        if !self.running {
            return false;
        }
        let due = match self.last_run {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };
        if due {
            self.last_run = Some(now);
        }
        due
    }
}

// ---------------------------------------------------------------------------
// Undo history
// ---------------------------------------------------------------------------

const DEFAULT_HISTORY_DEPTH: usize = 100;

/// Snapshot-based undo/redo stacks.
#[derive(Debug, Clone)]
pub struct History<T> {
    undo: Vec<T>,
    redo: Vec<T>,
    depth: usize,
}

impl<T> History<T> {
    pub fn new() -> Self {
        Self::with_depth(DEFAULT_HISTORY_DEPTH)
    }

    pub fn with_depth(depth: usize) -> Self {
        Self {
            undo: Vec::new(),
            redo: Vec::new(),
            depth: depth.max(1),
        }
    }

    /// Record the state that existed before an edit.
    pub fn record(&mut self, before: T) {
        self.undo.push(before);
        if self.undo.len() > self.depth {
            self.undo.remove(0);
        }
        self.redo.clear();
    }

    pub fn undo(&mut self, current: T) -> Option<T> {
        let previous = self.undo.pop()?;
        self.redo.push(current);
        Some(previous)
    }

    pub fn redo(&mut self, current: T) -> Option<T> {
        let next = self.redo.pop()?;
        self.undo.push(current);
        Some(next)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

impl<T> Default for History<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Surface access
// ---------------------------------------------------------------------------

/// Borrow a shared surface; a detached or already-borrowed surface is unavailable.
pub fn read_surface<T>(handle: Option<&Rc<RefCell<T>>>) -> Result<Ref<'_, T>, AdapterError> {
    handle
        .ok_or(AdapterError::Unavailable)?
        .try_borrow()
        .map_err(|_| AdapterError::Unavailable)
}

pub fn write_surface<T>(handle: Option<&Rc<RefCell<T>>>) -> Result<RefMut<'_, T>, AdapterError> {
    handle
        .ok_or(AdapterError::Unavailable)?
        .try_borrow_mut()
        .map_err(|_| AdapterError::Unavailable)
}

// ---------------------------------------------------------------------------
// Per-adapter state
// ---------------------------------------------------------------------------

/// Listener sets, last-known selection, dirty tracker and poller owned by
/// one adapter instance.
pub struct AdapterCore {
    selection_listeners: ListenerSet<TextSelection>,
    content_listeners: ListenerSet<String>,
    error_listeners: ListenerSet<AdapterError>,
    dirty: DirtyTracker,
    last_selection: Option<TextSelection>,
    poller: Poller,
    destroyed: bool,
}

impl AdapterCore {
    pub fn new(poll_interval: Duration) -> Self {
        let mut poller = Poller::new(poll_interval);
        poller.start();
        Self {
            selection_listeners: ListenerSet::new(),
            content_listeners: ListenerSet::new(),
            error_listeners: ListenerSet::new(),
            dirty: DirtyTracker::default(),
            last_selection: None,
            poller,
            destroyed: false,
        }
    }

    pub fn subscribe_selection(
        &self,
        callback: Box<dyn FnMut(&TextSelection)>,
    ) -> Subscription {
        self.selection_listeners.subscribe(callback)
    }

    pub fn subscribe_content(&self, callback: Box<dyn FnMut(&String)>) -> Subscription {
        self.content_listeners.subscribe(callback)
    }

    pub fn subscribe_error(&self, callback: Box<dyn FnMut(&AdapterError)>) -> Subscription {
        self.error_listeners.subscribe(callback)
    }

    /// Establish the clean baseline for dirty tracking.
    pub fn reset_baseline(&mut self, snapshot: String, selection: Option<TextSelection>) {
        self.dirty.mark_clean(snapshot);
        self.last_selection = selection;
    }

    pub fn mark_clean(&mut self, snapshot: String) {
        self.dirty.mark_clean(snapshot);
    }

    pub fn is_dirty(&self, current_snapshot: &str) -> bool {
        self.dirty.is_dirty(current_snapshot)
    }

    /// Notify content listeners with `text` if `snapshot` changed.
    pub fn observe_content(&mut self, snapshot: String, text: &str) -> bool {
        let changed = self.dirty.observe(snapshot);
        if changed {
            self.content_listeners.emit(&text.to_string());
        }
        changed
    }

    /// Notify selection listeners if the selection differs from the last one seen.
    pub fn observe_selection(&mut self, selection: Option<TextSelection>) -> bool {
        let changed = match (&self.last_selection, &selection) {
            (Some(previous), Some(current)) => !previous.same_range(current),
            (None, None) => false,
            _ => true,
        };
        if changed {
            if let Some(current) = &selection {
                self.selection_listeners.emit(current);
            }
            self.last_selection = selection;
        }
        changed
    }

    pub fn last_selection(&self) -> Option<&TextSelection> {
        self.last_selection.as_ref()
    }

    pub fn report_error(&self, error: &AdapterError) {
        log::warn!("adapter error: {error}");
        self.error_listeners.emit(error);
    }

    pub fn poll_due(&mut self, now: Instant) -> bool {
        !self.destroyed && self.poller.due(now)
    }

    pub fn poller(&self) -> &Poller {
        &self.poller
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Stop polling and drop all listeners. Returns `false` if already torn down.
    pub fn teardown(&mut self) -> bool {
        if self.destroyed {
            return false;
        }
        self.destroyed = true;
        self.poller.stop();
        self.selection_listeners.clear();
        self.content_listeners.clear();
        self.error_listeners.clear();
        self.last_selection = None;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn plain_text_skips_empty_containers() {
        let doc = StructuredContent::new(vec![
            ContentBlock::with_id("h", BlockType::Heading, "Title"),
            ContentBlock::with_id("l", BlockType::List, "").with_children(vec![
                ContentBlock::with_id("i1", BlockType::Paragraph, "one"),
                ContentBlock::with_id("i2", BlockType::Paragraph, "two"),
            ]),
        ]);
        assert_eq!(extract_plain_text(&doc), "Title\none\ntwo");
    }

    #[test]
    fn changes_sort_by_start_descending() {
        let sorted = sort_changes_descending(&[
            TextChange::new(0, 1, "a"),
            TextChange::new(10, 12, "b"),
            TextChange::new(5, 5, "c"),
        ]);
        let starts: Vec<_> = sorted.iter().map(|c| c.start).collect();
        assert_eq!(starts, vec![10, 5, 0]);
    }

    #[rstest]
    #[case("", 0)]
    #[case("abc", 1)]
    #[case("abcd", 1)]
    #[case("abcde", 2)]
    fn token_estimate_rounds_up(#[case] text: &str, #[case] tokens: usize) {
        assert_eq!(estimate_tokens(text), tokens);
    }

    #[test]
    fn context_is_clamped_to_bounds() {
        let ctx = create_selection_context("Hello, world!", 7, 12, 100);
        assert_eq!(ctx.before, "Hello, ");
        assert_eq!(ctx.after, "!");

        let ctx = create_selection_context("Hello, world!", 7, 12, 3);
        assert_eq!(ctx.before, "o, ");
        assert_eq!(ctx.after, "!");
    }

    #[test]
    fn char_helpers_respect_multibyte_text() {
        let s = "héllo wörld";
        assert_eq!(slice_chars(s, 1, 4), "éll");
        assert_eq!(splice_chars(s, 6, 11, "there"), "héllo there");
        assert_eq!(find_chars(s, "wörld", 0), Some((6, 11)));
        assert_eq!(find_chars(s, "l", 4), Some((9, 10)));
        assert_eq!(find_chars(s, "x", 0), None);
    }

    #[test]
    fn range_validation() {
        assert!(validate_range(0, 3, 3).is_ok());
        assert_eq!(
            validate_range(2, 5, 3),
            Err(AdapterError::Validation {
                start: 2,
                end: 5,
                len: 3
            })
        );
        assert!(validate_range(3, 2, 5).is_err());
    }

    #[test]
    fn poller_respects_interval_and_stop() {
        let t0 = Instant::now();
        let mut poller = Poller::new(Duration::from_millis(100));
        assert!(!poller.due(t0), "not running yet");
        poller.start();
        assert!(poller.due(t0));
        assert!(!poller.due(t0 + Duration::from_millis(50)));
        assert!(poller.due(t0 + Duration::from_millis(100)));
        poller.stop();
        assert!(!poller.due(t0 + Duration::from_secs(5)));
    }

    #[test]
    fn history_undo_redo() {
        let mut history = History::new();
        history.record("a".to_string());
        history.record("ab".to_string());

        assert_eq!(history.undo("abc".to_string()), Some("ab".to_string()));
        assert_eq!(history.redo("ab".to_string()), Some("abc".to_string()));
        assert!(history.can_undo());
        assert!(!history.can_redo());
    }

    #[test]
    fn dirty_tracker_fires_only_on_diff() {
        let mut core = AdapterCore::new(Duration::from_millis(100));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let _sub = core.subscribe_content(Box::new(move |text: &String| {
            sink.borrow_mut().push(text.clone())
        }));

        core.reset_baseline(snapshot_of("a"), None);
        assert!(!core.observe_content(snapshot_of("a"), "a"));
        assert!(core.observe_content(snapshot_of("ab"), "ab"));
        assert!(!core.observe_content(snapshot_of("ab"), "ab"));

        assert_eq!(*seen.borrow(), vec!["ab".to_string()]);
        assert!(core.is_dirty(&snapshot_of("ab")));
    }

    #[test]
    fn teardown_is_idempotent() {
        let mut core = AdapterCore::new(Duration::from_millis(100));
        assert!(core.teardown());
        assert!(!core.teardown());
        assert!(!core.poller().is_running());
    }
}
