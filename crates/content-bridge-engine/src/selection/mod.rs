//! # Selection manager
//!
//! The one orchestration point for callers. It owns a registry of adapters
//! keyed by string id and exactly one **active** adapter, the only one that
//! receives selection reads, selection writes and changes.
//!
//! Every adapter's selection callback is hooked at registration, but an
//! event is forwarded only if its adapter is active when the event fires.
//! Events are queued by the hooks and delivered, with context, once the
//! triggering call returns, so listeners never run while an adapter is
//! mutably borrowed.

mod global;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Instant;

use thiserror::Error;

pub use global::{reset_global_manager, with_global_manager};

use crate::adapters::base::{self, char_len};
use crate::adapters::{AdapterError, DEFAULT_CONTEXT_RADIUS, EditorAdapter};
use crate::events::{ListenerSet, Subscription};
use crate::types::{ContentInput, ContentStats, EditorState, TextChange, TextSelection};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SelectionError {
    #[error("No active adapter")]
    NoActiveAdapter,
    #[error("Unknown adapter: {0}")]
    UnknownAdapter(String),
    #[error("An adapter is already registered as {0}")]
    DuplicateAdapter(String),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

struct Registration {
    adapter: Box<dyn EditorAdapter>,
    forwarding: Option<Subscription>,
}

type Pending = Rc<RefCell<Vec<(String, TextSelection)>>>;

pub struct SelectionManager {
    adapters: BTreeMap<String, Registration>,
    active: Rc<RefCell<Option<String>>>,
    pending: Pending,
    selection_listeners: ListenerSet<TextSelection>,
    context_listeners: ListenerSet<TextSelection>,
    context_radius: usize,
    destroyed: bool,
}

impl Default for SelectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionManager {
    pub fn new() -> Self {
        Self::with_context_radius(DEFAULT_CONTEXT_RADIUS)
    }

    /// Radius of the context attached to events for context listeners.
    pub fn with_context_radius(context_radius: usize) -> Self {
        Self {
            adapters: BTreeMap::new(),
            active: Rc::new(RefCell::new(None)),
            pending: Rc::new(RefCell::new(Vec::new())),
            selection_listeners: ListenerSet::new(),
            context_listeners: ListenerSet::new(),
            context_radius,
            destroyed: false,
        }
    }

    /// Register `adapter` under `id`. The first adapter registered becomes
    /// active.
    pub fn register_adapter(
        &mut self,
        id: impl Into<String>,
        adapter: Box<dyn EditorAdapter>,
    ) -> Result<(), SelectionError> {
        let id = id.into();
        if self.adapters.contains_key(&id) {
            return Err(SelectionError::DuplicateAdapter(id));
        }

        let active = self.active.clone();
        let pending = self.pending.clone();
        let source = id.clone();
        let forwarding = adapter.on_selection_change(Box::new(move |selection: &TextSelection| {
            if active.borrow().as_deref() == Some(source.as_str()) {
                pending.borrow_mut().push((source.clone(), selection.clone()));
            }
        }));

        log::debug!("registered {} adapter as {id}", adapter.editor_type());
        self.adapters.insert(
            id.clone(),
            Registration {
                adapter,
                forwarding: Some(forwarding),
            },
        );
        if self.active.borrow().is_none() {
            *self.active.borrow_mut() = Some(id);
        }
        self.destroyed = false;
        Ok(())
    }

    /// Remove and return the adapter registered as `id`, still live. If it
    /// was active, no adapter is active afterwards.
    pub fn unregister_adapter(&mut self, id: &str) -> Result<Box<dyn EditorAdapter>, SelectionError> {
        let mut registration = self
            .adapters
            .remove(id)
            .ok_or_else(|| SelectionError::UnknownAdapter(id.to_string()))?;
        if let Some(forwarding) = registration.forwarding.take() {
            forwarding.unsubscribe();
        }
        if self.active.borrow().as_deref() == Some(id) {
            *self.active.borrow_mut() = None;
        }
        self.pending.borrow_mut().retain(|(source, _)| source != id);
        Ok(registration.adapter)
    }

    pub fn set_active_adapter(&mut self, id: &str) -> Result<(), SelectionError> {
        if !self.adapters.contains_key(id) {
            return Err(SelectionError::UnknownAdapter(id.to_string()));
        }
        log::debug!("active adapter is now {id}");
        *self.active.borrow_mut() = Some(id.to_string());
        // Queued events from the previous adapter are stale now.
        self.pending.borrow_mut().retain(|(source, _)| source == id);
        Ok(())
    }

    pub fn active_adapter_id(&self) -> Option<String> {
        self.active.borrow().clone()
    }

    pub fn adapter_ids(&self) -> Vec<&str> {
        self.adapters.keys().map(String::as_str).collect()
    }

    pub fn adapter(&self, id: &str) -> Option<&dyn EditorAdapter> {
        self.adapters.get(id).map(|r| r.adapter.as_ref())
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    fn active(&self) -> Result<&dyn EditorAdapter, SelectionError> {
        let id = self.active.borrow().clone().ok_or(SelectionError::NoActiveAdapter)?;
        self.adapters
            .get(&id)
            .map(|r| r.adapter.as_ref())
            .ok_or(SelectionError::UnknownAdapter(id))
    }

    fn active_mut(&mut self) -> Result<&mut Box<dyn EditorAdapter>, SelectionError> {
        let id = self.active.borrow().clone().ok_or(SelectionError::NoActiveAdapter)?;
        self.adapters
            .get_mut(&id)
            .map(|r| &mut r.adapter)
            .ok_or(SelectionError::UnknownAdapter(id))
    }

    /// Run a mutation on the active adapter, then deliver the selection
    /// events it caused.
    fn mutate<T>(
        &mut self,
        operation: impl FnOnce(&mut dyn EditorAdapter) -> Result<T, AdapterError>,
    ) -> Result<T, SelectionError> {
        let result = operation(self.active_mut()?.as_mut());
        self.flush();
        Ok(result?)
    }

    pub fn get_current_selection(&self) -> Result<Option<TextSelection>, SelectionError> {
        Ok(self.active()?.get_selection()?)
    }

    pub fn set_selection(&mut self, start: usize, end: usize) -> Result<(), SelectionError> {
        self.mutate(|adapter| adapter.set_selection(start, end))
    }

    /// The active selection with up to `radius` characters either side.
    pub fn get_selection_context(&self, radius: usize) -> Result<Option<TextSelection>, SelectionError> {
        Ok(self.active()?.create_selection_context(radius)?)
    }

    pub fn get_content(&self) -> Result<String, SelectionError> {
        Ok(self.active()?.get_text_content()?)
    }

    pub fn set_content(&mut self, content: ContentInput<'_>) -> Result<(), SelectionError> {
        self.mutate(|adapter| adapter.set_content(content))
    }

    pub fn apply_change(&mut self, change: &TextChange) -> Result<(), SelectionError> {
        self.mutate(|adapter| adapter.apply_change(change))
    }

    pub fn apply_changes(&mut self, changes: &[TextChange]) -> Result<(), SelectionError> {
        self.mutate(|adapter| adapter.apply_changes(changes))
    }

    /// Replace the first (or, with `all`, every) occurrence of `search`,
    /// scanning forward past each replacement. Returns the count.
    pub fn replace_text(&mut self, search: &str, replacement: &str, all: bool) -> Result<usize, SelectionError> {
        if search.is_empty() {
            return Ok(0);
        }
        let replacement_len = char_len(replacement);
        self.mutate(|adapter| {
            let mut count = 0;
            let mut from = 0;
            while let Some(found) = adapter.find_text(search, from)? {
                adapter.apply_change(&TextChange::new(found.start, found.end, replacement))?;
                count += 1;
                from = found.start + replacement_len;
                if !all {
                    break;
                }
            }
            Ok(count)
        })
    }

    /// First occurrence of `needle` at or after `from` in the active content.
    pub fn find_text(&self, needle: &str, from: usize) -> Result<Option<TextSelection>, SelectionError> {
        Ok(self.active()?.find_text(needle, from)?)
    }

    /// Every non-overlapping occurrence of `needle`.
    pub fn find_all(&self, needle: &str) -> Result<Vec<TextSelection>, SelectionError> {
        let text = self.get_content()?;
        let mut found = Vec::new();
        let mut from = 0;
        while let Some((start, end)) = base::find_chars(&text, needle, from) {
            found.push(base::selection_in(&text, start, end));
            from = end;
        }
        Ok(found)
    }

    pub fn get_content_stats(&self) -> Result<ContentStats, SelectionError> {
        Ok(base::content_stats(&self.get_content()?))
    }

    pub fn get_editor_state(&self) -> Result<EditorState, SelectionError> {
        Ok(self.active()?.get_state()?)
    }

    /// Poll every adapter, background ones included, then deliver events
    /// from the active one.
    pub fn poll(&mut self, now: Instant) {
        for registration in self.adapters.values_mut() {
            registration.adapter.poll(now);
        }
        self.flush();
    }

    fn flush(&mut self) {
        let events = std::mem::take(&mut *self.pending.borrow_mut());
        for (source, selection) in events {
            if self.active.borrow().as_deref() != Some(source.as_str()) {
                continue;
            }
            self.selection_listeners.emit(&selection);
            if self.context_listeners.is_empty() {
                continue;
            }
            let Some(registration) = self.adapters.get(&source) else {
                continue;
            };
            match registration.adapter.get_text_content() {
                Ok(text) => {
                    let mut with_context = selection.clone();
                    with_context.context = Some(base::create_selection_context(
                        &text,
                        selection.start,
                        selection.end,
                        self.context_radius,
                    ));
                    self.context_listeners.emit(&with_context);
                }
                Err(error) => log::warn!("no context for selection in {source}: {error}"),
            }
        }
    }

    pub fn on_selection_change(&self, callback: impl FnMut(&TextSelection) + 'static) -> Subscription {
        self.selection_listeners.subscribe(callback)
    }

    /// Like [`SelectionManager::on_selection_change`], with the selection's
    /// surrounding text filled in.
    pub fn on_context_change(&self, callback: impl FnMut(&TextSelection) + 'static) -> Subscription {
        self.context_listeners.subscribe(callback)
    }

    /// Destroy every adapter and drop every listener. Safe to call twice.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        for (id, mut registration) in std::mem::take(&mut self.adapters) {
            if let Some(forwarding) = registration.forwarding.take() {
                forwarding.unsubscribe();
            }
            registration.adapter.destroy();
            log::debug!("destroyed adapter {id}");
        }
        *self.active.borrow_mut() = None;
        self.pending.borrow_mut().clear();
        self.selection_listeners.clear();
        self.context_listeners.clear();
    }
}

impl Drop for SelectionManager {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{AdapterOptions, TextareaAdapter};
    use crate::surfaces::{TextareaHandle, TextareaSurface};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn textarea(text: &str) -> (TextareaHandle, Box<dyn EditorAdapter>) {
        let surface = Rc::new(RefCell::new(TextareaSurface::new(text)));
        let adapter = TextareaAdapter::new(surface.clone(), &AdapterOptions::default());
        (surface, Box::new(adapter))
    }

    fn recorder(manager: &SelectionManager) -> (Rc<RefCell<Vec<(usize, usize)>>>, Subscription) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let subscription = manager.on_selection_change(move |s| sink.borrow_mut().push((s.start, s.end)));
        (seen, subscription)
    }

    #[test]
    fn first_registration_becomes_active() {
        let mut manager = SelectionManager::new();
        assert_eq!(manager.get_content(), Err(SelectionError::NoActiveAdapter));

        manager.register_adapter("a", textarea("alpha").1).unwrap();
        manager.register_adapter("b", textarea("beta").1).unwrap();
        assert_eq!(manager.active_adapter_id().as_deref(), Some("a"));
        assert_eq!(manager.get_content().unwrap(), "alpha");

        manager.set_active_adapter("b").unwrap();
        assert_eq!(manager.get_content().unwrap(), "beta");
        assert_eq!(
            manager.set_active_adapter("zzz"),
            Err(SelectionError::UnknownAdapter("zzz".to_string()))
        );
        assert_eq!(
            manager.register_adapter("a", textarea("").1),
            Err(SelectionError::DuplicateAdapter("a".to_string()))
        );
    }

    #[test]
    fn replace_all_counts_and_advances() {
        let mut manager = SelectionManager::new();
        manager
            .register_adapter("main", textarea("Hello, world! Hello, world!").1)
            .unwrap();
        let count = manager.replace_text("world", "universe", true).unwrap();
        assert_eq!(count, 2);
        assert_eq!(manager.get_content().unwrap(), "Hello, universe! Hello, universe!");
    }

    #[test]
    fn replacement_containing_the_search_does_not_loop() {
        let mut manager = SelectionManager::new();
        manager.register_adapter("main", textarea("a a").1).unwrap();
        assert_eq!(manager.replace_text("a", "aa", true).unwrap(), 2);
        assert_eq!(manager.get_content().unwrap(), "aa aa");
        assert_eq!(manager.replace_text("aa", "b", false).unwrap(), 1);
        assert_eq!(manager.get_content().unwrap(), "b aa");
    }

    #[test]
    fn only_the_active_adapter_forwards_selection_events() {
        let mut manager = SelectionManager::new();
        let (surface_a, adapter_a) = textarea("first text");
        let (surface_b, adapter_b) = textarea("second text");
        manager.register_adapter("a", adapter_a).unwrap();
        manager.register_adapter("b", adapter_b).unwrap();
        let (seen, _subscription) = recorder(&manager);

        let start = Instant::now();
        surface_a.borrow_mut().set_selection_range(0, 5);
        surface_b.borrow_mut().set_selection_range(0, 6);
        manager.poll(start);
        assert_eq!(*seen.borrow(), vec![(0, 5)]);

        manager.set_active_adapter("b").unwrap();
        surface_a.borrow_mut().set_selection_range(1, 2);
        manager.poll(start + Duration::from_secs(1));
        assert_eq!(*seen.borrow(), vec![(0, 5)]);

        surface_b.borrow_mut().set_selection_range(7, 11);
        manager.poll(start + Duration::from_secs(2));
        assert_eq!(*seen.borrow(), vec![(0, 5), (7, 11)]);
    }

    #[test]
    fn context_listeners_get_surrounding_text() {
        let mut manager = SelectionManager::with_context_radius(3);
        manager.register_adapter("a", textarea("one two three").1).unwrap();
        let contexts = Rc::new(RefCell::new(Vec::new()));
        let sink = contexts.clone();
        let _subscription = manager.on_context_change(move |s| sink.borrow_mut().push(s.context.clone()));

        manager.set_selection(4, 7).unwrap();
        let context = contexts.borrow()[0].clone().unwrap();
        assert_eq!((context.before.as_str(), context.after.as_str()), ("ne ", " th"));

        let selection = manager.get_selection_context(100).unwrap().unwrap();
        assert_eq!(selection.text, "two");
        assert_eq!(selection.context.unwrap().after, " three");
    }

    #[test]
    fn find_stats_and_state() {
        let mut manager = SelectionManager::new();
        manager.register_adapter("a", textarea("ab ab\n\nab").1).unwrap();
        let found: Vec<_> = manager
            .find_all("ab")
            .unwrap()
            .into_iter()
            .map(|s| s.start)
            .collect();
        assert_eq!(found, vec![0, 3, 7]);
        assert_eq!(manager.find_text("ab", 1).unwrap().unwrap().start, 3);

        let stats = manager.get_content_stats().unwrap();
        assert_eq!((stats.words, stats.paragraphs), (3, 2));

        manager.apply_change(&TextChange::new(0, 2, "xy")).unwrap();
        let state = manager.get_editor_state().unwrap();
        assert_eq!(state.content, "xy ab\n\nab");
        assert!(state.is_dirty);
    }

    #[test]
    fn adapter_errors_surface_to_the_caller() {
        let mut manager = SelectionManager::new();
        manager.register_adapter("a", textarea("abc").1).unwrap();
        assert_eq!(
            manager.apply_change(&TextChange::new(2, 9, "x")),
            Err(SelectionError::Adapter(AdapterError::Validation {
                start: 2,
                end: 9,
                len: 3
            }))
        );
    }

    #[test]
    fn unregistering_the_active_adapter_leaves_none_active() {
        let mut manager = SelectionManager::new();
        manager.register_adapter("a", textarea("x").1).unwrap();
        let adapter = manager.unregister_adapter("a").unwrap();
        assert_eq!(adapter.get_text_content().unwrap(), "x");
        assert_eq!(manager.active_adapter_id(), None);
        assert!(manager.is_empty());
    }

    #[test]
    fn destroy_is_idempotent_and_tears_down_adapters() {
        let mut manager = SelectionManager::new();
        let (surface, adapter) = textarea("text");
        manager.register_adapter("a", adapter).unwrap();
        let (seen, _subscription) = recorder(&manager);

        manager.destroy();
        manager.destroy();
        assert!(manager.is_empty());
        assert_eq!(manager.get_current_selection(), Err(SelectionError::NoActiveAdapter));

        surface.borrow_mut().set_selection_range(1, 2);
        manager.poll(Instant::now());
        assert!(seen.borrow().is_empty());
    }
}
