use std::cell::{Cell, Ref, RefMut};
use std::rc::Rc;
use std::time::Instant;

use super::base::{self, AdapterCore, char_len, snapshot_of};
use super::{AdapterError, AdapterOptions, EditorAdapter};
use crate::events::Subscription;
use crate::parser;
use crate::surfaces::TextareaSurface;
use crate::surfaces::TextareaHandle;
use crate::types::{
    ContentFormat, ContentInput, EditorCapabilities, EditorType, StructuredContent, TextChange,
    TextSelection,
};

static CAPABILITIES: EditorCapabilities = EditorCapabilities {
    supports_rich_text: false,
    supports_structured_content: false,
    supports_undo: false,
    supports_selection: true,
    supports_formatting: false,
    supported_formats: &[ContentFormat::Text],
};

/// Adapter over a plain `<textarea>`. Native offsets are plain-text offsets.
///
/// The surface fires `input` events but nothing for selection changes, so the
/// selection is observed by polling.
pub struct TextareaAdapter {
    surface: Option<TextareaHandle>,
    core: AdapterCore,
    input_pending: Rc<Cell<bool>>,
    input_subscription: Option<Subscription>,
}

impl TextareaAdapter {
    pub fn new(surface: TextareaHandle, options: &AdapterOptions) -> Self {
        let input_pending = Rc::new(Cell::new(false));
        let flag = input_pending.clone();
        let input_subscription = surface
            .borrow()
            .add_input_listener(move |_| flag.set(true));

        let mut adapter = Self {
            surface: Some(surface),
            core: AdapterCore::new(options.poll_interval_for(EditorType::Textarea)),
            input_pending,
            input_subscription: Some(input_subscription),
        };
        if let Ok(text) = adapter.get_text_content() {
            let selection = adapter.get_selection().ok().flatten();
            adapter.core.reset_baseline(snapshot_of(&text), selection);
        }
        log::debug!("textarea adapter attached");
        adapter
    }

    pub fn handle(&self) -> Option<&TextareaHandle> {
        self.surface.as_ref()
    }

    fn read(&self) -> Result<Ref<'_, TextareaSurface>, AdapterError> {
        base::read_surface(self.surface.as_ref())
    }

    fn write(&self) -> Result<RefMut<'_, TextareaSurface>, AdapterError> {
        base::write_surface(self.surface.as_ref())
    }

    /// Fire a synthetic `input` event so host listeners see programmatic edits.
    fn dispatch_input(&self) -> Result<(), AdapterError> {
        self.read()?.dispatch_input(true);
        Ok(())
    }

    fn sync_content(&mut self) {
        if let Ok(text) = self.get_text_content() {
            self.core.observe_content(snapshot_of(&text), &text);
        }
    }

    fn sync_selection(&mut self) {
        if let Ok(selection) = self.get_selection() {
            self.core.observe_selection(selection);
        }
    }
}

impl EditorAdapter for TextareaAdapter {
    fn editor_type(&self) -> EditorType {
        EditorType::Textarea
    }

    fn capabilities(&self) -> &'static EditorCapabilities {
        &CAPABILITIES
    }

    fn core(&self) -> &AdapterCore {
        &self.core
    }

    fn is_ready(&self) -> bool {
        self.surface.is_some()
    }

    fn get_text_content(&self) -> Result<String, AdapterError> {
        Ok(self.read()?.value())
    }

    fn get_structured_content(&self) -> Result<StructuredContent, AdapterError> {
        Ok(parser::text_to_structured(&self.get_text_content()?))
    }

    fn set_content(&mut self, content: ContentInput<'_>) -> Result<(), AdapterError> {
        let text = match content {
            ContentInput::Text(text) => text.to_string(),
            ContentInput::Structured(structured) => base::extract_plain_text(structured),
        };
        self.write()?.set_value(&text);
        self.dispatch_input()?;
        self.input_pending.set(false);
        self.sync_content();
        self.sync_selection();
        Ok(())
    }

    fn get_selection(&self) -> Result<Option<TextSelection>, AdapterError> {
        let surface = self.read()?;
        let (start, end) = surface.selection();
        Ok(Some(base::selection_in(&surface.value(), start, end)))
    }

    fn set_selection(&mut self, start: usize, end: usize) -> Result<(), AdapterError> {
        let len = self.read()?.len();
        base::validate_range(start, end, len)?;
        self.write()?.set_selection_range(start, end);
        self.sync_selection();
        Ok(())
    }

    fn apply_change(&mut self, change: &TextChange) -> Result<(), AdapterError> {
        let len = self.read()?.len();
        base::validate_change(change, len)?;
        {
            let mut surface = self.write()?;
            surface.replace_range(change.start, change.end, &change.new_text);
            let caret = change.start + char_len(&change.new_text);
            surface.set_selection_range(caret, caret);
        }
        self.dispatch_input()?;
        self.input_pending.set(false);
        self.sync_content();
        self.sync_selection();
        Ok(())
    }

    fn focus(&mut self) -> Result<(), AdapterError> {
        self.write()?.focus();
        Ok(())
    }

    fn is_dirty(&self) -> bool {
        self.get_text_content()
            .map(|text| self.core.is_dirty(&snapshot_of(&text)))
            .unwrap_or(false)
    }

    fn mark_clean(&mut self) {
        if let Ok(text) = self.get_text_content() {
            self.core.mark_clean(snapshot_of(&text));
        }
    }

    fn poll(&mut self, now: Instant) {
        if self.core.is_destroyed() {
            return;
        }
        if self.input_pending.replace(false) {
            self.sync_content();
        }
        if self.core.poll_due(now) {
            self.sync_selection();
        }
    }

    fn destroy(&mut self) {
        if !self.core.teardown() {
            return;
        }
        if let Some(subscription) = self.input_subscription.take() {
            subscription.unsubscribe();
        }
        self.surface = None;
        log::debug!("textarea adapter destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::cell::RefCell;
    use std::time::Duration;

    fn adapter(text: &str) -> (TextareaHandle, TextareaAdapter) {
        let handle = Rc::new(RefCell::new(TextareaSurface::new(text)));
        let adapter = TextareaAdapter::new(handle.clone(), &AdapterOptions::default());
        (handle, adapter)
    }

    #[rstest]
    #[case("")]
    #[case("Hello, world!")]
    #[case("multi\nline\n\ntext")]
    #[case("ünïcødé ✓")]
    fn set_content_round_trips(#[case] text: &str) {
        let (_, mut adapter) = adapter("seed");
        adapter.set_content(text.into()).unwrap();
        assert_eq!(adapter.get_text_content().unwrap(), text);
    }

    #[test]
    fn apply_change_moves_caret_after_insertion() {
        let (handle, mut adapter) = adapter("Hello world");
        adapter
            .apply_change(&TextChange::new(6, 11, "there"))
            .unwrap();
        assert_eq!(handle.borrow().value(), "Hello there");
        assert_eq!(handle.borrow().selection(), (11, 11));
    }

    #[test]
    fn out_of_bounds_change_is_rejected() {
        let (_, mut adapter) = adapter("abc");
        let err = adapter.apply_change(&TextChange::new(2, 9, "x")).unwrap_err();
        assert_eq!(
            err,
            AdapterError::Validation {
                start: 2,
                end: 9,
                len: 3
            }
        );
        assert_eq!(adapter.get_text_content().unwrap(), "abc");
    }

    #[test]
    fn batched_changes_ignore_call_order() {
        let changes = [
            TextChange::new(0, 5, "Howdy"),
            TextChange::new(7, 12, "folks"),
        ];
        let reversed = [changes[1].clone(), changes[0].clone()];

        let (_, mut first) = adapter("Hello, world!");
        let (_, mut second) = adapter("Hello, world!");
        first.apply_changes(&changes).unwrap();
        second.apply_changes(&reversed).unwrap();

        assert_eq!(first.get_text_content().unwrap(), "Howdy, folks!");
        assert_eq!(second.get_text_content().unwrap(), "Howdy, folks!");
    }

    #[test]
    fn selection_polling_fires_only_on_change() {
        let (handle, mut adapter) = adapter("Hello world");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let _sub = adapter.on_selection_change(Box::new(move |s: &TextSelection| {
            sink.borrow_mut().push(s.text.clone())
        }));

        let t0 = Instant::now();
        adapter.poll(t0);
        handle.borrow_mut().set_selection_range(0, 5);
        adapter.poll(t0 + Duration::from_millis(50));
        assert!(seen.borrow().is_empty());

        adapter.poll(t0 + Duration::from_millis(100));
        adapter.poll(t0 + Duration::from_millis(200));
        assert_eq!(*seen.borrow(), vec!["Hello".to_string()]);
    }

    #[test]
    fn user_input_marks_dirty_and_notifies() {
        let (handle, mut adapter) = adapter("abc");
        let changes = Rc::new(Cell::new(0));
        let counter = changes.clone();
        let _sub = adapter.on_content_change(Box::new(move |_: &String| {
            counter.set(counter.get() + 1)
        }));

        assert!(!adapter.is_dirty());
        handle.borrow_mut().type_text("d");
        adapter.poll(Instant::now());

        assert_eq!(changes.get(), 1);
        assert!(adapter.is_dirty());
        adapter.mark_clean();
        assert!(!adapter.is_dirty());
    }

    #[test]
    fn destroy_is_idempotent_and_detaches() {
        let (handle, mut adapter) = adapter("abc");
        adapter.destroy();
        adapter.destroy();
        assert!(!adapter.is_ready());
        assert_eq!(adapter.get_text_content(), Err(AdapterError::Unavailable));
        assert_eq!(handle.borrow().value(), "abc");
    }

    #[test]
    fn no_undo_support() {
        let (_, mut adapter) = adapter("abc");
        assert!(!adapter.capabilities().supports_undo);
        assert_eq!(adapter.undo(), Ok(false));
    }
}
