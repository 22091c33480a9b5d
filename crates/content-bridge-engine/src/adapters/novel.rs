//! Adapter over a block-JSON editor.
//!
//! Plain-text offsets are translated with a walk over the text-bearing blocks
//! in document order: each block owns `len` characters plus one separator, so
//! offset `n` lands in the first block whose span reaches `n`. Media blocks
//! own no span.

use std::cell::{Ref, RefMut};
use std::time::Instant;

use serde_json::Value;

use super::base::{self, AdapterCore, snapshot_of};
use super::{AdapterError, AdapterOptions, EditorAdapter};
use crate::surfaces::NovelHandle;
use crate::surfaces::novel::{
    BlockPoint, BlockRange, BlockUpdate, InlineContent, NovelBlock, NovelDocument, NovelEditor,
    NovelError, NovelEvent, Placement, TextEntry, block_types::*,
};
use crate::types::{
    BlockType, ContentBlock, ContentFormat, ContentInput, EditorCapabilities, EditorType,
    StructuredContent, TextChange, TextSelection, generate_block_id,
};

static CAPABILITIES: EditorCapabilities = EditorCapabilities {
    supports_rich_text: true,
    supports_structured_content: true,
    supports_undo: true,
    supports_selection: true,
    supports_formatting: true,
    supported_formats: &[
        ContentFormat::Text,
        ContentFormat::Html,
        ContentFormat::Markdown,
        ContentFormat::Json,
    ],
};

// ---------------------------------------------------------------------------
// Block walk
// ---------------------------------------------------------------------------

pub fn plain_to_point(entries: &[TextEntry], plain: usize) -> Option<BlockPoint> {
    let entry = entries
        .iter()
        .find(|entry| plain <= entry.plain_start + entry.len)
        .or_else(|| entries.last())?;
    let offset = plain.saturating_sub(entry.plain_start).min(entry.len);
    Some(BlockPoint::new(entry.id.clone(), offset))
}

pub fn point_to_plain(entries: &[TextEntry], point: &BlockPoint) -> Option<usize> {
    entries
        .iter()
        .find(|entry| entry.id == point.block_id)
        .map(|entry| entry.plain_start + point.offset.min(entry.len))
}

fn plain_len(entries: &[TextEntry]) -> usize {
    entries
        .last()
        .map(|entry| entry.plain_start + entry.len)
        .unwrap_or(0)
}

fn text_len(editor: &NovelEditor) -> usize {
    plain_len(&editor.document().text_entries())
}

// ---------------------------------------------------------------------------
// Block type maps
// ---------------------------------------------------------------------------

pub fn document_to_structured(document: &NovelDocument) -> StructuredContent {
    StructuredContent::new(document.blocks.iter().map(novel_to_block).collect())
}

fn novel_to_block(block: &NovelBlock) -> ContentBlock {
    let id = block.id.clone();
    let text = block.inline_text();
    let converted = match block.block_type.as_str() {
        HEADING => {
            let level = block.props.get("level").and_then(Value::as_u64).unwrap_or(1);
            ContentBlock::with_id(id, BlockType::Heading, text).with_attribute("level", level)
        }
        BULLET_LIST_ITEM | NUMBERED_LIST_ITEM | CHECK_LIST_ITEM => {
            let style = match block.block_type.as_str() {
                NUMBERED_LIST_ITEM => "numbered",
                CHECK_LIST_ITEM => "check",
                _ => "bullet",
            };
            let item = ContentBlock::with_id(id, BlockType::List, text).with_attribute("listStyle", style);
            match block.props.get("checked").and_then(Value::as_bool) {
                Some(checked) => item.with_attribute("checked", checked),
                None => item,
            }
        }
        CODE_BLOCK => {
            let code = ContentBlock::with_id(id, BlockType::Code, text);
            match block.prop_str("language") {
                Some(language) => code.with_attribute("language", language),
                None => code,
            }
        }
        QUOTE => ContentBlock::with_id(id, BlockType::Quote, text),
        IMAGE | VIDEO | AUDIO | FILE => {
            let mut media = ContentBlock::with_id(id, BlockType::Image, "")
                .with_attribute("src", block.prop_str("url").unwrap_or_default())
                .with_attribute("alt", block.prop_str("caption").unwrap_or_default());
            if block.block_type != IMAGE {
                media = media.with_attribute("mediaType", block.block_type.as_str());
            }
            media
        }
        other => {
            if other != PARAGRAPH {
                log::debug!("unmapped block type {other:?}, reading it as a paragraph");
            }
            match sole_link(block) {
                Some(href) => {
                    ContentBlock::with_id(id, BlockType::Link, text).with_attribute("href", href)
                }
                None => ContentBlock::with_id(id, BlockType::Paragraph, text),
            }
        }
    };

    if block.children.is_empty() {
        converted
    } else {
        converted.with_children(block.children.iter().map(novel_to_block).collect())
    }
}

fn sole_link(block: &NovelBlock) -> Option<&str> {
    match block.content.as_slice() {
        [InlineContent::Link { href, .. }] => Some(href.as_str()),
        _ => None,
    }
}

pub fn structured_to_document(content: &StructuredContent) -> NovelDocument {
    NovelDocument::new(content.content.iter().flat_map(block_to_novel).collect())
}

fn novel_id(block: &ContentBlock) -> String {
    if block.id.is_empty() {
        generate_block_id()
    } else {
        block.id.clone()
    }
}

fn list_item_type(block: &ContentBlock) -> &'static str {
    let ordered = block
        .attributes
        .as_ref()
        .and_then(|attrs| attrs.get("ordered"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    match block.attribute_str("listStyle") {
        Some("numbered") => NUMBERED_LIST_ITEM,
        Some("check") => CHECK_LIST_ITEM,
        Some(_) => BULLET_LIST_ITEM,
        None if ordered => NUMBERED_LIST_ITEM,
        None => BULLET_LIST_ITEM,
    }
}

/// A list container with no text of its own becomes one list-item block per
/// child; every other block maps one-to-one.
fn block_to_novel(block: &ContentBlock) -> Vec<NovelBlock> {
    let id = novel_id(block);
    let children: Vec<NovelBlock> = block.children().iter().flat_map(block_to_novel).collect();

    let converted = match block.block_type {
        BlockType::Paragraph => NovelBlock::with_id(id, PARAGRAPH, &block.content),
        BlockType::Heading => NovelBlock::with_id(id, HEADING, &block.content)
            .with_prop("level", block.heading_level()),
        BlockType::Code => {
            let code = NovelBlock::with_id(id, CODE_BLOCK, &block.content);
            match block.attribute_str("language") {
                Some(language) => code.with_prop("language", language),
                None => code,
            }
        }
        BlockType::Quote => NovelBlock::with_id(id, QUOTE, &block.content),
        BlockType::Link => {
            let href = block.attribute_str("href").unwrap_or_default();
            let text = if block.content.is_empty() { href } else { block.content.as_str() };
            let mut link = NovelBlock::with_id(id, PARAGRAPH, "");
            link.content = vec![InlineContent::link(href, text)];
            link
        }
        BlockType::Image => {
            let media_type = match block.attribute_str("mediaType") {
                Some(VIDEO) => VIDEO,
                Some(AUDIO) => AUDIO,
                Some(FILE) => FILE,
                _ => IMAGE,
            };
            NovelBlock::with_id(id, media_type, "")
                .with_prop("url", block.attribute_str("src").unwrap_or_default())
                .with_prop("caption", block.attribute_str("alt").unwrap_or_default())
        }
        BlockType::List => {
            let item_type = list_item_type(block);
            if block.content.is_empty() && !block.children().is_empty() {
                return block
                    .children()
                    .iter()
                    .map(|child| {
                        let nested = child.children().iter().flat_map(block_to_novel).collect();
                        NovelBlock::with_id(novel_id(child), item_type, &child.content)
                            .with_children(nested)
                    })
                    .collect();
            }
            let item = NovelBlock::with_id(id, item_type, &block.content);
            match block
                .attributes
                .as_ref()
                .and_then(|attrs| attrs.get("checked"))
                .and_then(Value::as_bool)
            {
                Some(checked) => item.with_prop("checked", checked),
                None => item,
            }
        }
    };
    vec![converted.with_children(children)]
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

pub struct NovelAdapter {
    editor: Option<NovelHandle>,
    core: AdapterCore,
}

impl NovelAdapter {
    pub fn new(editor: NovelHandle, options: &AdapterOptions) -> Self {
        editor.borrow_mut().drain_events();
        let mut adapter = Self {
            editor: Some(editor),
            core: AdapterCore::new(options.poll_interval_for(EditorType::Novel)),
        };
        if let Ok(snapshot) = adapter.snapshot() {
            let selection = adapter.get_selection().ok().flatten();
            adapter.core.reset_baseline(snapshot, selection);
        }
        log::debug!("novel adapter attached");
        adapter
    }

    pub fn handle(&self) -> Option<&NovelHandle> {
        self.editor.as_ref()
    }

    /// Selection in block coordinates, untranslated.
    pub fn native_selection(&self) -> Result<Option<BlockRange>, AdapterError> {
        Ok(self.read()?.selection().cloned())
    }

    /// Replace the text between two block points. No plain-text translation
    /// happens here.
    pub fn apply_native_change(
        &mut self,
        start: &BlockPoint,
        end: &BlockPoint,
        text: &str,
    ) -> Result<BlockPoint, AdapterError> {
        let result = self.write().and_then(|mut editor| {
            let len = text_len(&editor);
            editor
                .replace_text(start, end, text)
                .map_err(|error| native_error(error, start.offset, end.offset, len))
        });
        let caret = self.route(result)?;
        self.drain_and_sync();
        Ok(caret)
    }

    pub fn get_block(&self, id: &str) -> Result<Option<ContentBlock>, AdapterError> {
        Ok(self.read()?.get_block(id).map(novel_to_block))
    }

    /// Insert `block` relative to `reference_id`. Returns the ids of the
    /// blocks created (a text-less list container yields one per item).
    pub fn insert_block(
        &mut self,
        block: &ContentBlock,
        reference_id: &str,
        placement: Placement,
    ) -> Result<Vec<String>, AdapterError> {
        let blocks = block_to_novel(block);
        let ids = blocks.iter().map(|block| block.id.clone()).collect();
        let result = self.write().and_then(|mut editor| {
            let len = text_len(&editor);
            editor
                .insert_blocks(blocks, reference_id, placement)
                .map_err(|error| native_error(error, 0, 0, len))
        });
        self.route(result)?;
        self.drain_and_sync();
        Ok(ids)
    }

    /// Replace type, props and text of block `id`; the id never changes.
    pub fn update_block(&mut self, id: &str, update: &ContentBlock) -> Result<(), AdapterError> {
        let mut converted = block_to_novel(update);
        let change = match converted.len() {
            0 => BlockUpdate::default(),
            _ => {
                let block = converted.swap_remove(0);
                BlockUpdate {
                    block_type: Some(block.block_type),
                    props: Some(block.props),
                    content: Some(block.content),
                }
            }
        };
        let result = self.write().and_then(|mut editor| {
            let len = text_len(&editor);
            editor
                .update_block(id, change)
                .map_err(|error| native_error(error, 0, 0, len))
        });
        self.route(result)?;
        self.drain_and_sync();
        Ok(())
    }

    pub fn delete_block(&mut self, id: &str) -> Result<(), AdapterError> {
        let result = self.write().and_then(|mut editor| {
            let len = text_len(&editor);
            editor
                .remove_blocks(&[id])
                .map_err(|error| native_error(error, 0, 0, len))
        });
        self.route(result)?;
        self.drain_and_sync();
        Ok(())
    }

    fn read(&self) -> Result<Ref<'_, NovelEditor>, AdapterError> {
        base::read_surface(self.editor.as_ref())
    }

    fn write(&self) -> Result<RefMut<'_, NovelEditor>, AdapterError> {
        base::write_surface(self.editor.as_ref())
    }

    fn snapshot(&self) -> Result<String, AdapterError> {
        Ok(snapshot_of(self.read()?.document()))
    }

    fn route<T>(&self, result: Result<T, AdapterError>) -> Result<T, AdapterError> {
        if let Err(error) = &result {
            self.core.report_error(error);
        }
        result
    }

    fn sync_content(&mut self) {
        let Ok((snapshot, text)) = self
            .read()
            .map(|editor| (snapshot_of(editor.document()), editor.get_text()))
        else {
            return;
        };
        self.core.observe_content(snapshot, &text);
    }

    fn sync_selection(&mut self) {
        if let Ok(selection) = self.get_selection() {
            self.core.observe_selection(selection);
        }
    }

    fn drain_and_sync(&mut self) {
        let Ok(events) = self.write().map(|mut editor| editor.drain_events()) else {
            return;
        };
        if events.contains(&NovelEvent::ContentChange) {
            self.sync_content();
        }
        if !events.is_empty() {
            self.sync_selection();
        }
    }
}

/// `len` is the plain-text length of the document the call was made on.
fn native_error(error: NovelError, start: usize, end: usize, len: usize) -> AdapterError {
    match error {
        NovelError::UnknownBlock(id) => AdapterError::UnknownBlock(id),
        NovelError::InvalidRange => AdapterError::Validation { start, end, len },
    }
}

/// A document of media blocks only has no text block to edit, so text
/// inserted at offset 0 goes into new paragraphs ahead of the first block.
fn insert_leading_text(editor: &mut NovelEditor, text: &str) -> Result<(), AdapterError> {
    if text.is_empty() {
        return Ok(());
    }
    let Some(first) = editor.document().blocks.first().map(|block| block.id.clone()) else {
        editor.append_blocks(NovelDocument::from_text(text).blocks);
        return Ok(());
    };
    let len = text_len(editor);
    editor
        .insert_blocks(NovelDocument::from_text(text).blocks, &first, Placement::Before)
        .map_err(|error| native_error(error, 0, 0, len))
}

impl EditorAdapter for NovelAdapter {
    fn editor_type(&self) -> EditorType {
        EditorType::Novel
    }

    fn capabilities(&self) -> &'static EditorCapabilities {
        &CAPABILITIES
    }

    fn core(&self) -> &AdapterCore {
        &self.core
    }

    fn is_ready(&self) -> bool {
        self.editor.is_some()
    }

    fn get_text_content(&self) -> Result<String, AdapterError> {
        Ok(self.read()?.get_text())
    }

    fn get_structured_content(&self) -> Result<StructuredContent, AdapterError> {
        Ok(document_to_structured(self.read()?.document()))
    }

    fn set_content(&mut self, content: ContentInput<'_>) -> Result<(), AdapterError> {
        let document = match content {
            ContentInput::Text(text) => NovelDocument::from_text(text),
            ContentInput::Structured(structured) => structured_to_document(structured),
        };
        let result = self
            .write()
            .map(|mut editor| editor.replace_document(document));
        self.route(result)?;
        self.drain_and_sync();
        Ok(())
    }

    /// `None` while the editor has no selection.
    fn get_selection(&self) -> Result<Option<TextSelection>, AdapterError> {
        let editor = self.read()?;
        let Some(range) = editor.selection() else {
            return Ok(None);
        };
        let entries = editor.document().text_entries();
        let (Some(start), Some(end)) = (
            point_to_plain(&entries, &range.start),
            point_to_plain(&entries, &range.end),
        ) else {
            return Ok(None);
        };
        let (start, end) = (start.min(end), start.max(end));
        Ok(Some(base::selection_in(&editor.get_text(), start, end)))
    }

    fn set_selection(&mut self, start: usize, end: usize) -> Result<(), AdapterError> {
        let result = self.write().and_then(|mut editor| {
            let entries = editor.document().text_entries();
            let len = plain_len(&entries);
            base::validate_range(start, end, len)?;
            let (Some(from), Some(to)) = (
                plain_to_point(&entries, start),
                plain_to_point(&entries, end),
            ) else {
                return Err(AdapterError::Validation { start, end, len });
            };
            editor
                .set_selection(Some(BlockRange {
                    start: from,
                    end: to,
                }))
                .map_err(|error| native_error(error, start, end, len))
        });
        self.route(result)?;
        self.drain_and_sync();
        Ok(())
    }

    fn apply_change(&mut self, change: &TextChange) -> Result<(), AdapterError> {
        let result = self.write().and_then(|mut editor| {
            let entries = editor.document().text_entries();
            let len = plain_len(&entries);
            base::validate_change(change, len)?;
            if entries.is_empty() {
                return insert_leading_text(&mut editor, &change.new_text);
            }
            let (Some(from), Some(to)) = (
                plain_to_point(&entries, change.start),
                plain_to_point(&entries, change.end),
            ) else {
                return Err(AdapterError::Validation {
                    start: change.start,
                    end: change.end,
                    len,
                });
            };
            editor
                .replace_text(&from, &to, &change.new_text)
                .map(|_| ())
                .map_err(|error| native_error(error, change.start, change.end, len))
        });
        self.route(result)?;
        self.drain_and_sync();
        Ok(())
    }

    fn focus(&mut self) -> Result<(), AdapterError> {
        self.write()?.focus();
        Ok(())
    }

    fn can_undo(&self) -> bool {
        self.read().map(|editor| editor.can_undo()).unwrap_or(false)
    }

    fn can_redo(&self) -> bool {
        self.read().map(|editor| editor.can_redo()).unwrap_or(false)
    }

    fn undo(&mut self) -> Result<bool, AdapterError> {
        let undone = self.write()?.undo();
        self.drain_and_sync();
        Ok(undone)
    }

    fn redo(&mut self) -> Result<bool, AdapterError> {
        let redone = self.write()?.redo();
        self.drain_and_sync();
        Ok(redone)
    }

    fn is_dirty(&self) -> bool {
        self.snapshot()
            .map(|snapshot| self.core.is_dirty(&snapshot))
            .unwrap_or(false)
    }

    fn mark_clean(&mut self) {
        if let Ok(snapshot) = self.snapshot() {
            self.core.mark_clean(snapshot);
        }
    }

    fn poll(&mut self, now: Instant) {
        if self.core.is_destroyed() {
            return;
        }
        self.drain_and_sync();
        if self.core.poll_due(now) {
            self.sync_content();
            self.sync_selection();
        }
    }

    fn destroy(&mut self) {
        if !self.core.teardown() {
            return;
        }
        if let Some(editor) = self.editor.take()
            && let Ok(mut editor) = editor.try_borrow_mut()
        {
            editor.drain_events();
        }
        log::debug!("novel adapter destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    fn sample() -> NovelDocument {
        NovelDocument::new(vec![
            NovelBlock::with_id("h", HEADING, "Title").with_prop("level", 2),
            NovelBlock::with_id("img", IMAGE, "").with_prop("url", "a.png"),
            NovelBlock::with_id("b1", BULLET_LIST_ITEM, "first").with_children(vec![
                NovelBlock::with_id("b2", BULLET_LIST_ITEM, "nested"),
            ]),
            NovelBlock::with_id("p", PARAGRAPH, "end"),
        ])
    }

    fn adapter(document: NovelDocument) -> (NovelHandle, NovelAdapter) {
        let handle = Rc::new(RefCell::new(NovelEditor::new(document)));
        let adapter = NovelAdapter::new(handle.clone(), &AdapterOptions::default());
        (handle, adapter)
    }

    #[test]
    fn block_walk_translates_both_ways() {
        let entries = sample().text_entries();
        // "Title\nfirst\nnested\nend"
        assert_eq!(plain_to_point(&entries, 5), Some(BlockPoint::new("h", 5)));
        assert_eq!(plain_to_point(&entries, 6), Some(BlockPoint::new("b1", 0)));
        assert_eq!(plain_to_point(&entries, 14), Some(BlockPoint::new("b2", 2)));
        assert_eq!(point_to_plain(&entries, &BlockPoint::new("p", 1)), Some(20));
        assert_eq!(point_to_plain(&entries, &BlockPoint::new("img", 0)), None);
    }

    #[test]
    fn change_in_nested_block_lands_in_that_block() {
        let (handle, mut adapter) = adapter(sample());
        adapter.apply_change(&TextChange::new(12, 18, "deep")).unwrap();
        assert_eq!(adapter.get_text_content().unwrap(), "Title\nfirst\ndeep\nend");
        assert_eq!(handle.borrow().get_block("b2").unwrap().inline_text(), "deep");
        assert_eq!(
            adapter.native_selection().unwrap().unwrap().start,
            BlockPoint::new("b2", 4)
        );
    }

    #[test]
    fn selection_round_trips_through_block_coordinates() {
        let (_, mut adapter) = adapter(sample());
        assert_eq!(adapter.get_selection().unwrap(), None);
        adapter.set_selection(6, 11).unwrap();
        let selection = adapter.get_selection().unwrap().unwrap();
        assert_eq!(selection.text, "first");
        assert_eq!((selection.start, selection.end), (6, 11));
    }

    #[test]
    fn type_maps_cover_lists_and_media() {
        let (_, adapter) = adapter(sample());
        let structured = adapter.get_structured_content().unwrap();
        let list = &structured.content[2];
        assert_eq!(list.block_type, BlockType::List);
        assert_eq!(list.attribute_str("listStyle"), Some("bullet"));
        assert_eq!(list.children()[0].id, "b2");
        assert_eq!(structured.content[1].attribute_str("src"), Some("a.png"));
        assert_eq!(
            base::extract_plain_text(&structured),
            adapter.get_text_content().unwrap()
        );

        let back = structured_to_document(&structured);
        assert_eq!(back.plain_text(), sample().plain_text());
        assert_eq!(back.find("b1").unwrap().block_type, BULLET_LIST_ITEM);
    }

    #[test]
    fn list_container_flattens_into_items() {
        let structured = StructuredContent::new(vec![
            ContentBlock::with_id("l", BlockType::List, "")
                .with_attribute("ordered", true)
                .with_children(vec![
                    ContentBlock::with_id("a", BlockType::Paragraph, "one"),
                    ContentBlock::with_id("b", BlockType::Paragraph, "two"),
                ]),
        ]);
        let document = structured_to_document(&structured);
        let types: Vec<_> = document.blocks.iter().map(|b| b.block_type.as_str()).collect();
        assert_eq!(types, vec![NUMBERED_LIST_ITEM, NUMBERED_LIST_ITEM]);
    }

    #[test]
    fn reversed_native_range_reports_the_text_length() {
        let (_, mut adapter) = adapter(sample());
        let err = adapter
            .apply_native_change(&BlockPoint::new("p", 1), &BlockPoint::new("h", 0), "x")
            .unwrap_err();
        // "Title\nfirst\nnested\nend"
        assert_eq!(
            err,
            AdapterError::Validation {
                start: 1,
                end: 0,
                len: 22
            }
        );
    }

    #[test]
    fn text_typed_into_a_media_only_document_gets_a_paragraph() {
        let (handle, mut adapter) = adapter(NovelDocument::new(vec![
            NovelBlock::with_id("img", IMAGE, "").with_prop("url", "a.png"),
        ]));
        assert_eq!(adapter.get_text_content().unwrap(), "");

        adapter.apply_change(&TextChange::insert(0, "x")).unwrap();
        assert_eq!(adapter.get_text_content().unwrap(), "x");
        let types: Vec<_> = handle
            .borrow()
            .document()
            .blocks
            .iter()
            .map(|block| block.block_type.clone())
            .collect();
        assert_eq!(types, vec![PARAGRAPH.to_string(), IMAGE.to_string()]);

        assert!(matches!(
            adapter.apply_change(&TextChange::new(0, 5, "")),
            Err(AdapterError::Validation { len: 1, .. })
        ));
    }

    #[test]
    fn block_crud_by_id() {
        let (_, mut adapter) = adapter(sample());
        let ids = adapter
            .insert_block(
                &ContentBlock::with_id("q", BlockType::Quote, "quoted"),
                "h",
                Placement::After,
            )
            .unwrap();
        assert_eq!(ids, vec!["q".to_string()]);
        assert_eq!(
            adapter.get_text_content().unwrap(),
            "Title\nquoted\nfirst\nnested\nend"
        );

        adapter
            .update_block("q", &ContentBlock::heading(3, "Sub"))
            .unwrap();
        let updated = adapter.get_block("q").unwrap().unwrap();
        assert_eq!(updated.id, "q");
        assert_eq!(updated.block_type, BlockType::Heading);
        assert_eq!(updated.content, "Sub");

        adapter.delete_block("q").unwrap();
        assert_eq!(adapter.get_block("q").unwrap(), None);
        assert_eq!(
            adapter.delete_block("q"),
            Err(AdapterError::UnknownBlock("q".to_string()))
        );
    }

    #[test]
    fn polls_on_its_own_interval() {
        let (handle, mut adapter) = adapter(sample());
        assert_eq!(adapter.core().poller().interval(), Duration::from_millis(200));

        let count = Rc::new(std::cell::Cell::new(0));
        let counter = count.clone();
        let _sub = adapter.on_content_change(Box::new(move |_: &String| {
            counter.set(counter.get() + 1)
        }));
        handle
            .borrow_mut()
            .replace_text(&BlockPoint::new("p", 3), &BlockPoint::new("p", 3), "!")
            .unwrap();
        adapter.poll(Instant::now());
        assert_eq!(count.get(), 1);
        assert!(adapter.undo().unwrap());
        assert_eq!(adapter.get_text_content().unwrap(), "Title\nfirst\nnested\nend");
    }
}
