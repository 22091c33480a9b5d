//! Adapter over a node-tree rich-text editor.
//!
//! Trait methods take plain-text offsets. [`PositionMap`] translates them to
//! node-tree positions (open/close tokens counted) and back; it is built from
//! the document each time a translation is needed, so it never goes stale.
//! Callers already holding node-tree positions use
//! [`TiptapAdapter::native_selection`] and [`TiptapAdapter::apply_native_change`].

use std::cell::{Ref, RefMut};
use std::time::Instant;

use serde_json::Value;

use super::base::{self, AdapterCore, char_len, snapshot_of};
use super::{AdapterError, AdapterOptions, EditorAdapter};
use crate::surfaces::TiptapHandle;
use crate::surfaces::inline;
use crate::surfaces::tiptap::{
    Mark, NativeRange, PmNode, TextblockRef, TiptapEditor, TiptapError, TiptapEvent, node_types::*,
    plain_width, resolve,
};
use crate::types::{
    BlockType, ContentBlock, ContentFormat, ContentInput, EditorCapabilities, EditorType,
    StructuredContent, TextChange, TextSelection,
};

static CAPABILITIES: EditorCapabilities = EditorCapabilities {
    supports_rich_text: true,
    supports_structured_content: true,
    supports_undo: true,
    supports_selection: true,
    supports_formatting: true,
    supported_formats: &[ContentFormat::Text, ContentFormat::Html, ContentFormat::Json],
};

// ---------------------------------------------------------------------------
// Position translation
// ---------------------------------------------------------------------------

/// Plain-text offset ↔ node-tree position translation for one document state.
pub struct PositionMap {
    blocks: Vec<TextblockRef>,
}

impl PositionMap {
    pub fn new(editor: &TiptapEditor) -> Self {
        Self {
            blocks: editor.textblocks(),
        }
    }

    /// Length of the plain-text projection.
    pub fn plain_len(&self) -> usize {
        self.blocks
            .last()
            .map(|block| block.plain_start + block.plain_len)
            .unwrap_or(0)
    }

    /// Node-tree position of a plain-text offset. An offset at a line end maps
    /// to the end of that textblock, not the start of the next.
    pub fn to_native(&self, plain: usize) -> usize {
        for block in &self.blocks {
            if plain <= block.plain_start + block.plain_len {
                let local = plain.saturating_sub(block.plain_start);
                return block.start + inline::unit_index_for_plain(&block.units, local, plain_width);
            }
        }
        self.blocks.last().map(TextblockRef::end).unwrap_or(0)
    }

    pub fn to_plain(&self, pos: usize) -> usize {
        match resolve(&self.blocks, pos) {
            Some((index, local)) => {
                let block = &self.blocks[index];
                block.plain_start + inline::plain_for_unit_index(&block.units, local, plain_width)
            }
            None => 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Node ↔ block lookup tables
// ---------------------------------------------------------------------------

/// Universal blocks for a document. Ids are derived from the node path so
/// they stay stable between reads of an unchanged document.
pub fn doc_to_structured(doc: &PmNode) -> StructuredContent {
    StructuredContent::new(child_blocks(doc, "node"))
}

fn child_blocks(node: &PmNode, parent_id: &str) -> Vec<ContentBlock> {
    node.content
        .iter()
        .enumerate()
        .flat_map(|(index, child)| node_to_blocks(child, format!("{parent_id}-{index}")))
        .collect()
}

/// A list node contributes one `list` item block per list item, styled the
/// way the Markdown reader and the block editor style theirs.
fn node_to_blocks(node: &PmNode, id: String) -> Vec<ContentBlock> {
    match node.node_type.as_str() {
        BULLET_LIST | ORDERED_LIST => {
            let style = if node.node_type == ORDERED_LIST { "numbered" } else { "bullet" };
            node.content
                .iter()
                .enumerate()
                .flat_map(|(index, child)| {
                    let child_id = format!("{id}-{index}");
                    if child.node_type == LIST_ITEM {
                        vec![list_item_block(child, child_id, style)]
                    } else {
                        node_to_blocks(child, child_id)
                    }
                })
                .collect()
        }
        _ => node_to_block(node, id).into_iter().collect(),
    }
}

fn list_item_block(node: &PmNode, id: String, style: &str) -> ContentBlock {
    let mut children = child_blocks(node, &id);
    let lead_is_text = node.content.first().is_some_and(PmNode::is_textblock);
    let content = if lead_is_text && !children.is_empty() {
        children.remove(0).content
    } else {
        String::new()
    };
    with_children(
        ContentBlock::with_id(id, BlockType::List, content).with_attribute("listStyle", style),
        children,
    )
}

fn node_to_block(node: &PmNode, id: String) -> Option<ContentBlock> {
    let block = match node.node_type.as_str() {
        PARAGRAPH => match whole_paragraph_link(node) {
            Some(href) => ContentBlock::with_id(id, BlockType::Link, node.inline_text())
                .with_attribute("href", href),
            None => ContentBlock::with_id(id, BlockType::Paragraph, node.inline_text()),
        },
        HEADING => {
            let level = node.attrs.get("level").and_then(Value::as_u64).unwrap_or(1);
            ContentBlock::with_id(id, BlockType::Heading, node.inline_text())
                .with_attribute("level", level)
        }
        CODE_BLOCK => {
            let block = ContentBlock::with_id(id, BlockType::Code, node.inline_text());
            match node.attr_str("language") {
                Some(language) => block.with_attribute("language", language),
                None => block,
            }
        }
        BLOCKQUOTE => with_children(
            ContentBlock::with_id(id.clone(), BlockType::Quote, ""),
            child_blocks(node, &id),
        ),
        // Reached only for a list item outside any list.
        LIST_ITEM => list_item_block(node, id, "bullet"),
        BULLET_LIST | ORDERED_LIST => {
            log::debug!("list node read outside a block sequence");
            return None;
        }
        IMAGE => {
            let mut block = ContentBlock::with_id(id, BlockType::Image, "");
            for key in ["src", "alt", "title"] {
                if let Some(value) = node.attr_str(key) {
                    block = block.with_attribute(key, value);
                }
            }
            block
        }
        HORIZONTAL_RULE | HARD_BREAK | TEXT => return None,
        other => {
            log::debug!("unmapped node type {other:?}, reading it as a paragraph");
            ContentBlock::with_id(id, BlockType::Paragraph, node.inline_text())
        }
    };
    Some(block)
}

fn with_children(block: ContentBlock, children: Vec<ContentBlock>) -> ContentBlock {
    if children.is_empty() {
        block
    } else {
        block.with_children(children)
    }
}

/// The href when every text node of the paragraph carries the same link.
fn whole_paragraph_link(node: &PmNode) -> Option<String> {
    let mut hrefs = node.content.iter().map(|child| {
        child
            .marks
            .iter()
            .find(|mark| mark.mark_type == "link")
            .and_then(|mark| mark.attrs.get("href"))
            .and_then(Value::as_str)
    });
    let first = hrefs.next()??;
    hrefs.all(|href| href == Some(first)).then(|| first.to_string())
}

pub fn structured_to_doc(content: &StructuredContent) -> PmNode {
    PmNode::doc(blocks_to_nodes(&content.content))
}

/// Runs of list item blocks with the same ordering share one list node.
fn blocks_to_nodes(blocks: &[ContentBlock]) -> Vec<PmNode> {
    let mut nodes = Vec::new();
    let mut index = 0;
    while index < blocks.len() {
        let block = &blocks[index];
        if block.is_list_item() {
            let ordered = block.is_ordered_list();
            let mut items = Vec::new();
            while index < blocks.len()
                && blocks[index].is_list_item()
                && blocks[index].is_ordered_list() == ordered
            {
                items.push(list_item_node(&blocks[index]));
                index += 1;
            }
            nodes.push(list_node(ordered, items));
            continue;
        }
        nodes.push(block_to_node(block));
        index += 1;
    }
    nodes
}

fn list_node(ordered: bool, items: Vec<PmNode>) -> PmNode {
    PmNode::new(if ordered { ORDERED_LIST } else { BULLET_LIST }).with_content(items)
}

fn list_item_node(block: &ContentBlock) -> PmNode {
    let mut content = vec![PmNode::paragraph(&block.content)];
    content.extend(blocks_to_nodes(block.children()));
    PmNode::new(LIST_ITEM).with_content(content)
}

fn block_to_node(block: &ContentBlock) -> PmNode {
    match block.block_type {
        BlockType::Paragraph => PmNode::paragraph(&block.content),
        BlockType::Heading => PmNode::heading(block.heading_level(), &block.content),
        BlockType::Code => {
            let mut node = PmNode::new(CODE_BLOCK);
            if !block.content.is_empty() {
                node = node.with_content(vec![PmNode::text(&block.content)]);
            }
            match block.attribute_str("language") {
                Some(language) => node.with_attr("language", language),
                None => node,
            }
        }
        BlockType::Quote => {
            let mut inner = Vec::new();
            if !block.content.is_empty() || block.children().is_empty() {
                inner.push(PmNode::paragraph(&block.content));
            }
            inner.extend(blocks_to_nodes(block.children()));
            PmNode::new(BLOCKQUOTE).with_content(inner)
        }
        BlockType::List if block.is_list_item() => {
            list_node(block.is_ordered_list(), vec![list_item_node(block)])
        }
        BlockType::List => {
            let mut items: Vec<PmNode> = block.list_items().iter().map(list_item_node).collect();
            if items.is_empty() {
                items.push(list_item_node(block));
            }
            list_node(block.is_ordered_list(), items)
        }
        BlockType::Link => {
            let href = block.attribute_str("href").unwrap_or_default();
            let text = if block.content.is_empty() { href } else { block.content.as_str() };
            PmNode::new(PARAGRAPH)
                .with_content(vec![PmNode::text(text).with_marks(vec![Mark::link(href)])])
        }
        BlockType::Image => {
            let mut node = PmNode::new(IMAGE);
            for key in ["src", "alt", "title"] {
                if let Some(value) = block.attribute_str(key) {
                    node = node.with_attr(key, value);
                }
            }
            node
        }
    }
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

pub struct TiptapAdapter {
    editor: Option<TiptapHandle>,
    core: AdapterCore,
}

impl TiptapAdapter {
    pub fn new(editor: TiptapHandle, options: &AdapterOptions) -> Self {
        // Events queued before attachment describe state we take as baseline.
        editor.borrow_mut().drain_events();
        let mut adapter = Self {
            editor: Some(editor),
            core: AdapterCore::new(options.poll_interval_for(EditorType::Tiptap)),
        };
        if let Ok(snapshot) = adapter.snapshot() {
            let selection = adapter.get_selection().ok().flatten();
            adapter.core.reset_baseline(snapshot, selection);
        }
        log::debug!("tiptap adapter attached");
        adapter
    }

    pub fn handle(&self) -> Option<&TiptapHandle> {
        self.editor.as_ref()
    }

    /// Selection in node-tree positions, untranslated.
    pub fn native_selection(&self) -> Result<NativeRange, AdapterError> {
        Ok(self.read()?.selection())
    }

    /// Replace node-tree range `from..to` with `text`. No plain-text
    /// translation happens here.
    pub fn apply_native_change(
        &mut self,
        from: usize,
        to: usize,
        text: &str,
    ) -> Result<NativeRange, AdapterError> {
        let result = self
            .write()
            .and_then(|mut editor| editor.insert_content_at(from, to, text).map_err(native_error));
        let range = self.route(result)?;
        self.drain_and_sync();
        Ok(range)
    }

    fn read(&self) -> Result<Ref<'_, TiptapEditor>, AdapterError> {
        base::read_surface(self.editor.as_ref())
    }

    fn write(&self) -> Result<RefMut<'_, TiptapEditor>, AdapterError> {
        base::write_surface(self.editor.as_ref())
    }

    fn snapshot(&self) -> Result<String, AdapterError> {
        Ok(snapshot_of(self.read()?.doc()))
    }

    /// Send failures to error listeners before handing them back.
    fn route<T>(&self, result: Result<T, AdapterError>) -> Result<T, AdapterError> {
        if let Err(error) = &result {
            self.core.report_error(error);
        }
        result
    }

    fn sync_content(&mut self) {
        let Ok((snapshot, text)) = self
            .read()
            .map(|editor| (snapshot_of(editor.doc()), editor.get_text()))
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

    /// Consume queued editor events, then bring listeners up to date.
    fn drain_and_sync(&mut self) -> bool {
        let Ok(events) = self.write().map(|mut editor| editor.drain_events()) else {
            return false;
        };
        let updated = events.iter().any(|event| matches!(event, TiptapEvent::Update));
        let selected = events
            .iter()
            .any(|event| matches!(event, TiptapEvent::SelectionUpdate(_)));
        if updated {
            self.sync_content();
        }
        if selected || updated {
            self.sync_selection();
        }
        !events.is_empty()
    }
}

fn native_error(error: TiptapError) -> AdapterError {
    match error {
        TiptapError::RangeError { from, to, size } => AdapterError::Validation {
            start: from,
            end: to,
            len: size,
        },
        TiptapError::NotEditable => AdapterError::Unavailable,
    }
}

impl EditorAdapter for TiptapAdapter {
    fn editor_type(&self) -> EditorType {
        EditorType::Tiptap
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
        Ok(doc_to_structured(self.read()?.doc()))
    }

    fn set_content(&mut self, content: ContentInput<'_>) -> Result<(), AdapterError> {
        let doc = match content {
            ContentInput::Text(text) => {
                PmNode::doc(text.split('\n').map(PmNode::paragraph).collect())
            }
            ContentInput::Structured(structured) => structured_to_doc(structured),
        };
        let result = self.write().map(|mut editor| editor.set_content(doc, true));
        self.route(result)?;
        self.drain_and_sync();
        Ok(())
    }

    fn get_selection(&self) -> Result<Option<TextSelection>, AdapterError> {
        let editor = self.read()?;
        let map = PositionMap::new(&editor);
        let NativeRange { from, to } = editor.selection();
        let text = editor.get_text();
        Ok(Some(base::selection_in(
            &text,
            map.to_plain(from),
            map.to_plain(to),
        )))
    }

    fn set_selection(&mut self, start: usize, end: usize) -> Result<(), AdapterError> {
        let result = self.write().and_then(|mut editor| {
            let map = PositionMap::new(&editor);
            base::validate_range(start, end, map.plain_len())?;
            editor.set_text_selection(map.to_native(start), map.to_native(end));
            Ok(())
        });
        self.route(result)?;
        self.drain_and_sync();
        Ok(())
    }

    fn apply_change(&mut self, change: &TextChange) -> Result<(), AdapterError> {
        let result = self.write().and_then(|mut editor| {
            let map = PositionMap::new(&editor);
            base::validate_change(change, map.plain_len())?;
            let from = map.to_native(change.start);
            let to = map.to_native(change.end);
            editor
                .insert_content_at(from, to, &change.new_text)
                .map_err(native_error)
        });
        self.route(result)?;
        self.drain_and_sync();
        log::debug!(
            "applied change at {} (+{} chars)",
            change.start,
            char_len(&change.new_text)
        );
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
        log::debug!("tiptap adapter destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn list_doc() -> PmNode {
        PmNode::doc(vec![
            PmNode::paragraph("Hi"),
            PmNode::new(BULLET_LIST).with_content(vec![
                PmNode::new(LIST_ITEM).with_content(vec![PmNode::paragraph("one")]),
            ]),
        ])
    }

    fn adapter(doc: PmNode) -> (TiptapHandle, TiptapAdapter) {
        let handle = Rc::new(RefCell::new(TiptapEditor::new(doc)));
        let adapter = TiptapAdapter::new(handle.clone(), &AdapterOptions::default());
        (handle, adapter)
    }

    #[test]
    fn position_map_counts_node_tokens() {
        let editor = TiptapEditor::new(list_doc());
        let map = PositionMap::new(&editor);
        assert_eq!(map.plain_len(), 6);
        assert_eq!(map.to_native(2), 3);
        assert_eq!(map.to_native(3), 7);
        assert_eq!(map.to_native(4), 8);
        assert_eq!(map.to_plain(8), 4);
        assert_eq!(map.to_plain(5), 3);
    }

    #[test]
    fn selection_is_reported_in_plain_offsets() {
        let (handle, adapter) = adapter(list_doc());
        handle.borrow_mut().set_text_selection(7, 10);
        let selection = adapter.get_selection().unwrap().unwrap();
        assert_eq!((selection.start, selection.end), (3, 6));
        assert_eq!(selection.text, "one");
        assert_eq!(adapter.native_selection().unwrap(), NativeRange::new(7, 10));
    }

    #[test]
    fn plain_change_spanning_blocks_joins_them() {
        let (_, mut adapter) = adapter(list_doc());
        adapter.apply_change(&TextChange::new(1, 4, "")).unwrap();
        assert_eq!(adapter.get_text_content().unwrap(), "Hne");
    }

    #[test]
    fn native_change_uses_positions_verbatim() {
        let (_, mut adapter) = adapter(list_doc());
        let caret = adapter.apply_native_change(7, 10, "two").unwrap();
        assert_eq!(caret, NativeRange::caret(10));
        assert_eq!(adapter.get_text_content().unwrap(), "Hi\ntwo");
    }

    #[test]
    fn failures_reach_error_listeners() {
        let (_, mut adapter) = adapter(list_doc());
        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = errors.clone();
        let _sub = adapter.on_error(Box::new(move |e: &AdapterError| sink.borrow_mut().push(e.clone())));

        let result = adapter.apply_change(&TextChange::new(0, 50, "x"));
        assert!(matches!(result, Err(AdapterError::Validation { .. })));
        assert_eq!(errors.borrow().len(), 1);
    }

    #[test]
    fn structured_round_trip_keeps_text() {
        let (_, mut adapter) = adapter(list_doc());
        let structured = adapter.get_structured_content().unwrap();
        let types: Vec<_> = structured.walk().map(|b| b.block_type).collect();
        assert_eq!(types, vec![BlockType::Paragraph, BlockType::List]);
        assert_eq!(structured.content[1].content, "one");
        assert_eq!(structured.content[1].attribute_str("listStyle"), Some("bullet"));
        assert_eq!(base::extract_plain_text(&structured), "Hi\none");

        adapter.set_content((&structured).into()).unwrap();
        assert_eq!(adapter.get_text_content().unwrap(), "Hi\none");
        assert_eq!(adapter.get_structured_content().unwrap(), structured);
    }

    #[test]
    fn ordered_list_renders_as_numbered_items() {
        let doc = PmNode::doc(vec![PmNode::new(ORDERED_LIST).with_content(vec![
            PmNode::new(LIST_ITEM).with_content(vec![PmNode::paragraph("one")]),
            PmNode::new(LIST_ITEM).with_content(vec![PmNode::paragraph("two")]),
        ])]);
        let (_, adapter) = adapter(doc.clone());

        let html = adapter.get_html().unwrap();
        assert!(html.contains("<ol>\n<li>one</li>\n<li>two</li>\n</ol>"), "{html}");
        let structured = adapter.get_structured_content().unwrap();
        assert_eq!(
            crate::parser::structured_to_markdown(&structured),
            "1. one\n2. two"
        );
        assert_eq!(structured_to_doc(&structured), doc);
    }

    #[test]
    fn adjacent_lists_of_different_kinds_stay_apart() {
        let doc = PmNode::doc(vec![
            PmNode::new(BULLET_LIST).with_content(vec![
                PmNode::new(LIST_ITEM).with_content(vec![PmNode::paragraph("a")]),
            ]),
            PmNode::new(ORDERED_LIST).with_content(vec![
                PmNode::new(LIST_ITEM).with_content(vec![PmNode::paragraph("b")]),
            ]),
        ]);
        assert_eq!(structured_to_doc(&doc_to_structured(&doc)), doc);
    }

    #[test]
    fn link_paragraph_maps_to_link_block() {
        let doc = PmNode::doc(vec![PmNode::new(PARAGRAPH).with_content(vec![
            PmNode::text("docs").with_marks(vec![Mark::link("https://example.com")]),
        ])]);
        let structured = doc_to_structured(&doc);
        assert_eq!(structured.content[0].block_type, BlockType::Link);
        assert_eq!(
            structured.content[0].attribute_str("href"),
            Some("https://example.com")
        );
        assert_eq!(structured_to_doc(&structured), doc);
    }

    #[test]
    fn editor_events_notify_without_waiting_for_the_poll_interval() {
        let (handle, mut adapter) = adapter(list_doc());
        let t0 = Instant::now();
        adapter.poll(t0);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let _sub = adapter.on_content_change(Box::new(move |text: &String| {
            sink.borrow_mut().push(text.clone())
        }));

        handle.borrow_mut().set_text_selection(3, 3);
        handle.borrow_mut().type_text("!").unwrap();
        adapter.poll(t0 + std::time::Duration::from_millis(10));

        assert_eq!(*seen.borrow(), vec!["Hi!\none".to_string()]);
        assert!(adapter.is_dirty());
    }

    #[test]
    fn undo_reverts_the_last_change() {
        let (_, mut adapter) = adapter(list_doc());
        adapter.apply_change(&TextChange::new(0, 2, "Hey")).unwrap();
        assert!(adapter.can_undo());
        assert_eq!(adapter.undo(), Ok(true));
        assert_eq!(adapter.get_text_content().unwrap(), "Hi\none");
        assert!(!adapter.is_dirty());
    }
}
