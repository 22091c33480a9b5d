//! Block-JSON editor (Novel / BlockNote document model).
//!
//! A document is a `blocks` array; every block has an id, a type, props,
//! inline `content` (styled text and links) and nested `children`.
//! Native coordinates are `(block id, character offset)` pairs.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::adapters::base::History;
use crate::surfaces::inline::{self, Unit};
use crate::types::{Attributes, generate_block_id};

pub mod block_types {
    pub const PARAGRAPH: &str = "paragraph";
    pub const HEADING: &str = "heading";
    pub const BULLET_LIST_ITEM: &str = "bulletListItem";
    pub const NUMBERED_LIST_ITEM: &str = "numberedListItem";
    pub const CHECK_LIST_ITEM: &str = "checkListItem";
    pub const CODE_BLOCK: &str = "codeBlock";
    pub const QUOTE: &str = "quote";
    pub const IMAGE: &str = "image";
    pub const VIDEO: &str = "video";
    pub const AUDIO: &str = "audio";
    pub const FILE: &str = "file";
}

use block_types::*;

/// Inline content of a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InlineContent {
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        styles: Attributes,
    },
    Link {
        href: String,
        #[serde(default)]
        content: Vec<InlineContent>,
    },
}

impl InlineContent {
    pub fn text(text: &str) -> Self {
        InlineContent::Text {
            text: text.to_string(),
            styles: Attributes::new(),
        }
    }

    pub fn link(href: &str, text: &str) -> Self {
        InlineContent::Link {
            href: href.to_string(),
            content: vec![InlineContent::text(text)],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NovelBlock {
    pub id: String,
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub props: Attributes,
    #[serde(default)]
    pub content: Vec<InlineContent>,
    #[serde(default)]
    pub children: Vec<NovelBlock>,
}

impl NovelBlock {
    pub fn new(block_type: &str, text: &str) -> Self {
        Self::with_id(generate_block_id(), block_type, text)
    }

    pub fn with_id(id: impl Into<String>, block_type: &str, text: &str) -> Self {
        let content = if text.is_empty() {
            Vec::new()
        } else {
            vec![InlineContent::text(text)]
        };
        Self {
            id: id.into(),
            block_type: block_type.to_string(),
            props: Attributes::new(),
            content,
            children: Vec::new(),
        }
    }

    pub fn with_prop(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.props.insert(key.to_string(), value.into());
        self
    }

    pub fn with_children(mut self, children: Vec<NovelBlock>) -> Self {
        self.children = children;
        self
    }

    pub fn prop_str(&self, key: &str) -> Option<&str> {
        self.props.get(key)?.as_str()
    }

    /// Media blocks carry no inline text and take no line in the plain text.
    pub fn has_text(&self) -> bool {
        !matches!(self.block_type.as_str(), IMAGE | VIDEO | AUDIO | FILE)
    }

    pub fn inline_text(&self) -> String {
        units_text(&to_units(&self.content))
    }
}

/// The editor document, serialized as `{"blocks": [...]}`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NovelDocument {
    #[serde(default)]
    pub blocks: Vec<NovelBlock>,
}

impl NovelDocument {
    pub fn new(blocks: Vec<NovelBlock>) -> Self {
        Self { blocks }
    }

    /// One paragraph block per line.
    pub fn from_text(text: &str) -> Self {
        Self::new(
            text.split('\n')
                .map(|line| NovelBlock::new(PARAGRAPH, line))
                .collect(),
        )
    }

    pub fn find(&self, id: &str) -> Option<&NovelBlock> {
        let path = self.path_of(id)?;
        self.block_at(&path)
    }

    pub fn path_of(&self, id: &str) -> Option<Vec<usize>> {
        fn search(blocks: &[NovelBlock], id: &str, path: &mut Vec<usize>) -> bool {
            for (index, block) in blocks.iter().enumerate() {
                path.push(index);
                if block.id == id || search(&block.children, id, path) {
                    return true;
                }
                path.pop();
            }
            false
        }
        let mut path = Vec::new();
        search(&self.blocks, id, &mut path).then_some(path)
    }

    fn block_at(&self, path: &[usize]) -> Option<&NovelBlock> {
        let (first, rest) = path.split_first()?;
        let mut block = self.blocks.get(*first)?;
        for &index in rest {
            block = block.children.get(index)?;
        }
        Some(block)
    }

    fn block_at_mut(&mut self, path: &[usize]) -> Option<&mut NovelBlock> {
        let (first, rest) = path.split_first()?;
        let mut block = self.blocks.get_mut(*first)?;
        for &index in rest {
            block = block.children.get_mut(index)?;
        }
        Some(block)
    }

    /// Sibling list containing the block at `path`.
    fn siblings_mut(&mut self, path: &[usize]) -> Option<&mut Vec<NovelBlock>> {
        match path.split_last()? {
            (_, []) => Some(&mut self.blocks),
            (_, parent) => Some(&mut self.block_at_mut(parent)?.children),
        }
    }

    /// Text-bearing blocks in depth-first order with their plain-text spans.
    pub fn text_entries(&self) -> Vec<TextEntry> {
        fn walk(blocks: &[NovelBlock], path: &mut Vec<usize>, out: &mut Vec<TextEntry>) {
            for (index, block) in blocks.iter().enumerate() {
                path.push(index);
                if block.has_text() {
                    let plain_start = out
                        .last()
                        .map(|prev: &TextEntry| prev.plain_start + prev.len + 1)
                        .unwrap_or(0);
                    out.push(TextEntry {
                        id: block.id.clone(),
                        path: path.clone(),
                        plain_start,
                        len: block.inline_text().chars().count(),
                    });
                }
                walk(&block.children, path, out);
                path.pop();
            }
        }
        let mut out = Vec::new();
        walk(&self.blocks, &mut Vec::new(), &mut out);
        out
    }

    /// Plain text: text-bearing blocks joined with `\n`.
    pub fn plain_text(&self) -> String {
        self.text_entries()
            .iter()
            .filter_map(|entry| self.block_at(&entry.path))
            .map(NovelBlock::inline_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A text-bearing block's place in the plain-text projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEntry {
    pub id: String,
    pub path: Vec<usize>,
    pub plain_start: usize,
    pub len: usize,
}

// ---------------------------------------------------------------------------
// Inline units
// ---------------------------------------------------------------------------

/// Styles plus the link target a character sits under.
pub type NovelMarks = (Attributes, Option<String>);
pub type NovelUnit = Unit<NovelMarks, ()>;

pub fn to_units(content: &[InlineContent]) -> Vec<NovelUnit> {
    fn push(content: &[InlineContent], href: Option<&str>, out: &mut Vec<NovelUnit>) {
        for item in content {
            match item {
                InlineContent::Text { text, styles } => {
                    let marks = (styles.clone(), href.map(str::to_string));
                    out.extend(text.chars().map(|c| Unit::Char(c, marks.clone())));
                }
                InlineContent::Link { href, content } => push(content, Some(href), out),
            }
        }
    }
    let mut out = Vec::new();
    push(content, None, &mut out);
    out
}

/// Fold units back into styled text runs and links.
pub fn from_units(units: Vec<NovelUnit>) -> Vec<InlineContent> {
    let mut runs: Vec<(NovelMarks, String)> = Vec::new();
    for unit in units {
        if let Unit::Char(c, marks) = unit {
            match runs.last_mut() {
                Some((last, text)) if *last == marks => text.push(c),
                _ => runs.push((marks, c.to_string())),
            }
        }
    }

    let mut out: Vec<InlineContent> = Vec::new();
    for ((styles, href), text) in runs {
        let run = InlineContent::Text { text, styles };
        match href {
            None => out.push(run),
            Some(href) => match out.last_mut() {
                Some(InlineContent::Link {
                    href: last_href,
                    content,
                }) if *last_href == href => content.push(run),
                _ => out.push(InlineContent::Link {
                    href,
                    content: vec![run],
                }),
            },
        }
    }
    out
}

fn units_text(units: &[NovelUnit]) -> String {
    units
        .iter()
        .filter_map(|unit| match unit {
            Unit::Char(c, _) => Some(*c),
            Unit::Atom(()) => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Editor
// ---------------------------------------------------------------------------

/// A caret position in block coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockPoint {
    pub block_id: String,
    pub offset: usize,
}

impl BlockPoint {
    pub fn new(block_id: impl Into<String>, offset: usize) -> Self {
        Self {
            block_id: block_id.into(),
            offset,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRange {
    pub start: BlockPoint,
    pub end: BlockPoint,
}

/// Where `insert_blocks` places new blocks relative to the reference block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Before,
    After,
    Nested,
}

/// Partial block update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockUpdate {
    pub block_type: Option<String>,
    pub props: Option<Attributes>,
    pub content: Option<Vec<InlineContent>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NovelEvent {
    SelectionChange(Option<BlockRange>),
    ContentChange,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NovelError {
    #[error("Block not found: {0}")]
    UnknownBlock(String),
    #[error("Block range is reversed or outside the document")]
    InvalidRange,
}

pub struct NovelEditor {
    document: NovelDocument,
    selection: Option<BlockRange>,
    history: History<NovelDocument>,
    events: VecDeque<NovelEvent>,
    focused: bool,
}

impl NovelEditor {
    pub fn new(document: NovelDocument) -> Self {
        let mut document = document;
        if document.blocks.is_empty() {
            document.blocks.push(NovelBlock::new(PARAGRAPH, ""));
        }
        Self {
            document,
            selection: None,
            history: History::new(),
            events: VecDeque::new(),
            focused: false,
        }
    }

    pub fn from_json(json: &serde_json::Value) -> Result<Self, serde_json::Error> {
        Ok(Self::new(NovelDocument::deserialize(json)?))
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.document).unwrap_or(serde_json::Value::Null)
    }

    pub fn document(&self) -> &NovelDocument {
        &self.document
    }

    pub fn get_block(&self, id: &str) -> Option<&NovelBlock> {
        self.document.find(id)
    }

    pub fn get_text(&self) -> String {
        self.document.plain_text()
    }

    pub fn selection(&self) -> Option<&BlockRange> {
        self.selection.as_ref()
    }

    pub fn set_selection(&mut self, range: Option<BlockRange>) -> Result<(), NovelError> {
        let range = match range {
            Some(range) => Some(self.clamp_range(range)?),
            None => None,
        };
        if range != self.selection {
            self.selection = range.clone();
            self.events.push_back(NovelEvent::SelectionChange(range));
        }
        Ok(())
    }

    pub fn set_text_cursor(&mut self, point: BlockPoint) -> Result<(), NovelError> {
        self.set_selection(Some(BlockRange {
            start: point.clone(),
            end: point,
        }))
    }

    /// Swap in a whole new document (`replaceBlocks` over everything).
    pub fn replace_document(&mut self, document: NovelDocument) {
        self.commit();
        self.document = document;
        if self.document.blocks.is_empty() {
            self.document.blocks.push(NovelBlock::new(PARAGRAPH, ""));
        }
        self.selection = None;
        self.events.push_back(NovelEvent::ContentChange);
        self.events.push_back(NovelEvent::SelectionChange(None));
    }

    pub fn insert_blocks(
        &mut self,
        blocks: Vec<NovelBlock>,
        reference_id: &str,
        placement: Placement,
    ) -> Result<(), NovelError> {
        let path = self
            .document
            .path_of(reference_id)
            .ok_or_else(|| NovelError::UnknownBlock(reference_id.to_string()))?;
        self.commit();

        let index = path.last().copied().unwrap_or(0);
        match placement {
            Placement::Nested => {
                if let Some(block) = self.document.block_at_mut(&path) {
                    block.children.extend(blocks);
                }
            }
            Placement::Before | Placement::After => {
                let at = if placement == Placement::Before { index } else { index + 1 };
                if let Some(siblings) = self.document.siblings_mut(&path) {
                    siblings.splice(at..at, blocks);
                }
            }
        }
        self.events.push_back(NovelEvent::ContentChange);
        Ok(())
    }

    /// Append blocks at the end of the document.
    pub fn append_blocks(&mut self, blocks: Vec<NovelBlock>) {
        self.commit();
        self.document.blocks.extend(blocks);
        self.events.push_back(NovelEvent::ContentChange);
    }

    pub fn update_block(&mut self, id: &str, update: BlockUpdate) -> Result<(), NovelError> {
        let path = self
            .document
            .path_of(id)
            .ok_or_else(|| NovelError::UnknownBlock(id.to_string()))?;
        self.commit();
        if let Some(block) = self.document.block_at_mut(&path) {
            if let Some(block_type) = update.block_type {
                block.block_type = block_type;
            }
            if let Some(props) = update.props {
                block.props.extend(props);
            }
            if let Some(content) = update.content {
                block.content = content;
            }
        }
        self.events.push_back(NovelEvent::ContentChange);
        Ok(())
    }

    pub fn remove_blocks(&mut self, ids: &[&str]) -> Result<(), NovelError> {
        let mut paths = Vec::with_capacity(ids.len());
        for id in ids {
            let path = self
                .document
                .path_of(id)
                .ok_or_else(|| NovelError::UnknownBlock(id.to_string()))?;
            paths.push(path);
        }
        self.commit();
        // Later paths first so earlier ones stay valid.
        paths.sort();
        for path in paths.iter().rev() {
            if let (Some(siblings), Some(&index)) = (self.document.siblings_mut(path), path.last())
                && index < siblings.len()
            {
                siblings.remove(index);
            }
        }
        if self.document.blocks.is_empty() {
            self.document.blocks.push(NovelBlock::new(PARAGRAPH, ""));
        }
        self.selection = None;
        self.events.push_back(NovelEvent::ContentChange);
        Ok(())
    }

    /// Replace the text between two block points, merging blocks when the
    /// range spans several. Children of merged-away blocks move up into their
    /// parent. Returns the caret after the insertion.
    pub fn replace_text(
        &mut self,
        start: &BlockPoint,
        end: &BlockPoint,
        text: &str,
    ) -> Result<BlockPoint, NovelError> {
        let entries = self.document.text_entries();
        let index_of = |id: &str| {
            entries
                .iter()
                .position(|entry| entry.id == id)
                .ok_or_else(|| NovelError::UnknownBlock(id.to_string()))
        };
        let si = index_of(&start.block_id)?;
        let ei = index_of(&end.block_id)?;
        let so = start.offset.min(entries[si].len);
        let eo = end.offset.min(entries[ei].len);
        if si > ei || (si == ei && so > eo) {
            return Err(NovelError::InvalidRange);
        }

        self.commit();
        let first_path = entries[si].path.clone();
        let first_units = self
            .document
            .block_at(&first_path)
            .map(|block| to_units(&block.content))
            .unwrap_or_default();

        let mut units = first_units;
        if si == ei {
            inline::splice(&mut units, so, eo, text);
        } else {
            let tail = self
                .document
                .block_at(&entries[ei].path)
                .map(|block| to_units(&block.content))
                .unwrap_or_default();
            units.truncate(so);
            inline::splice(&mut units, so, so, text);
            units.extend(tail.into_iter().skip(eo));

            for entry in entries[si + 1..=ei].iter().rev() {
                self.remove_hoisting_children(&entry.path);
            }
        }

        if let Some(block) = self.document.block_at_mut(&first_path) {
            block.content = from_units(units);
        }

        let caret = BlockPoint::new(entries[si].id.clone(), so + text.chars().count());
        self.selection = Some(BlockRange {
            start: caret.clone(),
            end: caret.clone(),
        });
        self.events.push_back(NovelEvent::ContentChange);
        self.events
            .push_back(NovelEvent::SelectionChange(self.selection.clone()));
        Ok(caret)
    }

    /// Simulate typing over the current selection.
    pub fn type_text(&mut self, text: &str) -> Result<BlockPoint, NovelError> {
        let range = self.selection.clone().ok_or(NovelError::InvalidRange)?;
        self.replace_text(&range.start, &range.end, text)
    }

    fn remove_hoisting_children(&mut self, path: &[usize]) {
        let Some(&index) = path.last() else {
            return;
        };
        if let Some(siblings) = self.document.siblings_mut(path)
            && index < siblings.len()
        {
            let removed = siblings.remove(index);
            siblings.splice(index..index, removed.children);
        }
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo(&mut self) -> bool {
        match self.history.undo(self.document.clone()) {
            Some(previous) => {
                self.restore(previous);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.history.redo(self.document.clone()) {
            Some(next) => {
                self.restore(next);
                true
            }
            None => false,
        }
    }

    fn restore(&mut self, document: NovelDocument) {
        self.document = document;
        self.selection = None;
        self.events.push_back(NovelEvent::ContentChange);
        self.events.push_back(NovelEvent::SelectionChange(None));
    }

    fn commit(&mut self) {
        self.history.record(self.document.clone());
    }

    pub fn focus(&mut self) {
        self.focused = true;
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn drain_events(&mut self) -> Vec<NovelEvent> {
        self.events.drain(..).collect()
    }

    fn clamp_range(&self, range: BlockRange) -> Result<BlockRange, NovelError> {
        let clamp = |point: BlockPoint| -> Result<BlockPoint, NovelError> {
            let block = self
                .document
                .find(&point.block_id)
                .ok_or_else(|| NovelError::UnknownBlock(point.block_id.clone()))?;
            let len = block.inline_text().chars().count();
            Ok(BlockPoint::new(point.block_id, point.offset.min(len)))
        };
        Ok(BlockRange {
            start: clamp(range.start)?,
            end: clamp(range.end)?,
        })
    }
}

impl std::fmt::Debug for NovelEditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NovelEditor")
            .field("document", &self.document)
            .field("selection", &self.selection)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> NovelEditor {
        NovelEditor::new(NovelDocument::new(vec![
            NovelBlock::with_id("h", HEADING, "Title").with_prop("level", 1),
            NovelBlock::with_id("p", PARAGRAPH, "Body text").with_children(vec![
                NovelBlock::with_id("c", BULLET_LIST_ITEM, "child"),
            ]),
            NovelBlock::with_id("img", IMAGE, "").with_prop("url", "a.png"),
            NovelBlock::with_id("t", PARAGRAPH, "tail"),
        ]))
    }

    #[test]
    fn text_entries_walk_depth_first_and_skip_media() {
        let editor = sample();
        let entries = editor.document().text_entries();
        let ids: Vec<_> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["h", "p", "c", "t"]);
        assert_eq!(entries[2].plain_start, 16);
        assert_eq!(editor.get_text(), "Title\nBody text\nchild\ntail");
    }

    #[test]
    fn links_survive_inline_round_trip() {
        let content = vec![
            InlineContent::text("See "),
            InlineContent::link("https://example.com", "docs"),
        ];
        assert_eq!(from_units(to_units(&content)), content);
    }

    #[test]
    fn replace_within_block() {
        let mut editor = sample();
        let caret = editor
            .replace_text(&BlockPoint::new("p", 0), &BlockPoint::new("p", 4), "Main")
            .unwrap();
        assert_eq!(caret, BlockPoint::new("p", 4));
        assert_eq!(editor.get_block("p").unwrap().inline_text(), "Main text");
    }

    #[test]
    fn replace_across_blocks_merges_and_hoists_children() {
        let mut editor = sample();
        editor
            .replace_text(&BlockPoint::new("h", 2), &BlockPoint::new("p", 5), "")
            .unwrap();
        assert_eq!(editor.get_text(), "Titext\nchild\ntail");
        // "c" moved up to the top level where "p" used to be.
        assert_eq!(editor.document().path_of("c"), Some(vec![1]));
    }

    #[test]
    fn insert_update_remove_blocks() {
        let mut editor = sample();
        editor
            .insert_blocks(vec![NovelBlock::with_id("n", PARAGRAPH, "new")], "h", Placement::After)
            .unwrap();
        assert_eq!(editor.document().path_of("n"), Some(vec![1]));

        editor
            .update_block(
                "n",
                BlockUpdate {
                    block_type: Some(QUOTE.to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(editor.get_block("n").unwrap().block_type, QUOTE);

        editor.remove_blocks(&["n"]).unwrap();
        assert!(editor.get_block("n").is_none());
        assert!(matches!(
            editor.remove_blocks(&["missing"]),
            Err(NovelError::UnknownBlock(_))
        ));
    }

    #[test]
    fn undo_restores_document() {
        let mut editor = sample();
        editor.remove_blocks(&["t"]).unwrap();
        assert!(editor.undo());
        assert!(editor.get_block("t").is_some());
    }

    #[test]
    fn selection_offsets_are_clamped() {
        let mut editor = sample();
        editor
            .set_text_cursor(BlockPoint::new("t", 99))
            .unwrap();
        assert_eq!(editor.selection().unwrap().start, BlockPoint::new("t", 4));
        assert!(matches!(editor.drain_events()[0], NovelEvent::SelectionChange(Some(_))));
    }

    #[test]
    fn deserializes_blocknote_json() {
        let json = serde_json::json!({
            "blocks": [{
                "id": "x",
                "type": "paragraph",
                "content": [
                    {"type": "text", "text": "bold", "styles": {"bold": true}},
                    {"type": "link", "href": "https://a.io", "content": [{"type": "text", "text": "a"}]}
                ]
            }]
        });
        let editor = NovelEditor::from_json(&json).unwrap();
        assert_eq!(editor.get_text(), "bolda");
    }
}
