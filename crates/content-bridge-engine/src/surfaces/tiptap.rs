//! Node-tree rich-text editor (Tiptap / ProseMirror document model).
//!
//! ## Position space
//!
//! Positions count tokens, not characters:
//!
//! - entering or leaving a non-leaf node consumes one position each
//! - every character of a text node consumes one position
//! - leaf atoms (image, hard break, horizontal rule) consume one position
//!
//! The document node's own tokens are not counted, so positions run from `0`
//! to `doc.content_size()`. In `<p>Hi</p><p>you</p>`, `H` sits at `1..2`,
//! the second paragraph's content starts at `5`.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::adapters::base::History;
use crate::surfaces::inline::{self, Unit};
use crate::types::Attributes;

pub mod node_types {
    pub const DOC: &str = "doc";
    pub const PARAGRAPH: &str = "paragraph";
    pub const HEADING: &str = "heading";
    pub const CODE_BLOCK: &str = "codeBlock";
    pub const BLOCKQUOTE: &str = "blockquote";
    pub const BULLET_LIST: &str = "bulletList";
    pub const ORDERED_LIST: &str = "orderedList";
    pub const LIST_ITEM: &str = "listItem";
    pub const TEXT: &str = "text";
    pub const IMAGE: &str = "image";
    pub const HARD_BREAK: &str = "hardBreak";
    pub const HORIZONTAL_RULE: &str = "horizontalRule";
}

use node_types::*;

/// An inline mark (bold, italic, link, code, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mark {
    #[serde(rename = "type")]
    pub mark_type: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: Attributes,
}

impl Mark {
    pub fn new(mark_type: &str) -> Self {
        Self {
            mark_type: mark_type.to_string(),
            attrs: Attributes::new(),
        }
    }

    pub fn link(href: &str) -> Self {
        let mut mark = Self::new("link");
        mark.attrs.insert("href".to_string(), href.into());
        mark
    }
}

/// A document node in the JSON shape `editor.getJSON()` produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PmNode {
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: Attributes,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<PmNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub marks: Vec<Mark>,
}

impl PmNode {
    pub fn new(node_type: &str) -> Self {
        Self {
            node_type: node_type.to_string(),
            attrs: Attributes::new(),
            content: Vec::new(),
            text: None,
            marks: Vec::new(),
        }
    }

    pub fn doc(content: Vec<PmNode>) -> Self {
        Self::new(DOC).with_content(content)
    }

    pub fn text(text: &str) -> Self {
        let mut node = Self::new(TEXT);
        node.text = Some(text.to_string());
        node
    }

    /// A paragraph holding `text`; empty text yields an empty paragraph.
    pub fn paragraph(text: &str) -> Self {
        Self::new(PARAGRAPH).with_content(inline_nodes(text))
    }

    pub fn heading(level: u8, text: &str) -> Self {
        Self::new(HEADING)
            .with_attr("level", level)
            .with_content(inline_nodes(text))
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.attrs.insert(key.to_string(), value.into());
        self
    }

    pub fn with_content(mut self, content: Vec<PmNode>) -> Self {
        self.content = content;
        self
    }

    pub fn with_marks(mut self, marks: Vec<Mark>) -> Self {
        self.marks = marks;
        self
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attrs.get(key)?.as_str()
    }

    pub fn is_text(&self) -> bool {
        self.node_type == TEXT
    }

    /// Nodes whose children are inline content.
    pub fn is_textblock(&self) -> bool {
        matches!(self.node_type.as_str(), PARAGRAPH | HEADING | CODE_BLOCK)
    }

    pub fn is_leaf_atom(&self) -> bool {
        matches!(self.node_type.as_str(), IMAGE | HARD_BREAK | HORIZONTAL_RULE)
    }

    /// Size in positions, including this node's own open/close tokens.
    pub fn node_size(&self) -> usize {
        if self.is_text() {
            self.text.as_deref().map(|t| t.chars().count()).unwrap_or(0)
        } else if self.is_leaf_atom() {
            1
        } else {
            self.content_size() + 2
        }
    }

    pub fn content_size(&self) -> usize {
        self.content.iter().map(PmNode::node_size).sum()
    }

    /// Text of this node's inline children; hard breaks become `\n`.
    pub fn inline_text(&self) -> String {
        let mut out = String::new();
        for child in &self.content {
            if let Some(text) = &child.text {
                out.push_str(text);
            } else if child.node_type == HARD_BREAK {
                out.push('\n');
            }
        }
        out
    }
}

/// Text nodes for `text`, keeping newlines as hard breaks.
fn inline_nodes(text: &str) -> Vec<PmNode> {
    let mut nodes = Vec::new();
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            nodes.push(PmNode::new(HARD_BREAK));
        }
        if !line.is_empty() {
            nodes.push(PmNode::text(line));
        }
    }
    nodes
}

// ---------------------------------------------------------------------------
// Inline units
// ---------------------------------------------------------------------------

pub type PmUnit = Unit<Vec<Mark>, PmNode>;

/// One unit per position of a textblock's content.
pub fn to_units(textblock: &PmNode) -> Vec<PmUnit> {
    let mut units = Vec::new();
    for child in &textblock.content {
        match &child.text {
            Some(text) => units.extend(text.chars().map(|c| Unit::Char(c, child.marks.clone()))),
            None => units.push(Unit::Atom(child.clone())),
        }
    }
    units
}

/// Fold units back into text nodes, merging runs with equal marks.
pub fn from_units(units: Vec<PmUnit>) -> Vec<PmNode> {
    let mut nodes: Vec<PmNode> = Vec::new();
    for unit in units {
        match unit {
            Unit::Char(c, marks) => match nodes.last_mut() {
                Some(last) if last.is_text() && last.marks == marks => {
                    if let Some(text) = last.text.as_mut() {
                        text.push(c);
                    }
                }
                _ => nodes.push(PmNode::text(&c.to_string()).with_marks(marks)),
            },
            Unit::Atom(node) => nodes.push(node),
        }
    }
    nodes
}

/// Plain-text width of a unit: hard breaks count as a newline, other atoms as nothing.
pub fn plain_width(unit: &PmUnit) -> usize {
    match unit {
        Unit::Char(..) => 1,
        Unit::Atom(node) if node.node_type == HARD_BREAK => 1,
        Unit::Atom(_) => 0,
    }
}

// ---------------------------------------------------------------------------
// Textblock index
// ---------------------------------------------------------------------------

/// Where a textblock sits, in both position spaces.
#[derive(Debug, Clone)]
pub struct TextblockRef {
    /// Child indices from the doc node down to the textblock.
    pub path: Vec<usize>,
    /// Position of the first content token.
    pub start: usize,
    pub units: Vec<PmUnit>,
    /// Offset of the block's first character in the plain-text projection.
    pub plain_start: usize,
    pub plain_len: usize,
}

impl TextblockRef {
    pub fn size(&self) -> usize {
        self.units.len()
    }

    pub fn end(&self) -> usize {
        self.start + self.size()
    }
}

/// Every textblock in document order. Plain text joins them with `\n`.
pub fn collect_textblocks(doc: &PmNode) -> Vec<TextblockRef> {
    fn walk(node: &PmNode, pos: usize, path: &mut Vec<usize>, out: &mut Vec<TextblockRef>) {
        let mut pos = pos;
        for (index, child) in node.content.iter().enumerate() {
            path.push(index);
            if child.is_textblock() {
                let units = to_units(child);
                let plain_len = units.iter().map(plain_width).sum();
                let plain_start = out
                    .last()
                    .map(|prev: &TextblockRef| prev.plain_start + prev.plain_len + 1)
                    .unwrap_or(0);
                out.push(TextblockRef {
                    path: path.clone(),
                    start: pos + 1,
                    units,
                    plain_start,
                    plain_len,
                });
            } else if !child.is_text() && !child.is_leaf_atom() {
                walk(child, pos + 1, path, out);
            }
            path.pop();
            pos += child.node_size();
        }
    }

    let mut out = Vec::new();
    walk(doc, 0, &mut Vec::new(), &mut out);
    out
}

/// Textblock index and local offset for a position. Positions between
/// textblocks resolve to the start of the following one.
pub fn resolve(blocks: &[TextblockRef], pos: usize) -> Option<(usize, usize)> {
    for (index, block) in blocks.iter().enumerate() {
        if pos < block.start {
            return Some((index, 0));
        }
        if pos <= block.end() {
            return Some((index, pos - block.start));
        }
    }
    blocks.last().map(|block| (blocks.len() - 1, block.size()))
}

fn node_at_mut<'a>(root: &'a mut PmNode, path: &[usize]) -> Option<&'a mut PmNode> {
    let mut node = root;
    for &index in path {
        node = node.content.get_mut(index)?;
    }
    Some(node)
}

fn remove_at(root: &mut PmNode, path: &[usize]) {
    if let Some((&last, parent_path)) = path.split_last()
        && let Some(parent) = node_at_mut(root, parent_path)
        && last < parent.content.len()
    {
        parent.content.remove(last);
    }
}

/// Drop container nodes left without content after a range deletion.
fn prune_empty_containers(node: &mut PmNode) {
    for child in node.content.iter_mut() {
        prune_empty_containers(child);
    }
    node.content.retain(|child| {
        child.is_text() || child.is_textblock() || child.is_leaf_atom() || !child.content.is_empty()
    });
}

// ---------------------------------------------------------------------------
// Editor
// ---------------------------------------------------------------------------

/// A `{from, to}` selection in node-tree positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NativeRange {
    pub from: usize,
    pub to: usize,
}

impl NativeRange {
    pub fn new(from: usize, to: usize) -> Self {
        if from <= to {
            Self { from, to }
        } else {
            Self { from: to, to: from }
        }
    }

    pub fn caret(pos: usize) -> Self {
        Self { from: pos, to: pos }
    }
}

/// Events the editor queues for observers (`selectionUpdate`, `update`, ...).
#[derive(Debug, Clone, PartialEq)]
pub enum TiptapEvent {
    SelectionUpdate(NativeRange),
    Update,
    Focus,
    Blur,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TiptapError {
    #[error("Position range {from}..{to} is outside the document (size {size})")]
    RangeError { from: usize, to: usize, size: usize },
    #[error("Editor is not editable")]
    NotEditable,
}

/// In-memory Tiptap editor: document, selection, transaction history.
pub struct TiptapEditor {
    doc: PmNode,
    selection: NativeRange,
    history: History<(PmNode, NativeRange)>,
    events: VecDeque<TiptapEvent>,
    focused: bool,
    editable: bool,
}

impl TiptapEditor {
    pub fn new(doc: PmNode) -> Self {
        let mut editor = Self {
            doc: normalize_doc(doc),
            selection: NativeRange::caret(1),
            history: History::new(),
            events: VecDeque::new(),
            focused: false,
            editable: true,
        };
        editor.selection = editor.clamp(editor.selection);
        editor
    }

    /// One paragraph per line.
    pub fn from_text(text: &str) -> Self {
        Self::new(PmNode::doc(text.split('\n').map(PmNode::paragraph).collect()))
    }

    pub fn from_json(json: &serde_json::Value) -> Result<Self, serde_json::Error> {
        Ok(Self::new(PmNode::deserialize(json)?))
    }

    pub fn get_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.doc).unwrap_or(serde_json::Value::Null)
    }

    pub fn doc(&self) -> &PmNode {
        &self.doc
    }

    pub fn content_size(&self) -> usize {
        self.doc.content_size()
    }

    pub fn textblocks(&self) -> Vec<TextblockRef> {
        collect_textblocks(&self.doc)
    }

    /// Plain text: textblocks joined with `\n`.
    pub fn get_text(&self) -> String {
        self.textblocks()
            .iter()
            .map(|block| units_text(&block.units))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Plain text between two positions.
    pub fn text_between(&self, from: usize, to: usize) -> String {
        let blocks = self.textblocks();
        let (Some((fi, fo)), Some((ti, to_off))) = (resolve(&blocks, from), resolve(&blocks, to))
        else {
            return String::new();
        };
        let mut parts = Vec::new();
        for (index, block) in blocks.iter().enumerate().take(ti + 1).skip(fi) {
            let start = if index == fi { fo } else { 0 };
            let end = if index == ti { to_off } else { block.size() };
            parts.push(units_text(&block.units[start.min(end)..end]));
        }
        parts.join("\n")
    }

    pub fn selection(&self) -> NativeRange {
        self.selection
    }

    pub fn set_text_selection(&mut self, from: usize, to: usize) {
        let range = self.clamp(NativeRange::new(from, to));
        if range != self.selection {
            self.selection = range;
            self.events.push_back(TiptapEvent::SelectionUpdate(range));
        }
    }

    /// Replace the whole document (`commands.setContent`).
    pub fn set_content(&mut self, doc: PmNode, emit_update: bool) {
        self.history.record((self.doc.clone(), self.selection));
        self.doc = normalize_doc(doc);
        self.selection = self.clamp(self.selection);
        if emit_update {
            self.events.push_back(TiptapEvent::Update);
        }
    }

    /// Replace `from..to` with `text` in one transaction and place the caret
    /// after the insertion (`commands.insertContentAt`).
    pub fn insert_content_at(
        &mut self,
        from: usize,
        to: usize,
        text: &str,
    ) -> Result<NativeRange, TiptapError> {
        if !self.editable {
            return Err(TiptapError::NotEditable);
        }
        let size = self.content_size();
        if from > to || to > size {
            return Err(TiptapError::RangeError { from, to, size });
        }

        self.history.record((self.doc.clone(), self.selection));
        let caret = replace_text_range(&mut self.doc, from, to, text);
        self.selection = self.clamp(NativeRange::caret(caret));
        self.events.push_back(TiptapEvent::Update);
        self.events.push_back(TiptapEvent::SelectionUpdate(self.selection));
        Ok(self.selection)
    }

    /// Simulate the user typing over the current selection.
    pub fn type_text(&mut self, text: &str) -> Result<NativeRange, TiptapError> {
        let NativeRange { from, to } = self.selection;
        self.insert_content_at(from, to, text)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo(&mut self) -> bool {
        match self.history.undo((self.doc.clone(), self.selection)) {
            Some((doc, selection)) => {
                self.restore(doc, selection);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.history.redo((self.doc.clone(), self.selection)) {
            Some((doc, selection)) => {
                self.restore(doc, selection);
                true
            }
            None => false,
        }
    }

    fn restore(&mut self, doc: PmNode, selection: NativeRange) {
        self.doc = doc;
        self.selection = self.clamp(selection);
        self.events.push_back(TiptapEvent::Update);
        self.events.push_back(TiptapEvent::SelectionUpdate(self.selection));
    }

    pub fn focus(&mut self) {
        if !self.focused {
            self.focused = true;
            self.events.push_back(TiptapEvent::Focus);
        }
    }

    pub fn blur(&mut self) {
        if self.focused {
            self.focused = false;
            self.events.push_back(TiptapEvent::Blur);
        }
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn set_editable(&mut self, editable: bool) {
        self.editable = editable;
    }

    /// Take every queued event, oldest first.
    pub fn drain_events(&mut self) -> Vec<TiptapEvent> {
        self.events.drain(..).collect()
    }

    fn clamp(&self, range: NativeRange) -> NativeRange {
        let size = self.content_size();
        NativeRange::new(range.from.min(size), range.to.min(size))
    }
}

impl std::fmt::Debug for TiptapEditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiptapEditor")
            .field("doc", &self.doc)
            .field("selection", &self.selection)
            .finish()
    }
}

fn units_text(units: &[PmUnit]) -> String {
    units
        .iter()
        .filter_map(|unit| match unit {
            Unit::Char(c, _) => Some(*c),
            Unit::Atom(node) if node.node_type == HARD_BREAK => Some('\n'),
            Unit::Atom(_) => None,
        })
        .collect()
}

/// Force a `doc` root holding at least one block.
fn normalize_doc(mut doc: PmNode) -> PmNode {
    if doc.node_type != DOC {
        doc = PmNode::doc(vec![doc]);
    }
    if doc.content.is_empty() {
        doc.content.push(PmNode::paragraph(""));
    }
    doc
}

/// Replace `from..to` with `text`, joining textblocks when the range spans
/// several. Returns the position right after the inserted text.
fn replace_text_range(doc: &mut PmNode, from: usize, to: usize, text: &str) -> usize {
    let blocks = collect_textblocks(doc);
    let (Some((fi, fo)), Some((ti, to_off))) = (resolve(&blocks, from), resolve(&blocks, to)) else {
        doc.content.push(PmNode::paragraph(text));
        return doc.content_size().saturating_sub(1);
    };
    let inserted = text.chars().count();

    if fi == ti {
        let mut units = blocks[fi].units.clone();
        inline::splice(&mut units, fo, to_off, text);
        if let Some(node) = node_at_mut(doc, &blocks[fi].path) {
            node.content = from_units(units);
        }
    } else {
        let mut units = blocks[fi].units.clone();
        units.truncate(fo);
        inline::splice(&mut units, fo, fo, text);
        units.extend(blocks[ti].units[to_off..].iter().cloned());
        if let Some(node) = node_at_mut(doc, &blocks[fi].path) {
            node.content = from_units(units);
        }
        for block in blocks[fi + 1..=ti].iter().rev() {
            remove_at(doc, &block.path);
        }
        prune_empty_containers(doc);
    }

    blocks[fi].start + fo + inserted
}
