use std::collections::HashMap;

use crate::types::{Attributes, BlockType, ContentBlock};

/// Slot index of a node in a [`BlockArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeKey(usize);

/// A block without its subtree; children are referenced by key.
#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub id: String,
    pub block_type: BlockType,
    pub content: String,
    pub attributes: Option<Attributes>,
    /// `None` when the source block had no `children` field.
    pub children: Option<Vec<NodeKey>>,
    pub parent: Option<NodeKey>,
}

/// Flat storage for a block tree. Freed slots are reused.
#[derive(Debug, Clone, Default)]
pub(crate) struct BlockArena {
    slots: Vec<Option<Node>>,
    free: Vec<usize>,
    pub roots: Vec<NodeKey>,
    /// First node (in document order) carrying each id.
    index: HashMap<String, NodeKey>,
    saw_duplicate_ids: bool,
}

impl BlockArena {
    pub fn from_blocks(blocks: &[ContentBlock]) -> Self {
        let mut arena = Self::default();
        let roots = blocks
            .iter()
            .map(|block| arena.alloc_tree(block, None))
            .collect();
        arena.roots = roots;
        arena.reindex();
        arena
    }

    pub fn get(&self, key: NodeKey) -> Option<&Node> {
        self.slots.get(key.0)?.as_ref()
    }

    pub fn get_mut(&mut self, key: NodeKey) -> Option<&mut Node> {
        self.slots.get_mut(key.0)?.as_mut()
    }

    pub fn key_of(&self, id: &str) -> Option<NodeKey> {
        self.index.get(id).copied()
    }

    pub fn children(&self, key: NodeKey) -> &[NodeKey] {
        self.get(key)
            .and_then(|node| node.children.as_deref())
            .unwrap_or(&[])
    }

    /// Store `block` and its subtree under `parent`. The caller links the
    /// returned key into the parent's child list (or the roots).
    pub fn alloc_tree(&mut self, block: &ContentBlock, parent: Option<NodeKey>) -> NodeKey {
        let key = self.alloc(Node {
            id: block.id.clone(),
            block_type: block.block_type,
            content: block.content.clone(),
            attributes: block.attributes.clone(),
            children: None,
            parent,
        });
        if let Some(children) = &block.children {
            let keys = children
                .iter()
                .map(|child| self.alloc_tree(child, Some(key)))
                .collect();
            if let Some(node) = self.get_mut(key) {
                node.children = Some(keys);
            }
        }
        self.note_id(&block.id, key);
        key
    }

    fn alloc(&mut self, node: Node) -> NodeKey {
        match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(node);
                NodeKey(slot)
            }
            None => {
                self.slots.push(Some(node));
                NodeKey(self.slots.len() - 1)
            }
        }
    }

    fn note_id(&mut self, id: &str, key: NodeKey) {
        if self.index.contains_key(id) {
            self.saw_duplicate_ids = true;
        } else {
            self.index.insert(id.to_string(), key);
        }
    }

    /// Free `key` and its subtree. The caller unlinks it first.
    pub fn free_tree(&mut self, key: NodeKey) {
        let children = self.children(key).to_vec();
        for child in children {
            self.free_tree(child);
        }
        if let Some(node) = self.slots.get_mut(key.0).and_then(Option::take) {
            if self.index.get(&node.id) == Some(&key) {
                self.index.remove(&node.id);
            }
            self.free.push(key.0);
        }
    }

    /// Rebuild the id index after relinking or removal when ids were ever
    /// shared.
    pub fn settle_index(&mut self) {
        if self.saw_duplicate_ids {
            self.reindex();
        }
    }

    fn reindex(&mut self) {
        self.index.clear();
        let order = self.preorder();
        for key in order {
            if let Some(id) = self.get(key).map(|node| node.id.clone()) {
                self.index.entry(id).or_insert(key);
            }
        }
    }

    /// Child list that holds `key`: its parent's, or the roots.
    pub fn siblings_mut(&mut self, parent: Option<NodeKey>) -> Option<&mut Vec<NodeKey>> {
        match parent {
            None => Some(&mut self.roots),
            Some(parent) => Some(self.get_mut(parent)?.children.get_or_insert_with(Vec::new)),
        }
    }

    pub fn unlink(&mut self, key: NodeKey) {
        let parent = self.get(key).and_then(|node| node.parent);
        if let Some(siblings) = self.siblings_mut(parent) {
            siblings.retain(|sibling| *sibling != key);
        }
    }

    /// Link `key` under `parent` at `position` (clamped; `None` appends).
    /// A shared id resolves to whichever copy now comes first.
    pub fn link(&mut self, key: NodeKey, parent: Option<NodeKey>, position: Option<usize>) {
        if let Some(node) = self.get_mut(key) {
            node.parent = parent;
        }
        if let Some(siblings) = self.siblings_mut(parent) {
            let at = position.unwrap_or(siblings.len()).min(siblings.len());
            siblings.insert(at, key);
        }
        self.settle_index();
    }

    /// Whether `key` is `ancestor` or lies below it.
    pub fn is_within(&self, key: NodeKey, ancestor: NodeKey) -> bool {
        let mut current = Some(key);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.get(node).and_then(|n| n.parent);
        }
        false
    }

    /// Every live key in document order.
    pub fn preorder(&self) -> Vec<NodeKey> {
        let mut order = Vec::new();
        let mut stack: Vec<NodeKey> = self.roots.iter().rev().copied().collect();
        while let Some(key) = stack.pop() {
            order.push(key);
            stack.extend(self.children(key).iter().rev());
        }
        order
    }

    /// Rebuild the owned block for `key` and its subtree.
    pub fn materialize(&self, key: NodeKey) -> Option<ContentBlock> {
        let node = self.get(key)?;
        let children = node.children.as_ref().map(|keys| {
            keys.iter()
                .filter_map(|child| self.materialize(*child))
                .collect()
        });
        Some(ContentBlock {
            id: node.id.clone(),
            block_type: node.block_type,
            content: node.content.clone(),
            attributes: node.attributes.clone(),
            children,
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}
