//! # Editing surfaces
//!
//! In-memory models of the three backend editors an adapter can be bound to.
//! The host owns each surface through a shared handle (`Rc<RefCell<_>>`) and
//! mutates it the way a user would (typing, selecting); adapters observe it.
//!
//! - **`textarea`**: a linear rope buffer with a character selection
//! - **`tiptap`**: a node-tree document with token-counted positions
//! - **`novel`**: a block-JSON document with `(block id, offset)` coordinates
//! - **`dom`**: a minimal element tree used for backend detection
//! - **`inline`**: styled-character runs shared by the tree surfaces

pub mod dom;
pub mod inline;
pub mod novel;
pub mod textarea;
pub mod tiptap;

use std::cell::RefCell;
use std::rc::Rc;

pub use dom::DomElement;
pub use novel::{NovelBlock, NovelDocument, NovelEditor};
pub use textarea::TextareaSurface;
pub use tiptap::{PmNode, TiptapEditor};

use crate::types::EditorType;

pub type TextareaHandle = Rc<RefCell<TextareaSurface>>;
pub type TiptapHandle = Rc<RefCell<TiptapEditor>>;
pub type NovelHandle = Rc<RefCell<NovelEditor>>;

/// A live editor instance, tagged with its backend by the host integration.
#[derive(Clone)]
pub enum EditorHandle {
    Textarea(TextareaHandle),
    Tiptap(TiptapHandle),
    Novel(NovelHandle),
}

impl EditorHandle {
    pub fn textarea(surface: TextareaSurface) -> Self {
        EditorHandle::Textarea(Rc::new(RefCell::new(surface)))
    }

    pub fn tiptap(editor: TiptapEditor) -> Self {
        EditorHandle::Tiptap(Rc::new(RefCell::new(editor)))
    }

    pub fn novel(editor: NovelEditor) -> Self {
        EditorHandle::Novel(Rc::new(RefCell::new(editor)))
    }

    pub fn editor_type(&self) -> EditorType {
        match self {
            EditorHandle::Textarea(_) => EditorType::Textarea,
            EditorHandle::Tiptap(_) => EditorType::Tiptap,
            EditorHandle::Novel(_) => EditorType::Novel,
        }
    }
}

impl std::fmt::Debug for EditorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EditorHandle::{}", self.editor_type())
    }
}
