//! Minimal element tree for backend detection.
//!
//! Only what detection needs: tag, classes, attributes, children, and the
//! editor instance the host mounted on the element (if any).

use std::collections::BTreeMap;

use crate::surfaces::EditorHandle;

/// Classes ProseMirror-based editors put on their editable root.
pub const TIPTAP_MARKER_CLASSES: &[&str] = &["ProseMirror", "tiptap"];
pub const TIPTAP_MARKER_ATTRIBUTES: &[&str] = &["data-tiptap-editor"];

/// Classes and attributes of block editors.
pub const NOVEL_MARKER_CLASSES: &[&str] = &["novel-editor", "bn-editor", "bn-container"];
pub const NOVEL_MARKER_ATTRIBUTES: &[&str] = &["data-novel-editor", "data-blocknote"];

#[derive(Debug, Clone, Default)]
pub struct DomElement {
    pub tag: String,
    pub classes: Vec<String>,
    pub attributes: BTreeMap<String, String>,
    pub children: Vec<DomElement>,
    /// Editor instance mounted on this element by the host.
    pub binding: Option<EditorHandle>,
}

impl DomElement {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            ..Default::default()
        }
    }

    pub fn with_class(mut self, class: &str) -> Self {
        self.classes.push(class.to_string());
        self
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_child(mut self, child: DomElement) -> Self {
        self.children.push(child);
        self
    }

    pub fn bind(mut self, handle: EditorHandle) -> Self {
        self.binding = Some(handle);
        self
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn is_textarea(&self) -> bool {
        self.tag == "textarea"
    }

    pub fn is_content_editable(&self) -> bool {
        matches!(self.attr("contenteditable"), Some("" | "true"))
    }

    pub fn has_tiptap_markers(&self) -> bool {
        TIPTAP_MARKER_CLASSES.iter().any(|c| self.has_class(c))
            || TIPTAP_MARKER_ATTRIBUTES
                .iter()
                .any(|a| self.attributes.contains_key(*a))
    }

    pub fn has_novel_markers(&self) -> bool {
        NOVEL_MARKER_CLASSES.iter().any(|c| self.has_class(c))
            || NOVEL_MARKER_ATTRIBUTES
                .iter()
                .any(|a| self.attributes.contains_key(*a))
    }

    /// This element and all descendants, depth first.
    pub fn descendants(&self) -> Vec<&DomElement> {
        fn visit<'a>(element: &'a DomElement, out: &mut Vec<&'a DomElement>) {
            out.push(element);
            for child in &element.children {
                visit(child, out);
            }
        }
        let mut out = Vec::new();
        visit(self, &mut out);
        out
    }
}
