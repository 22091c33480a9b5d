//! # Adapter construction
//!
//! The host hands over an [`EditorHandle`], already tagged with its backend,
//! and that tag decides which adapter is built. Element fingerprinting
//! ([`detect_from_element`]) and instance-shape probing ([`detect_from_probe`])
//! only cross-check that choice and pick a type for untagged callers.
//!
//! - **Override**: an explicit type always wins over detection
//! - **Fallback**: inconclusive detection means textarea, with a warning
//! - **Scanning**: [`EditorFactory::create_multiple_adapters`] builds one
//!   adapter per bound element under a container

use std::collections::BTreeSet;

use thiserror::Error;

use crate::adapters::{AdapterOptions, EditorAdapter, NovelAdapter, TextareaAdapter, TiptapAdapter};
use crate::surfaces::{DomElement, EditorHandle};
use crate::types::EditorType;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FactoryError {
    #[error("Requested a {requested} adapter for a {actual} editor instance")]
    TypeMismatch {
        requested: EditorType,
        actual: EditorType,
    },
    #[error("No editor instance is mounted on <{0}>")]
    NotBound(String),
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// Backend suggested by an element's tag, classes and attributes, or `None`
/// when nothing conclusive was found.
pub fn detect_from_element(element: &DomElement) -> Option<EditorType> {
    if element.is_textarea() {
        return Some(EditorType::Textarea);
    }
    // Block editors render a ProseMirror view inside their container, so the
    // block markers are checked first.
    if element.descendants().iter().any(|e| e.has_novel_markers()) {
        return Some(EditorType::Novel);
    }
    if element.descendants().iter().any(|e| e.has_tiptap_markers()) {
        return Some(EditorType::Tiptap);
    }
    None
}

/// Like [`detect_from_element`], falling back to textarea.
pub fn detect_or_default(element: &DomElement) -> EditorType {
    detect_from_element(element).unwrap_or_else(|| {
        log::warn!(
            "could not detect editor type for <{}>, falling back to textarea",
            element.tag
        );
        EditorType::Textarea
    })
}

/// Constructor names that identify a block editor instance.
const BLOCK_EDITOR_CONSTRUCTORS: &[&str] = &["NovelEditor", "BlockNoteEditor"];

/// Member names and constructor of an editor instance, for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceProbe {
    pub members: BTreeSet<String>,
    pub constructor: Option<String>,
}

impl InstanceProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_member(mut self, member: &str) -> Self {
        self.members.insert(member.to_string());
        self
    }

    pub fn with_constructor(mut self, constructor: &str) -> Self {
        self.constructor = Some(constructor.to_string());
        self
    }

    /// The shape each backend exposes.
    pub fn of(handle: &EditorHandle) -> Self {
        let (members, constructor): (&[&str], &str) = match handle {
            EditorHandle::Textarea(_) => (
                &["value", "selectionStart", "selectionEnd", "setSelectionRange"],
                "HTMLTextAreaElement",
            ),
            EditorHandle::Tiptap(_) => (&["state", "commands", "getJSON", "getText"], "Editor"),
            EditorHandle::Novel(_) => (&["dom", "getJSON", "setContent", "document"], "NovelEditor"),
        };
        members
            .iter()
            .fold(Self::new(), |probe, member| probe.with_member(member))
            .with_constructor(constructor)
    }

    fn has(&self, member: &str) -> bool {
        self.members.contains(member)
    }
}

/// Guess a backend from an instance's shape. Diagnostic only: adapters are
/// always built from the handle's own tag.
pub fn detect_from_probe(probe: &InstanceProbe) -> Option<EditorType> {
    let block_constructor = probe
        .constructor
        .as_deref()
        .is_some_and(|name| BLOCK_EDITOR_CONSTRUCTORS.contains(&name));

    let detected = if probe.has("dom") && probe.has("getJSON") && probe.has("setContent") && block_constructor
    {
        Some(EditorType::Novel)
    } else if probe.has("state") && probe.has("commands") && probe.has("getJSON") {
        Some(EditorType::Tiptap)
    } else if probe.has("value") && probe.has("setSelectionRange") {
        Some(EditorType::Textarea)
    } else {
        None
    };
    log::debug!("instance probe {:?} detected {detected:?}", probe.constructor);
    detected
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Build an adapter for `handle`, unchecked.
pub fn create_adapter(handle: EditorHandle, options: &AdapterOptions) -> Box<dyn EditorAdapter> {
    match handle {
        EditorHandle::Textarea(surface) => Box::new(TextareaAdapter::new(surface, options)),
        EditorHandle::Tiptap(editor) => Box::new(TiptapAdapter::new(editor, options)),
        EditorHandle::Novel(editor) => Box::new(NovelAdapter::new(editor, options)),
    }
}

#[derive(Debug, Clone, Default)]
pub struct EditorFactory {
    options: AdapterOptions,
    /// Applies when a call passes no override of its own.
    default_override: Option<EditorType>,
}

impl EditorFactory {
    pub fn new(options: AdapterOptions) -> Self {
        Self {
            options,
            default_override: None,
        }
    }

    pub fn with_override(mut self, editor_type: EditorType) -> Self {
        self.default_override = Some(editor_type);
        self
    }

    pub fn options(&self) -> &AdapterOptions {
        &self.options
    }

    /// Build the adapter for `handle`. A requested type that disagrees with
    /// the handle's backend is an error.
    pub fn create(
        &self,
        handle: EditorHandle,
        override_type: Option<EditorType>,
    ) -> Result<Box<dyn EditorAdapter>, FactoryError> {
        let actual = handle.editor_type();
        if let Some(requested) = override_type.or(self.default_override)
            && requested != actual
        {
            return Err(FactoryError::TypeMismatch { requested, actual });
        }

        if let Some(probed) = detect_from_probe(&InstanceProbe::of(&handle))
            && probed != actual
        {
            log::warn!("instance looks like {probed} but is tagged {actual}");
        }
        log::debug!("creating {actual} adapter");
        Ok(create_adapter(handle, &self.options))
    }

    /// Build the adapter for the editor mounted on `element`.
    pub fn create_from_element(
        &self,
        element: &DomElement,
        override_type: Option<EditorType>,
    ) -> Result<Box<dyn EditorAdapter>, FactoryError> {
        let handle = element
            .binding
            .clone()
            .ok_or_else(|| FactoryError::NotBound(element.tag.clone()))?;

        let requested = override_type.or(self.default_override);
        if requested.is_none() {
            let detected = detect_or_default(element);
            if detected != handle.editor_type() {
                log::warn!(
                    "<{}> looks like {detected} but hosts a {} editor",
                    element.tag,
                    handle.editor_type()
                );
            }
        }
        self.create(handle, requested)
    }

    /// One adapter per bound element under `container` (the container
    /// included), in document order. Elements that fail are skipped with a
    /// warning.
    pub fn create_multiple_adapters(&self, container: &DomElement) -> Vec<Box<dyn EditorAdapter>> {
        container
            .descendants()
            .into_iter()
            .filter(|element| element.binding.is_some())
            .filter_map(|element| match self.create_from_element(element, None) {
                Ok(adapter) => Some(adapter),
                Err(error) => {
                    log::warn!("skipping <{}>: {error}", element.tag);
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surfaces::{NovelDocument, NovelEditor, TextareaSurface, TiptapEditor};
    use rstest::rstest;

    fn tiptap_handle() -> EditorHandle {
        EditorHandle::tiptap(TiptapEditor::from_text("rich"))
    }

    #[rstest]
    #[case(DomElement::new("textarea"), Some(EditorType::Textarea))]
    #[case(DomElement::new("div").with_class("ProseMirror"), Some(EditorType::Tiptap))]
    #[case(
        DomElement::new("div").with_attr("data-novel-editor", "").with_child(DomElement::new("div").with_class("ProseMirror")),
        Some(EditorType::Novel)
    )]
    #[case(DomElement::new("div").with_child(DomElement::new("div").with_class("tiptap")), Some(EditorType::Tiptap))]
    #[case(DomElement::new("div").with_attr("contenteditable", "true"), None)]
    fn element_detection(#[case] element: DomElement, #[case] expected: Option<EditorType>) {
        assert_eq!(detect_from_element(&element), expected);
    }

    #[test]
    fn inconclusive_detection_falls_back_to_textarea() {
        assert_eq!(detect_or_default(&DomElement::new("section")), EditorType::Textarea);
    }

    #[test]
    fn probe_detection() {
        let tiptap = InstanceProbe::new()
            .with_member("state")
            .with_member("commands")
            .with_member("getJSON");
        assert_eq!(detect_from_probe(&tiptap), Some(EditorType::Tiptap));

        let lookalike = InstanceProbe::new()
            .with_member("dom")
            .with_member("getJSON")
            .with_member("setContent")
            .with_constructor("Object");
        assert_eq!(detect_from_probe(&lookalike), None);

        let novel = lookalike.with_constructor("NovelEditor");
        assert_eq!(detect_from_probe(&novel), Some(EditorType::Novel));

        for handle in [
            EditorHandle::textarea(TextareaSurface::new("")),
            tiptap_handle(),
            EditorHandle::novel(NovelEditor::new(NovelDocument::default())),
        ] {
            assert_eq!(
                detect_from_probe(&InstanceProbe::of(&handle)),
                Some(handle.editor_type())
            );
        }
    }

    #[test]
    fn override_must_match_the_handle() {
        let factory = EditorFactory::default();
        let err = factory
            .create(tiptap_handle(), Some(EditorType::Novel))
            .err()
            .unwrap();
        assert_eq!(
            err,
            FactoryError::TypeMismatch {
                requested: EditorType::Novel,
                actual: EditorType::Tiptap
            }
        );

        let adapter = factory.create(tiptap_handle(), Some(EditorType::Tiptap)).unwrap();
        assert_eq!(adapter.editor_type(), EditorType::Tiptap);
    }

    #[test]
    fn factory_override_applies_when_call_has_none() {
        let factory = EditorFactory::default().with_override(EditorType::Textarea);
        assert!(factory.create(tiptap_handle(), None).is_err());
        assert!(factory
            .create(tiptap_handle(), Some(EditorType::Tiptap))
            .is_ok());
    }

    #[test]
    fn unbound_element_is_an_error() {
        let factory = EditorFactory::default();
        let err = factory
            .create_from_element(&DomElement::new("textarea"), None)
            .err()
            .unwrap();
        assert_eq!(err, FactoryError::NotBound("textarea".to_string()));
    }

    #[test]
    fn scans_container_for_bound_surfaces() {
        let container = DomElement::new("main")
            .with_child(DomElement::new("textarea").bind(EditorHandle::textarea(TextareaSurface::new("a"))))
            .with_child(
                DomElement::new("div")
                    .with_class("ProseMirror")
                    .bind(tiptap_handle()),
            )
            .with_child(DomElement::new("p"));

        let adapters = EditorFactory::default().create_multiple_adapters(&container);
        let types: Vec<_> = adapters.iter().map(|a| a.editor_type()).collect();
        assert_eq!(types, vec![EditorType::Textarea, EditorType::Tiptap]);
        assert_eq!(adapters[1].get_text_content().unwrap(), "rich");
    }
}
