pub mod adapters;
pub mod events;
pub mod factory;
pub mod parser;
pub mod rich_text;
pub mod selection;
pub mod structured;
pub mod surfaces;
pub mod types;

// Re-export key types for easier usage
pub use adapters::{AdapterError, AdapterOptions, EditorAdapter, NovelAdapter, TextareaAdapter, TiptapAdapter};
pub use events::{ListenerSet, Subscription};
pub use factory::{EditorFactory, FactoryError, InstanceProbe, detect_from_element, detect_from_probe};
pub use parser::{ConversionError, parse_content};
pub use rich_text::{ProcessedResponse, RichTextElement, RichTextKind, process_ai_response};
pub use selection::{SelectionError, SelectionManager, reset_global_manager, with_global_manager};
pub use structured::{BlockPatch, StructuredContentHandler, StructuredError};
pub use surfaces::{DomElement, EditorHandle};
pub use types::*;
