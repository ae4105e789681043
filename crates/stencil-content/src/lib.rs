//! Content and template loading for stencil sites.
//!
//! Reads JSON content documents and template fragments from disk and resolves
//! each page to the template that renders it. Everything is read fresh on
//! every call; nothing here caches between builds.

pub mod content;
pub mod loader;
pub mod page;
pub mod templates;

pub use content::{ContentDocument, ContentSet, PageSource};
pub use loader::LoadError;
pub use page::{PageDescriptor, PageKind, DEFAULT_STANDALONE_LAYOUTS, HOME_PAGE};
pub use templates::{ComponentRegistry, TemplateSet};
