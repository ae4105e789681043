//! Page descriptors: which template renders a page and where it is written.

use crate::content::{ContentDocument, PageSource, LAYOUT_FIELD};

/// Source file stem of the home page. Its output is always `index.html`.
pub const HOME_PAGE: &str = "home";

/// Source file stem of the specifications page.
pub const SPECIFICATIONS_PAGE: &str = "specifications";

/// Layouts rendered without the base layout wrapper unless configured
/// otherwise.
pub const DEFAULT_STANDALONE_LAYOUTS: &[&str] = &["landing-page-anduril"];

/// The kind of a page, resolved once per content document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageKind {
    /// Complete document rendered by `pages/<template>`, never wrapped
    Standalone { template: String },

    /// The site's home page
    Home,

    /// The specifications page
    Specifications,

    /// Everything else
    Landing,
}

impl PageKind {
    /// Resolve a page's kind.
    ///
    /// An explicit `layout` naming a standalone template takes priority over
    /// the file-name convention; anything unmatched falls back to
    /// [`PageKind::Landing`].
    pub fn resolve(name: &str, document: &ContentDocument, standalone_layouts: &[String]) -> Self {
        if let Some(layout) = document.get(LAYOUT_FIELD).and_then(|v| v.as_str()) {
            if standalone_layouts.iter().any(|s| s == layout) {
                return Self::Standalone {
                    template: layout.to_string(),
                };
            }
            tracing::debug!("Ignoring non-standalone layout '{}' on page {}", layout, name);
        }

        match name {
            HOME_PAGE => Self::Home,
            SPECIFICATIONS_PAGE => Self::Specifications,
            _ => Self::Landing,
        }
    }

    /// Stem of the page template under `templates/pages/`.
    pub fn template(&self) -> &str {
        match self {
            Self::Standalone { template } => template,
            Self::Home => "home-page",
            Self::Specifications => "specs-page",
            Self::Landing => "landing-page",
        }
    }

    /// Whether the rendered body is the final document.
    pub fn is_standalone(&self) -> bool {
        matches!(self, Self::Standalone { .. })
    }
}

/// A page to be rendered: its name and resolved kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDescriptor {
    /// Source file stem
    pub name: String,

    /// Resolved page kind
    pub kind: PageKind,
}

impl PageDescriptor {
    pub fn new(name: impl Into<String>, kind: PageKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Describe a loaded page.
    pub fn resolve(page: &PageSource, standalone_layouts: &[String]) -> Self {
        Self::new(
            page.name.clone(),
            PageKind::resolve(&page.name, &page.document, standalone_layouts),
        )
    }

    /// Output file name: `index.html` for the home page, `<name>.html`
    /// otherwise.
    pub fn output_file_name(&self) -> String {
        if self.name == HOME_PAGE {
            "index.html".to_string()
        } else {
            format!("{}.html", self.name)
        }
    }
}
