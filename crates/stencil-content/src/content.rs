//! JSON content documents: global content shared by every page, and one
//! document per page.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::loader::{file_stem, list_files, read_json, read_object, LoadError};

/// A page content document: string keys mapped to arbitrary JSON.
pub type ContentDocument = Map<String, Value>;

/// Global documents every site must provide.
pub const REQUIRED_GLOBALS: &[&str] = &["navigation", "footer"];

/// Reserved page field selecting a standalone template.
pub const LAYOUT_FIELD: &str = "layout";

/// A page content document together with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSource {
    /// File stem of the source file (`about.json` -> `about`)
    pub name: String,

    /// Source file path
    pub path: PathBuf,

    /// Parsed document
    pub document: ContentDocument,
}

impl PageSource {
    /// Load a single page document.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        Ok(Self {
            name: file_stem(path)?,
            path: path.to_path_buf(),
            document: read_object(path)?,
        })
    }

    /// The `layout` field, if the page sets one.
    pub fn layout(&self) -> Option<&str> {
        self.document.get(LAYOUT_FIELD).and_then(Value::as_str)
    }
}

/// Every content document under a content root.
#[derive(Debug, Clone, Default)]
pub struct ContentSet {
    /// Global documents keyed by file stem
    pub globals: BTreeMap<String, Value>,

    /// Page documents, sorted by file name
    pub pages: Vec<PageSource>,
}

impl ContentSet {
    /// Load `global/*.json` and `pages/*.json` below `content_dir`.
    ///
    /// `global/navigation.json` and `global/footer.json` are required. Any
    /// other global document is loaded as well and shared under its stem.
    pub fn load(content_dir: &Path) -> Result<Self, LoadError> {
        let global_dir = content_dir.join("global");

        for name in REQUIRED_GLOBALS {
            let path = global_dir.join(format!("{name}.json"));
            if !path.is_file() {
                return Err(LoadError::Missing(path.display().to_string()));
            }
        }

        let mut globals = BTreeMap::new();
        for path in list_files(&global_dir, Some("json"))? {
            globals.insert(file_stem(&path)?, read_json(&path)?);
        }

        let pages = list_files(&content_dir.join("pages"), Some("json"))?
            .iter()
            .map(|path| PageSource::load(path))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            "Loaded {} global documents and {} pages from {}",
            globals.len(),
            pages.len(),
            content_dir.display()
        );

        Ok(Self { globals, pages })
    }

    /// Build the rendering context for one page.
    ///
    /// Globals go in first and the page's own fields are layered on top, so a
    /// page field wins on a key collision. The page document is not modified.
    pub fn page_context(&self, page: &PageSource) -> Map<String, Value> {
        let mut context: Map<String, Value> = self
            .globals
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        for (key, value) in &page.document {
            context.insert(key.clone(), value.clone());
        }

        context
    }
}
