//! Template fragments: components, the base layout and page templates.

use std::collections::btree_map::{BTreeMap, Entry};
use std::path::{Path, PathBuf};

use crate::loader::{file_stem, list_files, read_text, LoadError};
use crate::page::PageKind;

/// Stem of the base layout file inside `layouts/`.
pub const BASE_LAYOUT: &str = "base";

/// A reusable template fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    /// Name the component is included by
    pub name: String,

    /// Source file path
    pub source_path: PathBuf,

    /// Template text
    pub source: String,
}

/// Components addressable by name from any other template.
///
/// Built once per build and handed to the renderer; there is no shared
/// engine state between builds.
#[derive(Debug, Clone, Default)]
pub struct ComponentRegistry {
    components: BTreeMap<String, Component>,
}

impl ComponentRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component. Names must be unique.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        source_path: impl Into<PathBuf>,
        source: impl Into<String>,
    ) -> Result<(), LoadError> {
        let name = name.into();
        let source_path = source_path.into();

        match self.components.entry(name.clone()) {
            Entry::Occupied(existing) => Err(LoadError::DuplicateComponent {
                name,
                first: existing.get().source_path.display().to_string(),
                second: source_path.display().to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(Component {
                    name,
                    source_path,
                    source: source.into(),
                });
                Ok(())
            }
        }
    }

    /// Register every file in `components_dir` under its file stem.
    pub fn scan(&mut self, components_dir: &Path) -> Result<usize, LoadError> {
        let files = list_files(components_dir, None)?;

        for path in &files {
            self.register(file_stem(path)?, path.clone(), read_text(path)?)?;
        }

        Ok(files.len())
    }

    /// Look up a component by name.
    pub fn get(&self, name: &str) -> Option<&Component> {
        self.components.get(name)
    }

    /// Registered component names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.components.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Component> {
        self.components.values()
    }

    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.components.len()
    }
}

/// Every template fragment under a templates root.
#[derive(Debug, Clone)]
pub struct TemplateSet {
    /// Registered components
    pub components: ComponentRegistry,

    /// Base layout text
    pub base_layout: String,

    /// Page templates keyed by file stem
    pub pages: BTreeMap<String, String>,
}

impl TemplateSet {
    /// Load `components/*`, `layouts/base.*` and `pages/*` below
    /// `templates_dir`.
    pub fn load(templates_dir: &Path) -> Result<Self, LoadError> {
        let mut components = ComponentRegistry::new();
        let count = components.scan(&templates_dir.join("components"))?;
        tracing::debug!("Registered {} component templates", count);

        let layouts_dir = templates_dir.join("layouts");
        let base_path = list_files(&layouts_dir, None)?
            .into_iter()
            .find(|path| file_stem(path).is_ok_and(|stem| stem == BASE_LAYOUT))
            .ok_or_else(|| {
                let pattern = layouts_dir.join(format!("{BASE_LAYOUT}.*"));
                LoadError::Missing(pattern.display().to_string())
            })?;
        let base_layout = read_text(&base_path)?;

        let mut pages = BTreeMap::new();
        let mut page_paths: BTreeMap<String, PathBuf> = BTreeMap::new();
        for path in list_files(&templates_dir.join("pages"), None)? {
            let name = file_stem(&path)?;
            if let Some(first) = page_paths.get(&name) {
                return Err(LoadError::DuplicatePageTemplate {
                    name,
                    first: first.display().to_string(),
                    second: path.display().to_string(),
                });
            }
            pages.insert(name.clone(), read_text(&path)?);
            page_paths.insert(name, path);
        }

        Ok(Self {
            components,
            base_layout,
            pages,
        })
    }

    /// The page template a page kind renders with.
    pub fn page_template(&self, kind: &PageKind) -> Result<&str, LoadError> {
        self.pages
            .get(kind.template())
            .map(String::as_str)
            .ok_or_else(|| LoadError::MissingTemplate(kind.template().to_string()))
    }
}
