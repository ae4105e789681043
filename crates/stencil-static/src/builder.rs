//! Static site builder.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use stencil_content::{
    ContentSet, LoadError, PageDescriptor, TemplateSet, DEFAULT_STANDALONE_LAYOUTS,
};

use crate::assets::AssetPipeline;
use crate::templates::{RenderError, TemplateEngine};

/// Configuration for building a static site.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Content root (`global/`, `pages/`)
    pub content_dir: PathBuf,

    /// Template root (`components/`, `layouts/`, `pages/`)
    pub templates_dir: PathBuf,

    /// Output directory
    pub output_dir: PathBuf,

    /// Static stylesheets to copy, if any
    pub styles_dir: Option<PathBuf>,

    /// Subdirectory of the output the styles are copied into
    pub styles_subdir: String,

    /// `layout` values that select a standalone template
    pub standalone_layouts: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            content_dir: PathBuf::from("content"),
            templates_dir: PathBuf::from("templates"),
            output_dir: PathBuf::from("dist"),
            styles_dir: Some(PathBuf::from("css")),
            styles_subdir: "css".to_string(),
            standalone_layouts: DEFAULT_STANDALONE_LAYOUTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Result of a build operation.
#[derive(Debug)]
pub struct BuildResult {
    /// Number of pages generated
    pub pages: usize,

    /// Number of style files copied
    pub styles: usize,

    /// Total build time in milliseconds
    pub duration_ms: u64,

    /// Output directory
    pub output_dir: PathBuf,
}

/// Errors that can occur during build. All of them abort the build.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("Pages {first} and {second} both write {file}")]
    OutputConflict {
        file: String,
        first: String,
        second: String,
    },

    #[error("Styles output {dest} lies inside the styles directory {source_dir}")]
    StylesNested { source_dir: String, dest: String },

    #[error("Failed to read {path}: {message}")]
    Read { path: String, message: String },

    #[error("Failed to write {path}: {message}")]
    Write { path: String, message: String },
}

impl BuildError {
    pub(crate) fn write(path: &Path, e: io::Error) -> Self {
        Self::Write {
            path: path.display().to_string(),
            message: e.to_string(),
        }
    }
}

/// A fully rendered page, held in memory until it is written.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPage {
    pub descriptor: PageDescriptor,
    pub html: String,
}

impl RenderedPage {
    pub fn output_file_name(&self) -> String {
        self.descriptor.output_file_name()
    }

    /// Write the page into `output_dir`, creating the directory if needed
    /// and overwriting any existing file.
    pub fn write(&self, output_dir: &Path) -> Result<PathBuf, BuildError> {
        fs::create_dir_all(output_dir).map_err(|e| BuildError::write(output_dir, e))?;

        let path = output_dir.join(self.output_file_name());
        fs::write(&path, &self.html).map_err(|e| BuildError::write(&path, e))?;

        Ok(path)
    }
}

/// Static site builder.
///
/// Every call to [`StaticBuilder::build`] reads all inputs fresh and
/// regenerates the whole site.
pub struct StaticBuilder {
    config: BuildConfig,
}

impl StaticBuilder {
    /// Create a new static builder.
    pub fn new(config: BuildConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Build the static site.
    ///
    /// Every page is rendered before anything is written, so a load or
    /// render failure leaves the output directory untouched.
    pub fn build(&self) -> Result<BuildResult, BuildError> {
        let start = Instant::now();

        tracing::debug!("Templates: {}", self.config.templates_dir.display());
        tracing::debug!("Content: {}", self.config.content_dir.display());
        tracing::debug!("Output: {}", self.config.output_dir.display());

        let pages = self.render()?;

        fs::create_dir_all(&self.config.output_dir)
            .map_err(|e| BuildError::write(&self.config.output_dir, e))?;
        let styles_copy = self.styles_copy()?;

        for page in &pages {
            page.write(&self.config.output_dir)?;
            tracing::info!("✅ Built {}", page.output_file_name());
        }

        let styles = match styles_copy {
            Some((source, dest)) => {
                let copied = AssetPipeline::copy_dir(&source, &dest)?;
                tracing::info!("Copied {} style files from {}", copied, source.display());
                copied
            }
            None => 0,
        };

        Ok(BuildResult {
            pages: pages.len(),
            styles,
            duration_ms: start.elapsed().as_millis() as u64,
            output_dir: self.config.output_dir.clone(),
        })
    }

    /// Load every input and render every page in memory.
    pub fn render(&self) -> Result<Vec<RenderedPage>, BuildError> {
        let templates = TemplateSet::load(&self.config.templates_dir)?;
        tracing::info!(
            "Registered {} component partials",
            templates.components.len()
        );

        let content = ContentSet::load(&self.config.content_dir)?;
        let engine = TemplateEngine::new(&templates)?;

        let descriptors: Vec<PageDescriptor> = content
            .pages
            .iter()
            .map(|page| PageDescriptor::resolve(page, &self.config.standalone_layouts))
            .collect();

        check_outputs(&descriptors)?;
        for descriptor in &descriptors {
            templates.page_template(&descriptor.kind)?;
        }

        content
            .pages
            .iter()
            .zip(descriptors)
            .map(|(page, descriptor)| {
                let context = content.page_context(page);
                let html = engine.render_page(&descriptor, &context)?;
                Ok(RenderedPage { descriptor, html })
            })
            .collect()
    }

    /// Where the styles directory should be copied, if anywhere.
    ///
    /// Returns `None` when no styles directory is configured, when it does
    /// not exist, or when the output already is the styles directory (the
    /// site is built in place). A destination nested inside the source is
    /// an error, since the copy would feed on itself.
    fn styles_copy(&self) -> Result<Option<(PathBuf, PathBuf)>, BuildError> {
        let Some(styles_dir) = &self.config.styles_dir else {
            return Ok(None);
        };

        if !styles_dir.is_dir() {
            tracing::warn!("Styles directory not found: {}", styles_dir.display());
            return Ok(None);
        }

        let source = canonical(styles_dir)?;
        let mut dest = canonical(&self.config.output_dir)?.join(&self.config.styles_subdir);
        if dest.exists() {
            dest = canonical(&dest)?;
        }

        if dest == source {
            tracing::debug!(
                "Styles already live in the output at {}, nothing to copy",
                source.display()
            );
            return Ok(None);
        }

        if dest.starts_with(&source) {
            return Err(BuildError::StylesNested {
                source_dir: source.display().to_string(),
                dest: dest.display().to_string(),
            });
        }

        Ok(Some((source, dest)))
    }
}

fn canonical(path: &Path) -> Result<PathBuf, BuildError> {
    path.canonicalize().map_err(|e| BuildError::Read {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Two pages must never write the same output file.
fn check_outputs(descriptors: &[PageDescriptor]) -> Result<(), BuildError> {
    let mut seen: HashMap<String, &str> = HashMap::new();

    for descriptor in descriptors {
        let file = descriptor.output_file_name();
        if let Some(first) = seen.get(&file) {
            return Err(BuildError::OutputConflict {
                file,
                first: first.to_string(),
                second: descriptor.name.clone(),
            });
        }
        seen.insert(file, &descriptor.name);
    }

    Ok(())
}
