//! Static site generator for stencil sites.
//!
//! Renders every page content document through its page template, wraps it in
//! the base layout where required, and writes one HTML file per page.

pub mod assets;
pub mod builder;
pub mod templates;

pub use builder::{BuildConfig, BuildError, BuildResult, RenderedPage, StaticBuilder};
pub use templates::{RenderError, TemplateEngine};
