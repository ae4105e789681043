//! Static site build command.

use std::path::PathBuf;

use anyhow::Result;
use stencil_static::StaticBuilder;

use crate::config::ConfigFile;

/// Run the build command.
pub fn run(file_config: &ConfigFile, output: Option<PathBuf>) -> Result<()> {
    let config = file_config.build_config(output);

    tracing::info!("Build system initialized");
    tracing::info!("Templates: {}", config.templates_dir.display());
    tracing::info!("Content: {}", config.content_dir.display());
    tracing::info!("Output: {}", config.output_dir.display());

    let result = StaticBuilder::new(config).build()?;

    tracing::info!(
        "✨ Build complete! {} pages, {} style files in {}ms",
        result.pages,
        result.styles,
        result.duration_ms
    );

    Ok(())
}
