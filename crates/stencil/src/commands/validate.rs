//! Content validation command.

use std::path::PathBuf;

use anyhow::Result;
use stencil_schema::{SchemaRegistry, ValidationReport};

use crate::config::ConfigFile;

/// Run the validate command. Returns whether every page is valid.
pub fn run(file_config: &ConfigFile, schemas: Option<PathBuf>) -> Result<bool> {
    let schemas_dir = schemas.unwrap_or_else(|| file_config.paths.schemas.clone());
    let pages_dir = file_config.paths.content.join("pages");

    let registry = SchemaRegistry::load(&schemas_dir)?;
    tracing::debug!(
        "Validating {} against {} schemas from {}",
        pages_dir.display(),
        registry.schema_count(),
        schemas_dir.display()
    );
    let report = registry.validate_pages(&pages_dir)?;

    print_report(&report);

    Ok(report.is_success())
}

fn print_report(report: &ValidationReport) {
    for file in &report.files {
        if file.is_valid() {
            tracing::info!("✅ {} is valid", file.file);
        } else {
            tracing::error!("❌ Validation failed for {}:", file.file);
            for violation in &file.violations {
                tracing::error!("{}", violation);
            }
        }
    }

    if report.is_success() {
        tracing::info!("✅ All content validated successfully");
    } else {
        tracing::error!(
            "❌ Validation failed: {} of {} files invalid",
            report.failed_count(),
            report.files.len()
        );
    }
}
