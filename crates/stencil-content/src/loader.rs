//! File-system helpers shared by the content and template loaders.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use walkdir::WalkDir;

/// Errors that can occur while loading content or templates.
///
/// Every variant is fatal for a build: no output is written once one occurs.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Required path not found: {0}")]
    Missing(String),

    #[error("Failed to read {path}: {message}")]
    Read { path: String, message: String },

    #[error("Invalid JSON in {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Expected a JSON object at the top level of {0}")]
    NotAnObject(String),

    #[error("Duplicate component '{name}': {first} and {second}")]
    DuplicateComponent {
        name: String,
        first: String,
        second: String,
    },

    #[error("Duplicate page template '{name}': {first} and {second}")]
    DuplicatePageTemplate {
        name: String,
        first: String,
        second: String,
    },

    #[error("Page template not found: pages/{0}")]
    MissingTemplate(String),
}

/// Whether a path's final component is a dotfile.
pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

/// File name without its last extension (`hero.html` -> `hero`).
pub fn file_stem(path: &Path) -> Result<String, LoadError> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .ok_or_else(|| LoadError::Read {
            path: path.display().to_string(),
            message: "file name is not valid UTF-8".to_string(),
        })
}

/// List the regular files directly inside `dir`, sorted by file name.
///
/// Dotfiles are skipped. With `extension` set, only files carrying that
/// extension are returned.
pub fn list_files(dir: &Path, extension: Option<&str>) -> Result<Vec<PathBuf>, LoadError> {
    if !dir.is_dir() {
        return Err(LoadError::Missing(dir.display().to_string()));
    }

    let mut files = Vec::new();

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| LoadError::Read {
            path: dir.display().to_string(),
            message: e.to_string(),
        })?;

        let path = entry.path();
        if !entry.file_type().is_file() || is_hidden(path) {
            continue;
        }

        if let Some(ext) = extension {
            if path.extension().and_then(|e| e.to_str()) != Some(ext) {
                continue;
            }
        }

        files.push(entry.into_path());
    }

    Ok(files)
}

/// Read a file to a string, mapping a missing file to [`LoadError::Missing`].
pub fn read_text(path: &Path) -> Result<String, LoadError> {
    fs::read_to_string(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => LoadError::Missing(path.display().to_string()),
        _ => LoadError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        },
    })
}

/// Read and parse any JSON value.
pub fn read_json(path: &Path) -> Result<Value, LoadError> {
    let text = read_text(path)?;
    serde_json::from_str(&text).map_err(|e| LoadError::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Read a JSON file whose top level must be an object.
pub fn read_object(path: &Path) -> Result<Map<String, Value>, LoadError> {
    match read_json(path)? {
        Value::Object(map) => Ok(map),
        _ => Err(LoadError::NotAnObject(path.display().to_string())),
    }
}
