//! Static asset copying.

use std::fs;
use std::path::Path;

use walkdir::WalkDir;

use crate::builder::BuildError;

/// Asset pipeline utilities.
pub struct AssetPipeline;

impl AssetPipeline {
    /// Copy every file under `source` into `dest`, keeping relative paths
    /// and overwriting files of the same name. Dotfiles and dot-directories
    /// are skipped.
    ///
    /// Returns the number of files copied.
    pub fn copy_dir(source: &Path, dest: &Path) -> Result<usize, BuildError> {
        let mut copied = 0;

        let walker = WalkDir::new(source)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()));

        for entry in walker {
            let entry = entry.map_err(|e| BuildError::Read {
                path: source.display().to_string(),
                message: e.to_string(),
            })?;

            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
            let target = dest.join(relative);

            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| BuildError::write(parent, e))?;
            }

            fs::copy(entry.path(), &target).map_err(|e| BuildError::write(&target, e))?;
            copied += 1;
        }

        Ok(copied)
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|n| n.starts_with('.'))
}
