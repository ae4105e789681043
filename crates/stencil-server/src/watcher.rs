//! File watching for rebuild-on-change.

use std::path::{Component, Path, PathBuf};
use std::sync::mpsc;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc as async_mpsc;

use stencil_static::BuildConfig;

/// Events emitted by the file watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A JSON content document changed
    Content(PathBuf),

    /// A template changed
    Template(PathBuf),

    /// A stylesheet changed
    Style(PathBuf),

    /// The site config file changed
    Config(PathBuf),
}

impl WatchEvent {
    pub fn path(&self) -> &Path {
        match self {
            Self::Content(p) | Self::Template(p) | Self::Style(p) | Self::Config(p) => p,
        }
    }
}

/// The inputs a rebuild depends on.
#[derive(Debug, Clone)]
pub struct WatchTargets {
    pub content_dir: PathBuf,
    pub templates_dir: PathBuf,
    pub styles_dir: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
}

impl WatchTargets {
    /// Watch everything a build with `config` reads, plus the config file.
    pub fn new(config: &BuildConfig, config_file: Option<PathBuf>) -> Self {
        Self {
            content_dir: config.content_dir.clone(),
            templates_dir: config.templates_dir.clone(),
            styles_dir: config.styles_dir.clone(),
            config_file,
        }
    }

    /// Make every existing path absolute so it can be compared with the
    /// paths notify reports.
    fn canonicalize(&self) -> Self {
        let abs = |p: &PathBuf| p.canonicalize().unwrap_or_else(|_| p.clone());
        Self {
            content_dir: abs(&self.content_dir),
            templates_dir: abs(&self.templates_dir),
            styles_dir: self.styles_dir.as_ref().map(abs),
            config_file: self.config_file.as_ref().map(abs),
        }
    }

    /// Directories to register with notify.
    fn roots(&self) -> Vec<(PathBuf, RecursiveMode)> {
        let mut roots = vec![
            (self.content_dir.clone(), RecursiveMode::Recursive),
            (self.templates_dir.clone(), RecursiveMode::Recursive),
        ];

        if let Some(styles) = &self.styles_dir {
            roots.push((styles.clone(), RecursiveMode::Recursive));
        }

        // Watch the config file's directory so editors that replace the file
        // on save are still seen.
        if let Some(parent) = self.config_file.as_ref().and_then(|f| f.parent()) {
            let parent = if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            };
            roots.push((parent.to_path_buf(), RecursiveMode::NonRecursive));
        }

        roots
    }

    /// Classify a changed path. Returns `None` for anything a rebuild does
    /// not depend on, including dotfiles and access-only events.
    pub fn classify(&self, path: &Path, kind: &EventKind) -> Option<WatchEvent> {
        if !matches!(
            kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
        ) {
            return None;
        }

        if self.config_file.as_deref() == Some(path) {
            return Some(WatchEvent::Config(path.to_path_buf()));
        }

        if let Some(relative) = relative_visible(path, &self.content_dir) {
            if relative.extension().is_some_and(|ext| ext == "json") {
                return Some(WatchEvent::Content(path.to_path_buf()));
            }
            return None;
        }

        if relative_visible(path, &self.templates_dir).is_some() {
            return Some(WatchEvent::Template(path.to_path_buf()));
        }

        if let Some(styles) = &self.styles_dir {
            if relative_visible(path, styles).is_some() {
                return Some(WatchEvent::Style(path.to_path_buf()));
            }
        }

        None
    }
}

/// `path` relative to `root`, unless it is the root itself or any component
/// below the root is a dotfile.
fn relative_visible<'a>(path: &'a Path, root: &Path) -> Option<&'a Path> {
    let relative = path.strip_prefix(root).ok()?;

    if relative.as_os_str().is_empty() {
        return None;
    }

    let hidden = relative.components().any(|c| match c {
        Component::Normal(name) => name.to_str().is_some_and(|n| n.starts_with('.')),
        _ => false,
    });

    (!hidden).then_some(relative)
}

/// File watcher for detecting changes.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Create a new file watcher for the given targets.
    ///
    /// Returns the watcher and a channel to receive events. Every relevant
    /// change is forwarded; nothing is debounced or coalesced.
    pub fn new(
        targets: &WatchTargets,
    ) -> Result<(Self, async_mpsc::Receiver<WatchEvent>), std::io::Error> {
        let targets = targets.canonicalize();
        let (sync_tx, sync_rx) = mpsc::channel();
        let (async_tx, async_rx) = async_mpsc::channel(100);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    let _ = sync_tx.send(event);
                }
                Err(e) => tracing::warn!("File watch error: {}", e),
            }
        })
        .map_err(std::io::Error::other)?;

        for (path, mode) in targets.roots() {
            if path.exists() {
                watcher.watch(&path, mode).map_err(std::io::Error::other)?;
                tracing::debug!("Watching {}", path.display());
            }
        }

        std::thread::spawn(move || {
            while let Ok(event) = sync_rx.recv() {
                for path in &event.paths {
                    if let Some(e) = targets.classify(path, &event.kind) {
                        if async_tx.blocking_send(e).is_err() {
                            return;
                        }
                    }
                }
            }
        });

        Ok((Self { _watcher: watcher }, async_rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, ModifyKind, RemoveKind};
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    fn targets(root: &Path) -> WatchTargets {
        WatchTargets {
            content_dir: root.join("content"),
            templates_dir: root.join("templates"),
            styles_dir: Some(root.join("css")),
            config_file: Some(root.join("site.toml")),
        }
    }

    fn modify() -> EventKind {
        EventKind::Modify(ModifyKind::Data(DataChange::Content))
    }

    #[test]
    fn classifies_watched_inputs() {
        let root = Path::new("/site");
        let t = targets(root);

        assert_eq!(
            t.classify(&root.join("content/pages/about.json"), &modify()),
            Some(WatchEvent::Content(root.join("content/pages/about.json")))
        );
        assert_eq!(
            t.classify(&root.join("templates/components/hero.html"), &modify()),
            Some(WatchEvent::Template(root.join("templates/components/hero.html")))
        );
        assert_eq!(
            t.classify(&root.join("css/main.css"), &EventKind::Create(CreateKind::File)),
            Some(WatchEvent::Style(root.join("css/main.css")))
        );
        assert_eq!(
            t.classify(&root.join("site.toml"), &EventKind::Remove(RemoveKind::File)),
            Some(WatchEvent::Config(root.join("site.toml")))
        );
    }

    #[test]
    fn ignores_unrelated_paths() {
        let root = Path::new("/site");
        let t = targets(root);

        assert_eq!(t.classify(&root.join("content/pages/notes.txt"), &modify()), None);
        assert_eq!(t.classify(&root.join("dist/index.html"), &modify()), None);
        assert_eq!(t.classify(&root.join("README.md"), &modify()), None);
        assert_eq!(t.classify(&root.join("templates"), &modify()), None);
    }

    #[test]
    fn ignores_dotfiles() {
        let root = Path::new("/site");
        let t = targets(root);

        assert_eq!(t.classify(&root.join("content/pages/.about.json"), &modify()), None);
        assert_eq!(
            t.classify(&root.join("templates/.cache/hero.html"), &modify()),
            None
        );
        assert_eq!(t.classify(&root.join("css/.main.css.swp"), &modify()), None);
    }

    #[test]
    fn dot_directories_above_the_root_do_not_hide_inputs() {
        let root = Path::new("/home/me/.sites/city");
        let t = targets(root);

        assert!(t
            .classify(&root.join("content/pages/home.json"), &modify())
            .is_some());
    }

    #[test]
    fn ignores_access_events() {
        let root = Path::new("/site");
        let t = targets(root);

        assert_eq!(
            t.classify(
                &root.join("content/pages/home.json"),
                &EventKind::Access(AccessKind::Read)
            ),
            None
        );
    }

    #[tokio::test]
    async fn watches_file_changes() {
        let temp = tempdir().unwrap();
        let pages = temp.path().join("content/pages");
        fs::create_dir_all(&pages).unwrap();
        fs::create_dir_all(temp.path().join("templates")).unwrap();

        let (watcher, mut rx) = FileWatcher::new(&targets(temp.path())).unwrap();

        // Give inotify time to set up
        tokio::time::sleep(Duration::from_millis(100)).await;

        fs::write(pages.join("home.json"), "{}").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(3), rx.recv()).await;

        drop(watcher);

        let event = event
            .expect("timeout waiting for file watch event")
            .expect("channel should not be closed");
        assert!(matches!(event, WatchEvent::Content(_)));
        assert!(event.path().ends_with("content/pages/home.json"));
    }
}
