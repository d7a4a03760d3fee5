//! Directory watchers for external config edits.

use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

/// Watches one directory and reports every path that was replaced or written.
///
/// Watching stops when the value is dropped.
pub struct DirectoryWatcher {
    dir: PathBuf,
    _watcher: RecommendedWatcher,
}

impl DirectoryWatcher {
    /// Starts watching `dir` (non-recursively) on notify's own thread.
    pub fn start<F>(dir: &Path, on_change: F) -> Result<Self, notify::Error>
    where
        F: Fn(&Path) + Send + 'static,
    {
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if counts_as_change(&event.kind) {
                    for path in &event.paths {
                        on_change(path);
                    }
                }
            }
            Err(e) => tracing::error!(error = %e, "Watch error"),
        })?;

        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        tracing::info!(dir = %dir.display(), "Config directory watcher started");

        Ok(Self {
            dir: dir.to_path_buf(),
            _watcher: watcher,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        tracing::debug!(dir = %self.dir.display(), "Config directory watcher stopped");
    }
}

/// Events that mean a file's content may differ from what was last read.
///
/// A rename is counted on its destination only, so a save through a
/// temporary file is one event for the target.
pub(crate) fn counts_as_change(kind: &EventKind) -> bool {
    match kind {
        EventKind::Create(_) | EventKind::Remove(_) => true,
        EventKind::Modify(ModifyKind::Data(_)) => true,
        EventKind::Modify(ModifyKind::Name(mode)) => {
            matches!(mode, RenameMode::To | RenameMode::Any)
        }
        EventKind::Modify(ModifyKind::Any) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind};

    #[test]
    fn test_counted_event_kinds() {
        assert!(counts_as_change(&EventKind::Create(CreateKind::File)));
        assert!(counts_as_change(&EventKind::Modify(ModifyKind::Data(DataChange::Content))));
        assert!(counts_as_change(&EventKind::Modify(ModifyKind::Name(RenameMode::To))));
    }

    #[test]
    fn test_ignored_event_kinds() {
        assert!(!counts_as_change(&EventKind::Modify(ModifyKind::Name(RenameMode::From))));
        assert!(!counts_as_change(&EventKind::Modify(ModifyKind::Name(RenameMode::Both))));
        assert!(!counts_as_change(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any))));
        assert!(!counts_as_change(&EventKind::Access(AccessKind::Any)));
    }
}
