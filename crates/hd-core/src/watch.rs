//! Change notifications for the lifecycle log.
//!
//! The watcher only says "the log changed"; reading stays with
//! [`EventFollower`](crate::events::EventFollower), which tracks its own
//! offset. The parent directory is watched so the log may be created or
//! rotated while someone follows it.

use std::ffi::{OsStr, OsString};
use std::path::Path;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::{self, UnboundedReceiver};

/// Whether a filesystem event can mean new bytes in the watched file.
fn is_growth(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Any | EventKind::Create(_) | EventKind::Modify(_))
}

fn touches(event: &notify::Event, name: Option<&OsStr>) -> bool {
    is_growth(&event.kind) && event.paths.iter().any(|p| p.file_name() == name)
}

/// Wakes a follower whenever the watched file is created or modified.
pub struct LogWatcher {
    // Dropping the watcher stops the notifications.
    _watcher: RecommendedWatcher,
    rx: UnboundedReceiver<()>,
}

impl LogWatcher {
    pub fn new(path: &Path) -> Result<Self, notify::Error> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(notify::Error::io)?;
        let name: Option<OsString> = path.file_name().map(ToOwned::to_owned);

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
            Ok(event) if touches(&event, name.as_deref()) => {
                let _ = tx.send(());
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(error = %e, "log watcher error"),
        })?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        tracing::debug!(path = %path.display(), "watching lifecycle log");

        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }

    /// Wait for the next change. Bursts collapse into one wake-up.
    /// Returns `None` once the watcher has shut down.
    pub async fn changed(&mut self) -> Option<()> {
        self.rx.recv().await?;
        while self.rx.try_recv().is_ok() {}
        Some(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, ModifyKind};
    use std::path::PathBuf;

    fn event(kind: EventKind, path: &str) -> notify::Event {
        notify::Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn only_writes_to_the_log_count() {
        let name = Some(OsStr::new("encampment.log"));
        let write = EventKind::Modify(ModifyKind::Data(DataChange::Content));
        assert!(touches(&event(write, "/camp/logs/encampment.log"), name));
        assert!(touches(
            &event(EventKind::Create(CreateKind::File), "/camp/logs/encampment.log"),
            name
        ));
        assert!(!touches(&event(write, "/camp/logs/other.log"), name));
        assert!(!touches(
            &event(EventKind::Access(AccessKind::Any), "/camp/logs/encampment.log"),
            name
        ));
    }
}
