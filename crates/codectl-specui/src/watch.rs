//! Change detection: a live `notify` watch with debounce, and a cheap
//! directory fingerprint used when no watch is available.

use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

pub const DEBOUNCE: Duration = Duration::from_millis(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Fingerprint {
    pub max_mtime: Option<SystemTime>,
    pub entries: usize,
}

/// Signature over each directory and its immediate, non-hidden children.
/// Deeper changes only show up when they bump an intermediate mtime.
pub fn fingerprint(dirs: &[PathBuf]) -> Fingerprint {
    let mut print = Fingerprint::default();
    for dir in dirs {
        if let Ok(meta) = std::fs::metadata(dir) {
            bump(&mut print, meta.modified().ok());
        }
        let Ok(entries) = std::fs::read_dir(dir) else {
            continue;
        };
        for entry in entries.flatten() {
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            print.entries += 1;
            if let Ok(meta) = entry.metadata() {
                bump(&mut print, meta.modified().ok());
            }
        }
    }
    print
}

fn bump(print: &mut Fingerprint, mtime: Option<SystemTime>) {
    if let Some(mtime) = mtime {
        if print.max_mtime.map_or(true, |current| mtime > current) {
            print.max_mtime = Some(mtime);
        }
    }
}

pub type ChangeReceiver = Arc<Mutex<Receiver<()>>>;

/// Live watch over a set of directories (non-recursive each). Dropping the
/// handle closes the change channel, which ends any pending wait.
pub struct WatchHandle {
    watcher: RecommendedWatcher,
    watched: HashSet<PathBuf>,
    changes: ChangeReceiver,
}

impl WatchHandle {
    pub fn start(dirs: &[PathBuf]) -> notify::Result<Self> {
        let (tx, rx) = mpsc::sync_channel(1);
        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| {
                if res.is_ok() {
                    let _ = tx.try_send(());
                }
            },
            NotifyConfig::default(),
        )?;
        let mut handle = Self {
            watcher,
            watched: HashSet::new(),
            changes: Arc::new(Mutex::new(rx)),
        };
        handle.sync_dirs(dirs);
        if handle.watched.is_empty() {
            return Err(notify::Error::generic("no directory could be watched"));
        }
        Ok(handle)
    }

    pub fn changes(&self) -> ChangeReceiver {
        Arc::clone(&self.changes)
    }

    /// Brings the watched set in line with `dirs`.
    pub fn sync_dirs(&mut self, dirs: &[PathBuf]) {
        let wanted: HashSet<PathBuf> = dirs.iter().cloned().collect();
        let stale: Vec<PathBuf> = self.watched.difference(&wanted).cloned().collect();
        for dir in stale {
            let _ = self.watcher.unwatch(&dir);
            self.watched.remove(&dir);
        }
        for dir in wanted {
            if self.watched.contains(&dir) {
                continue;
            }
            match self.watcher.watch(&dir, RecursiveMode::NonRecursive) {
                Ok(()) => {
                    self.watched.insert(dir);
                }
                Err(err) => {
                    debug!(path = %dir.display(), error = %err, "watch_add_failed");
                }
            }
        }
    }
}

/// Blocks until a change arrives, then waits for `quiet` without further
/// events. Returns false when the watch has been torn down.
pub fn wait_for_change(changes: &Mutex<Receiver<()>>, quiet: Duration) -> bool {
    let rx = match changes.lock() {
        Ok(rx) => rx,
        Err(_) => {
            warn!("watch_receiver_poisoned");
            return false;
        }
    };
    if rx.recv().is_err() {
        return false;
    }
    loop {
        match rx.recv_timeout(quiet) {
            Ok(()) => continue,
            Err(RecvTimeoutError::Timeout) => return true,
            Err(RecvTimeoutError::Disconnected) => return true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::path::Path;
    use std::time::Duration;

    fn set_mtime(path: &Path, at: SystemTime) {
        let file = File::options().write(true).open(path).expect("open");
        file.set_modified(at).expect("set mtime");
    }

    fn set_dir_mtime(path: &Path, at: SystemTime) {
        let file = File::open(path).expect("open dir");
        file.set_modified(at).expect("set dir mtime");
    }

    #[test]
    fn collapsed_touch_is_invisible_but_visible_touch_is_not() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().to_path_buf();
        let collapsed = root.join("collapsed");
        let expanded = root.join("expanded");
        std::fs::create_dir_all(&collapsed).expect("mkdir");
        std::fs::create_dir_all(&expanded).expect("mkdir");
        std::fs::write(collapsed.join("inner.txt"), "x").expect("write");
        std::fs::write(expanded.join("shown.txt"), "x").expect("write");

        let base = SystemTime::now() - Duration::from_secs(3600);
        for path in [collapsed.join("inner.txt"), expanded.join("shown.txt")] {
            set_mtime(&path, base);
        }
        for path in [&collapsed, &expanded, &root] {
            set_dir_mtime(path, base);
        }

        let dirs = vec![root.clone(), expanded.clone()];
        let before = fingerprint(&dirs);

        set_mtime(&collapsed.join("inner.txt"), base + Duration::from_secs(60));
        assert_eq!(fingerprint(&dirs), before);

        set_mtime(&expanded.join("shown.txt"), base + Duration::from_secs(120));
        let after = fingerprint(&dirs);
        assert_ne!(after, before);

        std::fs::write(root.join("new.txt"), "x").expect("write");
        assert_ne!(fingerprint(&dirs), after);
    }

    #[test]
    fn wait_returns_false_once_sender_is_gone() {
        let (tx, rx) = mpsc::sync_channel(1);
        let changes = Mutex::new(rx);
        tx.try_send(()).expect("send");
        drop(tx);
        assert!(wait_for_change(&changes, Duration::from_millis(5)));
        assert!(!wait_for_change(&changes, Duration::from_millis(5)));
    }

    #[test]
    fn burst_collapses_into_one_signal() {
        let (tx, rx) = mpsc::sync_channel(1);
        let changes = Mutex::new(rx);
        let sender = std::thread::spawn(move || {
            for _ in 0..5 {
                let _ = tx.try_send(());
                std::thread::sleep(Duration::from_millis(2));
            }
            tx
        });
        assert!(wait_for_change(&changes, Duration::from_millis(50)));
        let tx = sender.join().expect("join");
        let guard = changes.lock().expect("lock");
        assert!(guard.try_recv().is_err());
        drop(tx);
    }
}
