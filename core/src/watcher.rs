use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, PoisonError, RwLock};
use std::thread::JoinHandle;

use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::Dispatch;

use crate::error::WatchError;

/// Callback invoked on the listener thread when a watched file's content changes.
pub type OnChange = Box<dyn Fn() + Send + Sync + 'static>;

type SharedOnChange = Arc<dyn Fn() + Send + Sync + 'static>;

// ---------------------------------------------------------------------------
// ChangeKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Modified,
    Removed,
}

impl ChangeKind {
    /// Classify a notify event kind. Access, metadata (chmod, link count)
    /// and everything else returns `None`.
    pub fn from_event_kind(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => {
                Some(ChangeKind::Modified)
            }
            EventKind::Remove(_) => Some(ChangeKind::Removed),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

struct WatchedPath {
    /// Path as the caller passed it; used in log messages.
    given: PathBuf,
    /// Resolved at registration time; used to match OS events.
    canonical: PathBuf,
}

impl WatchedPath {
    fn matches(&self, event_path: &Path, resolved: &Path) -> bool {
        self.canonical == resolved || self.canonical == event_path
    }
}

/// One successful `watch_files` call. Removed files leave `paths`; a
/// registration with no paths left is dropped.
struct Registration {
    paths: Vec<WatchedPath>,
    on_change: Option<SharedOnChange>,
    logger: Option<Dispatch>,
}

impl Registration {
    fn contains(&self, event_path: &Path, resolved: &Path) -> bool {
        self.paths.iter().any(|w| w.matches(event_path, resolved))
    }

    /// Drop every entry for a removed file, returning the first one.
    fn take(&mut self, event_path: &Path, resolved: &Path) -> Option<WatchedPath> {
        let (gone, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.paths)
            .into_iter()
            .partition(|w| w.matches(event_path, resolved));
        self.paths = kept;
        gone.into_iter().next()
    }

    fn log_error(&self, err: &notify::Error) {
        if let Some(logger) = &self.logger {
            tracing::dispatcher::with_default(logger, || {
                tracing::error!(error = %err, "filesystem notifier reported an error");
            });
        }
    }
}

type Registrations = Arc<RwLock<Vec<Registration>>>;

/// Work collected under the registrations lock and run after releasing it.
enum Action {
    Change {
        on_change: SharedOnChange,
        logger: Option<Dispatch>,
    },
    Removal {
        path: PathBuf,
        logger: Dispatch,
    },
}

impl Action {
    fn run(self) {
        match self {
            Action::Change { on_change, logger } => match logger {
                Some(logger) => tracing::dispatcher::with_default(&logger, || on_change()),
                None => on_change(),
            },
            Action::Removal { path, logger } => {
                tracing::dispatcher::with_default(&logger, || {
                    tracing::warn!(path = %path.display(), "{}has been removed.", path.display());
                });
            }
        }
    }
}

enum Signal {
    Notify(notify::Result<Event>),
    Shutdown,
}

// ---------------------------------------------------------------------------
// FsWatcher
// ---------------------------------------------------------------------------

/// Watches an explicit, flat list of files for content changes and removal.
///
/// Uses the platform-native backend (inotify on Linux, FSEvents on macOS,
/// etc.) with one non-recursive watch per file. Events are consumed by a
/// single background thread, started by the first successful
/// [`watch_files`](Self::watch_files) call.
pub struct FsWatcher {
    watcher: RecommendedWatcher,
    registrations: Registrations,
    tx: mpsc::Sender<Signal>,
    rx: Option<mpsc::Receiver<Signal>>,
    listener: Option<JoinHandle<()>>,
}

impl FsWatcher {
    pub fn new() -> Result<Self, WatchError> {
        let (tx, rx) = mpsc::channel::<Signal>();
        let event_tx = tx.clone();

        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = event_tx.send(Signal::Notify(res));
            },
            Config::default(),
        )
        .map_err(WatchError::Init)?;

        Ok(Self {
            watcher,
            registrations: Arc::new(RwLock::new(Vec::new())),
            tx,
            rx: Some(rx),
            listener: None,
        })
    }

    /// Register `paths` for watching.
    ///
    /// All-or-nothing: if any path does not exist, or the OS rejects any
    /// watch, nothing from this call stays registered. `on_change` runs on
    /// the listener thread for every content write, with `logger` (if any)
    /// installed as the thread's default dispatcher. Removals are logged to
    /// `logger` and dropped when there is none.
    ///
    /// A path already watched is handed to the OS again, so a file that was
    /// removed and re-created is watched anew.
    pub fn watch_files<P: AsRef<Path>>(
        &mut self,
        paths: &[P],
        on_change: Option<OnChange>,
        logger: Option<Dispatch>,
    ) -> Result<(), WatchError> {
        let mut watched = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            if !path.exists() {
                return Err(WatchError::PathNotFound {
                    path: path.to_path_buf(),
                });
            }
            watched.push(WatchedPath {
                given: path.to_path_buf(),
                canonical: resolve(path),
            });
        }

        let live: HashSet<PathBuf> = self
            .registrations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .flat_map(|r| r.paths.iter().map(|w| w.canonical.clone()))
            .collect();

        // Paths no live registration holds; a failure unwatches exactly these.
        let mut added: Vec<PathBuf> = Vec::new();
        for w in &watched {
            if let Err(source) = self.watcher.watch(&w.canonical, RecursiveMode::NonRecursive) {
                self.unwatch_all(&added);
                return Err(WatchError::Register {
                    path: w.given.clone(),
                    source,
                });
            }
            if !live.contains(&w.canonical) && !added.contains(&w.canonical) {
                added.push(w.canonical.clone());
            }
        }

        if let Err(e) = self.ensure_listener() {
            self.unwatch_all(&added);
            return Err(e);
        }

        tracing::debug!(
            files = watched.len(),
            new_watches = added.len(),
            "registered watched files"
        );

        self.registrations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Registration {
                paths: watched,
                on_change: on_change.map(SharedOnChange::from),
                logger,
            });

        Ok(())
    }

    /// Every registered path in registration order, as callers passed them.
    /// Files whose removal the listener has seen are no longer listed.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.registrations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .flat_map(|r| r.paths.iter().map(|w| w.given.clone()))
            .collect()
    }

    /// Stop the listener thread and release the OS watch handle.
    pub fn close(mut self) -> Result<(), WatchError> {
        self.shutdown()
    }

    fn ensure_listener(&mut self) -> Result<(), WatchError> {
        let Some(rx) = self.rx.take() else {
            return Ok(());
        };
        let registrations = Arc::clone(&self.registrations);
        let handle = std::thread::Builder::new()
            .name("fswatcher-listener".into())
            .spawn(move || listen(rx, registrations))
            .map_err(WatchError::Listener)?;
        self.listener = Some(handle);
        Ok(())
    }

    fn unwatch_all(&mut self, paths: &[PathBuf]) {
        for path in paths {
            if let Err(e) = self.watcher.unwatch(path) {
                tracing::debug!(path = %path.display(), error = %e, "unwatch during rollback failed");
            }
        }
    }

    fn shutdown(&mut self) -> Result<(), WatchError> {
        let Some(handle) = self.listener.take() else {
            return Ok(());
        };
        // The listener exits on this signal even if OS events are queued ahead of it.
        let _ = self.tx.send(Signal::Shutdown);
        handle.join().map_err(|_| WatchError::ListenerPanicked)
    }
}

impl Drop for FsWatcher {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

// ---------------------------------------------------------------------------
// Listener
// ---------------------------------------------------------------------------

fn listen(rx: mpsc::Receiver<Signal>, registrations: Registrations) {
    while let Ok(signal) = rx.recv() {
        match signal {
            Signal::Shutdown => return,
            Signal::Notify(Ok(event)) => dispatch(&event, &registrations),
            Signal::Notify(Err(err)) => {
                let registrations = registrations.read().unwrap_or_else(PoisonError::into_inner);
                for registration in registrations.iter() {
                    registration.log_error(&err);
                }
            }
        }
    }
}

fn dispatch(event: &Event, registrations: &Registrations) {
    let Some(kind) = ChangeKind::from_event_kind(&event.kind) else {
        return;
    };
    let resolved: Vec<(&Path, PathBuf)> = event
        .paths
        .iter()
        .map(|p| (p.as_path(), resolve(p)))
        .collect();

    let actions = match kind {
        ChangeKind::Modified => collect_changes(&resolved, registrations),
        ChangeKind::Removed => collect_removals(&resolved, registrations),
    };

    // Callbacks run without the lock held so they can't stall watch_files.
    for action in actions {
        action.run();
    }
}

fn collect_changes(paths: &[(&Path, PathBuf)], registrations: &Registrations) -> Vec<Action> {
    let registrations = registrations.read().unwrap_or_else(PoisonError::into_inner);
    let mut actions = Vec::new();
    for (path, resolved) in paths {
        for registration in registrations.iter() {
            let Some(on_change) = &registration.on_change else {
                continue;
            };
            if registration.contains(path, resolved) {
                actions.push(Action::Change {
                    on_change: Arc::clone(on_change),
                    logger: registration.logger.clone(),
                });
            }
        }
    }
    actions
}

fn collect_removals(paths: &[(&Path, PathBuf)], registrations: &Registrations) -> Vec<Action> {
    let mut registrations = registrations.write().unwrap_or_else(PoisonError::into_inner);
    let mut actions = Vec::new();
    for (path, resolved) in paths {
        for registration in registrations.iter_mut() {
            let Some(watched) = registration.take(path, resolved) else {
                continue;
            };
            if let Some(logger) = &registration.logger {
                actions.push(Action::Removal {
                    path: watched.given,
                    logger: logger.clone(),
                });
            }
        }
    }
    registrations.retain(|r| !r.paths.is_empty());
    actions
}

/// Canonical form of `path`. A removed file no longer canonicalizes, so fall
/// back to its canonical parent joined with the file name.
fn resolve(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => {
            let parent = if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            };
            parent
                .canonicalize()
                .map(|p| p.join(name))
                .unwrap_or_else(|_| path.to_path_buf())
        }
        _ => path.to_path_buf(),
    }
}
