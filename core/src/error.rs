use std::path::PathBuf;

use thiserror::Error;

/// Errors returned synchronously from [`FsWatcher`](crate::watcher::FsWatcher)
/// construction, registration and close.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("failed to initialize filesystem watcher: {0}")]
    Init(#[source] notify::Error),

    #[error("cannot watch {}: file does not exist", path.display())]
    PathNotFound { path: PathBuf },

    #[error("failed to watch {}: {source}", path.display())]
    Register {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("failed to spawn watcher listener thread: {0}")]
    Listener(#[source] std::io::Error),

    #[error("watcher listener thread panicked")]
    ListenerPanicked,
}
