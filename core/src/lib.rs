pub mod error;
pub mod watcher;

pub use error::WatchError;
pub use watcher::{ChangeKind, FsWatcher, OnChange};
