use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Remote store error: {0}")]
    Network(String),

    #[error("A reconciliation pass is already in flight")]
    PassInFlight,

    #[error("Downloaded file is empty: {path}")]
    Integrity { path: PathBuf },

    #[error("Content not available on the remote store for tag {0}")]
    NotAvailable(String),

    #[error("Library error: {0}")]
    Library(#[from] core_library::LibraryError),

    #[error("Channel error: {0}")]
    Ipc(#[from] core_ipc::IpcError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
