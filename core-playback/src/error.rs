use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("Failed to spawn decoder: {source}")]
    Spawn {
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to signal decoder process: {0}")]
    Signal(std::io::Error),

    #[error("Channel error: {0}")]
    Ipc(#[from] core_ipc::IpcError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PlaybackError>;
