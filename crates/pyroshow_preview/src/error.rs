use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("failed to start mpv: {0}")]
    Spawn(std::io::Error),

    #[error("mpv socket did not appear: {0}")]
    SocketTimeout(PathBuf),

    #[error("mpv IPC error: {0}")]
    Ipc(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("mpv replied with error: {0}")]
    Mpv(String),

    #[error("mpv connection closed")]
    Disconnected,

    #[error("mpv reported no {0}")]
    MissingData(&'static str),
}

impl From<PreviewError> for pyroshow_core::error::CoreError {
    fn from(e: PreviewError) -> Self {
        pyroshow_core::error::CoreError::PlaybackRejected(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PreviewError>;
