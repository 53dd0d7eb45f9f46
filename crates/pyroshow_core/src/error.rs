use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Item not found: {0}")]
    ItemNotFound(uuid::Uuid),

    #[error("Drag already in progress for item {0}")]
    DragInProgress(uuid::Uuid),

    #[error("Playback rejected: {0}")]
    PlaybackRejected(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
