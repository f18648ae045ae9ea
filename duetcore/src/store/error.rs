use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Serialization/deserialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store connection error: {0}")]
    Connection(String),

    #[error("Permission denied for {0}")]
    PermissionDenied(String),

    #[error("Store backend error: {0}")]
    Backend(#[from] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T> = std::result::Result<T, StoreError>;
