use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("video id {0:?} cannot be used as a file name")]
    InvalidVideoId(String),

    #[error("source {0} cannot be scanned")]
    UnscannableSource(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
