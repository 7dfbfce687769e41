use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("video id must not be empty")]
    EmptyVideoId,

    #[error("frame payload for {id} is empty")]
    EmptyPayload { id: String },

    #[error("frame payload for {id} is not JPEG data")]
    NotJpeg { id: String },

    #[error("invalid resource locator: {0}")]
    InvalidLocator(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
