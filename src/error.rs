use thiserror::Error;

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Another request is still in flight")]
    Busy,
}

pub type Result<T> = std::result::Result<T, CalibrationError>;

impl From<CalibrationError> for String {
    fn from(err: CalibrationError) -> Self {
        err.to_string()
    }
}

impl From<rusqlite::Error> for CalibrationError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => CalibrationError::NotFound(err.to_string()),
            other => CalibrationError::Storage(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for CalibrationError {
    fn from(err: serde_json::Error) -> Self {
        CalibrationError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for CalibrationError {
    fn from(err: reqwest::Error) -> Self {
        CalibrationError::Http(err.to_string())
    }
}
