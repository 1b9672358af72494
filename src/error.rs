use thiserror::Error;

use crate::report::StageReport;
use crate::types::Stage;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Extract error ({entity}): {message}")]
    Extract { entity: &'static str, message: String },

    #[error("Database error: {message}")]
    Database { message: String },

    #[error("run aborted at {stage} stage: {source}")]
    StageAborted {
        stage: Stage,
        completed: Vec<StageReport>,
        source: Box<EtlError>,
    },
}

impl From<rusqlite::Error> for EtlError {
    fn from(err: rusqlite::Error) -> Self {
        EtlError::Database {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
