use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Batch contains no rows")]
    EmptyInput,

    #[error("Reference data unavailable: {0}")]
    ReferenceUnavailable(String),

    #[error("Reference lookup failed: {0}")]
    ReferenceLookup(String),

    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Workbook error: {0}")]
    Workbook(String),

    #[error("Settings error: {0}")]
    Settings(String),
}

pub type Result<T> = std::result::Result<T, BatchError>;
