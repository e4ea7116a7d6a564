use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvoError {
    #[error("Simulation failure: {0}")]
    SimulationFailure(String),

    #[error("Schema mismatch: expected genome of length {expected}, got {actual}")]
    SchemaMismatch { expected: usize, actual: usize },

    #[error("Schema mismatch: log was written for '{found}', active schema is '{active}'")]
    SchemaFingerprint { active: String, found: String },

    #[error("Record not found: generation {generation} (log holds {available} records)")]
    RecordNotFound { generation: u64, available: usize },

    #[error("Checkpoint log error: {0}")]
    LogIo(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl EvoError {
    /// Schema errors are fatal for whichever operation hit them.
    pub fn is_schema_mismatch(&self) -> bool {
        matches!(
            self,
            EvoError::SchemaMismatch { .. } | EvoError::SchemaFingerprint { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, EvoError>;
