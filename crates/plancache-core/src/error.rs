use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    /// The store's backing schema is absent or not yet visible. Expected
    /// during install/restore; callers fall back to the external planner.
    #[error("plan store schema is not available")]
    SchemaNotReady,

    #[error("plan store schema is misconfigured: missing {0}")]
    SchemaMisconfigured(String),

    #[error("tree depth limit exceeded while walking {0} tree")]
    RecursionLimitExceeded(&'static str),

    #[error("store I/O failure: {0}")]
    StoreIo(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid diagnostic request: {0}")]
    InvalidDiagnosticRequest(String),

    #[error("planner failure: {0}")]
    PlannerFailure(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
