use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    /// A policy refusal. The message is shown to end users verbatim.
    #[error("{0}")]
    Denied(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
    #[error("store write failed: {0}")]
    StoreWrite(#[source] rusqlite::Error),
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// For `map_err` on insert/update/commit calls.
    pub fn write(e: rusqlite::Error) -> Self {
        Self::StoreWrite(e)
    }

    /// Stable code used on the IPC wire.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Denied(_) => "denied",
            Self::InvalidInput(_) => "bad_params",
            Self::Store(_) => "db_query_failed",
            Self::StoreWrite(_) => "db_update_failed",
        }
    }
}
