use thiserror::Error;

#[derive(Error, Debug)]
pub enum SoucheError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Monthly quota exceeded: {consumed} already ordered, {requested} requested, cap is {cap}")]
    QuotaExceeded {
        consumed: u32,
        requested: u32,
        cap: u32,
    },

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Confirmation does not match")]
    ConfirmationMismatch,

    #[error("Invalid number of souches: {0} (expected 1 to {max})", max = crate::quota::MONTHLY_CAP)]
    InvalidUnits(u32),

    #[error("Unknown class: {0}")]
    UnknownClass(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(i64),

    #[error("Invalid month key: {0} (expected YYYY-MM)")]
    InvalidMonth(String),

    #[error("Invalid code")]
    InvalidCode,

    #[error("Not allowed: {0}")]
    Forbidden(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SoucheError {
    /// Validation errors are raised before any store call is made.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SoucheError::QuotaExceeded { .. }
                | SoucheError::MissingField(_)
                | SoucheError::ConfirmationMismatch
                | SoucheError::InvalidUnits(_)
                | SoucheError::UnknownClass(_)
                | SoucheError::InvalidAmount(_)
                | SoucheError::InvalidMonth(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SoucheError>;
