use thiserror::Error;

#[derive(Error, Debug)]
pub enum StipendError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid input for '{field}': {reason}")]
    InvalidInput { field: &'static str, reason: String },

    #[error("Invalid period: month {month}, year {year}")]
    InvalidPeriod { month: u32, year: i32 },

    #[error("Kollel student {id} not found")]
    StudentNotFound { id: i64 },

    #[error("Monthly stipend {id} not found")]
    StipendNotFound { id: i64 },

    #[error("Student '{student_ref}' already has an active kollel enrollment")]
    AlreadyEnrolled { student_ref: String },

    #[error("Monthly stipend {id} was modified concurrently: expected version {expected}, found {actual}")]
    VersionConflict { id: i64, expected: i64, actual: i64 },

    #[error("Break '{name}' ends before it starts")]
    InvalidBreakRange { name: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StipendResult<T> = Result<T, StipendError>;
