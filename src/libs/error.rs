use thiserror::Error;

/// Errors raised while building a complex report.
#[derive(Debug, Error)]
pub enum ReportError {
    /// A single record could not be understood. The record is skipped
    /// unless the error limit is reached.
    #[error("Format error: {0}")]
    Format(String),

    /// Inputs or outputs that are missing, unreadable or malformed.
    /// Always fatal.
    #[error("Setup error: {0}")]
    Setup(String),

    /// Two complexes of the membership index share a name, so the same
    /// (assignment, query complex) key was reached from both.
    #[error("Assignment {assignment_id} of query complex {complex_name} was reached from complex ids {first} and {second}")]
    KeyCollision {
        assignment_id: u32,
        complex_name: String,
        first: u32,
        second: u32,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ReportError {
    pub fn is_format(&self) -> bool {
        matches!(self, ReportError::Format(_))
    }
}

pub type Result<T> = std::result::Result<T, ReportError>;
