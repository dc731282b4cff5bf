use common::JobId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnrollmentError {
    #[error("{0}")]
    Validation(String),

    #[error("An enrollment attempt is already being submitted")]
    DuplicateSubmission,

    #[error("Enrollment {job_id} is still in progress")]
    EnrollmentInProgress { job_id: JobId },

    #[error("Enrollment submission failed: {0}")]
    Submission(String),

    #[error("Could not check the enrollment status: {0}")]
    Poll(String),

    #[error("Enrollment failed: {reason} (attempt {attempts_made} of {attempts_allowed})")]
    JobFailed {
        reason: String,
        attempts_made: u32,
        attempts_allowed: u32,
    },

    #[error("Gave up waiting for the enrollment after {polls} status checks")]
    TimedOut { polls: u32 },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl EnrollmentError {
    pub fn not_authenticated() -> Self {
        EnrollmentError::Validation("User is not authenticated".to_string())
    }

    /// Errors the user clears by retrying straight away.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            EnrollmentError::EnrollmentInProgress { .. } | EnrollmentError::Storage(_)
        )
    }
}

impl From<rusqlite::Error> for EnrollmentError {
    fn from(e: rusqlite::Error) -> Self {
        EnrollmentError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for EnrollmentError {
    fn from(e: serde_json::Error) -> Self {
        EnrollmentError::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EnrollmentError>;
