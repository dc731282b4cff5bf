use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct JobId(pub String);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        JobId(s.to_string())
    }
}

impl JobId {
    /// First eight characters, used wherever the id is shown next to other text.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

/// Queue-side state of an enrollment job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Pending,
    Waiting,
    Active,
    Delayed,
    Paused,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// States in which a persisted session counts as holding an in-flight job.
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            JobState::Waiting | JobState::Active | JobState::Delayed | JobState::Paused
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Pending => "pending",
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Delayed => "delayed",
            JobState::Paused => "paused",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A confirmed selection, immutable once submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentRequest {
    student_id: String,
    section_ids: Vec<String>,
}

impl EnrollmentRequest {
    /// Builds a request, rejecting an empty selection, blank ids or repeated ids.
    pub fn new(student_id: impl Into<String>, section_ids: Vec<String>) -> anyhow::Result<Self> {
        let student_id = student_id.into();
        if student_id.trim().is_empty() {
            anyhow::bail!("student identifier is empty");
        }
        if section_ids.is_empty() {
            anyhow::bail!("select at least one section");
        }
        let mut seen = std::collections::HashSet::new();
        for id in &section_ids {
            if id.trim().is_empty() {
                anyhow::bail!("section identifiers must not be blank");
            }
            if !seen.insert(id.as_str()) {
                anyhow::bail!("section {} selected more than once", id);
            }
        }
        Ok(Self { student_id, section_ids })
    }

    pub fn student_id(&self) -> &str {
        &self.student_id
    }

    pub fn section_ids(&self) -> &[String] {
        &self.section_ids
    }
}

/// Returned once per successful submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: JobId,
    pub queue_name: String,
    pub initial_status: JobState,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobTimestamps {
    pub created: Option<DateTime<Utc>>,
    pub processed_on: Option<DateTime<Utc>>,
    pub finished_on: Option<DateTime<Utc>>,
}

/// One poll result. Superseded wholesale by the next poll for the same job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusSnapshot {
    pub job_id: JobId,
    pub status: JobState,
    pub progress: u8,
    pub result: Option<serde_json::Value>,
    pub failure_reason: Option<String>,
    pub attempts_made: u32,
    pub attempts_allowed: u32,
    pub timestamps: JobTimestamps,
}

impl JobStatusSnapshot {
    /// `returnValue.message` when the worker left one.
    pub fn result_message(&self) -> Option<&str> {
        self.result
            .as_ref()
            .and_then(|v| v.get("message"))
            .and_then(|m| m.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_rejects_empty_and_duplicates() {
        assert!(EnrollmentRequest::new("223041866", vec![]).is_err());
        assert!(EnrollmentRequest::new("223041866", vec!["A".into(), "A".into()]).is_err());
        assert!(EnrollmentRequest::new("", vec!["A".into()]).is_err());

        let req = EnrollmentRequest::new("223041866", vec!["B".into(), "A".into()]).unwrap();
        assert_eq!(req.section_ids(), &["B".to_string(), "A".to_string()]);
    }

    #[test]
    fn test_state_classes() {
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Queued.is_in_flight());
        assert!(JobState::Paused.is_in_flight());
        let parsed: JobState = serde_json::from_str("\"delayed\"").unwrap();
        assert_eq!(parsed, JobState::Delayed);
    }

    #[test]
    fn test_short_id() {
        assert_eq!(JobId::from("1234567890").short(), "12345678");
        assert_eq!(JobId::from("job-1").short(), "job-1");
    }
}
