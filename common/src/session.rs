use crate::job::{JobId, JobState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The single persisted record of the in-flight enrollment, shared by every view.
///
/// Field names follow the stored layout so records written by older clients still load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentSession {
    pub active_job_id: Option<JobId>,
    #[serde(alias = "activeJobStatus")]
    pub active_status: Option<JobState>,
    #[serde(alias = "materiasEnProceso")]
    pub sections_in_process: Option<Vec<String>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl EnrollmentSession {
    pub fn active(job_id: JobId, sections: Vec<String>) -> Self {
        Self {
            active_job_id: Some(job_id),
            active_status: Some(JobState::Waiting),
            sections_in_process: Some(sections),
            updated_at: Some(Utc::now()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.active_job_id.is_none()
    }

    /// True when a job id is recorded and its status is one of the in-flight states.
    pub fn has_active(&self) -> bool {
        self.active_job_id.is_some() && self.active_status.map_or(false, JobState::is_in_flight)
    }

    pub fn refers_to(&self, job_id: &JobId) -> bool {
        self.active_job_id.as_ref() == Some(job_id)
    }
}
