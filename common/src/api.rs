//! Wire shapes of the enrollment backend.
//!
//! The backend speaks camelCase JSON for queue endpoints and snake_case for the
//! login payload; both are kept as-is here and converted into the domain types
//! from [`crate::job`] at the boundary.

use crate::job::{EnrollmentRequest, JobHandle, JobId, JobState, JobStatusSnapshot, JobTimestamps};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Either epoch milliseconds (queue timestamps) or an RFC 3339 string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireTimestamp {
    Millis(i64),
    Text(String),
}

impl WireTimestamp {
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            WireTimestamp::Millis(ms) => Utc.timestamp_millis_opt(*ms).single(),
            WireTimestamp::Text(s) => {
                if let Ok(ms) = s.parse::<i64>() {
                    return Utc.timestamp_millis_opt(ms).single();
                }
                DateTime::parse_from_rfc3339(s)
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc))
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitEnrollmentBody {
    pub registro: String,
    #[serde(rename = "ofertaId")]
    pub oferta_id: Vec<String>,
}

impl From<&EnrollmentRequest> for SubmitEnrollmentBody {
    fn from(req: &EnrollmentRequest) -> Self {
        Self {
            registro: req.student_id().to_string(),
            oferta_id: req.section_ids().to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitEnrollmentResponse {
    pub job_id: JobId,
    #[serde(default)]
    pub queue_name: Option<String>,
    #[serde(default)]
    pub status: Option<JobState>,
    #[serde(default)]
    pub timestamp: Option<WireTimestamp>,
}

impl SubmitEnrollmentResponse {
    pub fn into_handle(self) -> JobHandle {
        let submitted_at = self
            .timestamp
            .as_ref()
            .and_then(WireTimestamp::to_utc)
            .unwrap_or_else(Utc::now);
        JobHandle {
            job_id: self.job_id,
            queue_name: self.queue_name.unwrap_or_default(),
            initial_status: self.status.unwrap_or(JobState::Queued),
            submitted_at,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobOpts {
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub delay: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub job_id: JobId,
    #[serde(default)]
    pub queue_name: Option<String>,
    pub status: JobState,
    #[serde(default)]
    pub progress: Option<serde_json::Value>,
    #[serde(default, alias = "timestamp")]
    pub created_at: Option<WireTimestamp>,
    #[serde(default)]
    pub processed_on: Option<WireTimestamp>,
    #[serde(default)]
    pub finished_on: Option<WireTimestamp>,
    #[serde(default)]
    pub return_value: Option<serde_json::Value>,
    #[serde(default)]
    pub attempts_made: u32,
    #[serde(default)]
    pub opts: Option<JobOpts>,
    #[serde(default)]
    pub failed_reason: Option<String>,
}

impl JobStatusResponse {
    pub fn into_snapshot(self) -> JobStatusSnapshot {
        let progress = self
            .progress
            .as_ref()
            .and_then(|p| p.as_f64())
            .map(|p| p.clamp(0.0, 100.0).round() as u8)
            .unwrap_or(0);
        JobStatusSnapshot {
            job_id: self.job_id,
            status: self.status,
            progress,
            result: self.return_value,
            failure_reason: self.failed_reason,
            attempts_made: self.attempts_made,
            attempts_allowed: self.opts.map(|o| o.attempts).unwrap_or(0),
            timestamps: JobTimestamps {
                created: self.created_at.as_ref().and_then(WireTimestamp::to_utc),
                processed_on: self.processed_on.as_ref().and_then(WireTimestamp::to_utc),
                finished_on: self.finished_on.as_ref().and_then(WireTimestamp::to_utc),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginBody {
    pub registro: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferMaster {
    pub id: String,
}

/// Student fields returned by login. Everything except the token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentProfile {
    pub id: String,
    pub nombre: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub apellido_paterno: String,
    #[serde(default)]
    pub apellido_materno: String,
    #[serde(default)]
    pub telefono: String,
    #[serde(default)]
    pub ci: String,
    pub registro: String,
    #[serde(default)]
    pub ppac: f64,
    #[serde(default, rename = "maestroDeOferta", alias = "MaestroDeOferta")]
    pub offer_masters: Vec<OfferMaster>,
}

impl StudentProfile {
    pub fn full_name(&self) -> String {
        [self.nombre.as_str(), self.apellido_paterno.as_str(), self.apellido_materno.as_str()]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(flatten)]
    pub profile: StudentProfile,
}

/// Error body shape used by the backend; `message` is a string or a list of strings.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<serde_json::Value>,
}

impl ErrorBody {
    pub fn message_text(&self) -> Option<String> {
        match self.message.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(|i| i.as_str())
                    .collect::<Vec<_>>()
                    .join("; "),
            ),
            _ => None,
        }
    }
}
