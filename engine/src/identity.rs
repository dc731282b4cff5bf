use crate::config::IdempotencyMode;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Idempotency token of one enrollment attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    /// Fresh random token; two attempts with the same selection never share one.
    pub fn random() -> Self {
        RequestId(Uuid::new_v4().to_string())
    }

    /// Same student, same set of sections and same time bucket give the same token,
    /// so a retry after a lost response maps onto the job the server already created.
    pub fn content_bucketed(student_id: &str, section_ids: &[String], at: DateTime<Utc>, bucket_secs: u64) -> Self {
        let mut sorted: Vec<&str> = section_ids.iter().map(String::as_str).collect();
        sorted.sort_unstable();
        let bucket = at.timestamp().div_euclid(bucket_secs.max(1) as i64);
        let name = format!("{}|{}|{}", student_id, sorted.join(","), bucket);
        RequestId(Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string())
    }

    pub fn generate(mode: IdempotencyMode, student_id: &str, section_ids: &[String], bucket_secs: u64) -> Self {
        match mode {
            IdempotencyMode::Random => Self::random(),
            IdempotencyMode::ContentBucketed => Self::content_bucketed(student_id, section_ids, Utc::now(), bucket_secs),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
