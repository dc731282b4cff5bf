pub mod api;
pub mod job;
pub mod offer;
pub mod session;

pub use api::{LoginResponse, StudentProfile, OfferMaster};
pub use job::{EnrollmentRequest, JobHandle, JobId, JobState, JobStatusSnapshot, JobTimestamps};
pub use offer::{CourseOffer, EnrolledCourse};
pub use session::EnrollmentSession;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:4000/api/";
pub const BACKEND_URL_ENV: &str = "ENROLLQ_BACKEND_URL";

// Storage keys. The handoff prefix must never collide with the session or auth keys.
pub const SESSION_KEY: &str = "inscripcion-status";
pub const AUTH_KEY: &str = "auth";
pub const HANDOFF_PREFIX: &str = "handoff.";

// Timing of the enrollment workflow, in milliseconds.
pub const POLL_INTERVAL_MS: u64 = 2_000;
pub const COMPLETED_GRACE_MS: u64 = 30_000;
pub const VIEW_CLEAR_MS: u64 = 3_000;

pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
pub const DEFAULT_DB_FILE: &str = "enrollq.db";
