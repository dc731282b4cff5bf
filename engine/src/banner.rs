use common::{EnrollmentSession, JobId, JobState};

const MAX_LISTED_SECTIONS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Processing,
    Queued,
}

/// Persistent "enrollment in progress" notice, derived from the shared session.
#[derive(Debug, Clone, PartialEq)]
pub struct Banner {
    pub job_id: JobId,
    pub tone: Tone,
    pub title: &'static str,
    pub description: &'static str,
    pub listed_sections: Vec<String>,
    pub more_sections: usize,
    pub total_sections: usize,
}

impl Banner {
    /// None unless the session holds an in-flight job.
    pub fn from_session(session: &EnrollmentSession) -> Option<Self> {
        if !session.has_active() {
            return None;
        }
        let job_id = session.active_job_id.clone()?;
        let (tone, title, description) = match session.active_status? {
            JobState::Delayed | JobState::Paused => (
                Tone::Queued,
                "Enrollment queued",
                "Your enrollment is waiting in the processing queue",
            ),
            _ => (
                Tone::Processing,
                "Enrollment in progress",
                "Your enrollment is being processed",
            ),
        };

        let sections = session.sections_in_process.clone().unwrap_or_default();
        let total_sections = sections.len();
        Some(Self {
            job_id,
            tone,
            title,
            description,
            more_sections: total_sections.saturating_sub(MAX_LISTED_SECTIONS),
            listed_sections: sections.into_iter().take(MAX_LISTED_SECTIONS).collect(),
            total_sections,
        })
    }

    pub fn render(&self) -> String {
        let marker = match self.tone {
            Tone::Processing => "*",
            Tone::Queued => "~",
        };
        let mut out = format!("[{}] {}\n    {}\n", marker, self.title, self.description);
        if self.total_sections > 0 {
            let mut listed = self.listed_sections.join(", ");
            if self.more_sections > 0 {
                listed.push_str(&format!(" +{} more", self.more_sections));
            }
            out.push_str(&format!("    Sections ({}): {}\n", self.total_sections, listed));
        }
        out.push_str(&format!("    ID: {}...\n", self.job_id.short()));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_banner_without_active_job() {
        assert!(Banner::from_session(&EnrollmentSession::default()).is_none());

        let mut done = EnrollmentSession::active(JobId::from("job-1"), vec![]);
        done.active_status = Some(JobState::Completed);
        assert!(Banner::from_session(&done).is_none());
    }

    #[test]
    fn test_banner_truncates_sections() {
        let sections = ["A", "B", "C", "D", "E"].iter().map(|s| s.to_string()).collect();
        let mut session = EnrollmentSession::active(JobId::from("1234567890abc"), sections);
        session.active_status = Some(JobState::Paused);

        let banner = Banner::from_session(&session).unwrap();
        assert_eq!(banner.tone, Tone::Queued);
        assert_eq!(banner.listed_sections, vec!["A", "B", "C"]);
        assert_eq!(banner.more_sections, 2);

        let text = banner.render();
        assert!(text.contains("Sections (5): A, B, C +2 more"));
        assert!(text.contains("ID: 12345678..."));
    }
}
