use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    Submissions,
    SubmissionFailures,
    Polls,
    PollErrors,
    Completed,
    Failed,
    DiscardedReplies,
}

impl Counter {
    const ALL: [Counter; 7] = [
        Counter::Submissions,
        Counter::SubmissionFailures,
        Counter::Polls,
        Counter::PollErrors,
        Counter::Completed,
        Counter::Failed,
        Counter::DiscardedReplies,
    ];

    fn name(self) -> &'static str {
        match self {
            Counter::Submissions => "enrollq_submissions_total",
            Counter::SubmissionFailures => "enrollq_submission_failures_total",
            Counter::Polls => "enrollq_status_polls_total",
            Counter::PollErrors => "enrollq_status_poll_errors_total",
            Counter::Completed => "enrollq_jobs_completed_total",
            Counter::Failed => "enrollq_jobs_failed_total",
            Counter::DiscardedReplies => "enrollq_discarded_replies_total",
        }
    }

    fn help(self) -> &'static str {
        match self {
            Counter::Submissions => "Enrollment submissions sent",
            Counter::SubmissionFailures => "Enrollment submissions rejected or lost",
            Counter::Polls => "Job status checks answered",
            Counter::PollErrors => "Job status checks that failed",
            Counter::Completed => "Enrollment jobs observed completing",
            Counter::Failed => "Enrollment jobs observed failing or abandoned after errors",
            Counter::DiscardedReplies => "Status replies dropped because their attempt was superseded",
        }
    }
}

/// Workflow counters with Prometheus-compatible output
pub struct WorkflowMetrics {
    counters: DashMap<Counter, AtomicU64>,
    polls_per_job: DashMap<String, AtomicU64>,
}

impl WorkflowMetrics {
    pub fn new() -> Self {
        Self {
            counters: DashMap::new(),
            polls_per_job: DashMap::new(),
        }
    }

    pub fn incr(&self, counter: Counter) {
        self.counters
            .entry(counter)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_poll(&self, job_id: &str) {
        self.incr(Counter::Polls);
        self.polls_per_job
            .entry(job_id.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.counters
            .get(&counter)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn export(&self) -> String {
        let mut output = String::new();

        for counter in Counter::ALL {
            output.push_str(&format!("# HELP {} {}\n", counter.name(), counter.help()));
            output.push_str(&format!("# TYPE {} counter\n", counter.name()));
            output.push_str(&format!("{} {}\n\n", counter.name(), self.get(counter)));
        }

        output.push_str("# HELP enrollq_job_polls_total Status checks answered per job\n");
        output.push_str("# TYPE enrollq_job_polls_total counter\n");
        let mut per_job: Vec<(String, u64)> = self
            .polls_per_job
            .iter()
            .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
            .collect();
        per_job.sort();
        for (job_id, polls) in per_job {
            output.push_str(&format!("enrollq_job_polls_total{{job_id=\"{}\"}} {}\n", job_id, polls));
        }

        output
    }
}

impl Default for WorkflowMetrics {
    fn default() -> Self {
        Self::new()
    }
}
