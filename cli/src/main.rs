mod output;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use common::{CourseOffer, JobId, JobState};
use engine::api::EnrollmentApi;
use engine::auth::AuthRecord;
use engine::banner::Banner;
use engine::config::Config;
use engine::slip::SlipStatistics;
use engine::tracker::TrackerEvent;
use engine::workflow::{Phase, WorkflowView};
use engine::Services;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (.yaml, .yml or .toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with a student registration number
    Login {
        #[arg(short, long)]
        registro: String,
        #[arg(short, long)]
        password: String,
    },
    /// Forget the stored login
    Logout,
    /// Show the logged-in student
    Whoami,
    /// List the section offers of an offer master
    Offers {
        /// Offer master ID; defaults to the first one on the student's record
        master_id: Option<String>,
        /// Offer IDs to stash for the next `enroll`, comma separated
        #[arg(long, value_delimiter = ',')]
        select: Vec<String>,
    },
    /// Submit an enrollment and follow it until it settles
    Enroll {
        /// Offer IDs; defaults to the selection stashed by `offers --select`
        ids: Vec<String>,
        /// Return as soon as the job is queued; follow it later with `status`
        #[arg(long)]
        detach: bool,
        /// Print workflow counters when done
        #[arg(long)]
        metrics: bool,
    },
    /// Follow an enrollment job until it completes or fails
    Status {
        /// Job ID; defaults to the last submitted job
        job_id: Option<String>,
    },
    /// Show the in-progress enrollment banner, if any
    Banner,
    /// Stop following the current enrollment locally. The server job is not cancelled.
    Cancel,
    /// Show the enrollment slip
    Slip {
        /// Also write the slip to a CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Show past enrollment attempts
    History {
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    engine::logging::setup_logging(&config.logging, cli.verbose)?;
    let services = Services::open(config)?;

    match cli.command {
        Commands::Login { registro, password } => {
            let login = services.api.login(&registro, &password).await?;
            let record = services.auth.save(login)?;
            services.api.set_token(Some(record.token.clone()));
            println!("Logged in as {} ({})", record.user.full_name(), record.user.registro);
        }
        Commands::Logout => {
            services.auth.clear()?;
            services.handoff.clear_all()?;
            services.api.set_token(None);
            println!("Logged out.");
        }
        Commands::Whoami => {
            let record = services.auth.require()?;
            let user = &record.user;
            println!("Student:  {}", user.full_name());
            println!("Registro: {}", user.registro);
            if !user.email.is_empty() {
                println!("Email:    {}", user.email);
            }
            println!("PPAC:     {:.2}", user.ppac);
            for master in &user.offer_masters {
                println!("Offer:    {}", master.id);
            }
        }
        Commands::Offers { master_id, select } => {
            let record = services.auth.require()?;
            let master_id = match master_id {
                Some(id) => id,
                None => record
                    .user
                    .offer_masters
                    .first()
                    .map(|m| m.id.clone())
                    .ok_or_else(|| anyhow!("No offer master on record; pass one explicitly"))?,
            };
            let offers = services.api.fetch_offers(&master_id).await?;
            if offers.is_empty() {
                println!("No sections offered.");
                return Ok(());
            }
            println!("{}", output::offers_table(&offers));

            if !select.is_empty() {
                let picked = pick_offers(&offers, &select)?;
                services.handoff.stash_selection(&picked)?;
                println!(
                    "Selected {} sections ({} credits). Run `enroll` to submit them.",
                    picked.len(),
                    common::offer::total_credits(&picked)
                );
            }
        }
        Commands::Enroll { ids, detach, metrics } => {
            let record = services.auth.require()?;
            enroll(&services, &record, ids, detach).await?;
            if metrics {
                print!("{}", services.metrics.export());
            }
        }
        Commands::Status { job_id } => {
            services.auth.require()?;
            let tracker = services.tracker();
            let snapshot = tracker
                .track(job_id.map(JobId), |event| match event {
                    TrackerEvent::Status(snapshot) => output::print_snapshot_line(snapshot),
                    TrackerEvent::PollError(message) => eprintln!("  status check failed: {}", message),
                })
                .await?;
            output::print_final(&snapshot);
        }
        Commands::Banner => match Banner::from_session(&services.session.snapshot()) {
            Some(banner) => print!("{}", banner.render()),
            None => println!("No enrollment in progress."),
        },
        Commands::Cancel => {
            let session = services.session.snapshot();
            services.session.clear()?;
            services.handoff.clear_pending()?;
            match session.active_job_id {
                Some(job_id) => println!("Stopped following job {}. The server may still process it.", job_id),
                None => println!("Nothing to cancel."),
            }
        }
        Commands::Slip { csv } => {
            let record = services.auth.require()?;
            let courses = services.api.enrolled_courses(&record.user.id).await?;
            if courses.is_empty() {
                println!("No enrolled courses.");
                return Ok(());
            }
            println!("{}", output::slip_table(&courses));
            output::print_statistics(&SlipStatistics::from_courses(&courses));
            if let Some(path) = csv {
                output::write_slip_csv(&path, &courses)
                    .with_context(|| format!("Failed to write {:?}", path))?;
                println!("Slip written to {:?}", path);
            }
        }
        Commands::History { limit } => {
            let entries = services.db.lock().unwrap().get_history(limit)?;
            if entries.is_empty() {
                println!("No enrollment attempts recorded.");
            } else {
                println!("{}", output::history_table(&entries));
            }
        }
    }

    Ok(())
}

fn pick_offers(offers: &[CourseOffer], ids: &[String]) -> anyhow::Result<Vec<CourseOffer>> {
    ids.iter()
        .map(|id| {
            offers
                .iter()
                .find(|o| &o.id == id)
                .cloned()
                .ok_or_else(|| anyhow!("Offer {} is not in this list", id))
        })
        .collect()
}

async fn enroll(services: &Services, record: &AuthRecord, ids: Vec<String>, detach: bool) -> anyhow::Result<()> {
    let (ids, sections) = if ids.is_empty() {
        let selection = services
            .handoff
            .peek_selection()?
            .ok_or_else(|| anyhow!("No sections given and nothing selected; use `offers --select`"))?;
        (selection.iter().map(|o| o.id.clone()).collect(), selection)
    } else {
        let stashed = services.handoff.peek_selection()?.unwrap_or_default();
        let sections = stashed.into_iter().filter(|o| ids.contains(&o.id)).collect();
        (ids, sections)
    };

    let workflow = services.workflow(Some(record.user.registro.clone()));
    let mut rx = workflow.subscribe();
    let handle = workflow.start_enrollment(ids).await?;
    services.handoff.record_submission(&handle.job_id, &sections)?;
    println!("Enrollment queued as job {} ({})", handle.job_id, handle.initial_status);

    if detach {
        println!("Follow it with `enrollq status`.");
        return Ok(());
    }

    let mut last_printed = None;
    let mut last_error: Option<String> = None;
    let view: WorkflowView = loop {
        let view = rx.borrow_and_update().clone();
        if let Some(snapshot) = &view.job_status {
            let key = (snapshot.status, snapshot.progress);
            if last_printed != Some(key) {
                output::print_snapshot_line(snapshot);
                last_printed = Some(key);
            }
        }
        if view.poll_error != last_error {
            if let Some(message) = &view.poll_error {
                eprintln!("  status check failed: {}", message);
            }
            last_error = view.poll_error.clone();
        }
        if view.phase.is_settled() {
            break view;
        }

        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break rx.borrow().clone();
                }
            }
            _ = tokio::signal::ctrl_c() => {
                workflow.cleanup();
                println!("\nStopped watching. The enrollment keeps running; check it with `enrollq status`.");
                return Ok(());
            }
        }
    };

    match view.phase {
        Phase::Completed => {
            services.handoff.clear_pending()?;
            if let Some(snapshot) = &view.job_status {
                output::print_final(snapshot);
            }
        }
        _ => {
            if let Some(snapshot) = view.job_status.as_ref().filter(|s| s.status == JobState::Failed) {
                output::print_final(snapshot);
            }
            if let Some(error) = view.error {
                if error.is_retryable() {
                    eprintln!("The selection was released; you can submit again.");
                }
                return Err(error.into());
            }
        }
    }
    Ok(())
}
