use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use common::{CourseOffer, EnrolledCourse, JobStatusSnapshot};
use engine::db::HistoryEntry;
use engine::slip::SlipStatistics;
use std::path::Path;

fn table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn offers_table(offers: &[CourseOffer]) -> Table {
    let mut table = table();
    table.set_header(vec!["Offer ID", "Code", "Subject", "Group", "Sem", "Cr", "Seats", "Teacher", "Schedule"]);
    for offer in offers {
        let detail = &offer.detalle_grupo_materia;
        table.add_row(vec![
            Cell::new(&offer.id),
            Cell::new(&detail.materia.sigla),
            Cell::new(&detail.materia.nombre),
            Cell::new(&detail.grupo),
            Cell::new(detail.materia.nivel.semestre),
            Cell::new(offer.credits()),
            Cell::new(format!("{}/{}", offer.seats_left(), detail.cupos)),
            Cell::new(offer.teacher_name()),
            Cell::new(offer.schedule_lines().join("\n")),
        ]);
    }
    table
}

pub fn slip_table(courses: &[EnrolledCourse]) -> Table {
    let mut table = table();
    table.set_header(vec!["Code", "Subject", "Group", "Sem", "Cr", "Grade"]);
    for course in courses {
        let group = &course.grupo_materia;
        table.add_row(vec![
            Cell::new(&group.materia.sigla),
            Cell::new(&group.materia.nombre),
            Cell::new(&group.grupo),
            Cell::new(group.materia.nivel.semestre),
            Cell::new(group.materia.creditos),
            Cell::new(grade_text(course.nota)),
        ]);
    }
    table
}

pub fn history_table(entries: &[HistoryEntry]) -> Table {
    let mut table = table();
    table.set_header(vec!["Submitted", "Job ID", "Sections", "Status", "Detail"]);
    for entry in entries {
        table.add_row(vec![
            Cell::new(&entry.submitted_at),
            Cell::new(&entry.job_id),
            Cell::new(entry.sections.join(", ")),
            Cell::new(entry.final_status.as_deref().unwrap_or("in progress")),
            Cell::new(entry.detail.as_deref().unwrap_or("")),
        ]);
    }
    table
}

fn grade_text(grade: Option<f64>) -> String {
    match grade {
        Some(g) => format!("{:.0}", g),
        None => "-".to_string(),
    }
}

pub fn print_statistics(stats: &SlipStatistics) {
    println!("Courses:          {}", stats.total_courses);
    println!("Credits:          {} ({} approved)", stats.total_credits, stats.approved_credits);
    match stats.average {
        Some(avg) => println!("Average:          {:.2}", avg),
        None => println!("Average:          -"),
    }
    println!(
        "Approved/Regular/Failed/In progress: {}/{}/{}/{}",
        stats.approved, stats.regular, stats.failed, stats.in_progress
    );
}

pub fn write_slip_csv(path: &Path, courses: &[EnrolledCourse]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(["sigla", "materia", "grupo", "semestre", "creditos", "nota"])?;
    for course in courses {
        let group = &course.grupo_materia;
        wtr.write_record([
            group.materia.sigla.clone(),
            group.materia.nombre.clone(),
            group.grupo.clone(),
            group.materia.nivel.semestre.to_string(),
            group.materia.creditos.to_string(),
            course.nota.map(|n| n.to_string()).unwrap_or_default(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn print_snapshot_line(snapshot: &JobStatusSnapshot) {
    println!(
        "  {:<10} {:>3}%  (attempt {}/{})",
        snapshot.status.as_str(),
        snapshot.progress,
        snapshot.attempts_made,
        snapshot.attempts_allowed
    );
}

pub fn print_final(snapshot: &JobStatusSnapshot) {
    match snapshot.status {
        common::JobState::Completed => {
            println!("Enrollment completed.");
            if let Some(message) = snapshot.result_message() {
                println!("  {}", message);
            }
        }
        _ => {
            println!("Enrollment failed.");
            if let Some(reason) = &snapshot.failure_reason {
                println!("  Reason: {}", reason);
            }
            println!("  Attempts: {}/{}", snapshot.attempts_made, snapshot.attempts_allowed);
        }
    }
    if let Some(finished) = snapshot.timestamps.finished_on {
        println!("  Finished: {}", finished.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S"));
    }
}
