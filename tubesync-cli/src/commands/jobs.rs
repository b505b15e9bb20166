//! Job command handlers
//!
//! Listing, live watching and starting research brews and test runs.

use anyhow::{Context, Result};
use colored::*;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;
use tubesync_core::domain::job::{Job, JobKind, JobKindTag, JobStatus};
use tubesync_sync::events::{SyncEvent, TransportStatus};
use tubesync_sync::SessionContext;

const KINDS: [JobKindTag; 2] = [JobKindTag::ResearchBrew, JobKindTag::ComponentTestRun];

/// List jobs after one pull from the backend
pub async fn list_jobs(session: &SessionContext, kind: Option<JobKindTag>, active: bool) -> Result<()> {
    session.refresh_jobs().await.context("Failed to list jobs")?;

    let registry = session.registry();
    let jobs: Vec<Job> = if active {
        registry.active_jobs(kind)
    } else {
        KINDS
            .into_iter()
            .filter(|k| kind.is_none_or(|wanted| wanted == *k))
            .flat_map(|k| registry.jobs(k))
            .collect()
    };

    if jobs.is_empty() {
        println!("{}", "No jobs found.".yellow());
        return Ok(());
    }

    println!("{}", format!("Found {} job(s):", jobs.len()).bold());
    println!();
    for job in &jobs {
        print_job_summary(job, false);
    }
    Ok(())
}

pub async fn show_job(session: &SessionContext, job_id: &str, kind: Option<JobKindTag>) -> Result<()> {
    let job = session
        .refresh_job(job_id, kind)
        .await
        .with_context(|| format!("Failed to fetch job {job_id}"))?;
    print_job_summary(&job, false);
    Ok(())
}

/// Follow live updates until Ctrl+C
pub async fn watch(session: &SessionContext) -> Result<()> {
    let mut rx = session.events().subscribe();
    session.start();
    println!("{}", "Watching jobs, press Ctrl+C to stop.".dimmed());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = rx.recv() => match event {
                Ok(SyncEvent::JobsChanged { kind }) => print_active(session, kind),
                Ok(SyncEvent::Transport(status)) => print_transport(status),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Watcher fell behind, showing current state");
                    for kind in KINDS {
                        print_active(session, kind);
                    }
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    Ok(())
}

pub async fn start_brew(session: &SessionContext, topic: &str) -> Result<()> {
    let job = session.start_brew(topic).await.context("Failed to start brew")?;
    println!("{} Brew started", "✓".green());
    print_job_summary(&job, false);
    Ok(())
}

pub async fn start_test_run(session: &SessionContext, component: &str) -> Result<()> {
    let job = session
        .start_test_run(component)
        .await
        .context("Failed to start test run")?;
    println!("{} Test run started", "✓".green());
    print_job_summary(&job, false);
    Ok(())
}

fn print_active(session: &SessionContext, kind: JobKindTag) {
    let registry = session.registry();
    let selected = registry.selected_job(kind).map(|j| j.id().to_string());
    let active = registry.active_jobs(Some(kind));

    println!("{}", format!("{} ({} active)", kind.as_str(), active.len()).bold());
    for job in &active {
        print_job_summary(job, selected.as_deref() == Some(job.id()));
    }
}

fn print_transport(status: TransportStatus) {
    let label = format!("{status:?}").to_lowercase();
    let colored = match status {
        TransportStatus::Live => label.green(),
        TransportStatus::Connecting | TransportStatus::Polling => label.cyan(),
        TransportStatus::Degraded => label.yellow(),
        TransportStatus::Stopped => label.dimmed(),
    };
    println!("{} transport {}", "●".dimmed(), colored);
}

fn print_job_summary(job: &Job, selected: bool) {
    let marker = if selected { "▶".green() } else { "▸".cyan() };
    let progress = job.progress();

    println!("  {} {} {}", marker, job.id().dimmed(), describe(job));
    println!(
        "    Status:   {} ({})",
        colorize_status(job.status()),
        job.stage_label()
    );
    if progress.total_steps > 0 {
        println!(
            "    Progress: {}/{} ({:.0}%)",
            progress.step,
            progress.total_steps,
            progress.ratio * 100.0
        );
    }
    println!(
        "    Updated:  {}",
        job.updated_at().format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
    );
}

fn describe(job: &Job) -> String {
    match job.kind() {
        JobKind::ResearchBrew(brew) => format!("brew \"{}\"", brew.topic),
        JobKind::ComponentTestRun(run) if !run.component_label.is_empty() => {
            format!("test run {}", run.component_label)
        }
        JobKind::ComponentTestRun(run) => format!("test run {}", run.component),
    }
}

fn colorize_status(status: JobStatus) -> ColoredString {
    let label = status.as_str();
    match status {
        JobStatus::Queued => label.yellow(),
        JobStatus::Running => label.cyan(),
        JobStatus::Completed => label.green(),
        JobStatus::Failed => label.red(),
    }
}
