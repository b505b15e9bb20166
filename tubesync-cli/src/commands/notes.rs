//! Notes command handlers

use anyhow::{Context, Result};
use colored::*;
use tubesync_core::domain::task::{ExecutionMode, TaskKind, TaskOrigin};
use tubesync_sync::SessionContext;
use tubesync_sync::inference::InferenceStatus;
use tubesync_sync::service::NotesOutcome;

fn print_status(status: InferenceStatus) {
    let line = match status {
        InferenceStatus::Probing { provider } => format!("Checking {provider}..."),
        InferenceStatus::Initializing { provider, detail } => format!("Preparing {provider} ({detail})..."),
        InferenceStatus::Ready { backend } => format!("Using {backend}"),
        InferenceStatus::Window { index, total } => format!("Analyzing part {index}/{total}..."),
        InferenceStatus::Merging { parts } => format!("Merging {parts} parts..."),
        InferenceStatus::EvidencePass => "Looking for stronger evidence...".to_string(),
    };
    eprintln!("{}", line.dimmed());
}

pub async fn ask(session: &SessionContext, video_id: &str, question: &str) -> Result<()> {
    let outcome = session
        .ask(video_id, question, &print_status)
        .await
        .context("Failed to ask")?;
    print_outcome(outcome);
    Ok(())
}

pub async fn analyze(session: &SessionContext, video_id: &str, force: bool) -> Result<()> {
    let outcome = session
        .analyze(video_id, force, &print_status)
        .await
        .context("Failed to analyze")?;
    print_outcome(outcome);
    Ok(())
}

pub async fn progress(session: &SessionContext, video_id: &str) -> Result<()> {
    let notes = session.notes();
    let remote = notes
        .refresh_remote(video_id)
        .await
        .context("Failed to fetch video")?;
    let analysis = notes
        .analyze_progress(video_id)
        .await
        .context("Failed to fetch analysis progress")?;

    if remote.is_empty() {
        println!("{}", "No notes task is running elsewhere.".green());
    } else {
        for kind in &remote {
            println!("{} {} running in another session", "⚠".yellow(), kind.as_str().yellow());
        }
    }

    let status = if analysis.status.is_empty() { "idle" } else { analysis.status.as_str() };
    println!("  {:<8} {}", "analyze", status.cyan());
    if !analysis.message.is_empty() {
        println!("  {}", analysis.message.dimmed());
    }
    Ok(())
}

/// Shows both modes, or sets one
pub fn mode(session: &SessionContext, task: Option<TaskKind>, mode: Option<ExecutionMode>) -> Result<()> {
    let prefs = session.prefs();
    if let (Some(task), Some(mode)) = (task, mode) {
        prefs.set_execution_mode(task, mode);
    }

    let kinds = match task {
        Some(task) => vec![task],
        None => vec![TaskKind::Ask, TaskKind::Analyze],
    };
    for kind in kinds {
        let mode = match prefs.execution_mode(kind) {
            ExecutionMode::Server => "server".cyan(),
            ExecutionMode::Local => "local".green(),
        };
        println!("  {:<8} {}", kind.as_str(), mode);
    }
    Ok(())
}

fn print_outcome(outcome: NotesOutcome) {
    match outcome {
        NotesOutcome::Answer { text, backend, cached } => {
            let source = if cached { format!("{backend}, cached") } else { backend };
            println!("{}", format!("Answer ({source}):").bold());
            println!("{text}");
        }
        NotesOutcome::Analysis { text, backend, stored } => {
            println!("{}", format!("Notes ({backend}):").bold());
            println!("{text}");
            if !stored {
                println!("{}", "The notes could not be stored on the server.".yellow());
            }
        }
        NotesOutcome::Busy { message, origin, progress } => {
            println!("{} {}", "⚠".yellow(), message.yellow());
            if let Some(progress) = progress.filter(|p| !p.message.is_empty()) {
                println!("  {}", progress.message.dimmed());
            }
            if origin == TaskOrigin::Remote {
                println!("  {}", "Try again once the other session finishes.".dimmed());
            }
        }
    }
}
