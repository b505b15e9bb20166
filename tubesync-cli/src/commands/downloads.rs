//! Download command handlers

use anyhow::{Context, Result};
use colored::*;
use tubesync_core::domain::recent::SaveStatus;
use tubesync_core::dto::media::MediaKind;
use tubesync_sync::SessionContext;
use tubesync_sync::recent::RecentItem;
use tubesync_sync::service::SaveOutcome;

pub async fn list_recent(session: &SessionContext, refresh: bool, json: bool) -> Result<()> {
    let items = if refresh {
        session
            .refresh_videos()
            .await
            .context("Failed to refresh saved videos")?
    } else {
        session.recent_view()
    };

    if json {
        let entries: Vec<_> = items.iter().map(|item| &item.entry).collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("{}", "No recent downloads.".yellow());
        return Ok(());
    }

    println!("{}", format!("{} recent download(s):", items.len()).bold());
    println!();
    for item in &items {
        print_recent(item);
    }
    Ok(())
}

pub async fn build_link(session: &SessionContext, url: &str, kind: MediaKind, wait: bool) -> Result<()> {
    let outcome = session
        .build_link(url, kind)
        .await
        .context("Failed to build link")?;

    let link = outcome.response.download_url.trim();
    if !link.is_empty() {
        println!("{} {} link ready", "✓".green(), kind.as_str());
        println!("  {}", link.cyan());
        if outcome.response.temporary {
            println!("  {}", "The link is temporary and may expire.".dimmed());
        }
    }

    match outcome.save {
        Some(save) => report_save(session, url, save, wait).await,
        None => Ok(()),
    }
}

pub async fn start_save(session: &SessionContext, url: &str, wait: bool) -> Result<()> {
    let outcome = session.start_save(url).await.context("Failed to start save")?;
    report_save(session, url, outcome, wait).await
}

async fn report_save(session: &SessionContext, url: &str, outcome: SaveOutcome, wait: bool) -> Result<()> {
    match outcome {
        SaveOutcome::Saved { public_url } => {
            println!("{} Saved on server", "✓".green());
            println!("  {}", public_url.cyan());
        }
        SaveOutcome::Busy { message } => {
            println!("{} {}", "⚠".yellow(), message.yellow());
        }
        SaveOutcome::Started if wait => {
            println!("{}", "Server save started, waiting for confirmation...".dimmed());
            session.downloads().wait_for_monitors().await;
            match session.recent().find(url) {
                Some(entry) if entry.save_status == SaveStatus::Saved => {
                    println!("{} Saved on server", "✓".green());
                    println!("  {}", entry.saved_video_url.cyan());
                }
                Some(entry) => {
                    println!("{} {}", "✗".red(), entry.save_message.red());
                }
                None => {}
            }
        }
        SaveOutcome::Started => {
            println!("{} Server save started", "✓".green());
        }
    }
    Ok(())
}

fn print_recent(item: &RecentItem) {
    let entry = &item.entry;
    println!("  {} {}", "▸".cyan(), entry.display_title());
    println!("    URL:     {}", entry.url.dimmed());
    if item.status != SaveStatus::None {
        println!("    Save:    {}", colorize_save(item.status));
    }
    if !entry.saved_video_url.is_empty() {
        println!("    File:    {}", entry.saved_video_url.cyan());
    }
    if !entry.save_message.is_empty() && item.status != SaveStatus::Saved {
        println!("    Message: {}", entry.save_message);
    }
    println!(
        "    Updated: {}",
        entry.updated_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
    );
}

fn colorize_save(status: SaveStatus) -> ColoredString {
    let label = status.as_str();
    match status {
        SaveStatus::Saved => label.green(),
        SaveStatus::Started | SaveStatus::Running => label.cyan(),
        SaveStatus::Busy => label.yellow(),
        SaveStatus::Error => label.red(),
        SaveStatus::None => label.normal(),
    }
}
