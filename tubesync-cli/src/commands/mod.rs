//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod downloads;
mod jobs;
mod notes;

use anyhow::Result;
use clap::{Subcommand, ValueEnum};
use tubesync_core::domain::job::JobKindTag;
use tubesync_core::domain::task::{ExecutionMode, TaskKind};
use tubesync_core::dto::media::MediaKind;
use tubesync_sync::SessionContext;

/// Job kind selector
#[derive(Clone, Copy, ValueEnum)]
pub enum KindArg {
    Brew,
    Test,
}

impl From<KindArg> for JobKindTag {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Brew => JobKindTag::ResearchBrew,
            KindArg::Test => JobKindTag::ComponentTestRun,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum MediaArg {
    Video,
    Audio,
}

impl From<MediaArg> for MediaKind {
    fn from(kind: MediaArg) -> Self {
        match kind {
            MediaArg::Video => MediaKind::Video,
            MediaArg::Audio => MediaKind::Audio,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum TaskArg {
    Ask,
    Analyze,
}

impl From<TaskArg> for TaskKind {
    fn from(kind: TaskArg) -> Self {
        match kind {
            TaskArg::Ask => TaskKind::Ask,
            TaskArg::Analyze => TaskKind::Analyze,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Server,
    Local,
}

impl From<ModeArg> for ExecutionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Server => ExecutionMode::Server,
            ModeArg::Local => ExecutionMode::Local,
        }
    }
}

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// List jobs
    Jobs {
        /// Only this kind
        #[arg(long, value_enum)]
        kind: Option<KindArg>,

        /// Only queued and running jobs
        #[arg(short, long)]
        active: bool,
    },
    /// Show one job fetched from the backend
    Job {
        job_id: String,

        /// Kind of the job, looked up when omitted
        #[arg(long, value_enum)]
        kind: Option<KindArg>,
    },
    /// Follow live job updates until interrupted
    Watch,
    /// Start a research brew with the saved filters
    Brew {
        topic: String,
    },
    /// Start a component test run
    TestRun {
        component: String,
    },
    /// Show recent downloads
    Recent {
        /// Reconcile with the server first
        #[arg(short, long)]
        refresh: bool,

        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },
    /// Build a direct media link
    Link {
        url: String,

        #[arg(long, value_enum, default_value = "video")]
        media: MediaArg,

        /// Wait for a server-side save the backend falls back to
        #[arg(short, long)]
        wait: bool,
    },
    /// Save a video on the server
    Save {
        url: String,

        /// Wait until the save is confirmed or times out
        #[arg(short, long)]
        wait: bool,
    },
    /// Ask a question about a video
    Ask {
        video_id: String,
        question: String,
    },
    /// Produce notes for a video
    Analyze {
        video_id: String,

        /// Discard a cached server analysis
        #[arg(short, long)]
        force: bool,
    },
    /// Show notes tasks running for a video in other sessions
    Progress {
        video_id: String,
    },
    /// Show or set where ask and analyze run
    Mode {
        #[arg(value_enum)]
        task: Option<TaskArg>,

        #[arg(value_enum)]
        mode: Option<ModeArg>,
    },
}

/// Handle a CLI command
///
/// # Arguments
/// * `command` - The command to execute
/// * `session` - The running session
pub async fn handle_command(command: Commands, session: &SessionContext) -> Result<()> {
    match command {
        Commands::Jobs { kind, active } => jobs::list_jobs(session, kind.map(Into::into), active).await,
        Commands::Job { job_id, kind } => jobs::show_job(session, &job_id, kind.map(Into::into)).await,
        Commands::Watch => jobs::watch(session).await,
        Commands::Brew { topic } => jobs::start_brew(session, &topic).await,
        Commands::TestRun { component } => jobs::start_test_run(session, &component).await,
        Commands::Recent { refresh, json } => downloads::list_recent(session, refresh, json).await,
        Commands::Link { url, media, wait } => downloads::build_link(session, &url, media.into(), wait).await,
        Commands::Save { url, wait } => downloads::start_save(session, &url, wait).await,
        Commands::Ask { video_id, question } => notes::ask(session, &video_id, &question).await,
        Commands::Analyze { video_id, force } => notes::analyze(session, &video_id, force).await,
        Commands::Progress { video_id } => notes::progress(session, &video_id).await,
        Commands::Mode { task, mode } => notes::mode(session, task.map(Into::into), mode.map(Into::into)),
    }
}
