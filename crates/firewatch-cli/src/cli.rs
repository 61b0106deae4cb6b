use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use firewatch_core::models::{QueueItemStatus, ReportStatus, Severity};

#[derive(Parser)]
#[command(name = "firewatch")]
#[command(about = "Queue wildfire reports offline and deliver them when the network returns")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding the persisted queue
    #[arg(long, global = true, value_name = "PATH")]
    pub data_dir: Option<PathBuf>,

    /// Queue storage backend
    #[arg(long, global = true, value_enum, default_value_t = StoreKind::Sqlite)]
    pub store: StoreKind,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Queue a new fire report
    Report {
        /// What was observed
        description: Vec<String>,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        #[arg(long, value_enum)]
        severity: Option<SeverityArg>,
        /// Free-form fire type (brush, structure, ...)
        #[arg(long, value_name = "TYPE")]
        fire_type: Option<String>,
        /// Also queue an upload of this local image
        #[arg(long, value_name = "PATH")]
        image: Option<PathBuf>,
        /// Only queue; skip the immediate delivery attempt
        #[arg(long)]
        no_drain: bool,
    },
    /// Queue a change to an existing report
    Update {
        report_id: String,
        #[arg(long, value_enum)]
        status: Option<ReportStatusArg>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, value_enum)]
        severity: Option<SeverityArg>,
        #[arg(long)]
        no_drain: bool,
    },
    /// Queue an image upload
    Upload {
        path: PathBuf,
        /// MIME type; inferred from the extension when omitted
        #[arg(long, value_name = "MIME")]
        content_type: Option<String>,
        /// Attach the image to this report
        #[arg(long, value_name = "ID")]
        report_id: Option<String>,
        #[arg(long)]
        no_drain: bool,
    },
    /// Queue a pull of server-side changes
    Sync {
        #[arg(long, default_value = "reports")]
        scope: String,
        /// Only changes after this Unix ms cursor
        #[arg(long, value_name = "MS")]
        since: Option<i64>,
        #[arg(long)]
        no_drain: bool,
    },
    /// Inspect and maintain the queue
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
    /// Keep draining on an interval until interrupted
    Watch {
        /// Seconds between passes (defaults to FIREWATCH_SYNC_INTERVAL_SECS)
        #[arg(long, value_name = "SECS")]
        interval_secs: Option<u64>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum QueueCommands {
    /// Show per-status counts
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List queued items
    List {
        /// Only items with this status
        #[arg(long, value_enum)]
        status: Option<ItemStatusArg>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run one delivery pass now
    Drain,
    /// Return failed items to pending and deliver them
    Retry,
    /// Remove completed items (or everything with --all)
    Clear {
        #[arg(long)]
        all: bool,
    },
    /// Purge items older than the retention window
    Cleanup,
    /// Remove a single item
    Remove { id: String },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum StoreKind {
    Json,
    Sqlite,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum SeverityArg {
    Low,
    Medium,
    High,
    Critical,
}

impl From<SeverityArg> for Severity {
    fn from(value: SeverityArg) -> Self {
        match value {
            SeverityArg::Low => Self::Low,
            SeverityArg::Medium => Self::Medium,
            SeverityArg::High => Self::High,
            SeverityArg::Critical => Self::Critical,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ReportStatusArg {
    Submitted,
    Verified,
    Contained,
    Resolved,
    Dismissed,
}

impl From<ReportStatusArg> for ReportStatus {
    fn from(value: ReportStatusArg) -> Self {
        match value {
            ReportStatusArg::Submitted => Self::Submitted,
            ReportStatusArg::Verified => Self::Verified,
            ReportStatusArg::Contained => Self::Contained,
            ReportStatusArg::Resolved => Self::Resolved,
            ReportStatusArg::Dismissed => Self::Dismissed,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ItemStatusArg {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl From<ItemStatusArg> for QueueItemStatus {
    fn from(value: ItemStatusArg) -> Self {
        match value {
            ItemStatusArg::Pending => Self::Pending,
            ItemStatusArg::Processing => Self::Processing,
            ItemStatusArg::Completed => Self::Completed,
            ItemStatusArg::Failed => Self::Failed,
        }
    }
}
