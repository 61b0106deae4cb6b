use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use firewatch_core::config::{ClientConfig, QueueConfig};
use firewatch_core::dispatch::{
    DispatchError, DispatchResult, HttpDispatcher, OperationDispatcher,
};
use firewatch_core::models::{QueueItem, QueueOperation};
use firewatch_core::network::HttpConnectivityProbe;
use firewatch_core::store::{JsonFileQueueStore, QueueStore, SqliteQueueStore};
use firewatch_core::util::{clip_message, normalize_text_option};
use firewatch_core::{DrainOutcome, OfflineQueue, QueueStatus};
use serde::Serialize;

use crate::cli::StoreKind;
use crate::error::CliError;

pub const DATABASE_FILE: &str = "firewatch.db";

const SUMMARY_CHARS: usize = 60;

/// Everything a command needs to open the queue.
pub struct CommandContext {
    pub data_dir: PathBuf,
    pub store: StoreKind,
    pub config: ClientConfig,
}

/// How long the opened queue is expected to live.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum QueueMode {
    /// Exits after one command; no background passes are scheduled
    OneShot,
    /// Stays up and lets the queue reschedule itself
    Resident,
}

impl CommandContext {
    pub const fn delivery_configured(&self) -> bool {
        self.config.api_base_url.is_some()
    }

    pub fn ensure_delivery_configured(&self) -> Result<(), CliError> {
        if self.delivery_configured() {
            Ok(())
        } else {
            Err(CliError::ApiNotConfigured)
        }
    }

    pub fn queue_config(&self, mode: QueueMode) -> QueueConfig {
        match mode {
            QueueMode::OneShot => self.config.queue.clone().manual(),
            QueueMode::Resident => self.config.queue.clone(),
        }
    }

    pub async fn open_queue(&self, mode: QueueMode) -> Result<OfflineQueue, CliError> {
        let store = open_store(self.store, &self.data_dir)?;
        let dispatcher: Arc<dyn OperationDispatcher> = match &self.config.api_base_url {
            Some(base_url) => Arc::new(HttpDispatcher::new(
                base_url.clone(),
                self.config.api_token.clone(),
            )?),
            None => Arc::new(UnconfiguredDispatcher),
        };
        let probe = HttpConnectivityProbe::new(
            self.config.probe_url.clone(),
            self.config.probe_timeout,
        )
        .map_err(|error| CliError::Probe(error.to_string()))?;

        Ok(OfflineQueue::open(store, dispatcher, Arc::new(probe), self.queue_config(mode)).await?)
    }
}

/// Stands in when no API base URL is set. Commands check
/// [`CommandContext::delivery_configured`] before draining, so this only
/// answers if something drains anyway.
struct UnconfiguredDispatcher;

#[async_trait]
impl OperationDispatcher for UnconfiguredDispatcher {
    async fn dispatch(&self, _operation: &QueueOperation) -> DispatchResult<()> {
        Err(DispatchError::InvalidConfiguration(
            "FIREWATCH_API_BASE_URL is not set".to_string(),
        ))
    }
}

pub fn open_store(kind: StoreKind, data_dir: &Path) -> Result<Arc<dyn QueueStore>, CliError> {
    match kind {
        StoreKind::Json => Ok(Arc::new(JsonFileQueueStore::in_dir(data_dir))),
        StoreKind::Sqlite => Ok(Arc::new(SqliteQueueStore::open(
            data_dir.join(DATABASE_FILE),
        )?)),
    }
}

pub fn resolve_data_dir(cli_data_dir: Option<PathBuf>) -> Result<PathBuf, CliError> {
    cli_data_dir
        .or_else(|| env::var_os("FIREWATCH_DATA_DIR").map(PathBuf::from))
        .or_else(default_data_dir)
        .ok_or(CliError::DataDirUnavailable)
}

pub fn default_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("firewatch"))
}

#[derive(Debug, Serialize)]
pub struct QueueItemView {
    pub id: String,
    pub kind: String,
    pub status: String,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: i64,
    pub relative_time: String,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn item_to_view(item: &QueueItem, now_ms: i64) -> QueueItemView {
    QueueItemView {
        id: item.id.to_string(),
        kind: item.kind().to_string(),
        status: item.status.to_string(),
        retry_count: item.retry_count,
        max_retries: item.max_retries,
        created_at: item.timestamp,
        relative_time: format_relative_time(item.timestamp, now_ms),
        summary: operation_summary(&item.operation),
        error: item.error.clone(),
    }
}

pub fn format_item_lines(items: &[QueueItem], now_ms: i64) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            let mut line = format!(
                "{}  {:<10}  {}/{}  {:>8}  {}",
                item.id,
                item.status,
                item.retry_count,
                item.max_retries,
                format_relative_time(item.timestamp, now_ms),
                operation_summary(&item.operation)
            );
            if let Some(error) = &item.error {
                line.push_str(&format!("  [{error}]"));
            }
            line
        })
        .collect()
}

pub fn format_status_lines(status: &QueueStatus) -> Vec<String> {
    vec![
        format!("Total:      {}", status.total),
        format!("Pending:    {}", status.pending),
        format!("Processing: {}", status.processing),
        format!("Completed:  {}", status.completed),
        format!("Failed:     {}", status.failed),
    ]
}

pub fn operation_summary(operation: &QueueOperation) -> String {
    let summary = match operation {
        QueueOperation::CreateReport(report) => {
            let severity = report
                .severity
                .map(|severity| format!(" [{severity}]"))
                .unwrap_or_default();
            format!(
                "report ({:.4}, {:.4}){severity} {}",
                report.latitude, report.longitude, report.description
            )
        }
        QueueOperation::UpdateReport(update) => {
            let mut changes = Vec::new();
            if let Some(status) = update.status {
                changes.push(format!("status={status}"));
            }
            if let Some(severity) = update.severity {
                changes.push(format!("severity={severity}"));
            }
            if update.description.is_some() {
                changes.push("description".to_string());
            }
            format!("update {} {}", update.report_id, changes.join(" "))
        }
        QueueOperation::UploadImage(upload) => match &upload.report_id {
            Some(report_id) => format!("image {} -> {report_id}", upload.local_path),
            None => format!("image {}", upload.local_path),
        },
        QueueOperation::SyncData(request) => match request.since {
            Some(since) => format!("sync {} since {since}", request.scope),
            None => format!("sync {}", request.scope),
        },
    };
    truncate_chars(&clip_message(&summary), SUMMARY_CHARS)
}

pub fn describe_outcome(outcome: DrainOutcome) -> String {
    match outcome {
        DrainOutcome::AlreadyRunning => "Another delivery pass is already running".to_string(),
        DrainOutcome::Offline => "Backend unreachable; items stay queued".to_string(),
        DrainOutcome::Drained(summary) if summary.attempted() == 0 => {
            "Nothing to deliver".to_string()
        }
        DrainOutcome::Drained(summary) => format!(
            "Delivered {}, requeued {}, failed {}",
            summary.delivered, summary.requeued, summary.failed
        ),
    }
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}

pub fn normalize_description(parts: &[String]) -> Result<String, CliError> {
    normalize_text_option(Some(parts.join(" "))).ok_or(CliError::EmptyDescription)
}

pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<(), CliError> {
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(CliError::InvalidCoordinates(format!(
            "Latitude {latitude} is outside [-90, 90]"
        )));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(CliError::InvalidCoordinates(format!(
            "Longitude {longitude} is outside [-180, 180]"
        )));
    }
    Ok(())
}

pub fn infer_content_type(path: &Path) -> Result<String, CliError> {
    let extension = path
        .extension()
        .and_then(|value| value.to_str())
        .map(str::to_ascii_lowercase);
    let content_type = match extension.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        Some("gif") => "image/gif",
        _ => return Err(CliError::UnknownContentType(path.display().to_string())),
    };
    Ok(content_type.to_string())
}

fn truncate_chars(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let kept: String = value.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}
