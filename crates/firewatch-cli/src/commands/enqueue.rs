use std::path::Path;

use firewatch_core::models::{
    ImageUpload, NewReport, QueueOperation, ReportStatus, ReportUpdate, Severity, SyncRequest,
};
use firewatch_core::util::normalize_text_option;

use crate::commands::common::{
    describe_outcome, infer_content_type, normalize_description, validate_coordinates,
    CommandContext, QueueMode,
};
use crate::error::CliError;

/// Queue `operations` in order, then make one delivery attempt unless told not to.
pub async fn run_enqueue(
    ctx: &CommandContext,
    operations: Vec<QueueOperation>,
    no_drain: bool,
) -> Result<(), CliError> {
    let queue = ctx.open_queue(QueueMode::OneShot).await?;
    for operation in operations {
        let kind = operation.kind();
        let id = queue.enqueue(operation).await;
        println!("Queued {kind} as {id}");
    }

    if no_drain {
        return Ok(());
    }
    if !ctx.delivery_configured() {
        println!("Delivery is not configured; items stay queued until FIREWATCH_API_BASE_URL is set");
        return Ok(());
    }

    println!("{}", describe_outcome(queue.process_queue().await));
    Ok(())
}

pub struct ReportArgs<'a> {
    pub description: &'a [String],
    pub latitude: f64,
    pub longitude: f64,
    pub severity: Option<Severity>,
    pub fire_type: Option<String>,
    pub image: Option<&'a Path>,
}

/// A report, plus an image upload when one is attached.
pub fn report_operations(args: ReportArgs<'_>) -> Result<Vec<QueueOperation>, CliError> {
    let description = normalize_description(args.description)?;
    validate_coordinates(args.latitude, args.longitude)?;

    let upload = args.image.map(|path| upload_operation(path, None, None)).transpose()?;
    let image_uri = match &upload {
        Some(QueueOperation::UploadImage(upload)) => Some(upload.local_path.clone()),
        _ => None,
    };

    let mut operations = vec![QueueOperation::CreateReport(NewReport {
        description,
        latitude: args.latitude,
        longitude: args.longitude,
        severity: args.severity,
        fire_type: normalize_text_option(args.fire_type),
        image_uri,
    })];
    operations.extend(upload);
    Ok(operations)
}

pub fn update_operation(
    report_id: &str,
    status: Option<ReportStatus>,
    description: Option<String>,
    severity: Option<Severity>,
) -> Result<QueueOperation, CliError> {
    let report_id = report_id.trim();
    if report_id.is_empty() {
        return Err(CliError::EmptyReportId);
    }
    let description = normalize_text_option(description);
    if status.is_none() && description.is_none() && severity.is_none() {
        return Err(CliError::EmptyUpdate);
    }

    Ok(QueueOperation::UpdateReport(ReportUpdate {
        report_id: report_id.to_string(),
        status,
        description,
        severity,
    }))
}

/// The file must exist now; it is read again at delivery time.
pub fn upload_operation(
    path: &Path,
    content_type: Option<String>,
    report_id: Option<String>,
) -> Result<QueueOperation, CliError> {
    let local_path = std::fs::canonicalize(path)?;
    let content_type = match normalize_text_option(content_type) {
        Some(value) => value.to_ascii_lowercase(),
        None => infer_content_type(&local_path)?,
    };
    if !content_type.starts_with("image/") {
        return Err(CliError::NotAnImage(content_type));
    }

    Ok(QueueOperation::UploadImage(ImageUpload {
        local_path: local_path.display().to_string(),
        content_type,
        report_id: normalize_text_option(report_id),
    }))
}

pub fn sync_operation(scope: &str, since: Option<i64>) -> Result<QueueOperation, CliError> {
    let scope = normalize_text_option(Some(scope.to_string())).ok_or(CliError::EmptyScope)?;
    Ok(QueueOperation::SyncData(SyncRequest { scope, since }))
}
