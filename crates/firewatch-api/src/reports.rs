use std::collections::{HashMap, VecDeque};

use chrono::Utc;
use firewatch_core::models::{NewReport, ReportStatus, Severity};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub id: String,
    pub reporter_id: String,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    pub severity: Option<Severity>,
    pub fire_type: Option<String>,
    pub status: ReportStatus,
    pub images: Vec<StoredImage>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredImage {
    pub id: String,
    pub report_id: Option<String>,
    pub uploader_id: String,
    pub content_type: String,
    pub size_bytes: usize,
    pub uploaded_at: i64,
}

/// Partial update body for `PATCH /v1/reports/{id}`. Unknown fields such as a
/// repeated `report_id` are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportPatch {
    pub status: Option<ReportStatus>,
    pub description: Option<String>,
    pub severity: Option<Severity>,
}

impl ReportPatch {
    fn is_empty(&self) -> bool {
        self.status.is_none() && self.description.is_none() && self.severity.is_none()
    }
}

/// Standalone uploads kept before the oldest is dropped
const MAX_UNATTACHED_IMAGES: usize = 1024;

/// In-memory report registry backing the HTTP routes.
///
/// Uploads without a report id are kept apart in a bounded list; a report
/// captured offline gets its id only on delivery, so its image arrives
/// standalone.
#[derive(Default)]
pub struct ReportStore {
    reports: RwLock<HashMap<String, Report>>,
    unattached_images: RwLock<VecDeque<StoredImage>>,
}

impl ReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, reporter_id: &str, input: NewReport) -> Result<Report, AppError> {
        let description = input.description.trim();
        if description.is_empty() {
            return Err(AppError::bad_request("Report description is required"));
        }
        validate_coordinates(input.latitude, input.longitude)?;

        let now = Utc::now().timestamp_millis();
        let report = Report {
            id: Uuid::new_v4().to_string(),
            reporter_id: reporter_id.to_string(),
            description: description.to_string(),
            latitude: input.latitude,
            longitude: input.longitude,
            severity: input.severity,
            fire_type: input
                .fire_type
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            status: ReportStatus::Submitted,
            images: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        self.reports
            .write()
            .await
            .insert(report.id.clone(), report.clone());
        Ok(report)
    }

    pub async fn get(&self, id: &str) -> Result<Report, AppError> {
        self.reports
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    /// Newest first.
    pub async fn list(&self) -> Vec<Report> {
        let mut reports: Vec<Report> = self.reports.read().await.values().cloned().collect();
        reports.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        reports
    }

    pub async fn updated_since(&self, since: Option<i64>) -> Vec<Report> {
        self.list()
            .await
            .into_iter()
            .filter(|report| since.map_or(true, |cutoff| report.updated_at > cutoff))
            .collect()
    }

    pub async fn update(&self, id: &str, patch: ReportPatch) -> Result<Report, AppError> {
        if patch.is_empty() {
            return Err(AppError::bad_request("Report update has no changes"));
        }

        let mut reports = self.reports.write().await;
        let report = reports.get_mut(id).ok_or_else(|| not_found(id))?;

        if let Some(description) = patch.description {
            let description = description.trim();
            if description.is_empty() {
                return Err(AppError::bad_request("Report description cannot be empty"));
            }
            report.description = description.to_string();
        }
        if let Some(status) = patch.status {
            report.status = status;
        }
        if let Some(severity) = patch.severity {
            report.severity = Some(severity);
        }
        report.updated_at = Utc::now().timestamp_millis().max(report.updated_at + 1);
        Ok(report.clone())
    }

    pub async fn delete(&self, id: &str) -> Result<Report, AppError> {
        self.reports
            .write()
            .await
            .remove(id)
            .ok_or_else(|| not_found(id))
    }

    pub async fn attach_image(
        &self,
        uploader_id: &str,
        report_id: Option<&str>,
        content_type: &str,
        size_bytes: usize,
    ) -> Result<StoredImage, AppError> {
        if !content_type.starts_with("image/") {
            return Err(AppError::bad_request(format!(
                "Unsupported content type `{content_type}`"
            )));
        }
        if size_bytes == 0 {
            return Err(AppError::bad_request("Image body is empty"));
        }

        let image = StoredImage {
            id: Uuid::new_v4().to_string(),
            report_id: report_id.map(ToString::to_string),
            uploader_id: uploader_id.to_string(),
            content_type: content_type.to_string(),
            size_bytes,
            uploaded_at: Utc::now().timestamp_millis(),
        };

        match report_id {
            Some(id) => {
                let mut reports = self.reports.write().await;
                let report = reports.get_mut(id).ok_or_else(|| not_found(id))?;
                report.images.push(image.clone());
                report.updated_at = image.uploaded_at.max(report.updated_at + 1);
            }
            None => {
                let mut unattached = self.unattached_images.write().await;
                if unattached.len() == MAX_UNATTACHED_IMAGES {
                    unattached.pop_front();
                }
                unattached.push_back(image.clone());
            }
        }
        Ok(image)
    }

    #[cfg(test)]
    pub async fn unattached_image_count(&self) -> usize {
        self.unattached_images.read().await.len()
    }
}

fn validate_coordinates(latitude: f64, longitude: f64) -> Result<(), AppError> {
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(AppError::bad_request("Latitude must be within [-90, 90]"));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(AppError::bad_request("Longitude must be within [-180, 180]"));
    }
    Ok(())
}

fn not_found(id: &str) -> AppError {
    AppError::not_found(format!("Report `{id}` does not exist"))
}
