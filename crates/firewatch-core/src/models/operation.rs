//! Backend mutations that can be queued for delivery

use std::fmt;

use serde::{Deserialize, Serialize};

/// Reported fire severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a report on the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Submitted,
    Verified,
    Contained,
    Resolved,
    Dismissed,
}

impl ReportStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Verified => "verified",
            Self::Contained => "contained",
            Self::Resolved => "resolved",
            Self::Dismissed => "dismissed",
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fire report captured on the device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReport {
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fire_type: Option<String>,
    /// Local image captured alongside the report, uploaded separately
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_uri: Option<String>,
}

/// Partial update to an existing report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportUpdate {
    pub report_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ReportStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
}

/// Local image awaiting upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUpload {
    pub local_path: String,
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
}

/// Request to pull server-side changes for a scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    pub scope: String,
    /// Only changes after this Unix ms cursor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<i64>,
}

/// A queued backend mutation.
///
/// Serialized adjacently tagged so persisted records read as
/// `{"type": "createReport", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum QueueOperation {
    CreateReport(NewReport),
    UpdateReport(ReportUpdate),
    UploadImage(ImageUpload),
    SyncData(SyncRequest),
}

impl QueueOperation {
    pub const fn kind(&self) -> QueueOperationKind {
        match self {
            Self::CreateReport(_) => QueueOperationKind::CreateReport,
            Self::UpdateReport(_) => QueueOperationKind::UpdateReport,
            Self::UploadImage(_) => QueueOperationKind::UploadImage,
            Self::SyncData(_) => QueueOperationKind::SyncData,
        }
    }
}

/// Tag of a [`QueueOperation`] without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueueOperationKind {
    CreateReport,
    UpdateReport,
    UploadImage,
    SyncData,
}

impl QueueOperationKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateReport => "createReport",
            Self::UpdateReport => "updateReport",
            Self::UploadImage => "uploadImage",
            Self::SyncData => "syncData",
        }
    }
}

impl fmt::Display for QueueOperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
