//! HTTP dispatcher for the Firewatch reports API

use reqwest::{RequestBuilder, StatusCode, Url};
use serde::{Deserialize, Serialize};

use super::{DispatchError, DispatchResult, OperationDispatcher};
use crate::models::{ImageUpload, NewReport, QueueOperation, Severity};
use crate::util::{clip_message, is_http_url, normalize_text_option};

/// Sends queued operations to the reports API over HTTP
#[derive(Clone)]
pub struct HttpDispatcher {
    base_url: Url,
    access_token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpDispatcher {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpDispatcher")
            .field("base_url", &self.base_url.as_str())
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish_non_exhaustive()
    }
}

impl HttpDispatcher {
    pub fn new(base_url: impl Into<String>, access_token: Option<String>) -> DispatchResult<Self> {
        Ok(Self {
            base_url: normalize_base_url(base_url.into())?,
            access_token: normalize_text_option(access_token),
            client: reqwest::Client::builder().build()?,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> DispatchResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                DispatchError::InvalidConfiguration("base URL cannot carry a path".to_string())
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header("Accept", "application/json");
        match self.access_token.as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn upload_image(&self, upload: &ImageUpload) -> DispatchResult<()> {
        let url = match upload.report_id.as_deref() {
            Some(report_id) => self.endpoint(&["v1", "reports", report_id, "images"])?,
            None => self.endpoint(&["v1", "reports", "images"])?,
        };
        let bytes = tokio::fs::read(&upload.local_path).await?;
        let request = self
            .client
            .post(url)
            .header("Content-Type", upload.content_type.as_str())
            .body(bytes);
        send(self.authorize(request)).await
    }
}

#[async_trait::async_trait]
impl OperationDispatcher for HttpDispatcher {
    async fn dispatch(&self, operation: &QueueOperation) -> DispatchResult<()> {
        match operation {
            QueueOperation::CreateReport(report) => {
                let url = self.endpoint(&["v1", "reports"])?;
                let body = ReportBody::from(report);
                send(self.authorize(self.client.post(url).json(&body))).await
            }
            QueueOperation::UpdateReport(update) => {
                let url = self.endpoint(&["v1", "reports", update.report_id.as_str()])?;
                send(self.authorize(self.client.patch(url).json(update))).await
            }
            QueueOperation::UploadImage(upload) => self.upload_image(upload).await,
            QueueOperation::SyncData(request) => {
                let url = self.endpoint(&["v1", "sync"])?;
                send(self.authorize(self.client.post(url).json(request))).await
            }
        }
    }
}

/// `POST /v1/reports` body. The local image path stays on the device; the
/// image follows as its own upload.
#[derive(Debug, Serialize)]
struct ReportBody<'a> {
    description: &'a str,
    latitude: f64,
    longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    severity: Option<Severity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fire_type: Option<&'a str>,
}

impl<'a> From<&'a NewReport> for ReportBody<'a> {
    fn from(report: &'a NewReport) -> Self {
        Self {
            description: &report.description,
            latitude: report.latitude,
            longitude: report.longitude,
            severity: report.severity,
            fire_type: report.fire_type.as_deref(),
        }
    }
}

async fn send(request: RequestBuilder) -> DispatchResult<()> {
    let response = request.send().await?;
    if response.status().is_success() {
        return Ok(());
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(DispatchError::Api(parse_api_error(status, &body)))
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", clip_message(&message), status.as_u16());
        }
    }

    let trimmed = clip_message(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_base_url(raw: String) -> DispatchResult<Url> {
    let base = normalize_text_option(Some(raw)).ok_or_else(|| {
        DispatchError::InvalidConfiguration("base URL must not be empty".to_string())
    })?;
    if !is_http_url(&base) {
        return Err(DispatchError::InvalidConfiguration(
            "base URL must include http:// or https://".to_string(),
        ));
    }
    Url::parse(base.trim_end_matches('/'))
        .map_err(|error| DispatchError::InvalidConfiguration(error.to_string()))
}
