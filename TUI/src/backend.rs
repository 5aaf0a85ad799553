// Backend communication with the MedRag HTTP service (/upload, /ask)

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::medical::{EvidenceChunk, MedicalAnalysis};

/// Report file types the backend OCR pipeline accepts, with their mime types.
pub const ACCEPTED_EXTENSIONS: &[(&str, &str)] = &[
    ("pdf", "application/pdf"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("cannot read report: {0}")]
    File(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskResponse {
    pub answer: String,
    #[serde(default)]
    pub chunks: Vec<EvidenceChunk>,
}

#[derive(Debug, Serialize)]
struct AskRequest<'a> {
    question: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct UploadEnvelope {
    status: String,
    #[serde(default)]
    analysis: Option<MedicalAnalysis>,
    #[serde(default)]
    message: Option<String>,
}

impl UploadEnvelope {
    fn into_analysis(self) -> Result<MedicalAnalysis, ApiError> {
        if self.status != "success" {
            let message = self
                .message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| "upload failed".to_string());
            return Err(ApiError::Backend(message));
        }
        self.analysis
            .ok_or_else(|| ApiError::Decode("success response without analysis".to_string()))
    }
}

/// A report file read into memory, ready to be sent as the `file` form field.
#[derive(Debug, Clone)]
pub struct ReportUpload {
    pub file_name: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

impl ReportUpload {
    /// Mime type for an accepted report extension (case-insensitive).
    pub fn mime_for(path: &Path) -> Result<&'static str, ApiError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        ACCEPTED_EXTENSIONS
            .iter()
            .find(|(accepted, _)| *accepted == ext)
            .map(|(_, mime)| *mime)
            .ok_or_else(|| {
                ApiError::File(format!(
                    "{} is not a PDF, PNG or JPEG report",
                    path.display()
                ))
            })
    }

    pub async fn from_path(path: &Path) -> Result<Self, ApiError> {
        let mime = Self::mime_for(path)?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ApiError::File(format!("{}: {}", path.display(), e)))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "report".to_string());

        Ok(Self { file_name, mime, bytes })
    }
}

/// The two operations the MedRag backend exposes.
#[async_trait]
pub trait MedRagApi: Send + Sync {
    async fn upload(&self, report: ReportUpload) -> Result<MedicalAnalysis, ApiError>;
    async fn ask(&self, question: &str) -> Result<AskResponse, ApiError>;
}

pub struct HttpBackend {
    base_url: String,
    top_k: Option<u32>,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, top_k: Option<u32>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            top_k,
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl MedRagApi for HttpBackend {
    async fn upload(&self, report: ReportUpload) -> Result<MedicalAnalysis, ApiError> {
        tracing::debug!(file = %report.file_name, bytes = report.bytes.len(), "POST /upload");

        let part = Part::bytes(report.bytes)
            .file_name(report.file_name)
            .mime_str(report.mime)
            .map_err(|e| ApiError::File(e.to_string()))?;
        let form = Form::new().part("file", part);

        let resp = self
            .client
            .post(self.endpoint("/upload"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let body = checked_body(resp).await?;
        let envelope: UploadEnvelope =
            serde_json::from_slice(&body).map_err(|e| ApiError::Decode(e.to_string()))?;
        envelope.into_analysis()
    }

    async fn ask(&self, question: &str) -> Result<AskResponse, ApiError> {
        tracing::debug!(chars = question.len(), "POST /ask");

        let request = AskRequest {
            question,
            top_k: self.top_k,
        };
        let resp = self
            .client
            .post(self.endpoint("/ask"))
            .json(&request)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let body = checked_body(resp).await?;
        serde_json::from_slice(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

async fn checked_body(resp: reqwest::Response) -> Result<Vec<u8>, ApiError> {
    let status = resp.status();
    let body = resp
        .bytes()
        .await
        .map_err(|e| ApiError::Network(e.to_string()))?;

    if !status.is_success() {
        return Err(ApiError::Backend(error_message(status, &body)));
    }
    Ok(body.to_vec())
}

/// Prefer the body's own explanation (`message`, or FastAPI's `detail`).
fn error_message(status: StatusCode, body: &[u8]) -> String {
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            json.get("message")
                .or_else(|| json.get("detail"))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| format!("HTTP {}", status))
}
