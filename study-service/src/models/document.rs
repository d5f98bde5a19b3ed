use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }
}

/// Reference material attached to a class. Only documents whose text
/// extraction has completed are fed into chat context. A document with a
/// `session_id` is scoped to that session instead of the whole class.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ClassDocument {
    pub document_id: Uuid,
    pub class_id: Uuid,
    pub session_id: Option<Uuid>,
    pub title: String,
    pub source_url: Option<String>,
    pub extracted_text: Option<String>,
    pub processing_status: String,
    pub uploaded_by: Uuid,
    pub created_utc: DateTime<Utc>,
}
