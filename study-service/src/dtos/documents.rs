use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

/// Register extracted document text as chat context. Text extraction itself
/// happens upstream; this service stores the result.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterDocumentRequest {
    #[validate(length(min = 1, max = 300))]
    pub title: String,
    #[validate(url)]
    pub source_url: Option<String>,
    pub extracted_text: Option<String>,
    pub session_id: Option<Uuid>,
}
