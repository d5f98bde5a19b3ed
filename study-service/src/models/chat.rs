use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A chat session. Active sessions count against the membership's
/// concurrency cap; closed sessions keep their transcript.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChatSession {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub class_id: Uuid,
    pub title: String,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChatMessage {
    pub message_id: Uuid,
    pub session_id: Uuid,
    pub content: String,
    pub is_user: bool,
    pub tokens_used: i64,
    pub response_time_ms: Option<i32>,
    pub context_used: Option<String>,
    pub created_utc: DateTime<Utc>,
}
