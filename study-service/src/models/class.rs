use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A class groups members, documents, and chat sessions under one owner.
/// Members join with the short `class_code`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Class {
    pub class_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub class_code: String,
    pub owner_id: Uuid,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
}
