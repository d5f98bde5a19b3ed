use crate::models::Class;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateClassRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateClassRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct JoinClassRequest {
    #[validate(length(min = 8, max = 8))]
    pub class_code: String,
}

#[derive(Debug, Serialize)]
pub struct ClassResponse {
    #[serde(flatten)]
    pub class: Class,
    pub member_count: i64,
    pub session_count: i64,
    pub document_count: i64,
}
