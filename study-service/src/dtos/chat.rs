use crate::models::ChatMessage;
use crate::services::ChatTurn;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSessionRequest {
    pub class_id: Uuid,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SendMessageRequest {
    #[validate(length(min = 1, max = 8000))]
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ChatTurnResponse {
    pub user_message: ChatMessage,
    pub assistant_message: ChatMessage,
    pub total_tokens: i64,
    pub cost: Decimal,
    pub response_time_ms: i32,
    pub context_provided: bool,
}

impl From<ChatTurn> for ChatTurnResponse {
    fn from(turn: ChatTurn) -> Self {
        ChatTurnResponse {
            user_message: turn.user_message,
            assistant_message: turn.assistant_message,
            total_tokens: turn.total_tokens,
            cost: turn.cost,
            response_time_ms: turn.response_time_ms,
            context_provided: turn.context_provided,
        }
    }
}
