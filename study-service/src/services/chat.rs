//! Chat orchestrator: the full lifecycle of a turn, from gate to ledger.

use crate::models::{ChatMessage, ChatSession};
use crate::services::billing::BillingResolver;
use crate::services::database::Database;
use crate::services::metrics;
use crate::services::providers::CompletionProvider;
use crate::services::quota::{ChatEligibility, QuotaEngine};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// Document context fed to the model is capped at this many characters.
const MAX_CONTEXT_CHARS: usize = 4_000;
/// Only a prefix of the context is stored alongside the message.
const STORED_CONTEXT_CHARS: usize = 500;

/// Result of one successful chat turn.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub user_message: ChatMessage,
    pub assistant_message: ChatMessage,
    pub total_tokens: i64,
    pub cost: Decimal,
    pub response_time_ms: i32,
    pub context_provided: bool,
}

pub struct ChatOrchestrator {
    db: Arc<Database>,
    quota: QuotaEngine,
    billing: BillingResolver,
    provider: Arc<dyn CompletionProvider>,
}

impl ChatOrchestrator {
    pub fn new(
        db: Arc<Database>,
        quota: QuotaEngine,
        billing: BillingResolver,
        provider: Arc<dyn CompletionProvider>,
    ) -> Self {
        Self {
            db,
            quota,
            billing,
            provider,
        }
    }

    /// Open a session, subject to the full gate plus the concurrency cap.
    #[instrument(skip(self, title))]
    pub async fn create_session(
        &self,
        user_id: Uuid,
        class_id: Uuid,
        title: &str,
    ) -> Result<ChatSession, AppError> {
        match self.quota.reserve_session(user_id, class_id, title).await? {
            Ok(session) => Ok(session),
            Err(reason) => Err(reason.into()),
        }
    }

    /// Run one chat turn: gate, persist the user message, assemble document
    /// context, call the model, then commit usage and append to the ledger.
    /// A provider failure aborts the turn before any counter or ledger
    /// write.
    #[instrument(skip(self, content), fields(session_id = %session_id))]
    pub async fn send_message(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        content: &str,
    ) -> Result<ChatTurn, AppError> {
        let session = self
            .db
            .get_session(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Session not found")))?;

        if session.user_id != user_id {
            return Err(AppError::Forbidden(anyhow::anyhow!(
                "Session belongs to another user"
            )));
        }
        if !session.is_active {
            return Err(AppError::BadRequest(anyhow::anyhow!("Session is closed")));
        }

        let class_id = session.class_id;

        match self
            .quota
            .evaluate_chat_eligibility(user_id, class_id)
            .await?
        {
            ChatEligibility::Allowed => {}
            ChatEligibility::Denied(reason) => return Err(reason.into()),
        }

        let user_message = self
            .db
            .insert_message(session_id, content, true, 0, None, None)
            .await?;

        let context = self.assemble_context(class_id, session_id).await?;
        let context_provided = context.is_some();

        let started = Instant::now();
        let completion = match self.provider.complete(content, context.as_deref()).await {
            Ok(completion) => completion,
            Err(e) => {
                let elapsed = started.elapsed().as_secs_f64();
                metrics::record_provider_request(self.provider.model_name(), "error", elapsed);
                metrics::record_chat_turn(&class_id.to_string(), "provider_error");
                metrics::record_error("provider", "send_message");
                error!(session_id = %session_id, error = %e, "Completion provider failed");
                return Err(AppError::BadGateway(e.to_string()));
            }
        };
        let elapsed = started.elapsed();
        metrics::record_provider_request(
            self.provider.model_name(),
            "ok",
            elapsed.as_secs_f64(),
        );
        let response_time_ms = elapsed.as_millis().min(i32::MAX as u128) as i32;

        let stored_context = context
            .as_deref()
            .map(|c| c.chars().take(STORED_CONTEXT_CHARS).collect::<String>());

        let assistant_message = self
            .db
            .insert_message(
                session_id,
                &completion.text,
                false,
                completion.total_tokens,
                Some(response_time_ms),
                stored_context.as_deref(),
            )
            .await?;

        self.db.touch_session(session_id).await?;

        self.quota
            .commit_token_usage(user_id, class_id, completion.total_tokens)
            .await?;

        let decision = self
            .billing
            .determine_billing(&self.db, user_id, class_id)
            .await?;
        let cost = self.billing.calculate_cost(completion.total_tokens);
        let (input_tokens, output_tokens) =
            BillingResolver::split_tokens(completion.total_tokens);

        self.db
            .insert_usage_record(&crate::models::RecordUsage {
                user_id,
                billed_to_user_id: decision.billed_to_user_id,
                class_id,
                session_id: Some(session_id),
                model_name: self.provider.model_name().to_string(),
                operation_type: "chat".to_string(),
                input_tokens,
                output_tokens,
                cost,
                is_sponsored: decision.is_sponsored,
                is_overflow: decision.is_overflow,
            })
            .await?;

        metrics::record_chat_turn(&class_id.to_string(), "ok");
        metrics::record_ledger_cost(
            self.provider.model_name(),
            decision.is_sponsored,
            cost.to_f64().unwrap_or(0.0),
        );

        info!(
            session_id = %session_id,
            tokens = completion.total_tokens,
            billed_to = %decision.billed_to_user_id,
            sponsored = decision.is_sponsored,
            "Chat turn completed"
        );

        Ok(ChatTurn {
            user_message,
            assistant_message,
            total_tokens: completion.total_tokens,
            cost,
            response_time_ms,
            context_provided,
        })
    }

    /// Concatenate completed class documents (plus any scoped to this
    /// session) into a single context block, truncated to a fixed budget.
    async fn assemble_context(
        &self,
        class_id: Uuid,
        session_id: Uuid,
    ) -> Result<Option<String>, AppError> {
        let documents = self
            .db
            .completed_context_documents(class_id, session_id)
            .await?;

        let mut context = String::new();
        for doc in &documents {
            let Some(text) = doc.extracted_text.as_deref() else {
                continue;
            };
            if !context.is_empty() {
                context.push_str("\n\n");
            }
            context.push_str(&format!("[{}]: {}", doc.title, text));
            if context.chars().count() >= MAX_CONTEXT_CHARS {
                context = context.chars().take(MAX_CONTEXT_CHARS).collect();
                break;
            }
        }

        if context.is_empty() {
            Ok(None)
        } else {
            Ok(Some(context))
        }
    }
}
