//! Billing resolver: who pays for a turn, and what it costs.

use crate::config::PricingConfig;
use crate::services::database::Database;
use rust_decimal::Decimal;
use service_core::error::AppError;
use tracing::instrument;
use uuid::Uuid;

/// Attribution for one chat turn, resolved before the ledger row is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingDecision {
    pub billed_to_user_id: Uuid,
    pub is_sponsored: bool,
    pub is_overflow: bool,
}

#[derive(Clone)]
pub struct BillingResolver {
    pricing: PricingConfig,
}

impl BillingResolver {
    pub fn new(pricing: PricingConfig) -> Self {
        Self { pricing }
    }

    /// Sponsored members bill to the class owner; everyone else pays for
    /// themselves and the spend is flagged as overflow.
    #[instrument(skip(self, db))]
    pub async fn determine_billing(
        &self,
        db: &Database,
        user_id: Uuid,
        class_id: Uuid,
    ) -> Result<BillingDecision, AppError> {
        let membership = db
            .get_membership(user_id, class_id)
            .await?
            .ok_or_else(|| AppError::Forbidden(anyhow::anyhow!("Not a member of this class")))?;

        if membership.is_sponsored {
            let class = db.get_class(class_id).await?.ok_or_else(|| {
                AppError::InternalError(anyhow::anyhow!(
                    "Membership exists for missing class {}",
                    class_id
                ))
            })?;
            Ok(BillingDecision {
                billed_to_user_id: class.owner_id,
                is_sponsored: true,
                is_overflow: false,
            })
        } else {
            Ok(BillingDecision {
                billed_to_user_id: user_id,
                is_sponsored: false,
                is_overflow: true,
            })
        }
    }

    /// Estimate the input/output breakdown when the provider reports only a
    /// total: 70% input, 30% output, integer floor division.
    pub fn split_tokens(total_tokens: i64) -> (i64, i64) {
        (total_tokens * 7 / 10, total_tokens * 3 / 10)
    }

    /// Dollar cost for a turn, priced per million tokens on the estimated
    /// split and rounded to 6 decimal places.
    pub fn calculate_cost(&self, total_tokens: i64) -> Decimal {
        let (input_tokens, output_tokens) = Self::split_tokens(total_tokens);
        let million = Decimal::from(1_000_000);

        let cost = Decimal::from(input_tokens) / million * self.pricing.input_per_million
            + Decimal::from(output_tokens) / million * self.pricing.output_per_million;

        cost.round_dp(6)
    }
}
