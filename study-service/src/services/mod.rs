pub mod billing;
pub mod chat;
pub mod database;
pub mod metrics;
pub mod providers;
pub mod quota;
pub mod usage;

pub use billing::{BillingDecision, BillingResolver};
pub use chat::{ChatOrchestrator, ChatTurn};
pub use database::Database;
pub use quota::{BillingClock, ChatEligibility, DenialReason, QuotaEngine};
pub use usage::UsageReportingService;
