pub mod chat;
pub mod class;
pub mod document;
pub mod membership;
pub mod tracker;
pub mod usage;

pub use chat::{ChatMessage, ChatSession};
pub use class::Class;
pub use document::{ClassDocument, ProcessingStatus};
pub use membership::{ClassMembership, MembershipPatch};
pub use tracker::UsageTracker;
pub use usage::{RecordUsage, UsageRecord, UsageStats};
