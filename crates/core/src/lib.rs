pub mod clock;
pub mod config;
pub mod domain;
pub mod errors;
pub mod resolver;
pub mod security;

pub use clock::{Clock, ManualClock, SystemClock};
pub use domain::account::{AccountId, UserAccount};
pub use domain::event::{EventDraft, EventLogRecord, EventType, LogStatus};
pub use domain::intent::{Classification, Intent};
pub use domain::message::{InboundMessage, MessageKind};
pub use domain::reminder::ReminderRecord;
pub use errors::{GateError, UpstreamError};
pub use resolver::{local_day_bounds, Confidence, EventCandidate, Resolution};
pub use security::{RateDecision, RateLimiter, RateLimiterConfig};
