//! Provider connectors
//!
//! REST connectors for the two per-user integrations:
//! - **Calendar** (`calendar`) - event CRUD against a Google-style calendar
//!   API, with a typed credential-expired error so the orchestrator can ask
//!   the user to re-link instead of apologizing generically
//! - **Knowledge** (`knowledge`) - optional Notion-style database writes,
//!   mapped best-effort against whatever schema the user's database has
//!
//! Both ship an in-memory fake for orchestrator tests.

pub mod calendar;
pub mod knowledge;

pub use calendar::{CalendarConnector, CalendarError, FakeCalendar, RestCalendarConnector};
pub use knowledge::{
    map_draft_to_properties, FakeKnowledge, KnowledgeConnector, KnowledgeError, PropertyDescriptor,
    PropertyKind, RestKnowledgeConnector,
};
