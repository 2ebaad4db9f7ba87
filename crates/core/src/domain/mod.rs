pub mod account;
pub mod event;
pub mod intent;
pub mod message;
pub mod reminder;
