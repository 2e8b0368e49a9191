//! Month logs and everything derived from them.
//!
//! - [event_log::EventLog] keeps the ordered events of a month.
//! - [reconcile] decides how an incoming enter/exit event changes a log.
//! - [modifiers] toggles sick and vacation days.
//! - [aggregate] calculates worked time.

pub mod aggregate;
pub mod event_log;
pub mod modifiers;
pub mod reconcile;
