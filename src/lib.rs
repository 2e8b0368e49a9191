//! Work time tracker. Arrivals and departures are recorded into one json log per month, kept
//! consistent by a reconciler that tolerates late, repeated and out of order submissions.
//! The same data is reachable through a small http api and a cli.
//!

pub mod cli;
pub mod daemon;
pub mod history;
pub mod utils;
