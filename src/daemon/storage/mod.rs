//!  Storage is organized through [month_storage::MonthStorageImpl].
//!  The basic idea is:
//!   - There is a directory with all the records.
//!   - Every local calendar month has its own record file `history-YYYY-M.json`.
//!   - A record is a json array of events sorted by time.
//!
//!  User preferences live next to the records in [config_storage::ConfigStorage].

pub mod config_storage;
pub mod entities;
pub mod month_storage;
