//! School operations core: attendance locking and the monthly fee ledger, served to a
//! desktop/web shell over a line-oriented JSON protocol.

pub mod attendance;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod fees;
pub mod ipc;
pub mod model;
pub mod period;
pub mod store;
