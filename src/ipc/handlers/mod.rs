pub mod attendance;
pub mod core;
pub mod fees;
pub mod setup;
