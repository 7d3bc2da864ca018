//! Utilities shared by the Hiroma packages: logging setup and time handling.

pub mod logger;
pub mod time;
