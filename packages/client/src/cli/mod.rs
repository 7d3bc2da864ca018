//! Interactive command-line chat client built on [`crate::RealtimeService`].

mod command;
mod error;
mod formatter;
mod runner;
mod ui;

pub use error::ClientError;
pub use runner::{ClientOptions, run_client};
