//! UI utilities for the client.

use std::io::Write;

/// Redisplay the prompt after printing an incoming message
pub fn redisplay_prompt(label: &str) {
    print!("{}> ", label);
    std::io::stdout().flush().ok();
}
