//! Driver errors

use thiserror::Error;

/// Errors raised at the container runtime boundary
#[derive(Debug, Error)]
pub enum DriverError {
    /// The runtime executable could not be started
    #[error("Failed to spawn `{command}`: {reason}")]
    SpawnFailed {
        /// Command line that was attempted
        command: String,
        /// Underlying OS error
        reason: String,
    },

    /// The runtime exited with a non-zero status
    #[error("`{command}` exited with {}: {output}", describe_status(.status))]
    CommandFailed {
        /// Command line that failed
        command: String,
        /// Exit code, `None` when killed by a signal
        status: Option<i32>,
        /// Captured stdout and stderr
        output: String,
    },

    /// `inspect` output could not be decoded
    #[error("Invalid inspect output for {what}: {reason}")]
    InvalidInspect {
        /// Object that was inspected
        what: String,
        /// Decoding error
        reason: String,
    },

    /// Every `10.X.0.0/16` candidate is taken
    #[error("No free subnet left in 10.{floor}.0.0/16 to 10.{ceiling}.0.0/16")]
    SubnetsExhausted {
        /// Lowest candidate octet
        floor: u8,
        /// Highest candidate octet
        ceiling: u8,
    },

    /// I/O error while talking to a child process
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

/// Result alias used throughout the crate
pub type DriverResult<T> = Result<T, DriverError>;
