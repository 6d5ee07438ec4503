//! Streaming support for command execution
//!
//! Runners read a child's stdout and stderr line by line while it runs and
//! hand every line to an [`OutputSink`]. The sink sees lines as they arrive;
//! the full text is still collected into the final `CommandOutput`.
//!
//! # Example
//!
//! ```
//! use ci_runner::runner::{OutputSink, OutputStream};
//!
//! struct Prefixer;
//!
//! impl OutputSink for Prefixer {
//!     fn on_line(&self, step_id: &str, stream: OutputStream, line: &str) {
//!         println!("[{} {:?}] {}", step_id, stream, line);
//!     }
//! }
//! ```

/// Which pipe a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Receives output lines as a command produces them
///
/// This trait is object-safe and can be used as `&dyn OutputSink`.
pub trait OutputSink: Send + Sync {
    /// Called once per line, without the trailing newline
    fn on_line(&self, step_id: &str, stream: OutputStream, line: &str);
}
