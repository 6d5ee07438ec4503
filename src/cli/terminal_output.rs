//! Terminal output sink for streaming command output
//!
//! With `--stream`, every line a step's command prints is echoed to the
//! terminal as it arrives, under a header naming the step:
//!
//! ```text
//! [3/7] fetch-reporter
//! ────────────────────────────────────────
//!   % Total    % Received ...
//! ```
//!
//! Lines from stderr are dimmed. Output that arrives for a step other than
//! the one announced last (teardowns, for instance) gets its own short
//! header so nothing is misattributed.
//!
//! # Example
//!
//! ```no_run
//! use ci_runner::cli::terminal_output::TerminalOutputSink;
//! use ci_runner::runner::{OutputSink, OutputStream};
//!
//! let sink = TerminalOutputSink::new();
//! sink.print_step_header(1, 3, "create-role");
//! sink.on_line("create-role", OutputStream::Stdout, "CREATE ROLE");
//! ```

use crate::runner::{OutputSink, OutputStream};
use console::style;
use std::io::{self, Write};
use std::sync::Mutex;

/// Sink that echoes command output to the terminal
#[derive(Debug, Default)]
pub struct TerminalOutputSink {
    /// Step whose header was printed last
    current_step: Mutex<Option<String>>,
}

impl TerminalOutputSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Print a step header
    ///
    /// Format: `[N/M] step-id`, followed by a separator.
    pub fn print_step_header(&self, step_num: usize, total: usize, step_id: &str) {
        println!(
            "\n[{}/{}] {}",
            style(step_num).cyan(),
            style(total).dim(),
            style(step_id).bold()
        );
        self.print_separator();
        self.set_current(step_id);
    }

    /// Print a separator line spanning the terminal width
    pub fn print_separator(&self) {
        // Get terminal width, default to 80 if unavailable
        let width = term_size::dimensions_stdout().map(|(w, _)| w).unwrap_or(80);
        println!("{}", style("─".repeat(width)).dim());
    }

    fn set_current(&self, step_id: &str) {
        if let Ok(mut current) = self.current_step.lock() {
            *current = Some(step_id.to_string());
        }
    }

    /// Whether `step_id` differs from the last announced step
    fn is_new_step(&self, step_id: &str) -> bool {
        match self.current_step.lock() {
            Ok(current) => current.as_deref() != Some(step_id),
            Err(_) => false,
        }
    }

    fn flush_stdout(&self) {
        let _ = io::stdout().flush();
    }
}

impl OutputSink for TerminalOutputSink {
    fn on_line(&self, step_id: &str, stream: OutputStream, line: &str) {
        if self.is_new_step(step_id) {
            println!("{}", style(format!("── {} ──", step_id)).dim());
            self.set_current(step_id);
        }

        match stream {
            OutputStream::Stdout => println!("{}", line),
            OutputStream::Stderr => println!("{}", style(line).dim()),
        }
        self.flush_stdout();
    }
}
