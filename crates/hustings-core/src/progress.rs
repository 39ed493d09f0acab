//! Progress reporting for TTY and non-TTY environments.
//!
//! TTY mode: one indicatif spinner per in-flight search term.
//! Non-TTY mode: hidden bars; log lines are the only progress output.

use std::io::IsTerminal;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

fn term_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {prefix:<24.dim} {wide_msg:.dim}")
        .expect("invalid template")
}

/// Central progress context managing multi-progress bars.
pub struct ProgressContext {
    multi: MultiProgress,
    is_tty: bool,
}

impl ProgressContext {
    /// Create a new context, detecting TTY automatically.
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            is_tty: std::io::stderr().is_terminal(),
        }
    }

    pub fn is_tty(&self) -> bool {
        self.is_tty
    }

    /// Per-term progress spinner. Hidden (no-op) when not on a TTY.
    pub fn term_bar(&self, term: &str) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(term_style());
        // Truncate long terms to keep bars aligned
        let display: String = term.chars().take(24).collect();
        pb.set_prefix(display);
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    }

    /// Print a line above managed progress bars (avoids interference).
    pub fn println(&self, msg: impl AsRef<str>) {
        if self.is_tty {
            let _ = self.multi.println(msg);
        } else {
            eprintln!("{}", msg.as_ref());
        }
    }
}

impl Default for ProgressContext {
    fn default() -> Self {
        Self::new()
    }
}
