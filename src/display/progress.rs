//! Progress feedback for the preprocessing stages.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed}] {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(TICKS)
}

/// Spinner for indeterminate progress.
fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(spinner_style());
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// Stage-by-stage spinner for a preprocessing run.
///
/// Hidden when disabled, so callers can report stages unconditionally.
pub struct StageProgress {
    bar: ProgressBar,
}

impl StageProgress {
    pub fn new(enabled: bool) -> Self {
        let bar = if enabled {
            create_spinner("starting")
        } else {
            ProgressBar::hidden()
        };
        Self { bar }
    }

    /// Report the stage currently running.
    pub fn stage(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    pub fn finish(&self, message: &str) {
        if self.bar.is_hidden() {
            return;
        }
        self.bar.finish_with_message(message.to_string());
    }
}
