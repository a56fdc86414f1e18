//! Spinner shown while a sweep or batch runs.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

pub struct SweepProgress {
    bar: ProgressBar,
}

impl SweepProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} [{elapsed}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    /// Callback handed to the harness; each call replaces the message.
    pub fn callback(&self) -> impl Fn(&str) + '_ {
        move |msg: &str| self.bar.set_message(msg.to_string())
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
