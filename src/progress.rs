//! Progress indicators for long-running waits.

use crate::ui;
use declarative::{WaitObserver, WaitState};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;

/// Create a spinner with a message
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Shows one spinner per wait, labelled with the last observed status.
pub struct SpinnerObserver {
    quiet: bool,
    current: Mutex<Option<ProgressBar>>,
}

impl SpinnerObserver {
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            current: Mutex::new(None),
        }
    }

    fn with_bar(&self, f: impl FnOnce(&mut Option<ProgressBar>)) {
        if let Ok(mut guard) = self.current.lock() {
            f(&mut guard);
        }
    }
}

/// Spinner line for one poll.
pub fn poll_message(label: &str, attempt: u32, status: Option<&str>, elapsed: Duration) -> String {
    let status = status.unwrap_or("retrying");
    format!(
        "{label}: {} (poll {attempt}, {})",
        ui::truncate(status, 40),
        ui::format_elapsed(elapsed)
    )
}

impl WaitObserver for SpinnerObserver {
    fn on_wait_start(&self, label: &str, target: &[String]) {
        if self.quiet {
            return;
        }
        let msg = format!("{label}: waiting for {}", target.join(" or "));
        self.with_bar(|bar| {
            if let Some(old) = bar.take() {
                old.finish_and_clear();
            }
            *bar = Some(spinner(&msg));
        });
    }

    fn on_poll(&self, label: &str, attempt: u32, status: Option<&str>, elapsed: Duration) {
        log::debug!("{}", poll_message(label, attempt, status, elapsed));
        self.with_bar(|bar| {
            if let Some(pb) = bar.as_ref() {
                pb.set_message(poll_message(label, attempt, status, elapsed));
            }
        });
    }

    fn on_wait_complete(&self, label: &str, state: WaitState) {
        self.with_bar(|bar| {
            if let Some(pb) = bar.take() {
                pb.finish_and_clear();
                match state {
                    WaitState::Converged => ui::success(&format!("{label}: done")),
                    WaitState::Failed => ui::warn(&format!("{label}: stopped waiting")),
                    WaitState::Polling => {}
                }
            }
        });
    }
}
