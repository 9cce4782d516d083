use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({eta}) {msg}";

/// Progress bar over benchmark questions with a rolling generation-speed
/// readout fed by server-reported token counts.
pub struct ProgressTracker {
    bar: ProgressBar,
    started: Instant,
    tokens: u64,
}

impl ProgressTracker {
    pub fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::with_template(BAR_TEMPLATE)
                .unwrap()
                .progress_chars("=> "),
        );
        Self {
            bar,
            started: Instant::now(),
            tokens: 0,
        }
    }

    pub fn add_tokens(&mut self, tokens: u64) {
        self.tokens += tokens;
    }

    /// Advance one question and refresh the speed readout.
    pub fn update(&mut self, message: impl Into<String>) {
        self.bar.inc(1);
        let rate = self.tokens as f64 / self.started.elapsed().as_secs_f64().max(1e-9);
        self.bar
            .set_message(format!("{} | {:.1} tok/s", message.into(), rate));
    }

    pub fn finish(self, message: impl Into<String>) {
        let message = message.into();
        debug!(
            "{} {} tokens across {} questions in {:.2}s",
            message,
            self.tokens,
            self.bar.position(),
            self.started.elapsed().as_secs_f64()
        );
        self.bar.finish_with_message(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_advances_bar() {
        let mut progress = ProgressTracker::new(3);
        progress.add_tokens(120);
        progress.update("Q1");
        progress.update("Q2");
        assert_eq!(progress.bar.position(), 2);
        assert!(progress.bar.message().starts_with("Q2 | "));
    }

    #[test]
    fn test_finish_keeps_final_message() {
        let progress = ProgressTracker::new(1);
        let bar = progress.bar.clone();
        progress.finish("All done!");
        assert!(bar.is_finished());
        assert_eq!(bar.message(), "All done!");
    }
}
