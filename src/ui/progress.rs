use crate::ui::theme::{theme, Role};
use indicatif::{HumanDuration, ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use std::time::Duration;

/// Progress bar over the pair-comparison phase of a batch run.
///
/// Clones share one underlying bar, so the runner's progress callback
/// can drive it from worker tasks.
#[derive(Clone)]
pub struct PairProgress {
    bar: ProgressBar,
}

impl PairProgress {
    pub fn new() -> Self {
        let bar = if console::Term::stdout().is_term() {
            let bar = ProgressBar::new(0).with_message("Comparing pairs");
            bar.set_style(
                ProgressStyle::with_template("{msg} {bar:30} {pos}/{len}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar
        } else {
            ProgressBar::hidden()
        };
        Self { bar }
    }

    pub fn update(&self, done: usize, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(done as u64);
    }

    pub fn finish_with_summary(&self, duration: Duration, files: usize, pairs: usize) {
        self.bar.finish_and_clear();
        println!(
            "{}",
            format!("Complete in {}", HumanDuration(duration)).style(theme().style(Role::Success))
        );
        println!(
            "  {} files  {} pairs compared",
            files.style(theme().style(Role::Info)),
            pairs.style(theme().style(Role::Info)),
        );
    }
}

impl Default for PairProgress {
    fn default() -> Self {
        Self::new()
    }
}
