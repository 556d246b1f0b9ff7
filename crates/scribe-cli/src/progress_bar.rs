//! Terminal progress for sync runs.

use indicatif::{ProgressBar, ProgressStyle};
use scribe_index::{ProgressEvent, ProgressSink};

/// Draws one bar per sync run on stderr.
pub struct BarSink {
    bar: ProgressBar,
}

impl BarSink {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{prefix:>5} [{bar:40.cyan/blue}] {pos}/{len} files {wide_msg}")
        {
            bar.set_style(style.progress_chars("##."));
        }
        Self { bar }
    }

    /// A sink that draws nothing, for `--quiet` and non-terminal output.
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }
}

impl ProgressSink for BarSink {
    fn report(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Planned {
                corpus,
                added,
                changed,
                removed,
                ..
            } => {
                self.bar.set_prefix(corpus.to_string());
                self.bar.set_position(0);
                self.bar.set_length((added + changed + removed) as u64);
            }
            ProgressEvent::File { path, .. } => {
                self.bar.set_message(path.clone());
                self.bar.inc(1);
            }
            // the warning itself is logged by the sync
            ProgressEvent::Failed { .. } => self.bar.inc(1),
            ProgressEvent::Finished(report) => {
                self.bar.finish_and_clear();
                if !self.bar.is_hidden() {
                    eprintln!("{}", report.summary());
                }
            }
        }
    }
}
