//! Sync progress reporting.
//!
//! Each sync run builds its own [`SyncProgress`], which keeps the running
//! totals and forwards events to a [`ProgressSink`] supplied by the caller.
//! The engine itself only ever logs through `tracing`; a terminal progress
//! bar is just another sink.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::diff::ManifestDiff;
use crate::manifest::CorpusKind;

/// Stage of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    Removing,
    Updating,
    Adding,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Removing => "removing",
            Self::Updating => "updating",
            Self::Adding => "adding",
        }
    }
}

/// A progress event for one corpus.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Diff computed; counts of work ahead
    Planned {
        corpus: CorpusKind,
        added: usize,
        changed: usize,
        removed: usize,
        unchanged: usize,
    },
    /// A file finished (`done` of `total` within the phase)
    File {
        corpus: CorpusKind,
        phase: SyncPhase,
        path: String,
        chunks: usize,
        done: usize,
        total: usize,
    },
    /// A file failed and will be retried next run
    Failed {
        corpus: CorpusKind,
        phase: SyncPhase,
        path: String,
        error: String,
    },
    /// The run ended
    Finished(SyncReport),
}

/// Receives progress events.
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: &ProgressEvent);
}

/// Logs progress through `tracing`.
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn report(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Planned {
                corpus,
                added,
                changed,
                removed,
                unchanged,
            } => info!(
                corpus = %corpus,
                added, changed, removed, unchanged,
                "Sync planned"
            ),
            ProgressEvent::File {
                corpus,
                phase,
                path,
                chunks,
                done,
                total,
            } => info!(
                corpus = %corpus,
                phase = phase.as_str(),
                chunks,
                "[{}/{}] {}",
                done,
                total,
                path
            ),
            // already logged by SyncProgress::file_failed
            ProgressEvent::Failed { .. } => {}
            ProgressEvent::Finished(report) => info!("{}", report.summary()),
        }
    }
}

/// Discards every event.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _event: &ProgressEvent) {}
}

/// Outcome of one sync run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub corpus: CorpusKind,
    /// Files embedded for the first time
    pub added: usize,
    /// Files re-embedded after a content change
    pub changed: usize,
    /// Files whose points were deleted
    pub removed: usize,
    pub unchanged: usize,
    /// Files that failed and stay pending
    pub failed: usize,
    pub chunks_upserted: usize,
    pub embedding_calls: usize,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
    /// The run was cancelled before finishing
    pub interrupted: bool,
}

impl SyncReport {
    pub fn new(corpus: CorpusKind) -> Self {
        Self {
            corpus,
            added: 0,
            changed: 0,
            removed: 0,
            unchanged: 0,
            failed: 0,
            chunks_upserted: 0,
            embedding_calls: 0,
            elapsed: Duration::ZERO,
            interrupted: false,
        }
    }

    /// True when the run changed nothing in the store.
    pub fn is_noop(&self) -> bool {
        self.added == 0 && self.changed == 0 && self.removed == 0
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        format!(
            "{}: {} added, {} changed, {} removed, {} unchanged, {} failed; {} chunks in {} embedding calls ({:.1}s){}",
            self.corpus,
            self.added,
            self.changed,
            self.removed,
            self.unchanged,
            self.failed,
            self.chunks_upserted,
            self.embedding_calls,
            self.elapsed.as_secs_f64(),
            if self.interrupted { " [interrupted]" } else { "" }
        )
    }
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

/// Per-run progress context.
pub struct SyncProgress {
    sink: Arc<dyn ProgressSink>,
    started: Instant,
    phase: Option<SyncPhase>,
    phase_done: usize,
    phase_total: usize,
    report: SyncReport,
}

impl SyncProgress {
    pub fn new(corpus: CorpusKind, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            sink,
            started: Instant::now(),
            phase: None,
            phase_done: 0,
            phase_total: 0,
            report: SyncReport::new(corpus),
        }
    }

    pub fn corpus(&self) -> CorpusKind {
        self.report.corpus
    }

    pub fn report(&self) -> &SyncReport {
        &self.report
    }

    /// Record the diff and announce the plan.
    pub fn planned(&mut self, diff: &ManifestDiff) {
        self.report.unchanged = diff.unchanged.len();
        self.sink.report(&ProgressEvent::Planned {
            corpus: self.report.corpus,
            added: diff.added.len(),
            changed: diff.changed.len(),
            removed: diff.removed.len(),
            unchanged: diff.unchanged.len(),
        });
    }

    /// Start a phase covering `total` files.
    pub fn begin_phase(&mut self, phase: SyncPhase, total: usize) {
        self.phase = Some(phase);
        self.phase_done = 0;
        self.phase_total = total;
    }

    /// A file in the current phase succeeded with `chunks` points.
    pub fn file_done(&mut self, path: &str, chunks: usize) {
        let Some(phase) = self.phase else {
            return;
        };
        self.phase_done += 1;
        match phase {
            SyncPhase::Removing => self.report.removed += 1,
            SyncPhase::Updating => self.report.changed += 1,
            SyncPhase::Adding => self.report.added += 1,
        }
        self.report.chunks_upserted += chunks;

        self.sink.report(&ProgressEvent::File {
            corpus: self.report.corpus,
            phase,
            path: path.to_string(),
            chunks,
            done: self.phase_done,
            total: self.phase_total,
        });
    }

    /// A file in the current phase failed. Always logged, whatever the sink.
    pub fn file_failed(&mut self, path: &str, error: &anyhow::Error) {
        let Some(phase) = self.phase else {
            return;
        };
        self.phase_done += 1;
        self.report.failed += 1;

        let error = format!("{error:#}");
        warn!(
            corpus = %self.report.corpus,
            phase = phase.as_str(),
            path = %path,
            "Failed, will retry next run: {}",
            error
        );

        self.sink.report(&ProgressEvent::Failed {
            corpus: self.report.corpus,
            phase,
            path: path.to_string(),
            error,
        });
    }

    /// Close the run and emit the final report.
    pub fn finish(mut self, embedding_calls: usize, interrupted: bool) -> SyncReport {
        self.report.embedding_calls = embedding_calls;
        self.report.interrupted = interrupted;
        self.report.elapsed = self.started.elapsed();
        self.sink.report(&ProgressEvent::Finished(self.report.clone()));
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ProgressEvent>>);

    impl ProgressSink for Recorder {
        fn report(&self, event: &ProgressEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn test_progress_counts_per_phase() {
        let recorder = Arc::new(Recorder::default());
        let mut progress = SyncProgress::new(CorpusKind::Docs, recorder.clone());

        progress.planned(&ManifestDiff {
            added: vec!["a.md".into(), "b.md".into()],
            changed: vec![],
            removed: vec!["gone.md".into()],
            unchanged: vec!["same.md".into()],
        });
        progress.begin_phase(SyncPhase::Removing, 1);
        progress.file_done("gone.md", 0);
        progress.begin_phase(SyncPhase::Adding, 2);
        progress.file_done("a.md", 3);
        progress.file_failed("b.md", &anyhow::anyhow!("boom"));

        let report = progress.finish(2, false);
        assert_eq!(report.added, 1);
        assert_eq!(report.removed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.chunks_upserted, 3);
        assert_eq!(report.embedding_calls, 2);

        let events = recorder.0.lock().unwrap();
        assert_eq!(events.len(), 5);
        assert!(matches!(
            &events[2],
            ProgressEvent::File { done: 1, total: 2, .. }
        ));
        assert!(matches!(&events[4], ProgressEvent::Finished(_)));
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failure_logged_with_path_for_any_sink() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let mut progress = SyncProgress::new(CorpusKind::Docs, Arc::new(NoProgress));
            progress.begin_phase(SyncPhase::Adding, 1);
            progress.file_failed("guide/bad.md", &anyhow::anyhow!("write rejected"));
        });

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("WARN"));
        assert!(output.contains("guide/bad.md"));
        assert!(output.contains("write rejected"));
    }

    #[test]
    fn test_summary_mentions_interruption() {
        let mut report = SyncReport::new(CorpusKind::Code);
        report.interrupted = true;
        assert!(report.summary().starts_with("code:"));
        assert!(report.summary().ends_with("[interrupted]"));
        assert!(report.is_noop());
    }

    #[test]
    fn test_report_serializes_elapsed_as_millis() {
        let mut report = SyncReport::new(CorpusKind::Docs);
        report.elapsed = Duration::from_millis(1500);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["elapsed"], 1500);
        assert_eq!(json["corpus"], "docs");
    }
}
