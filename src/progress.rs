//! Analysis progress reporting.
//!
//! Reports batch settlement while `pdr analyze` waits on the inference
//! service, so users see how many calls are done and how many remain.
//! Progress is emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event for one analysis run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Batches have been planned; `total` inference calls will be attempted.
    Planned { document_id: i64, total: usize },
    /// `settled` of `total` batches have finished (successfully or not).
    Settled {
        document_id: i64,
        settled: usize,
        failed: usize,
        total: usize,
    },
}

/// Receives progress events. Called from the scheduler's join loop.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "analyze doc:42  settled  3 / 12 batches".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Planned { document_id, total } => {
                format!("analyze doc:{}  planned  {} batches\n", document_id, total)
            }
            ProgressEvent::Settled {
                document_id,
                settled,
                failed,
                total,
            } => {
                if *failed > 0 {
                    format!(
                        "analyze doc:{}  settled  {} / {} batches ({} failed)\n",
                        document_id, settled, total, failed
                    )
                } else {
                    format!(
                        "analyze doc:{}  settled  {} / {} batches\n",
                        document_id, settled, total
                    )
                }
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        if let Ok(line) = serde_json::to_string(&event_json(&event)) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

fn event_json(event: &ProgressEvent) -> serde_json::Value {
    match event {
        ProgressEvent::Planned { document_id, total } => serde_json::json!({
            "event": "progress",
            "documentId": document_id,
            "phase": "planned",
            "total": total
        }),
        ProgressEvent::Settled {
            document_id,
            settled,
            failed,
            total,
        } => serde_json::json!({
            "event": "progress",
            "documentId": document_id,
            "phase": "settled",
            "n": settled,
            "failed": failed,
            "total": total
        }),
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
