use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::PubtatorError;

/// Documents or files between two progress events.
pub const PROGRESS_INTERVAL: usize = 100;

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub processed: usize,
}

impl ProgressEvent {
    pub fn processed(processed: usize) -> Self {
        Self {
            message: format!("Processed {processed} documents ..."),
            processed,
        }
    }
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedFile {
    pub path: String,
    pub error: String,
}

/// Outcome of running a per-file tool over a set of files.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchResult {
    pub processed: usize,
    pub failed: Vec<FailedFile>,
}

impl BatchResult {
    /// Turn per-file failures into an error for the whole run.
    pub fn into_result(self) -> Result<Self, PubtatorError> {
        if self.failed.is_empty() {
            Ok(self)
        } else {
            Err(PubtatorError::FilesFailed {
                count: self.processed,
                failed: self.failed.len(),
            })
        }
    }
}

/// Run `process` on every file. A failing file is logged and recorded, and
/// the remaining files are still processed.
pub fn process_files<F>(files: &[PathBuf], sink: &dyn ProgressSink, mut process: F) -> BatchResult
where
    F: FnMut(&Path) -> Result<(), PubtatorError>,
{
    let mut result = BatchResult::default();
    for file in files {
        if let Err(err) = process(file) {
            tracing::error!("failed {}: {err}", file.display());
            result.failed.push(FailedFile {
                path: file.display().to_string(),
                error: err.to_string(),
            });
        }
        result.processed += 1;
        if result.processed % PROGRESS_INTERVAL == 0 {
            sink.event(ProgressEvent::processed(result.processed));
        }
    }
    sink.event(ProgressEvent {
        message: format!(
            "Done, processed {} documents ({} errors).",
            result.processed,
            result.failed.len()
        ),
        processed: result.processed,
    });
    result
}
