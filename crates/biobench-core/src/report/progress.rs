//! Progress reporting while a run collects job completions. The orchestrator
//! emits done/total in completion order; the console layer consumes via a sink.

use std::sync::Arc;

/// One progress update: how many jobs have completed (success or failure)
/// out of how many were submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub done: usize,
    pub total: usize,
}

/// Sink for progress events. Called once per completion.
pub type ProgressSink = Arc<dyn Fn(ProgressEvent) + Send + Sync>;
