//! Progress reporting and cooperative cancellation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Host context of a pipeline run.
///
/// The orchestrator polls [`Feedback::is_canceled`] after every stage and
/// reports a short progress text when it continues.
pub trait Feedback {
    fn set_progress_text(&self, text: &str);

    fn is_canceled(&self) -> bool;
}

/// Feedback that logs progress through `tracing` and cancels on a shared flag
#[derive(Debug, Clone, Default)]
pub struct LogFeedback {
    canceled: Arc<AtomicBool>,
}

impl LogFeedback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an externally owned flag, e.g. one set by a signal handler
    pub fn with_flag(canceled: Arc<AtomicBool>) -> Self {
        Self { canceled }
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.canceled)
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }
}

impl Feedback for LogFeedback {
    fn set_progress_text(&self, text: &str) {
        tracing::info!("{}", text);
    }

    fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }
}
