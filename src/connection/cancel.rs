use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex, PoisonError,
};

/// Reports whether the owning distribution manager is shutting down.
pub trait CancelCriterion: Send + Sync + 'static {
    /// Returns the reason if cancellation is in progress.
    fn cancel_in_progress(&self) -> Option<String>;
}

/// A cancellation flag with the reason it was raised.
///
/// The first reason given wins; cancelling again keeps it.
#[derive(Debug, Default)]
pub struct CancelSignal {
    cancelled: AtomicBool,
    reason: Mutex<Option<String>>,
}

impl CancelSignal {
    /// Creates a signal which is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the signal.
    pub fn cancel(&self, reason: impl Into<String>) {
        let mut current = self.reason.lock().unwrap_or_else(PoisonError::into_inner);
        if current.is_none() {
            *current = Some(reason.into());
        }
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns `true` once [`cancel`](Self::cancel) was called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl CancelCriterion for CancelSignal {
    fn cancel_in_progress(&self) -> Option<String> {
        if !self.is_cancelled() {
            return None;
        }
        self.reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_reason_wins() {
        let signal = CancelSignal::new();
        assert_eq!(signal.cancel_in_progress(), None);

        signal.cancel("member shutting down");
        signal.cancel("forced disconnect");
        assert!(signal.is_cancelled());
        assert_eq!(
            signal.cancel_in_progress().as_deref(),
            Some("member shutting down")
        );
    }
}
