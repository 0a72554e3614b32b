//! Tokio Timer Scheduler
//!
//! [`Scheduler`] built on `tokio::time::sleep`. Each timer is a small task
//! that posts its token to a [`TimerSink`] when it fires; cancelling aborts
//! the task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::application::ports::{Scheduler, TimerToken};

/// Receives fired timer tokens.
pub type TimerSink = Arc<dyn Fn(TimerToken) + Send + Sync>;

/// Tokio-backed timers. Must be used inside a tokio runtime.
pub struct TokioScheduler {
    sink: TimerSink,
    next_id: u64,
    timers: HashMap<TimerToken, JoinHandle<()>>,
}

impl TokioScheduler {
    /// Create a scheduler that reports to `sink`.
    #[must_use]
    pub fn new(sink: TimerSink) -> Self {
        Self {
            sink,
            next_id: 0,
            timers: HashMap::new(),
        }
    }

    /// Number of timers that have not fired or been cancelled.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.timers.values().filter(|t| !t.is_finished()).count()
    }
}

impl std::fmt::Debug for TokioScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioScheduler")
            .field("next_id", &self.next_id)
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

impl Scheduler for TokioScheduler {
    fn set_timer(&mut self, delay: Duration) -> TimerToken {
        self.timers.retain(|_, task| !task.is_finished());

        self.next_id += 1;
        let token = TimerToken::new(self.next_id);
        let sink = Arc::clone(&self.sink);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            sink(token);
        });
        self.timers.insert(token, task);
        token
    }

    fn cancel(&mut self, token: TimerToken) {
        if let Some(task) = self.timers.remove(&token) {
            task.abort();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, task) in self.timers.drain() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    fn scheduler() -> (TokioScheduler, mpsc::UnboundedReceiver<TimerToken>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink: TimerSink = Arc::new(move |token| {
            let _ = tx.send(token);
        });
        (TokioScheduler::new(sink), rx)
    }

    #[tokio::test]
    async fn timer_fires_with_its_token() {
        let (mut scheduler, mut fired) = scheduler();

        let token = scheduler.set_timer(Duration::from_millis(10));

        let received = tokio::time::timeout(Duration::from_secs(2), fired.recv())
            .await
            .unwrap();
        assert_eq!(received, Some(token));
    }

    #[tokio::test]
    async fn tokens_are_unique() {
        let (mut scheduler, _fired) = scheduler();

        let a = scheduler.set_timer(Duration::from_secs(60));
        let b = scheduler.set_timer(Duration::from_secs(60));

        assert_ne!(a, b);
        assert_eq!(scheduler.pending(), 2);
    }

    #[tokio::test]
    async fn cancelled_timer_does_not_fire() {
        let (mut scheduler, mut fired) = scheduler();

        let cancelled = scheduler.set_timer(Duration::from_millis(20));
        let kept = scheduler.set_timer(Duration::from_millis(60));
        scheduler.cancel(cancelled);
        scheduler.cancel(TimerToken::new(999));

        let received = tokio::time::timeout(Duration::from_secs(2), fired.recv())
            .await
            .unwrap();
        assert_eq!(received, Some(kept));
    }
}
