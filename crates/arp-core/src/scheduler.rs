//! Timer scheduler
//!
//! Owns every cancellable background timer in the process:
//! - one-shot timers (emergency level deadlines)
//! - periodic timers (monitor ticks)
//!
//! Timers are keyed; scheduling under an existing key replaces the previous
//! timer. Cancellation is observed only while a timer is sleeping, so a
//! callback that has started always runs to completion.

use dashmap::DashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, trace};

/// Key identifying one timer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimerKey(String);

impl TimerKey {
    #[inline]
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TimerKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for TimerKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl fmt::Display for TimerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

struct TimerHandle {
    cancel: watch::Sender<bool>,
    finished: watch::Receiver<bool>,
    generation: u64,
}

/// Cancellable keyed timers on the current tokio runtime
#[derive(Clone, Default)]
pub struct Scheduler {
    timers: Arc<DashMap<TimerKey, TimerHandle>>,
    generation: Arc<AtomicU64>,
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` once after `delay` unless cancelled first
    pub fn schedule_once<F, Fut>(&self, key: impl Into<TimerKey>, delay: Duration, f: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let key = key.into();
        let (generation, mut cancel_rx, finished_tx) = self.install(&key);
        let timers = Arc::clone(&self.timers);

        debug!(timer = %key, delay_ms = delay.as_millis() as u64, "scheduled one-shot timer");
        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(delay) => {
                    trace!(timer = %key, "one-shot timer fired");
                    f().await;
                }
                _ = cancel_rx.changed() => {
                    trace!(timer = %key, "one-shot timer cancelled");
                }
            }
            timers.remove_if(&key, |_, handle| handle.generation == generation);
            let _ = finished_tx.send(true);
        });
    }

    /// Run `f` every `period` (first run after one period) until cancelled
    pub fn schedule_every<F, Fut>(&self, key: impl Into<TimerKey>, period: Duration, f: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let key = key.into();
        let (generation, mut cancel_rx, finished_tx) = self.install(&key);
        let timers = Arc::clone(&self.timers);

        debug!(timer = %key, period_ms = period.as_millis() as u64, "scheduled periodic timer");
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = tokio::time::sleep(period) => {}
                    _ = cancel_rx.changed() => break,
                }
                f().await;
            }
            trace!(timer = %key, "periodic timer stopped");
            timers.remove_if(&key, |_, handle| handle.generation == generation);
            let _ = finished_tx.send(true);
        });
    }

    /// Cancel the timer under `key`; returns whether one was pending
    pub fn cancel(&self, key: &TimerKey) -> bool {
        match self.timers.remove(key) {
            Some((_, handle)) => {
                let _ = handle.cancel.send(true);
                debug!(timer = %key, "timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel and wait for a callback already in progress to finish
    pub async fn cancel_and_wait(&self, key: &TimerKey) -> bool {
        let finished = self.timers.get(key).map(|h| h.finished.clone());
        let cancelled = self.cancel(key);
        if let Some(mut rx) = finished {
            let _ = rx.wait_for(|done| *done).await;
        }
        cancelled
    }

    #[must_use]
    pub fn is_scheduled(&self, key: &TimerKey) -> bool {
        self.timers.contains_key(key)
    }

    /// Number of live timers
    #[must_use]
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Wait until the timer currently registered under `key` finishes
    ///
    /// Returns immediately when nothing is scheduled. A callback that re-arms
    /// its own key installs a new timer; callers wanting to follow a chain
    /// loop while [`Self::is_scheduled`] holds.
    pub async fn wait(&self, key: &TimerKey) {
        let finished = self.timers.get(key).map(|h| h.finished.clone());
        if let Some(mut rx) = finished {
            let _ = rx.wait_for(|done| *done).await;
        }
    }

    /// Cancel every timer
    pub fn shutdown(&self) {
        let keys: Vec<TimerKey> = self.timers.iter().map(|e| e.key().clone()).collect();
        for key in &keys {
            self.cancel(key);
        }
    }

    fn install(&self, key: &TimerKey) -> (u64, watch::Receiver<bool>, watch::Sender<bool>) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (finished_tx, finished_rx) = watch::channel(false);
        let previous = self.timers.insert(
            key.clone(),
            TimerHandle {
                cancel: cancel_tx,
                finished: finished_rx,
                generation,
            },
        );
        if let Some(previous) = previous {
            let _ = previous.cancel.send(true);
            debug!(timer = %key, "replaced existing timer");
        }
        (generation, cancel_rx, finished_tx)
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("timers", &self.timers.len())
            .finish()
    }
}
