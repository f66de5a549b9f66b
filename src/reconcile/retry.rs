//! Late-tile polling
//!
//! The host may render a participant's tile after reconciliation wanted it.
//! Each participant gets at most one polling task with a fixed attempt budget:
//!
//! ```text
//! Idle -> Polling -> { Resolved | Cancelled | Exhausted }
//! ```
//!
//! Every terminal state removes the task and returns the participant to Idle.

use crate::config::RetryConfig;
use crate::types::ParticipantId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Result of one attachment attempt made by a polling task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachAttempt {
    Attached,
    TileMissing,
    /// The participant no longer has an effective binding
    NotWanted,
}

/// What a polling task drives
pub trait RetryTarget: Send + Sync + 'static {
    fn attempt(&self, id: &ParticipantId) -> AttachAttempt;
}

/// Observable scheduler state for one participant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Idle,
    Polling { attempts_remaining: u32 },
}

/// How the last polling task for a participant ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryOutcome {
    Resolved { attempts: u32 },
    Cancelled,
    Exhausted { attempts: u32 },
}

/// Cooperative cancellation flag shared with a polling task
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct RetryTask {
    task_id: u64,
    cancel: CancelToken,
    remaining: Arc<AtomicU32>,
    handle: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Registry {
    tasks: HashMap<ParticipantId, RetryTask>,
    outcomes: HashMap<ParticipantId, RetryOutcome>,
}

/// Per-participant bounded polling
#[derive(Clone)]
pub struct RetryScheduler {
    max_attempts: u32,
    interval: Duration,
    registry: Arc<Mutex<Registry>>,
    next_task: Arc<AtomicU64>,
}

impl RetryScheduler {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            interval: config.interval(),
            registry: Arc::new(Mutex::new(Registry::default())),
            next_task: Arc::new(AtomicU64::new(1)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Start polling for `id`.
    ///
    /// Returns `false` when a task is already in flight for `id`, or when no
    /// async runtime is available to run one.
    pub fn schedule(&self, id: &ParticipantId, target: Arc<dyn RetryTarget>) -> bool {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                log::debug!("No runtime to poll for {}'s tile", id);
                return false;
            }
        };

        let mut registry = self.lock();
        if registry.tasks.contains_key(id) {
            return false;
        }

        let task_id = self.next_task.fetch_add(1, Ordering::SeqCst);
        let cancel = CancelToken::default();
        let remaining = Arc::new(AtomicU32::new(self.max_attempts));

        let handle = runtime.spawn(Self::poll(
            self.clone(),
            id.clone(),
            task_id,
            cancel.clone(),
            remaining.clone(),
            target,
        ));

        registry.tasks.insert(
            id.clone(),
            RetryTask {
                task_id,
                cancel,
                remaining,
                handle: Some(handle),
            },
        );
        log::debug!(
            "Polling for {}'s tile ({} attempts every {:?})",
            id,
            self.max_attempts,
            self.interval
        );
        true
    }

    async fn poll(
        self,
        id: ParticipantId,
        task_id: u64,
        cancel: CancelToken,
        remaining: Arc<AtomicU32>,
        target: Arc<dyn RetryTarget>,
    ) {
        for attempt in 1..=self.max_attempts {
            tokio::time::sleep(self.interval).await;
            if cancel.is_cancelled() {
                return;
            }

            match target.attempt(&id) {
                AttachAttempt::Attached => {
                    log::debug!("Tile for {} attached after {} attempt(s)", id, attempt);
                    self.finish(&id, task_id, RetryOutcome::Resolved { attempts: attempt });
                    return;
                }
                AttachAttempt::NotWanted => {
                    log::debug!("Stopped polling for {}: overlay no longer wanted", id);
                    self.finish(&id, task_id, RetryOutcome::Cancelled);
                    return;
                }
                AttachAttempt::TileMissing => {
                    log::trace!("Tile for {} still missing (attempt {})", id, attempt);
                    remaining.store(self.max_attempts - attempt, Ordering::SeqCst);
                }
            }
        }

        log::debug!(
            "Gave up on {}'s tile after {} attempts",
            id,
            self.max_attempts
        );
        self.finish(
            &id,
            task_id,
            RetryOutcome::Exhausted {
                attempts: self.max_attempts,
            },
        );
    }

    fn finish(&self, id: &ParticipantId, task_id: u64, outcome: RetryOutcome) {
        let mut registry = self.lock();
        let current = registry.tasks.get(id).map(|task| task.task_id);
        if current == Some(task_id) {
            registry.tasks.remove(id);
            registry.outcomes.insert(id.clone(), outcome);
        }
    }

    /// Stop the participant's task before its next tick fires
    pub fn cancel(&self, id: &ParticipantId) -> bool {
        self.stop(id, RetryOutcome::Cancelled)
    }

    /// Retire the participant's task because its overlay was attached elsewhere
    pub fn resolve(&self, id: &ParticipantId) -> bool {
        let attempts = self
            .lock()
            .tasks
            .get(id)
            .map(|task| self.max_attempts - task.remaining.load(Ordering::SeqCst))
            .unwrap_or(0);
        self.stop(id, RetryOutcome::Resolved { attempts })
    }

    fn stop(&self, id: &ParticipantId, outcome: RetryOutcome) -> bool {
        let mut registry = self.lock();
        let Some(mut task) = registry.tasks.remove(id) else {
            return false;
        };
        task.cancel.cancel();
        if let Some(handle) = task.handle.take() {
            handle.abort();
        }
        registry.outcomes.insert(id.clone(), outcome);
        true
    }

    pub fn cancel_all(&self) -> Vec<ParticipantId> {
        let pending = self.pending();
        for id in &pending {
            self.cancel(id);
        }
        pending
    }

    pub fn state(&self, id: &ParticipantId) -> RetryState {
        match self.lock().tasks.get(id) {
            Some(task) => RetryState::Polling {
                attempts_remaining: task.remaining.load(Ordering::SeqCst),
            },
            None => RetryState::Idle,
        }
    }

    pub fn last_outcome(&self, id: &ParticipantId) -> Option<RetryOutcome> {
        self.lock().outcomes.get(id).copied()
    }

    /// Participants with a task in flight, sorted
    pub fn pending(&self) -> Vec<ParticipantId> {
        let mut ids: Vec<_> = self.lock().tasks.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn is_polling(&self, id: &ParticipantId) -> bool {
        self.lock().tasks.contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Scripted {
        calls: AtomicUsize,
        attach_on: usize,
        wanted: AtomicBool,
    }

    impl Scripted {
        fn new(attach_on: usize) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                attach_on,
                wanted: AtomicBool::new(true),
            })
        }
    }

    impl RetryTarget for Scripted {
        fn attempt(&self, _id: &ParticipantId) -> AttachAttempt {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.wanted.load(Ordering::SeqCst) {
                AttachAttempt::NotWanted
            } else if call >= self.attach_on {
                AttachAttempt::Attached
            } else {
                AttachAttempt::TileMissing
            }
        }
    }

    fn scheduler(attempts: u32) -> RetryScheduler {
        RetryScheduler::new(&RetryConfig {
            max_attempts: attempts,
            interval_ms: 50,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolves_when_tile_appears() {
        let retries = scheduler(10);
        let target = Scripted::new(3);
        let id = ParticipantId::from("alice");

        assert!(retries.schedule(&id, target.clone()));
        assert_eq!(
            retries.state(&id),
            RetryState::Polling {
                attempts_remaining: 10
            }
        );

        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(retries.state(&id), RetryState::Idle);
        assert_eq!(
            retries.last_outcome(&id),
            Some(RetryOutcome::Resolved { attempts: 3 })
        );
        assert_eq!(target.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_schedule_is_noop() {
        let retries = scheduler(5);
        let target = Scripted::new(usize::MAX);
        let id = ParticipantId::from("alice");

        assert!(retries.schedule(&id, target.clone()));
        assert!(!retries.schedule(&id, target.clone()));
        assert_eq!(retries.pending(), vec![id.clone()]);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(target.calls.load(Ordering::SeqCst), 5);
        assert_eq!(
            retries.last_outcome(&id),
            Some(RetryOutcome::Exhausted { attempts: 5 })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_preempts_pending_tick() {
        let retries = scheduler(10);
        let target = Scripted::new(1);
        let id = ParticipantId::from("alice");

        retries.schedule(&id, target.clone());
        assert!(retries.cancel(&id));
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(target.calls.load(Ordering::SeqCst), 0);
        assert_eq!(retries.last_outcome(&id), Some(RetryOutcome::Cancelled));
        assert!(!retries.cancel(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unwanted_target_cancels_itself() {
        let retries = scheduler(10);
        let target = Scripted::new(usize::MAX);
        target.wanted.store(false, Ordering::SeqCst);
        let id = ParticipantId::from("alice");

        retries.schedule(&id, target.clone());
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert_eq!(target.calls.load(Ordering::SeqCst), 1);
        assert_eq!(retries.last_outcome(&id), Some(RetryOutcome::Cancelled));
        assert!(!retries.is_polling(&id));
    }

    #[test]
    fn test_schedule_without_runtime_is_refused() {
        let retries = scheduler(3);
        assert!(!retries.schedule(&"alice".into(), Scripted::new(1)));
        assert_eq!(retries.state(&"alice".into()), RetryState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_records_progress() {
        let retries = scheduler(10);
        let id = ParticipantId::from("alice");
        retries.schedule(&id, Scripted::new(usize::MAX));
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert!(retries.resolve(&id));
        assert_eq!(
            retries.last_outcome(&id),
            Some(RetryOutcome::Resolved { attempts: 2 })
        );
    }
}
