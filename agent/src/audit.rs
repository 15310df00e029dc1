//! Outbound queue for `log_auth_attempt` calls.
//!
//! Callers either fire and forget ([`AuditQueue::dispatch`]) or wait for the
//! delivery outcome ([`AuditQueue::record`]). Neither path ever fails the
//! caller: an entry the backend does not accept is written to the
//! `audit_dead_letters` table instead.

use std::sync::Arc;

use chrono::Utc;
use common::AuthAttempt;
use log::{debug, error};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::backend::Backend;
use crate::storage::Storage;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum AuditOutcome {
    Delivered(String),
    DeadLettered(String),
}

enum Job {
    Deliver {
        attempt: AuthAttempt,
        done: Option<oneshot::Sender<AuditOutcome>>,
    },
    Flush(oneshot::Sender<()>),
}

#[derive(Clone)]
pub struct DeadLetterLog {
    storage: Storage,
}

impl DeadLetterLog {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub async fn record(&self, attempt: &AuthAttempt, reason: &str) {
        error!(
            "Audit entry dead-lettered ({} / {} / {}): {}",
            attempt.action,
            attempt.email,
            attempt.status.as_str(),
            reason
        );
        if let Err(e) = self.storage.insert_dead_letter(attempt, reason, Utc::now()).await {
            error!("Dead-letter write failed too, entry lost: {}", e);
        }
    }
}

#[derive(Clone)]
pub struct AuditQueue {
    tx: mpsc::Sender<Job>,
    dead_letters: DeadLetterLog,
}

impl AuditQueue {
    pub fn start(backend: Arc<dyn Backend>, dead_letters: DeadLetterLog, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Job>(capacity.max(1));
        let worker_letters = dead_letters.clone();
        let worker = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                match job {
                    Job::Deliver { attempt, done } => {
                        let outcome = match backend.log_auth_attempt(&attempt).await {
                            Ok(id) => {
                                debug!("Audit entry {} delivered ({})", id, attempt.action);
                                AuditOutcome::Delivered(id)
                            }
                            Err(e) => {
                                let reason = e.to_string();
                                worker_letters.record(&attempt, &reason).await;
                                AuditOutcome::DeadLettered(reason)
                            }
                        };
                        if let Some(done) = done {
                            let _ = done.send(outcome);
                        }
                    }
                    Job::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            debug!("Audit worker stopped");
        });
        (Self { tx, dead_letters }, worker)
    }

    /// Queues the entry without waiting. A full or closed queue dead-letters it.
    pub fn dispatch(&self, attempt: AuthAttempt) {
        let job = Job::Deliver { attempt, done: None };
        let (attempt, reason) = match self.tx.try_send(job) {
            Ok(()) => return,
            Err(mpsc::error::TrySendError::Full(Job::Deliver { attempt, .. })) => (attempt, "audit queue full"),
            Err(mpsc::error::TrySendError::Closed(Job::Deliver { attempt, .. })) => (attempt, "audit queue closed"),
            Err(_) => return,
        };
        let letters = self.dead_letters.clone();
        tokio::spawn(async move { letters.record(&attempt, reason).await });
    }

    /// Queues the entry and waits until the backend accepted it or it was
    /// dead-lettered.
    pub async fn record(&self, attempt: AuthAttempt) -> AuditOutcome {
        let (done, outcome) = oneshot::channel();
        if let Err(mpsc::error::SendError(Job::Deliver { attempt, .. })) =
            self.tx.send(Job::Deliver { attempt, done: Some(done) }).await
        {
            let reason = "audit queue closed";
            self.dead_letters.record(&attempt, reason).await;
            return AuditOutcome::DeadLettered(reason.to_string());
        }
        outcome
            .await
            .unwrap_or_else(|_| AuditOutcome::DeadLettered("audit worker stopped".to_string()))
    }

    /// Resolves once everything queued before the call has been handled.
    pub async fn flush(&self) {
        let (done, flushed) = oneshot::channel();
        if self.tx.send(Job::Flush(done)).await.is_ok() {
            let _ = flushed.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{LocalBackend, Table};
    use crate::testing::ScriptedBackend;
    use common::AttemptStatus;

    fn attempt(action: &str) -> AuthAttempt {
        AuthAttempt::new(action, "a@example.com", AttemptStatus::Success, "Valid credentials provided", "Linux")
    }

    #[tokio::test]
    async fn delivered_entries_land_in_activity_logs() {
        let storage = Storage::in_memory().await.unwrap();
        let backend = Arc::new(LocalBackend::new(storage.clone(), chrono::Duration::hours(1), true));
        let (queue, _worker) = AuditQueue::start(backend.clone(), DeadLetterLog::new(storage.clone()), 8);

        queue.dispatch(attempt("Login"));
        let outcome = queue.record(attempt("Signup")).await;
        assert!(matches!(outcome, AuditOutcome::Delivered(_)));

        let rows = backend.select_all(Table::ActivityLogs).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(storage.dead_letter_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn rejected_entries_are_dead_lettered_not_dropped() {
        let storage = Storage::in_memory().await.unwrap();
        let backend = Arc::new(ScriptedBackend::unreachable());
        let (queue, _worker) = AuditQueue::start(backend, DeadLetterLog::new(storage.clone()), 8);

        queue.dispatch(attempt("Login"));
        queue.flush().await;
        let outcome = queue.record(attempt("Signup")).await;

        assert_eq!(outcome, AuditOutcome::DeadLettered("transport error: connection refused".into()));
        let letters = storage.recent_dead_letters(10).await.unwrap();
        assert_eq!(letters.len(), 2);
        assert_eq!(letters[0].attempt.action, "Signup");
        assert_eq!(letters[1].attempt.action, "Login");
    }

    #[tokio::test]
    async fn stopped_worker_dead_letters_immediately() {
        let storage = Storage::in_memory().await.unwrap();
        let (queue, worker) = AuditQueue::start(Arc::new(ScriptedBackend::unreachable()), DeadLetterLog::new(storage.clone()), 1);
        worker.abort();
        let _ = worker.await;

        let outcome = queue.record(attempt("Signup")).await;
        assert_eq!(outcome, AuditOutcome::DeadLettered("audit queue closed".into()));
        assert_eq!(storage.dead_letter_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn full_queue_dead_letters_without_waiting() {
        let storage = Storage::in_memory().await.unwrap();
        let backend = Arc::new(ScriptedBackend::slow_audit(std::time::Duration::from_millis(500)));
        let (queue, _worker) = AuditQueue::start(backend, DeadLetterLog::new(storage.clone()), 1);

        let started = std::time::Instant::now();
        for action in ["Login", "Login Attempt", "Signup", "Signup Attempt"] {
            queue.dispatch(attempt(action));
        }
        assert!(started.elapsed() < std::time::Duration::from_millis(100));

        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
        while storage.dead_letter_count().await.unwrap() < 3 {
            assert!(tokio::time::Instant::now() < deadline, "overflow never dead-lettered");
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let letters = storage.recent_dead_letters(10).await.unwrap();
        assert_eq!(letters.len(), 3);
        assert!(letters.iter().all(|l| l.error == "audit queue full"));
        assert!(letters.iter().all(|l| l.attempt.action != "Login"));

        queue.flush().await;
        assert_eq!(storage.dead_letter_count().await.unwrap(), 3);
    }
}
