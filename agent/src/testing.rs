//! Scripted backend for exercising races and failures the SQLite backend
//! cannot produce on demand.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use common::{AuthAttempt, Device, NewDevice, Session};
use tokio::sync::{broadcast, mpsc};

use crate::backend::{AuthEvent, Backend, ChangeEvent, ChangeKind, ChangeSubscription, Table};
use crate::error::BackendError;

/// One scripted answer to `select_all`.
pub struct Reply {
    pub delay: Duration,
    pub rows: Result<Vec<serde_json::Value>, BackendError>,
}

impl Reply {
    pub fn rows(delay_ms: u64, rows: Vec<serde_json::Value>) -> Self {
        Self { delay: Duration::from_millis(delay_ms), rows: Ok(rows) }
    }

    pub fn fail(message: &str) -> Self {
        Self { delay: Duration::ZERO, rows: Err(BackendError::Transport(message.to_string())) }
    }
}

pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Reply>>,
    changes: Mutex<Option<mpsc::Receiver<ChangeEvent>>>,
    auth_tx: broadcast::Sender<AuthEvent>,
    /// When set, `log_auth_attempt` takes this long and then succeeds.
    audit_delay: Option<Duration>,
}

impl ScriptedBackend {
    /// Returns the backend and the sender that feeds its change subscription.
    pub fn new(replies: Vec<Reply>) -> (Self, mpsc::Sender<ChangeEvent>) {
        let (tx, rx) = mpsc::channel(64);
        let (auth_tx, _) = broadcast::channel(4);
        let backend = Self {
            replies: Mutex::new(replies.into()),
            changes: Mutex::new(Some(rx)),
            auth_tx,
            audit_delay: None,
        };
        (backend, tx)
    }

    pub fn unreachable() -> Self {
        Self::new(Vec::new()).0
    }

    /// Accepts every audit entry, each after `delay`.
    pub fn slow_audit(delay: Duration) -> Self {
        Self { audit_delay: Some(delay), ..Self::unreachable() }
    }
}

pub fn change(table: Table) -> ChangeEvent {
    ChangeEvent { table, kind: ChangeKind::Update }
}

fn down() -> BackendError {
    BackendError::Transport("connection refused".to_string())
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        Ok(None)
    }

    fn auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.auth_tx.subscribe()
    }

    async fn sign_in_with_password(&self, _: &str, _: &str) -> Result<Session, BackendError> {
        Err(down())
    }

    async fn sign_up(&self, _: &str, _: &str, _: &str) -> Result<(), BackendError> {
        Err(down())
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        Err(down())
    }

    async fn select_all(&self, _: Table) -> Result<Vec<serde_json::Value>, BackendError> {
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(reply) => {
                tokio::time::sleep(reply.delay).await;
                reply.rows
            }
            None => Err(down()),
        }
    }

    async fn insert_device(&self, _: &NewDevice) -> Result<Device, BackendError> {
        Err(down())
    }

    async fn log_auth_attempt(&self, attempt: &AuthAttempt) -> Result<String, BackendError> {
        match self.audit_delay {
            Some(delay) => {
                tokio::time::sleep(delay).await;
                Ok(format!("logged:{}", attempt.action))
            }
            None => Err(down()),
        }
    }

    fn subscribe(&self, _: Table) -> ChangeSubscription {
        let rx = self
            .changes
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| mpsc::channel(1).1);
        ChangeSubscription::new(rx, tokio::spawn(async {}))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
