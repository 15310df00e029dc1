//! The hosted backend seen through one trait.
//!
//! Two implementations exist: [`RestBackend`] talks to the hosted service over
//! HTTP, [`LocalBackend`] keeps everything in a SQLite file and is what the
//! agent runs against in offline mode and in tests.

use async_trait::async_trait;
use common::{AuthAttempt, Device, NewDevice, Session};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::error::BackendError;

pub mod local;
pub mod rest;

pub use local::LocalBackend;
pub use rest::RestBackend;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Profiles,
    Devices,
    ActivityLogs,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Profiles => "profiles",
            Table::Devices => "devices",
            Table::ActivityLogs => "activity_logs",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    /// The transport cannot tell what changed, only that something may have.
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
}

/// Pushed by the backend whenever its notion of the current session moves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(Session),
    TokenRefreshed(Session),
    SignedOut,
}

/// Change notifications for one table. Dropping it releases the channel.
pub struct ChangeSubscription {
    rx: mpsc::Receiver<ChangeEvent>,
    pump: JoinHandle<()>,
}

impl ChangeSubscription {
    pub fn new(rx: mpsc::Receiver<ChangeEvent>, pump: JoinHandle<()>) -> Self {
        Self { rx, pump }
    }

    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// Session the backend already holds, if any (start-up recovery).
    async fn get_session(&self) -> Result<Option<Session>, BackendError>;

    fn auth_events(&self) -> broadcast::Receiver<AuthEvent>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError>;

    async fn sign_up(&self, email: &str, password: &str, redirect_to: &str) -> Result<(), BackendError>;

    async fn sign_out(&self) -> Result<(), BackendError>;

    /// Every row of `table`, newest first by `created_at`.
    async fn select_all(&self, table: Table) -> Result<Vec<serde_json::Value>, BackendError>;

    async fn insert_device(&self, device: &NewDevice) -> Result<Device, BackendError>;

    /// Calls the `log_auth_attempt` procedure and returns the new row id.
    async fn log_auth_attempt(&self, attempt: &AuthAttempt) -> Result<String, BackendError>;

    fn subscribe(&self, table: Table) -> ChangeSubscription;

    fn name(&self) -> &'static str;

    /// Stops background work the client started on its own.
    fn close(&self) {}
}

/// Descriptor of the machine the agent runs on, written into audit entries.
pub fn device_descriptor() -> String {
    use sysinfo::{System, SystemExt};

    let sys = System::new();
    match (sys.long_os_version(), sys.host_name()) {
        (Some(os), Some(host)) => format!("{} ({})", os, host),
        (Some(os), None) => os,
        _ => "Unknown".to_string(),
    }
}
