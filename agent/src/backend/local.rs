//! SQLite-backed stand-in for the hosted backend.
//!
//! Emulates the pieces the dashboard relies on: password accounts, bearer
//! sessions with a TTL, the `profiles` row the hosted side creates for every
//! new identity, the owner check on `devices` inserts, the
//! `log_auth_attempt` procedure, and change notifications.

use std::sync::Mutex;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use common::{AuthAttempt, Device, Identity, NewDevice, Session};
use hmac::{Hmac, Mac};
use log::{debug, info};
use rand::RngCore;
use sha2::Sha256;
use tokio::sync::{broadcast, mpsc};

use super::{AuthEvent, Backend, ChangeEvent, ChangeKind, ChangeSubscription, Table};
use crate::error::BackendError;
use crate::storage::Storage;

type HmacSha256 = Hmac<Sha256>;

const MIN_PASSWORD_LEN: usize = 6;

pub struct LocalBackend {
    storage: Storage,
    session_ttl: Duration,
    auto_confirm: bool,
    current: Mutex<Option<Session>>,
    auth_tx: broadcast::Sender<AuthEvent>,
    change_tx: broadcast::Sender<ChangeEvent>,
}

fn random_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

fn keyed(salt: &str, password: &str) -> Result<HmacSha256, BackendError> {
    let mut mac = HmacSha256::new_from_slice(salt.as_bytes())
        .map_err(|e| BackendError::Storage(e.to_string()))?;
    mac.update(password.as_bytes());
    Ok(mac)
}

fn hash_password(salt: &str, password: &str) -> Result<String, BackendError> {
    Ok(URL_SAFE_NO_PAD.encode(keyed(salt, password)?.finalize().into_bytes()))
}

fn verify_password(salt: &str, password: &str, expected: &str) -> bool {
    match (URL_SAFE_NO_PAD.decode(expected), keyed(salt, password)) {
        (Ok(expected), Ok(mac)) => mac.verify_slice(&expected).is_ok(),
        _ => false,
    }
}

impl LocalBackend {
    pub fn new(storage: Storage, session_ttl: Duration, auto_confirm: bool) -> Self {
        let (auth_tx, _) = broadcast::channel(16);
        let (change_tx, _) = broadcast::channel(256);
        Self {
            storage,
            session_ttl,
            auto_confirm,
            current: Mutex::new(None),
            auth_tx,
            change_tx,
        }
    }

    fn notify(&self, table: Table, kind: ChangeKind) {
        debug!("local backend: {:?} on {}", kind, table.name());
        // No subscribers is fine.
        let _ = self.change_tx.send(ChangeEvent { table, kind });
    }

    fn set_current(&self, session: Option<Session>) {
        if let Ok(mut guard) = self.current.lock() {
            *guard = session;
        }
    }

    fn current(&self) -> Option<Session> {
        self.current.lock().ok().and_then(|guard| guard.clone())
    }
}

#[async_trait]
impl Backend for LocalBackend {
    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        if let Some(session) = self.current() {
            if !session.is_expired() {
                return Ok(Some(session));
            }
        }
        let recovered = self.storage.latest_live_session(Utc::now()).await?.map(|row| Session {
            user: Identity { id: row.user_id, email: Some(row.email) },
            access_token: row.access_token,
            refresh_token: Some(row.refresh_token),
            expires_at: row.expires_at,
        });
        self.set_current(recovered.clone());
        Ok(recovered)
    }

    fn auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.auth_tx.subscribe()
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let email = email.trim().to_lowercase();
        let user = match self.storage.find_auth_user(&email).await? {
            Some(user) if verify_password(&user.salt, password, &user.password_hash) => user,
            _ => return Err(BackendError::rejected("Invalid login credentials")),
        };
        if !user.confirmed {
            return Err(BackendError::rejected("Email not confirmed"));
        }

        let now = Utc::now();
        let session = Session {
            user: Identity { id: user.id.clone(), email: Some(user.email.clone()) },
            access_token: random_token(32),
            refresh_token: Some(random_token(24)),
            expires_at: now + self.session_ttl,
        };
        self.storage
            .insert_session(
                &session.access_token,
                session.refresh_token.as_deref().unwrap_or_default(),
                &user.id,
                session.expires_at,
            )
            .await?;
        if self.storage.touch_last_login(&user.id, now).await? > 0 {
            self.notify(Table::Profiles, ChangeKind::Update);
        }

        self.set_current(Some(session.clone()));
        info!("local backend: {} signed in", user.email);
        let _ = self.auth_tx.send(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str, redirect_to: &str) -> Result<(), BackendError> {
        let email = email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(BackendError::rejected("Unable to validate email address: invalid format"));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(BackendError::rejected(format!(
                "Password should be at least {} characters.",
                MIN_PASSWORD_LEN
            )));
        }
        if self.storage.find_auth_user(&email).await?.is_some() {
            return Err(BackendError::rejected("User already registered"));
        }

        let now = Utc::now();
        let user_id = uuid::Uuid::new_v4().to_string();
        let salt = random_token(16);
        self.storage
            .insert_auth_user(&user_id, &email, &hash_password(&salt, password)?, &salt, self.auto_confirm, now)
            .await?;
        self.storage
            .insert_profile(&uuid::Uuid::new_v4().to_string(), &user_id, &email, now)
            .await?;
        self.notify(Table::Profiles, ChangeKind::Insert);

        if !self.auto_confirm {
            info!("local backend: confirmation for {} would redirect to {}", email, redirect_to);
        }
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let Some(session) = self.current() else {
            return Ok(());
        };
        self.storage.delete_session(&session.access_token).await?;
        self.set_current(None);
        let _ = self.auth_tx.send(AuthEvent::SignedOut);
        Ok(())
    }

    async fn select_all(&self, table: Table) -> Result<Vec<serde_json::Value>, BackendError> {
        let rows = match table {
            Table::Profiles => serde_json::to_value(self.storage.select_profiles().await?)?,
            Table::Devices => serde_json::to_value(self.storage.select_devices().await?)?,
            Table::ActivityLogs => serde_json::to_value(self.storage.select_activity_logs().await?)?,
        };
        match rows {
            serde_json::Value::Array(rows) => Ok(rows),
            _ => Err(BackendError::Decode("expected an array of rows".to_string())),
        }
    }

    async fn insert_device(&self, device: &NewDevice) -> Result<Device, BackendError> {
        let session = match self.current() {
            Some(session) if !session.is_expired() => session,
            _ => return Err(BackendError::NotAuthenticated),
        };
        if session.user.id != device.user_id {
            return Err(BackendError::rejected(
                "new row violates row-level security policy for table \"devices\"",
            ));
        }

        let now = Utc::now();
        let inserted = self
            .storage
            .insert_device(&uuid::Uuid::new_v4().to_string(), device, now)
            .await?;
        self.notify(Table::Devices, ChangeKind::Insert);
        if self.storage.increment_device_count(&device.user_id, now).await? > 0 {
            self.notify(Table::Profiles, ChangeKind::Update);
        }
        Ok(inserted)
    }

    async fn log_auth_attempt(&self, attempt: &AuthAttempt) -> Result<String, BackendError> {
        let id = uuid::Uuid::new_v4().to_string();
        let user_id = self.current().map(|s| s.user.id);
        self.storage
            .insert_activity_log(&id, user_id.as_deref(), attempt, Utc::now())
            .await?;
        self.notify(Table::ActivityLogs, ChangeKind::Insert);
        Ok(id)
    }

    fn subscribe(&self, table: Table) -> ChangeSubscription {
        let mut events = self.change_tx.subscribe();
        let (tx, rx) = mpsc::channel(64);
        let pump = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) if event.table == table => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    // Missed events still mean the table changed.
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        let event = ChangeEvent { table, kind: ChangeKind::Unknown };
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        ChangeSubscription::new(rx, pump)
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{AttemptStatus, DeviceStatus};

    async fn backend() -> LocalBackend {
        LocalBackend::new(Storage::in_memory().await.unwrap(), Duration::hours(1), true)
    }

    fn laptop(user_id: &str) -> NewDevice {
        NewDevice {
            user_id: user_id.to_string(),
            name: "Test Laptop".into(),
            device_type: "desktop".into(),
            os: "Linux".into(),
            status: DeviceStatus::Compliant,
            last_seen: None,
            location: None,
        }
    }

    #[tokio::test]
    async fn sign_up_then_sign_in_pushes_signed_in() {
        let backend = backend().await;
        let mut events = backend.auth_events();

        backend.sign_up("Alice@Example.com", "hunter22", "http://localhost/").await.unwrap();
        let session = backend.sign_in_with_password("alice@example.com", "hunter22").await.unwrap();

        assert_eq!(session.user.email.as_deref(), Some("alice@example.com"));
        assert_eq!(events.recv().await.unwrap(), AuthEvent::SignedIn(session.clone()));
        assert_eq!(backend.get_session().await.unwrap(), Some(session));

        let profiles = backend.select_all(Table::Profiles).await.unwrap();
        assert_eq!(profiles.len(), 1);
        assert!(profiles[0]["last_login"].is_string());
    }

    #[tokio::test]
    async fn wrong_password_is_rejected_with_backend_message() {
        let backend = backend().await;
        backend.sign_up("a@example.com", "hunter22", "/").await.unwrap();
        let err = backend.sign_in_with_password("a@example.com", "nope").await.unwrap_err();
        assert_eq!(err, BackendError::rejected("Invalid login credentials"));
    }

    #[tokio::test]
    async fn duplicate_and_weak_sign_ups_are_rejected() {
        let backend = backend().await;
        backend.sign_up("a@example.com", "hunter22", "/").await.unwrap();
        assert_eq!(
            backend.sign_up("a@example.com", "hunter22", "/").await.unwrap_err().message(),
            "User already registered"
        );
        assert!(backend.sign_up("b@example.com", "123", "/").await.is_err());
        assert!(backend.sign_up("not-an-email", "hunter22", "/").await.is_err());
    }

    #[tokio::test]
    async fn unconfirmed_accounts_cannot_sign_in() {
        let backend = LocalBackend::new(Storage::in_memory().await.unwrap(), Duration::hours(1), false);
        backend.sign_up("a@example.com", "hunter22", "/").await.unwrap();
        let err = backend.sign_in_with_password("a@example.com", "hunter22").await.unwrap_err();
        assert_eq!(err.message(), "Email not confirmed");
    }

    #[tokio::test]
    async fn device_insert_requires_owner_session() {
        let backend = backend().await;
        assert_eq!(
            backend.insert_device(&laptop("someone")).await.unwrap_err(),
            BackendError::NotAuthenticated
        );

        backend.sign_up("a@example.com", "hunter22", "/").await.unwrap();
        let session = backend.sign_in_with_password("a@example.com", "hunter22").await.unwrap();
        assert!(matches!(
            backend.insert_device(&laptop("someone-else")).await,
            Err(BackendError::Rejected { .. })
        ));

        let mut changes = backend.subscribe(Table::Devices);
        let device = backend.insert_device(&laptop(&session.user.id)).await.unwrap();
        assert_eq!(device.status, Some(DeviceStatus::Compliant));
        assert_eq!(changes.recv().await.unwrap().kind, ChangeKind::Insert);

        let profiles = backend.select_all(Table::Profiles).await.unwrap();
        assert_eq!(profiles[0]["devices"], 1);
    }

    #[tokio::test]
    async fn sign_out_clears_session_and_pushes_event() {
        let backend = backend().await;
        backend.sign_up("a@example.com", "hunter22", "/").await.unwrap();
        backend.sign_in_with_password("a@example.com", "hunter22").await.unwrap();
        let mut events = backend.auth_events();

        backend.sign_out().await.unwrap();
        assert_eq!(events.recv().await.unwrap(), AuthEvent::SignedOut);
        assert_eq!(backend.get_session().await.unwrap(), None);
    }

    #[tokio::test]
    async fn log_auth_attempt_writes_activity_row() {
        let backend = backend().await;
        let attempt = AuthAttempt::new("Login Attempt", "bad@example.com", AttemptStatus::Denied, "Invalid login credentials", "Linux");
        let id = backend.log_auth_attempt(&attempt).await.unwrap();

        let rows = backend.select_all(Table::ActivityLogs).await.unwrap();
        assert_eq!(rows[0]["id"], id.as_str());
        assert_eq!(rows[0]["email"], "bad@example.com");
        assert_eq!(rows[0]["status"], "denied");
        assert_eq!(rows[0]["ip_address"], "Client IP");
        assert_eq!(rows[0]["metadata"]["device"], "Linux");
    }

    #[test]
    fn password_hash_verifies_only_the_right_password() {
        let hash = hash_password("salt", "hunter22").unwrap();
        assert!(verify_password("salt", "hunter22", &hash));
        assert!(!verify_password("salt", "hunter23", &hash));
        assert!(!verify_password("pepper", "hunter22", &hash));
    }
}
