use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::{AuthAttempt, BackendConfig, Device, Identity, NewDevice, Session};
use log::{info, warn};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::{AuthEvent, Backend, ChangeEvent, ChangeKind, ChangeSubscription, Table};
use crate::error::BackendError;

/// Refresh this long before the access token runs out.
const REFRESH_MARGIN_SECS: i64 = 60;

/// Client for the hosted backend: auth under `/auth/v1`, tables and
/// procedures under `/rest/v1`.
#[derive(Clone)]
pub struct RestBackend {
    inner: Arc<Inner>,
}

struct Inner {
    client: Client,
    base_url: String,
    anon_key: String,
    session_file: PathBuf,
    poll_interval: Duration,
    current: Mutex<Option<Session>>,
    refresher: Mutex<Option<JoinHandle<()>>>,
    auth_tx: broadcast::Sender<AuthEvent>,
}

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: i64,
    user: UserResponse,
}

#[derive(Deserialize)]
struct UserResponse {
    id: String,
    email: Option<String>,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        Session {
            user: Identity { id: self.user.id, email: self.user.email },
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: Utc::now() + chrono::Duration::seconds(self.expires_in),
        }
    }
}

/// Pulls the human-readable reason out of an error body. The auth and
/// table endpoints use different field names.
pub fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["error_description", "msg", "message", "error"]
        .iter()
        .find_map(|key| value.get(key).and_then(|v| v.as_str()).map(str::to_string))
}

async fn check(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body).unwrap_or_else(|| format!("request failed with status {}", status));
    if status.is_client_error() {
        Err(BackendError::Rejected { message })
    } else {
        Err(BackendError::Transport(message))
    }
}

impl RestBackend {
    pub fn new(config: &BackendConfig) -> anyhow::Result<Self> {
        if config.url.is_empty() {
            anyhow::bail!("backend.url is required in rest mode");
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        let (auth_tx, _) = broadcast::channel(16);
        Ok(Self {
            inner: Arc::new(Inner {
                client,
                base_url: config.url.trim_end_matches('/').to_string(),
                anon_key: config.anon_key.clone(),
                session_file: PathBuf::from(&config.session_file),
                poll_interval: Duration::from_secs(config.realtime_poll_secs.max(1)),
                current: Mutex::new(None),
                refresher: Mutex::new(None),
                auth_tx,
            }),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.inner.base_url, path)
    }

    fn current(&self) -> Option<Session> {
        self.inner.current.lock().ok().and_then(|guard| guard.clone())
    }

    /// Anon key always, user token when signed in.
    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        let bearer = self
            .current()
            .map(|s| s.access_token)
            .unwrap_or_else(|| self.inner.anon_key.clone());
        builder
            .header("apikey", &self.inner.anon_key)
            .bearer_auth(bearer)
    }

    fn load_persisted(&self) -> Option<Session> {
        let raw = std::fs::read_to_string(&self.inner.session_file).ok()?;
        match serde_json::from_str::<Session>(&raw) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!("Ignoring unreadable session file {}: {}", self.inner.session_file.display(), e);
                None
            }
        }
    }

    fn persist(&self, session: Option<&Session>) {
        let path = &self.inner.session_file;
        let result = match session {
            Some(session) => {
                if let Some(parent) = path.parent() {
                    let _ = std::fs::create_dir_all(parent);
                }
                serde_json::to_string(session)
                    .map_err(std::io::Error::from)
                    .and_then(|body| std::fs::write(path, body))
            }
            None => match std::fs::remove_file(path) {
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                other => other,
            },
        };
        if let Err(e) = result {
            warn!("Could not update session file {}: {}", path.display(), e);
        }
    }

    fn install(&self, session: Option<Session>) {
        self.persist(session.as_ref());
        if let Ok(mut guard) = self.inner.current.lock() {
            *guard = session.clone();
        }
        self.schedule_refresh(session);
    }

    fn schedule_refresh(&self, session: Option<Session>) {
        let Ok(mut slot) = self.inner.refresher.lock() else {
            return;
        };
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        let Some(mut session) = session else {
            return;
        };

        let backend = self.clone();
        *slot = Some(tokio::spawn(async move {
            while let Some(refresh_token) = session.refresh_token.clone() {
                let wait = (session.expires_at - Utc::now()).num_seconds() - REFRESH_MARGIN_SECS;
                tokio::time::sleep(Duration::from_secs(wait.max(0) as u64)).await;
                match backend.refresh(&refresh_token).await {
                    Ok(fresh) => {
                        info!("Session for {} refreshed", fresh.user.id);
                        let _ = backend.inner.auth_tx.send(AuthEvent::TokenRefreshed(fresh.clone()));
                        session = fresh;
                    }
                    Err(e) => {
                        warn!("Session refresh failed, treating as expired: {}", e);
                        if let Ok(mut guard) = backend.inner.current.lock() {
                            *guard = None;
                        }
                        backend.persist(None);
                        let _ = backend.inner.auth_tx.send(AuthEvent::SignedOut);
                        break;
                    }
                }
            }
        }));
    }

    /// Exchanges the refresh token and stores the new session. Scheduling
    /// the next refresh is left to the caller.
    async fn refresh(&self, refresh_token: &str) -> Result<Session, BackendError> {
        let response = self
            .inner
            .client
            .post(self.url("/auth/v1/token?grant_type=refresh_token"))
            .header("apikey", &self.inner.anon_key)
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await?;
        let session = check(response).await?.json::<TokenResponse>().await?.into_session();
        self.persist(Some(&session));
        if let Ok(mut guard) = self.inner.current.lock() {
            *guard = Some(session.clone());
        }
        Ok(session)
    }
}

#[async_trait]
impl Backend for RestBackend {
    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        if let Some(session) = self.current() {
            return Ok(Some(session));
        }
        let Some(stored) = self.load_persisted() else {
            return Ok(None);
        };
        if !stored.is_expired() {
            self.install(Some(stored.clone()));
            return Ok(Some(stored));
        }
        // Expired on disk: one refresh attempt, otherwise no session.
        match stored.refresh_token.as_deref() {
            Some(token) => match self.refresh(token).await {
                Ok(session) => {
                    self.schedule_refresh(Some(session.clone()));
                    Ok(Some(session))
                }
                Err(e) => {
                    info!("Stored session could not be refreshed: {}", e);
                    self.install(None);
                    Ok(None)
                }
            },
            None => {
                self.install(None);
                Ok(None)
            }
        }
    }

    fn auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.auth_tx.subscribe()
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let response = self
            .inner
            .client
            .post(self.url("/auth/v1/token?grant_type=password"))
            .header("apikey", &self.inner.anon_key)
            .json(&PasswordGrant { email, password })
            .send()
            .await?;
        let session = check(response).await?.json::<TokenResponse>().await?.into_session();
        self.install(Some(session.clone()));
        let _ = self.inner.auth_tx.send(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str, redirect_to: &str) -> Result<(), BackendError> {
        let response = self
            .inner
            .client
            .post(self.url("/auth/v1/signup"))
            .query(&[("redirect_to", redirect_to)])
            .header("apikey", &self.inner.anon_key)
            .json(&PasswordGrant { email, password })
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        if self.current().is_none() {
            return Ok(());
        }
        let response = self
            .authorized(self.inner.client.post(self.url("/auth/v1/logout")))
            .send()
            .await?;
        check(response).await?;
        self.install(None);
        let _ = self.inner.auth_tx.send(AuthEvent::SignedOut);
        Ok(())
    }

    async fn select_all(&self, table: Table) -> Result<Vec<serde_json::Value>, BackendError> {
        let response = self
            .authorized(self.inner.client.get(self.url(&format!("/rest/v1/{}", table.name()))))
            .query(&[("select", "*"), ("order", "created_at.desc")])
            .send()
            .await?;
        Ok(check(response).await?.json::<Vec<serde_json::Value>>().await?)
    }

    async fn insert_device(&self, device: &NewDevice) -> Result<Device, BackendError> {
        if self.current().is_none() {
            return Err(BackendError::NotAuthenticated);
        }
        let response = self
            .authorized(self.inner.client.post(self.url("/rest/v1/devices")))
            .header("Prefer", "return=representation")
            .json(device)
            .send()
            .await?;
        let mut rows = check(response).await?.json::<Vec<Device>>().await?;
        rows.pop()
            .ok_or_else(|| BackendError::Decode("insert returned no row".to_string()))
    }

    async fn log_auth_attempt(&self, attempt: &AuthAttempt) -> Result<String, BackendError> {
        let response = self
            .authorized(self.inner.client.post(self.url("/rest/v1/rpc/log_auth_attempt")))
            .json(attempt)
            .send()
            .await?;
        let id = check(response).await?.json::<serde_json::Value>().await?;
        Ok(id.as_str().map(str::to_string).unwrap_or_else(|| id.to_string()))
    }

    /// There is no push transport here; each tick stands in for "something
    /// on this table may have changed".
    fn subscribe(&self, table: Table) -> ChangeSubscription {
        let (tx, rx) = mpsc::channel(1);
        let period = self.inner.poll_interval;
        let pump = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let event = ChangeEvent { table, kind: ChangeKind::Unknown };
                match tx.try_send(event) {
                    Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => {}
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
        });
        ChangeSubscription::new(rx, pump)
    }

    fn name(&self) -> &'static str {
        "rest"
    }

    fn close(&self) {
        if let Ok(mut slot) = self.inner.refresher.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }
}
