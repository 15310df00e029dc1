//! The single session an agent instance holds.
//!
//! State moves `Loading -> {Authenticated, Anonymous}`, then follows what the
//! backend pushes. Nobody writes the state directly on a successful sign-in:
//! the backend's `SignedIn` event does that.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use common::{AttemptStatus, AuthAttempt, Session, SessionState};
use log::{debug, info, warn};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::audit::AuditQueue;
use crate::backend::{AuthEvent, Backend};

#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

struct Inner {
    state: watch::Sender<SessionState>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SessionState::Loading);
        Self {
            inner: Arc::new(Inner { state, listener: Mutex::new(None) }),
        }
    }

    pub fn current(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Subscribes to the backend's auth events, then recovers whatever session
    /// the backend already holds. Events keep being applied until
    /// [`shutdown`](Self::shutdown).
    pub async fn start(&self, backend: Arc<dyn Backend>, audit: AuditQueue, device: String) {
        let events = backend.auth_events();
        let listener = tokio::spawn(listen(self.clone(), events, audit, device));
        if let Ok(mut slot) = self.inner.listener.lock() {
            if let Some(previous) = slot.replace(listener) {
                previous.abort();
            }
        }

        let recovered = match backend.get_session().await {
            Ok(session) => session.filter(|s| !s.is_expired()),
            Err(e) => {
                warn!("Session recovery failed: {}", e);
                None
            }
        };
        // A pushed event may already have settled the state.
        self.inner.state.send_if_modified(|state| {
            if !state.is_loading() {
                return false;
            }
            *state = match recovered {
                Some(session) => {
                    info!("Recovered session for {}", session.user.id);
                    SessionState::Authenticated(session)
                }
                None => SessionState::Anonymous,
            };
            true
        });
    }

    pub fn shutdown(&self) {
        if let Ok(mut slot) = self.inner.listener.lock() {
            if let Some(listener) = slot.take() {
                listener.abort();
            }
        }
    }

    fn set(&self, state: SessionState) {
        info!("Session state -> {}", state.label());
        self.inner.state.send_replace(state);
    }

    fn expire_if_current(&self, token: &str) {
        self.inner.state.send_if_modified(|state| match state.session() {
            Some(session) if session.access_token == token => {
                info!("Session for {} expired", session.user.id);
                *state = SessionState::Anonymous;
                true
            }
            _ => false,
        });
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

async fn listen(store: SessionStore, mut events: broadcast::Receiver<AuthEvent>, audit: AuditQueue, device: String) {
    // Recovery settles the state outside this task, so the expiry timer is
    // re-armed on every state change, not only after an event.
    let mut state = store.subscribe();
    loop {
        let expiry = state.borrow_and_update().session().cloned();
        let event = tokio::select! {
            event = events.recv() => event,
            changed = state.changed() => match changed {
                Ok(()) => continue,
                Err(_) => break,
            },
            _ = sleep_until_expired(expiry.as_ref()) => {
                if let Some(session) = &expiry {
                    store.expire_if_current(&session.access_token);
                }
                continue;
            }
        };

        match event {
            Ok(AuthEvent::SignedIn(session)) => {
                let email = session.user.email.clone().unwrap_or_default();
                store.set(SessionState::Authenticated(session));
                audit.dispatch(AuthAttempt::new(
                    "Login",
                    email,
                    AttemptStatus::Success,
                    "Valid credentials provided",
                    device.clone(),
                ));
            }
            Ok(AuthEvent::TokenRefreshed(session)) => {
                debug!("Token refreshed for {}", session.user.id);
                store.set(SessionState::Authenticated(session));
            }
            Ok(AuthEvent::SignedOut) => store.set(SessionState::Anonymous),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Missed {} auth events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("Auth event stream closed");
                break;
            }
        }
    }
}

/// Pends forever without a session.
async fn sleep_until_expired(session: Option<&Session>) {
    match session {
        Some(session) => {
            let remaining = (session.expires_at - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(remaining).await;
        }
        None => std::future::pending::<()>().await,
    }
}
