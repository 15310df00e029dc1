//! Everything one agent instance owns, passed explicitly to whoever needs it.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use common::{
    BackendMode, Config, DashboardOverview, Device, GuardOutcome, Profile, Route, SessionState,
};
use log::{info, warn};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;

use crate::audit::{AuditQueue, DeadLetterLog};
use crate::auth::AuthGateway;
use crate::backend::{self, Backend, LocalBackend, RestBackend};
use crate::dashboard;
use crate::devices::DeviceRegistry;
use crate::feeds::Feeds;
use crate::notify::Notifier;
use crate::policies::PolicyBook;
use crate::session::SessionStore;
use crate::storage::Storage;
use crate::sync::{ListSnapshot, RealtimeList};

/// The backend-backed pages. Mounted while a session exists.
pub struct Pages {
    pub users: RealtimeList<Profile>,
    pub devices: RealtimeList<Device>,
}

impl Pages {
    fn mount(backend: Arc<dyn Backend>) -> Self {
        Self {
            users: RealtimeList::mount(backend.clone()),
            devices: RealtimeList::mount(backend),
        }
    }

    async fn stop(self) {
        self.users.stop().await;
        self.devices.stop().await;
    }
}

pub struct App {
    pub config: Config,
    pub backend: Arc<dyn Backend>,
    pub storage: Storage,
    pub notifier: Notifier,
    pub audit: AuditQueue,
    pub session: SessionStore,
    pub auth: AuthGateway,
    pub registry: DeviceRegistry,
    pub policies: PolicyBook,
    pub feeds: Feeds,
    pub started_at: DateTime<Utc>,
    pages: Arc<RwLock<Option<Pages>>>,
    tasks: Vec<JoinHandle<()>>,
}

impl App {
    pub async fn start(config: Config) -> Result<Self> {
        let storage = Storage::new(&config.storage.db_path).await?;
        info!("Storage initialized at {}", config.storage.db_path);

        let backend: Arc<dyn Backend> = match config.backend.mode {
            BackendMode::Local => Arc::new(LocalBackend::new(
                storage.clone(),
                chrono::Duration::seconds(config.backend.session_ttl_secs as i64),
                config.backend.auto_confirm,
            )),
            BackendMode::Rest => Arc::new(RestBackend::new(&config.backend)?),
        };
        Ok(Self::assemble(config, backend, storage).await)
    }

    /// Wires the components around an existing backend and storage.
    pub async fn assemble(config: Config, backend: Arc<dyn Backend>, storage: Storage) -> Self {
        info!("Using {} backend", backend.name());
        let device = backend::device_descriptor();
        let notifier = Notifier::new(config.agent.event_ring_capacity);
        let (audit, audit_worker) = AuditQueue::start(
            backend.clone(),
            DeadLetterLog::new(storage.clone()),
            config.agent.audit_queue_capacity,
        );

        let session = SessionStore::new();
        let pages = Arc::new(RwLock::new(None));
        let follower = tokio::spawn(follow_session(session.subscribe(), backend.clone(), pages.clone()));
        session.start(backend.clone(), audit.clone(), device.clone()).await;
        info!("Session state after recovery: {}", session.current().label());

        let auth = AuthGateway::new(
            backend.clone(),
            audit.clone(),
            notifier.clone(),
            config.backend.redirect_url.clone(),
            device,
        );
        let registry = DeviceRegistry::new(backend.clone(), notifier.clone());
        let policies = PolicyBook::new(notifier.clone());
        let feeds = Feeds::start(&config.feeds, notifier.clone());

        Self {
            config,
            backend,
            storage,
            notifier,
            audit,
            session,
            auth,
            registry,
            policies,
            feeds,
            started_at: Utc::now(),
            pages,
            tasks: vec![audit_worker, follower],
        }
    }

    pub fn session_state(&self) -> SessionState {
        self.session.current()
    }

    pub fn guard(&self, route: Route) -> GuardOutcome {
        common::routes::resolve(route, &self.session.current())
    }

    pub async fn users(&self) -> Option<ListSnapshot<Profile>> {
        self.pages.read().await.as_ref().map(|p| p.users.snapshot())
    }

    pub async fn devices(&self) -> Option<ListSnapshot<Device>> {
        self.pages.read().await.as_ref().map(|p| p.devices.snapshot())
    }

    pub async fn dashboard(&self) -> DashboardOverview {
        let (profiles, devices) = match self.pages.read().await.as_ref() {
            Some(pages) => (pages.users.rows(), pages.devices.rows()),
            None => Default::default(),
        };
        let alerts = self.feeds.alerts.list().await;
        let activity = self.feeds.activity.recent(usize::MAX).await;
        dashboard::summarize(&profiles, &devices, self.policies.active_count().await, &alerts, &activity)
    }

    pub async fn shutdown(&self) {
        info!("Shutting down");
        self.session.shutdown();
        self.feeds.shutdown();
        if let Some(pages) = self.pages.write().await.take() {
            pages.stop().await;
        }
        self.audit.flush().await;
        for task in &self.tasks {
            task.abort();
        }
        self.backend.close();
    }
}

async fn follow_session(
    mut state: watch::Receiver<SessionState>,
    backend: Arc<dyn Backend>,
    pages: Arc<RwLock<Option<Pages>>>,
) {
    loop {
        let signed_in = state.borrow_and_update().session().is_some();
        let mut slot = pages.write().await;
        if signed_in && slot.is_none() {
            *slot = Some(Pages::mount(backend.clone()));
        } else if !signed_in {
            if let Some(mounted) = slot.take() {
                mounted.stop().await;
            }
        }
        drop(slot);

        if state.changed().await.is_err() {
            warn!("Session store dropped, pages stay as they are");
            break;
        }
    }
}
