//! Table mirrors that follow the backend's change notifications.
//!
//! Any change event triggers a full, unfiltered re-read of the table; the
//! result replaces the whole local list. Every read takes the next number
//! from a monotonic counter and its result is applied only if that number is
//! still the latest issued when it lands. Overlapping reads are allowed and
//! older ones are simply discarded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{Device, Profile};
use log::{debug, error, info};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};

use crate::backend::{Backend, Table};
use crate::error::{BackendError, FetchError};

pub trait Record: DeserializeOwned + Serialize + Clone + Send + Sync + 'static {
    const TABLE: Table;
}

impl Record for Profile {
    const TABLE: Table = Table::Profiles;
}

impl Record for Device {
    const TABLE: Table = Table::Devices;
}

#[derive(Debug, Clone, Serialize)]
pub struct ListSnapshot<T> {
    pub rows: Arc<Vec<T>>,
    /// Generation of the read these rows came from; 0 before the first one.
    pub generation: u64,
    pub loaded: bool,
    pub last_error: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl<T> Default for ListSnapshot<T> {
    fn default() -> Self {
        Self {
            rows: Arc::new(Vec::new()),
            generation: 0,
            loaded: false,
            last_error: None,
            updated_at: None,
        }
    }
}

struct Shared<T> {
    backend: Arc<dyn Backend>,
    issued: AtomicU64,
    state: watch::Sender<ListSnapshot<T>>,
}

impl<T: Record> Shared<T> {
    async fn refetch(&self) -> Result<bool, FetchError> {
        let generation = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let result = match self.backend.select_all(T::TABLE).await {
            Ok(rows) => rows
                .into_iter()
                .map(serde_json::from_value::<T>)
                .collect::<Result<Vec<_>, _>>()
                .map_err(BackendError::from),
            Err(e) => Err(e),
        };

        match result {
            Ok(rows) => Ok(self.apply(generation, rows)),
            Err(source) => {
                let err = FetchError { table: T::TABLE.name(), source };
                error!("{}", err);
                self.state.send_if_modified(|snapshot| {
                    if generation != self.issued.load(Ordering::SeqCst) {
                        return false;
                    }
                    snapshot.last_error = Some(err.to_string());
                    true
                });
                Err(err)
            }
        }
    }

    fn apply(&self, generation: u64, rows: Vec<T>) -> bool {
        self.state.send_if_modified(|snapshot| {
            let latest = self.issued.load(Ordering::SeqCst);
            if generation != latest {
                debug!(
                    "Discarding stale {} read (generation {}, latest {})",
                    T::TABLE.name(),
                    generation,
                    latest
                );
                return false;
            }
            snapshot.rows = Arc::new(rows);
            snapshot.generation = generation;
            snapshot.loaded = true;
            snapshot.last_error = None;
            snapshot.updated_at = Some(Utc::now());
            true
        })
    }
}

/// A mounted mirror of one table. Dropping it releases the subscription and
/// abandons reads still in flight.
pub struct RealtimeList<T: Record> {
    shared: Arc<Shared<T>>,
    task: Option<JoinHandle<()>>,
}

impl<T: Record> RealtimeList<T> {
    pub fn mount(backend: Arc<dyn Backend>) -> Self {
        let mut changes = backend.subscribe(T::TABLE);
        let (state, _) = watch::channel(ListSnapshot::default());
        let shared = Arc::new(Shared { backend, issued: AtomicU64::new(0), state });
        info!("Mounted realtime list for {}", T::TABLE.name());

        let looped = shared.clone();
        let task = tokio::spawn(async move {
            let mut reads = JoinSet::new();
            let first = looped.clone();
            reads.spawn(async move { first.refetch().await });
            loop {
                tokio::select! {
                    event = changes.recv() => match event {
                        Some(event) => {
                            debug!("{:?} on {}, re-reading", event.kind, T::TABLE.name());
                            let shared = looped.clone();
                            reads.spawn(async move { shared.refetch().await });
                        }
                        None => break,
                    },
                    Some(_) = reads.join_next(), if !reads.is_empty() => {}
                }
            }
            // Let whatever is in flight land before the task ends.
            while reads.join_next().await.is_some() {}
        });

        Self { shared, task: Some(task) }
    }

    pub fn snapshot(&self) -> ListSnapshot<T> {
        self.shared.state.borrow().clone()
    }

    pub fn rows(&self) -> Arc<Vec<T>> {
        self.shared.state.borrow().rows.clone()
    }

    pub fn watch(&self) -> watch::Receiver<ListSnapshot<T>> {
        self.shared.state.subscribe()
    }

    pub async fn stop(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
        info!("Unmounted realtime list for {}", T::TABLE.name());
    }
}

impl<T: Record> Drop for RealtimeList<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LocalBackend;
    use crate::storage::Storage;
    use crate::testing::{change, Reply, ScriptedBackend};
    use common::{DeviceStatus, NewDevice};
    use serde_json::json;
    use std::time::Duration;

    fn device_row(id: &str, name: &str) -> serde_json::Value {
        json!({"id": id, "user_id": "U1", "name": name, "type": "desktop", "os": "Linux", "status": "compliant"})
    }

    async fn settle<T: Record>(list: &RealtimeList<T>, pred: impl Fn(&ListSnapshot<T>) -> bool) -> ListSnapshot<T> {
        let mut rx = list.watch();
        let snapshot = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| pred(s)))
            .await
            .expect("list never settled")
            .unwrap()
            .clone();
        snapshot
    }

    #[tokio::test]
    async fn rapid_inserts_converge_to_a_full_read() {
        let backend = Arc::new(LocalBackend::new(Storage::in_memory().await.unwrap(), chrono::Duration::hours(1), true));
        backend.sign_up("u1@example.com", "hunter22", "/").await.unwrap();
        let session = backend.sign_in_with_password("u1@example.com", "hunter22").await.unwrap();

        let list = RealtimeList::<Device>::mount(backend.clone());
        for i in 0..8 {
            let device = NewDevice {
                user_id: session.user.id.clone(),
                name: format!("device-{}", i),
                device_type: "mobile".into(),
                os: "Android".into(),
                status: DeviceStatus::Compliant,
                last_seen: None,
                location: None,
            };
            backend.insert_device(&device).await.unwrap();
        }

        let snapshot = settle(&list, |s| s.rows.len() == 8).await;
        let direct: Vec<Device> = backend
            .select_all(Table::Devices)
            .await
            .unwrap()
            .into_iter()
            .map(|v| serde_json::from_value(v).unwrap())
            .collect();
        assert_eq!(*snapshot.rows, direct);
        assert_eq!(snapshot.rows[0].name, "device-7");
    }

    #[tokio::test]
    async fn registered_device_appears_after_refetch() {
        let backend = Arc::new(LocalBackend::new(Storage::in_memory().await.unwrap(), chrono::Duration::hours(1), true));
        backend.sign_up("u1@example.com", "hunter22", "/").await.unwrap();
        let session = backend.sign_in_with_password("u1@example.com", "hunter22").await.unwrap();
        let list = RealtimeList::<Device>::mount(backend.clone());
        settle(&list, |s| s.loaded).await;

        backend
            .insert_device(&NewDevice {
                user_id: session.user.id.clone(),
                name: "Test Laptop".into(),
                device_type: "desktop".into(),
                os: "Linux".into(),
                status: DeviceStatus::Compliant,
                last_seen: None,
                location: None,
            })
            .await
            .unwrap();

        let snapshot = settle(&list, |s| !s.rows.is_empty()).await;
        let device = &snapshot.rows[0];
        assert_eq!(device.user_id, session.user.id);
        assert_eq!(device.name, "Test Laptop");
        assert_eq!(device.device_type, "desktop");
        assert_eq!(device.os.as_deref(), Some("Linux"));
        assert_eq!(device.status, Some(DeviceStatus::Compliant));
    }

    #[tokio::test]
    async fn slow_stale_read_is_discarded() {
        let (backend, changes) = ScriptedBackend::new(vec![
            Reply::rows(300, vec![device_row("old", "stale")]),
            Reply::rows(0, vec![device_row("new", "fresh")]),
        ]);
        let list = RealtimeList::<Device>::mount(Arc::new(backend));
        tokio::time::sleep(Duration::from_millis(20)).await;
        changes.send(change(Table::Devices)).await.unwrap();

        let snapshot = settle(&list, |s| s.loaded).await;
        assert_eq!(snapshot.rows[0].name, "fresh");
        assert_eq!(snapshot.generation, 2);

        tokio::time::sleep(Duration::from_millis(400)).await;
        let after = list.snapshot();
        assert_eq!(after.rows[0].name, "fresh");
        assert_eq!(after.generation, 2);
    }

    #[tokio::test]
    async fn failed_read_keeps_previous_rows() {
        let (backend, changes) = ScriptedBackend::new(vec![
            Reply::rows(0, vec![device_row("d1", "kept")]),
            Reply::fail("connection reset"),
        ]);
        let list = RealtimeList::<Device>::mount(Arc::new(backend));
        settle(&list, |s| s.loaded).await;

        changes.send(change(Table::Devices)).await.unwrap();
        let snapshot = settle(&list, |s| s.last_error.is_some()).await;
        assert_eq!(snapshot.rows.len(), 1);
        assert_eq!(snapshot.rows[0].name, "kept");
        assert!(snapshot.last_error.unwrap().contains("connection reset"));
    }

    #[tokio::test]
    async fn undecodable_rows_count_as_a_failed_read() {
        let (backend, _changes) = ScriptedBackend::new(vec![Reply::rows(0, vec![json!({"id": 1})])]);
        let list = RealtimeList::<Device>::mount(Arc::new(backend));
        let snapshot = settle(&list, |s| s.last_error.is_some()).await;
        assert!(!snapshot.loaded);
        assert!(snapshot.last_error.unwrap().contains("decode error"));
    }

    #[tokio::test]
    async fn two_quick_profile_events_reach_the_final_state() {
        let profile = |id: &str| json!({"id": id, "user_id": id, "trust_score": 90});
        let (backend, changes) = ScriptedBackend::new(vec![
            Reply::rows(0, vec![]),
            Reply::rows(30, vec![profile("a")]),
            Reply::rows(30, vec![profile("b"), profile("a")]),
        ]);
        let list = RealtimeList::<Profile>::mount(Arc::new(backend));
        settle(&list, |s| s.loaded).await;

        changes.send(change(Table::Profiles)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        changes.send(change(Table::Profiles)).await.unwrap();

        let snapshot = settle(&list, |s| s.generation == 3).await;
        assert_eq!(snapshot.rows.len(), 2);
        assert_eq!(snapshot.rows[0].user_id, "b");
    }

    #[tokio::test]
    async fn stop_releases_the_subscription() {
        let (backend, changes) = ScriptedBackend::new(vec![Reply::rows(0, vec![])]);
        let list = RealtimeList::<Device>::mount(Arc::new(backend));
        settle(&list, |s| s.loaded).await;

        list.stop().await;
        assert!(changes.is_closed());
    }
}
