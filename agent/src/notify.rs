use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use common::{Notification, NotificationVariant};
use log::{info, warn};

/// Toast-style notifications: logged and kept in a bounded ring for later
/// `notifications` requests.
#[derive(Clone)]
pub struct Notifier {
    inner: Arc<Inner>,
}

struct Inner {
    next_id: AtomicU64,
    capacity: usize,
    recent: Mutex<VecDeque<Notification>>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Inner {
                next_id: AtomicU64::new(1),
                capacity,
                recent: Mutex::new(VecDeque::with_capacity(capacity)),
            }),
        }
    }

    pub fn success(&self, title: &str, description: &str) -> Notification {
        self.push(title, description, NotificationVariant::Success)
    }

    pub fn error(&self, title: &str, description: &str) -> Notification {
        self.push(title, description, NotificationVariant::Destructive)
    }

    fn push(&self, title: &str, description: &str, variant: NotificationVariant) -> Notification {
        let notification = Notification {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            title: title.to_string(),
            description: description.to_string(),
            variant,
            at: Utc::now(),
        };
        match variant {
            NotificationVariant::Destructive => warn!("[notify] {}: {}", title, description),
            _ => info!("[notify] {}: {}", title, description),
        }

        if let Ok(mut recent) = self.inner.recent.lock() {
            if recent.len() == self.inner.capacity {
                recent.pop_front();
            }
            recent.push_back(notification.clone());
        }
        notification
    }

    /// Newest first.
    pub fn recent(&self, limit: usize) -> Vec<Notification> {
        self.inner
            .recent
            .lock()
            .map(|recent| recent.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    pub fn latest(&self) -> Option<Notification> {
        self.recent(1).pop()
    }
}
