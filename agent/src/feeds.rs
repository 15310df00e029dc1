//! Synthetic activity and alert streams for the Activity and Alerts pages.
//!
//! Neither feed reads from the backend. Entries are drawn from fixed pools
//! and the tickers run for the lifetime of the agent.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use common::{ActivityEvent, ActivityStats, ActivityStatus, Alert, AlertSeverity, AlertStats, AlertStatus, FeedsConfig};
use log::{debug, info};
use rand::seq::SliceRandom;
use rand::Rng;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant};

use crate::notify::Notifier;

const USERS: &[&str] = &["Alice Johnson", "Bob Smith", "Carol White", "David Lee", "Emma Davis"];
const ACTIONS: &[&str] = &["Login", "Access Request", "File Upload", "Database Query", "API Call", "Policy Check"];
const RESOURCES: &[&str] = &["Dashboard", "User Database", "File Storage", "API Gateway", "Admin Panel"];
// Weighted 3:1:1.
const STATUSES: &[ActivityStatus] = &[
    ActivityStatus::Success,
    ActivityStatus::Success,
    ActivityStatus::Success,
    ActivityStatus::Denied,
    ActivityStatus::Warning,
];
const DEVICES: &[&str] = &["MacBook Pro", "iPhone 14", "Windows PC", "Android Tab", "iPad Pro"];

struct AlertTemplate {
    title: &'static str,
    description: &'static str,
    severity: AlertSeverity,
    source: &'static str,
}

const ALERTS: &[AlertTemplate] = &[
    AlertTemplate {
        title: "Unauthorized Access Attempt",
        description: "Multiple failed login attempts detected from unknown IP address",
        severity: AlertSeverity::Critical,
        source: "Authentication Service",
    },
    AlertTemplate {
        title: "Policy Violation Detected",
        description: "User attempted to access restricted resource without proper clearance",
        severity: AlertSeverity::High,
        source: "Policy Engine",
    },
    AlertTemplate {
        title: "Non-Compliant Device Connection",
        description: "Device with outdated security patches attempted network access",
        severity: AlertSeverity::Medium,
        source: "Device Management",
    },
    AlertTemplate {
        title: "Suspicious Activity Pattern",
        description: "Unusual data transfer volume detected during off-hours",
        severity: AlertSeverity::High,
        source: "Monitoring System",
    },
];

fn pick<T: Copy>(rng: &mut impl Rng, pool: &[T], fallback: T) -> T {
    pool.choose(rng).copied().unwrap_or(fallback)
}

fn random_event(id: u64) -> ActivityEvent {
    let mut rng = rand::thread_rng();
    ActivityEvent {
        id: id.to_string(),
        timestamp: Utc::now() - ChronoDuration::milliseconds(rng.gen_range(0..300_000)),
        user: pick(&mut rng, USERS, "Unknown").to_string(),
        action: pick(&mut rng, ACTIONS, "Login").to_string(),
        resource: pick(&mut rng, RESOURCES, "Dashboard").to_string(),
        status: pick(&mut rng, STATUSES, ActivityStatus::Success),
        ip: format!("192.168.{}.{}", rng.gen_range(0..255), rng.gen_range(0..255)),
        device: pick(&mut rng, DEVICES, "Unknown").to_string(),
    }
}

fn random_alert(id: u64) -> Alert {
    let mut rng = rand::thread_rng();
    let template = ALERTS.choose(&mut rng).unwrap_or(&ALERTS[0]);
    Alert {
        id: id.to_string(),
        title: template.title.to_string(),
        description: template.description.to_string(),
        severity: template.severity,
        timestamp: Utc::now() - ChronoDuration::milliseconds(rng.gen_range(0..3_600_000)),
        source: template.source.to_string(),
        status: if rng.gen_bool(0.7) { AlertStatus::Active } else { AlertStatus::Resolved },
    }
}

fn ticker(period_secs: u64) -> tokio::time::Interval {
    let period = Duration::from_secs(period_secs.max(1));
    interval_at(Instant::now() + period, period)
}

#[derive(Clone)]
pub struct ActivityFeed {
    events: Arc<RwLock<Vec<ActivityEvent>>>,
    next_id: Arc<AtomicU64>,
    capacity: usize,
}

impl ActivityFeed {
    pub fn new(seed: usize, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let events = (0..seed.min(capacity) as u64).map(random_event).collect();
        Self {
            events: Arc::new(RwLock::new(events)),
            next_id: Arc::new(AtomicU64::new(seed as u64)),
            capacity,
        }
    }

    /// Prepends one generated entry, dropping the oldest past capacity.
    pub async fn tick(&self) -> ActivityEvent {
        let event = random_event(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut events = self.events.write().await;
        events.insert(0, event.clone());
        events.truncate(self.capacity);
        debug!("Activity: {} {} on {}", event.user, event.action, event.resource);
        event
    }

    /// Newest first.
    pub async fn recent(&self, limit: usize) -> Vec<ActivityEvent> {
        self.events.read().await.iter().take(limit).cloned().collect()
    }

    pub async fn stats(&self) -> ActivityStats {
        ActivityStats::from_events(&self.events.read().await)
    }

    pub fn spawn_ticker(&self, period_secs: u64) -> JoinHandle<()> {
        let feed = self.clone();
        tokio::spawn(async move {
            let mut interval = ticker(period_secs);
            loop {
                interval.tick().await;
                feed.tick().await;
            }
        })
    }
}

#[derive(Clone)]
pub struct AlertFeed {
    alerts: Arc<RwLock<Vec<Alert>>>,
    next_id: Arc<AtomicU64>,
    probability: f64,
    capacity: usize,
    notifier: Notifier,
}

impl AlertFeed {
    /// A probability that is not a finite number never raises.
    pub fn new(seed: usize, probability: f64, capacity: usize, notifier: Notifier) -> Self {
        let capacity = capacity.max(1);
        let alerts = (0..seed.min(capacity) as u64).map(random_alert).collect();
        let probability = if probability.is_finite() { probability.clamp(0.0, 1.0) } else { 0.0 };
        Self {
            alerts: Arc::new(RwLock::new(alerts)),
            next_id: Arc::new(AtomicU64::new(seed as u64)),
            probability,
            capacity,
            notifier,
        }
    }

    /// Raises a new alert with the configured probability.
    pub async fn tick(&self) -> Option<Alert> {
        let raise = rand::thread_rng().gen_bool(self.probability);
        if !raise {
            return None;
        }
        let alert = random_alert(self.next_id.fetch_add(1, Ordering::Relaxed));
        {
            let mut alerts = self.alerts.write().await;
            alerts.insert(0, alert.clone());
            alerts.truncate(self.capacity);
        }
        info!("Alert raised: {} ({:?})", alert.title, alert.severity);
        self.notifier
            .error("New security alert detected!", "Check the alerts dashboard for details");
        Some(alert)
    }

    pub async fn list(&self) -> Vec<Alert> {
        self.alerts.read().await.clone()
    }

    /// `None` when no alert has this id.
    pub async fn resolve(&self, id: &str) -> Option<Alert> {
        let mut alerts = self.alerts.write().await;
        let alert = alerts.iter_mut().find(|a| a.id == id)?;
        alert.status = AlertStatus::Resolved;
        let resolved = alert.clone();
        drop(alerts);

        info!("Alert {} resolved", id);
        self.notifier.success("Alert resolved successfully", &resolved.title);
        Some(resolved)
    }

    pub async fn stats(&self) -> AlertStats {
        AlertStats::from_alerts(&self.alerts.read().await)
    }

    pub fn spawn_ticker(&self, period_secs: u64) -> JoinHandle<()> {
        let feed = self.clone();
        tokio::spawn(async move {
            let mut interval = ticker(period_secs);
            loop {
                interval.tick().await;
                feed.tick().await;
            }
        })
    }
}

/// Both feeds plus their tickers.
pub struct Feeds {
    pub activity: ActivityFeed,
    pub alerts: AlertFeed,
    tickers: Vec<JoinHandle<()>>,
}

impl Feeds {
    pub fn start(config: &FeedsConfig, notifier: Notifier) -> Self {
        let activity = ActivityFeed::new(config.activity_seed, config.activity_capacity);
        let alerts = AlertFeed::new(config.alert_seed, config.alert_probability, config.alert_capacity, notifier);
        let tickers = vec![
            activity.spawn_ticker(config.activity_interval_secs),
            alerts.spawn_ticker(config.alert_interval_secs),
        ];
        info!(
            "Feeds started (activity every {}s, alerts every {}s at p={})",
            config.activity_interval_secs, config.alert_interval_secs, config.alert_probability
        );
        Self { activity, alerts, tickers }
    }

    pub fn shutdown(&self) {
        for ticker in &self.tickers {
            ticker.abort();
        }
    }
}
