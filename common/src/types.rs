use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// IP placeholder written into every audit entry.
pub const CLIENT_IP_PLACEHOLDER: &str = "Client IP";

pub const DEFAULT_TRUST_SCORE: i32 = 50;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Cached proof of an authenticated identity.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: Identity,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Lifecycle of the single session held by an application instance.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "state", content = "session", rename_all = "snake_case")]
pub enum SessionState {
    Loading,
    Authenticated(Session),
    Anonymous,
}

impl SessionState {
    pub fn is_loading(&self) -> bool {
        matches!(self, SessionState::Loading)
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionState::Authenticated(session) => Some(session),
            _ => None,
        }
    }

    pub fn user(&self) -> Option<&Identity> {
        self.session().map(|s| &s.user)
    }

    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Loading => "loading",
            SessionState::Authenticated(_) => "authenticated",
            SessionState::Anonymous => "anonymous",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Success,
    Denied,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Success => "success",
            AttemptStatus::Denied => "denied",
        }
    }
}

/// Arguments of the `log_auth_attempt` remote procedure.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AuthAttempt {
    #[serde(rename = "p_action")]
    pub action: String,
    #[serde(rename = "p_device")]
    pub device: String,
    #[serde(rename = "p_email")]
    pub email: String,
    #[serde(rename = "p_ip_address")]
    pub ip_address: String,
    #[serde(rename = "p_reason")]
    pub reason: String,
    #[serde(rename = "p_status")]
    pub status: AttemptStatus,
}

impl AuthAttempt {
    pub fn new(
        action: impl Into<String>,
        email: impl Into<String>,
        status: AttemptStatus,
        reason: impl Into<String>,
        device: impl Into<String>,
    ) -> Self {
        Self {
            action: action.into(),
            device: device.into(),
            email: email.into(),
            ip_address: CLIENT_IP_PLACEHOLDER.to_string(),
            reason: reason.into(),
            status,
        }
    }
}

/// Row of the `activity_logs` table.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ActivityLogEntry {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub action: String,
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProfileStatus {
    Active,
    Inactive,
    Suspended,
    #[serde(other)]
    Unknown,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustTier {
    High,
    Medium,
    Low,
}

impl TrustTier {
    pub fn from_score(score: i32) -> Self {
        if score >= 80 {
            TrustTier::High
        } else if score >= 50 {
            TrustTier::Medium
        } else {
            TrustTier::Low
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TrustTier::High => "High Trust",
            TrustTier::Medium => "Medium Trust",
            TrustTier::Low => "Low Trust",
        }
    }
}

/// A user as shown on the users page (row of `profiles`).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Profile {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub trust_score: Option<i32>,
    #[serde(default)]
    pub status: Option<ProfileStatus>,
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
    #[serde(default)]
    pub devices: Option<i32>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Profile {
    pub fn trust_score(&self) -> i32 {
        self.trust_score.unwrap_or(DEFAULT_TRUST_SCORE)
    }

    pub fn trust_tier(&self) -> TrustTier {
        TrustTier::from_score(self.trust_score())
    }

    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or(&self.user_id)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceStatus {
    Compliant,
    Warning,
    NonCompliant,
    #[serde(other)]
    Unknown,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Compliant => "compliant",
            DeviceStatus::Warning => "warning",
            DeviceStatus::NonCompliant => "non-compliant",
            DeviceStatus::Unknown => "unknown",
        }
    }
}

/// Row of the `devices` table. `device_type` is free text.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Device {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: String,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub status: Option<DeviceStatus>,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Insert payload for `devices`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NewDevice {
    pub user_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: String,
    pub os: String,
    pub status: DeviceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComplianceStats {
    pub compliant: usize,
    pub warning: usize,
    pub non_compliant: usize,
}

impl ComplianceStats {
    pub fn from_devices(devices: &[Device]) -> Self {
        devices.iter().fold(Self::default(), |mut stats, d| {
            match d.status {
                Some(DeviceStatus::Compliant) => stats.compliant += 1,
                Some(DeviceStatus::Warning) => stats.warning += 1,
                Some(DeviceStatus::NonCompliant) => stats.non_compliant += 1,
                _ => {}
            }
            stats
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PolicyType {
    Access,
    Device,
    Network,
    Time,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PolicyStatus {
    Active,
    Inactive,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Policy {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub policy_type: PolicyType,
    pub status: PolicyStatus,
    pub applies_to: String,
    pub created_at: NaiveDate,
}

/// Registration form. Blank strings count as missing.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct DeviceForm {
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: String,
    pub os: String,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct PolicyForm {
    pub name: String,
    pub description: String,
    pub applies_to: String,
    #[serde(default, rename = "type")]
    pub policy_type: Option<PolicyType>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Success,
    Denied,
    Warning,
}

/// Synthetic entry shown in the live activity stream.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ActivityEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub user: String,
    pub action: String,
    pub resource: String,
    pub status: ActivityStatus,
    pub ip: String,
    pub device: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Resolved,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Alert {
    pub id: String,
    pub title: String,
    pub description: String,
    pub severity: AlertSeverity,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub status: AlertStatus,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivityStats {
    pub total: usize,
    pub success: usize,
    pub denied: usize,
    pub warning: usize,
}

impl ActivityStats {
    pub fn from_events(events: &[ActivityEvent]) -> Self {
        events.iter().fold(Self::default(), |mut stats, e| {
            stats.total += 1;
            match e.status {
                ActivityStatus::Success => stats.success += 1,
                ActivityStatus::Denied => stats.denied += 1,
                ActivityStatus::Warning => stats.warning += 1,
            }
            stats
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertStats {
    pub active: usize,
    /// Critical alerts that are still active.
    pub critical: usize,
    pub resolved: usize,
}

impl AlertStats {
    pub fn from_alerts(alerts: &[Alert]) -> Self {
        alerts.iter().fold(Self::default(), |mut stats, a| {
            match a.status {
                AlertStatus::Active => {
                    stats.active += 1;
                    if a.severity == AlertSeverity::Critical {
                        stats.critical += 1;
                    }
                }
                AlertStatus::Resolved => stats.resolved += 1,
            }
            stats
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrustDistribution {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

/// Headline numbers for the landing page.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DashboardOverview {
    pub users: usize,
    pub devices: usize,
    pub compliance: ComplianceStats,
    pub active_policies: usize,
    pub alerts: AlertStats,
    pub activity: ActivityStats,
    pub trust: TrustDistribution,
    pub recent_denied: Vec<ActivityEvent>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationVariant {
    Default,
    Success,
    Destructive,
}

/// User-facing toast.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub variant: NotificationVariant,
    pub at: DateTime<Utc>,
}
