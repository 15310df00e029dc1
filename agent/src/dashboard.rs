use chrono::Utc;
use common::{
    ActivityEvent, ActivityStats, ActivityStatus, Alert, AlertStats, ComplianceStats, DashboardOverview, Device, Profile,
    TrustDistribution, TrustTier,
};

const RECENT_DENIED: usize = 5;

/// Landing page numbers from whatever the lists and feeds currently hold.
/// `activity` is expected newest first.
pub fn summarize(
    profiles: &[Profile],
    devices: &[Device],
    active_policies: usize,
    alerts: &[Alert],
    activity: &[ActivityEvent],
) -> DashboardOverview {
    let trust = profiles.iter().fold(TrustDistribution::default(), |mut t, p| {
        match p.trust_tier() {
            TrustTier::High => t.high += 1,
            TrustTier::Medium => t.medium += 1,
            TrustTier::Low => t.low += 1,
        }
        t
    });

    DashboardOverview {
        users: profiles.len(),
        devices: devices.len(),
        compliance: ComplianceStats::from_devices(devices),
        active_policies,
        alerts: AlertStats::from_alerts(alerts),
        activity: ActivityStats::from_events(activity),
        trust,
        recent_denied: activity
            .iter()
            .filter(|e| e.status == ActivityStatus::Denied)
            .take(RECENT_DENIED)
            .cloned()
            .collect(),
        generated_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn profile(score: Option<i32>) -> Profile {
        serde_json::from_value(json!({"id": "p", "user_id": "u", "trust_score": score})).unwrap()
    }

    fn event(status: ActivityStatus) -> ActivityEvent {
        ActivityEvent {
            id: "e".into(),
            timestamp: Utc::now(),
            user: "Bob Smith".into(),
            action: "Access Request".into(),
            resource: "Admin Panel".into(),
            status,
            ip: "192.168.0.1".into(),
            device: "iPhone 14".into(),
        }
    }

    #[test]
    fn trust_distribution_uses_default_score_for_missing_values() {
        let profiles = vec![profile(Some(95)), profile(Some(80)), profile(None), profile(Some(10))];
        let overview = summarize(&profiles, &[], 3, &[], &[]);
        assert_eq!(overview.users, 4);
        assert_eq!(overview.trust, TrustDistribution { high: 2, medium: 1, low: 1 });
        assert_eq!(overview.active_policies, 3);
    }

    #[test]
    fn recent_denied_is_capped() {
        let mut activity: Vec<_> = (0..8).map(|_| event(ActivityStatus::Denied)).collect();
        activity.push(event(ActivityStatus::Success));
        let overview = summarize(&[], &[], 0, &[], &activity);
        assert_eq!(overview.recent_denied.len(), RECENT_DENIED);
        assert_eq!(overview.activity.denied, 8);
        assert_eq!(overview.activity.total, 9);
    }
}
