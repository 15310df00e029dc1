use chrono::{DateTime, Utc};
use colored::*;
use common::{
    ActivityEvent, ActivityStats, ActivityStatus, Alert, AlertSeverity, AlertStats, AlertStatus, DashboardOverview,
    Device, DeviceStatus, IpcResponse, Notification, NotificationVariant, Policy, PolicyStatus, Profile,
    ProfileStatus, TrustTier,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

const RULE: &str = "────────────────────────────────────────────────────────────────────────────────";

fn header(title: &str) {
    println!("\n{}", RULE.bright_cyan());
    println!("  {}", title.bright_cyan().bold());
    println!("{}", RULE.bright_cyan());
}

fn footer() {
    println!("{}\n", RULE.bright_cyan());
}

/// Prints the failure and returns `None`, or hands back the payload.
fn payload(response: &IpcResponse) -> Option<&Value> {
    match response.error_message() {
        Some(message) => {
            println!("{} {}", "✗".red().bold(), message.red());
            None
        }
        None => Some(&response.data),
    }
}

fn decode<T: DeserializeOwned>(value: &Value) -> Option<T> {
    serde_json::from_value(value.clone()).ok()
}

pub fn format_uptime(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// "42s ago", "7m ago", "3h ago", then the date.
pub fn time_ago(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = (now - at).num_seconds().max(0);
    if diff < 60 {
        format!("{}s ago", diff)
    } else if diff < 3600 {
        format!("{}m ago", diff / 60)
    } else if diff < 86_400 {
        format!("{}h ago", diff / 3600)
    } else {
        at.format("%Y-%m-%d").to_string()
    }
}

/// Pads or cuts to exactly `max_len` characters.
pub fn truncate(s: &str, max_len: usize) -> String {
    let count = s.chars().count();
    if count <= max_len {
        format!("{:width$}", s, width = max_len)
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(2)).collect();
        format!("{}..", kept)
    }
}

fn trust_color(tier: TrustTier) -> Color {
    match tier {
        TrustTier::High => Color::Green,
        TrustTier::Medium => Color::Yellow,
        TrustTier::Low => Color::Red,
    }
}

fn device_status(status: Option<DeviceStatus>) -> (&'static str, Color) {
    match status {
        Some(DeviceStatus::Compliant) => ("Compliant", Color::Green),
        Some(DeviceStatus::Warning) => ("Warning", Color::Yellow),
        Some(DeviceStatus::NonCompliant) => ("Non-Compliant", Color::Red),
        Some(DeviceStatus::Unknown) | None => ("Unknown", Color::BrightBlack),
    }
}

fn activity_status(status: ActivityStatus) -> (&'static str, Color) {
    match status {
        ActivityStatus::Success => ("Success", Color::Green),
        ActivityStatus::Denied => ("Denied", Color::Red),
        ActivityStatus::Warning => ("Warning", Color::Yellow),
    }
}

fn severity(severity: AlertSeverity) -> (&'static str, Color) {
    match severity {
        AlertSeverity::Critical => ("CRITICAL", Color::Red),
        AlertSeverity::High => ("HIGH", Color::BrightRed),
        AlertSeverity::Medium => ("MEDIUM", Color::Yellow),
        AlertSeverity::Low => ("LOW", Color::White),
    }
}

/// Cuts before coloring so the reset code is never truncated away.
fn cell((label, color): (&str, Color), width: usize) -> ColoredString {
    truncate(label, width).color(color)
}

pub fn print_status(response: &IpcResponse) {
    let Some(data) = payload(response) else { return };
    header("ZTD Agent Status");
    println!("  {:14} {}", "Uptime:".bright_cyan(), format_uptime(data["uptime_seconds"].as_u64().unwrap_or(0)).bright_white());
    println!("  {:14} {}", "Status:".bright_cyan(), data["status"].as_str().unwrap_or("unknown").bright_green().bold());
    println!("  {:14} {}", "Backend:".bright_cyan(), data["backend"].as_str().unwrap_or("?").bright_white());
    println!("  {:14} {}", "Session:".bright_cyan(), data["session"].as_str().unwrap_or("?").bright_white());
    println!("  {:14} {}", "Pages:".bright_cyan(), if data["pages_mounted"].as_bool().unwrap_or(false) { "mounted".green() } else { "unmounted".dimmed() });
    let dead = data["audit"]["dead_letters"].as_i64().unwrap_or(0);
    let dead_text = if dead > 0 { dead.to_string().red().bold() } else { dead.to_string().green() };
    println!("  {:14} {}", "Dead letters:".bright_cyan(), dead_text);
    if let Some(alerts) = decode::<AlertStats>(&data["feeds"]["alerts"]) {
        println!(
            "  {:14} {} active, {} critical, {} resolved",
            "Alerts:".bright_cyan(),
            alerts.active.to_string().bright_yellow(),
            alerts.critical.to_string().bright_red().bold(),
            alerts.resolved.to_string().green()
        );
    }
    if let Some(last) = decode::<Notification>(&data["last_notification"]) {
        println!("  {}", "Last notification:".bright_cyan());
        print_notification(&last);
    }
    footer();
}

pub fn print_navigate(response: &IpcResponse) {
    let Some(data) = payload(response) else { return };
    let path = data["path"].as_str().unwrap_or("?");
    match data["guard"]["outcome"].as_str() {
        Some("render") => println!("{} {}", "→".bright_cyan(), path.bright_white().bold()),
        Some("redirect") => println!(
            "{} {} redirects to {}",
            "↪".yellow(),
            path.bright_white(),
            data["guard"]["to"].as_str().unwrap_or("?").bright_white().bold()
        ),
        _ => println!("{} {}", "…".dimmed(), "Loading...".dimmed()),
    }
}

pub fn print_whoami(response: &IpcResponse) {
    let Some(data) = payload(response) else { return };
    match data["user"]["id"].as_str() {
        Some(id) => {
            let email = data["user"]["email"].as_str().unwrap_or("(no email)");
            println!("{} {} {}", "●".green(), email.bright_white().bold(), format!("({})", id).dimmed());
            if let Some(expires) = decode::<DateTime<Utc>>(&data["expires_at"]) {
                println!("  session expires {}", expires.format("%Y-%m-%d %H:%M:%S UTC").to_string().dimmed());
            }
        }
        None => println!("{} {}", "○".dimmed(), format!("Not signed in ({})", data["state"].as_str().unwrap_or("?")).dimmed()),
    }
}

fn print_list_error(data: &Value) {
    if let Some(error) = data["last_error"].as_str() {
        println!("  {} {}", "last refresh failed:".red(), error.dimmed());
    }
}

pub fn print_users(response: &IpcResponse) {
    let Some(data) = payload(response) else { return };
    let users: Vec<Profile> = decode(&data["rows"]).unwrap_or_default();
    header(&format!("Users ({})", users.len()));
    print_list_error(data);
    if users.is_empty() {
        let note = if data["loaded"].as_bool().unwrap_or(false) { "No users found." } else { "Loading..." };
        println!("  {}", note.dimmed());
    }
    for user in &users {
        let tier = user.trust_tier();
        let status = match user.status {
            Some(ProfileStatus::Active) => "active".green(),
            Some(ProfileStatus::Suspended) => "suspended".red(),
            Some(ProfileStatus::Inactive) => "inactive".yellow(),
            _ => "-".dimmed(),
        };
        println!(
            "  {} {} {} {:>3} {} {} {}",
            truncate(user.display_name(), 22).bright_white(),
            truncate(user.email.as_deref().unwrap_or("-"), 28).dimmed(),
            truncate(user.role.as_deref().unwrap_or("user"), 8),
            user.trust_score().to_string().color(trust_color(tier)).bold(),
            truncate(tier.label(), 6).color(trust_color(tier)),
            status,
            format!("{} devices", user.devices.unwrap_or(0)).dimmed(),
        );
    }
    footer();
}

pub fn print_devices(response: &IpcResponse) {
    let Some(data) = payload(response) else { return };
    let devices: Vec<Device> = decode(&data["rows"]).unwrap_or_default();
    let stats = common::ComplianceStats::from_devices(&devices);
    header(&format!(
        "Devices ({})  {} compliant · {} warning · {} non-compliant",
        devices.len(),
        stats.compliant,
        stats.warning,
        stats.non_compliant
    ));
    print_list_error(data);
    if devices.is_empty() {
        let note = if data["loaded"].as_bool().unwrap_or(false) { "No devices registered." } else { "Loading..." };
        println!("  {}", note.dimmed());
    }
    let now = Utc::now();
    for device in &devices {
        println!(
            "  {} {} {} {} {}",
            truncate(&device.name, 22).bright_white(),
            truncate(&device.device_type, 8),
            truncate(device.os.as_deref().unwrap_or("-"), 14).dimmed(),
            cell(device_status(device.status), 13),
            device.last_seen.map(|at| time_ago(at, now)).unwrap_or_else(|| "never".into()).dimmed(),
        );
    }
    footer();
}

pub fn print_device(response: &IpcResponse) {
    let Some(data) = payload(response) else { return };
    if let Some(device) = decode::<Device>(data) {
        println!("{} Registered {} ({})", "✓".green().bold(), device.name.bright_white().bold(), device.id.dimmed());
    }
}

pub fn print_policies(response: &IpcResponse) {
    let Some(data) = payload(response) else { return };
    let policies: Vec<Policy> = decode(&data["policies"]).unwrap_or_default();
    header(&format!("Access Policies ({} active)", data["active"].as_u64().unwrap_or(0)));
    for policy in &policies {
        let status = match policy.status {
            PolicyStatus::Active => "active".green(),
            PolicyStatus::Inactive => "inactive".dimmed(),
        };
        println!("  {} {} {}", truncate(&policy.name, 34).bright_white().bold(), status, policy.created_at.to_string().dimmed());
        println!("    {}", policy.description.dimmed());
        println!("    applies to {}", policy.applies_to.bright_white());
    }
    footer();
}

pub fn print_policy(response: &IpcResponse) {
    let Some(data) = payload(response) else { return };
    if let Some(policy) = decode::<Policy>(data) {
        println!("{} Created policy {} ({})", "✓".green().bold(), policy.name.bright_white().bold(), policy.id.dimmed());
    }
}

pub fn print_activity(response: &IpcResponse) {
    let Some(data) = payload(response) else { return };
    let events: Vec<ActivityEvent> = decode(&data["events"]).unwrap_or_default();
    let stats: ActivityStats = decode(&data["stats"]).unwrap_or_default();
    header(&format!(
        "Activity  {} total · {} success · {} denied · {} warning",
        stats.total, stats.success, stats.denied, stats.warning
    ));
    let now = Utc::now();
    for event in &events {
        println!(
            "  {} {} {} {} {} {}",
            truncate(&time_ago(event.timestamp, now), 8).dimmed(),
            truncate(&event.user, 14).bright_white(),
            truncate(&event.action, 15),
            truncate(&event.resource, 14).dimmed(),
            cell(activity_status(event.status), 7),
            format!("{} · {}", event.ip, event.device).dimmed(),
        );
    }
    footer();
}

pub fn print_alerts(response: &IpcResponse) {
    let Some(data) = payload(response) else { return };
    let alerts: Vec<Alert> = decode(&data["alerts"]).unwrap_or_default();
    let stats: AlertStats = decode(&data["stats"]).unwrap_or_default();
    header(&format!(
        "Security Alerts  {} active · {} critical · {} resolved",
        stats.active, stats.critical, stats.resolved
    ));
    let now = Utc::now();
    for alert in &alerts {
        let state = match alert.status {
            AlertStatus::Active => "active".bright_yellow(),
            AlertStatus::Resolved => "resolved".green(),
        };
        println!(
            "  {} {} {} {}",
            format!("#{:<14}", alert.id).dimmed(),
            cell(severity(alert.severity), 8).bold(),
            alert.title.bright_white().bold(),
            state
        );
        println!("    {} {}", alert.description.dimmed(), format!("({}, {})", alert.source, time_ago(alert.timestamp, now)).dimmed());
    }
    footer();
}

pub fn print_alert(response: &IpcResponse) {
    let Some(data) = payload(response) else { return };
    if let Some(alert) = decode::<Alert>(data) {
        println!("{} Resolved {} ({})", "✓".green().bold(), alert.title.bright_white().bold(), alert.id.dimmed());
    }
}

pub fn print_notification(notification: &Notification) {
    let mark = match notification.variant {
        NotificationVariant::Success => "✓".green().bold(),
        NotificationVariant::Destructive => "✗".red().bold(),
        NotificationVariant::Default => "•".bright_cyan(),
    };
    if notification.description.is_empty() {
        println!("  {} {}", mark, notification.title.bright_white());
    } else {
        println!("  {} {} {}", mark, notification.title.bright_white(), notification.description.dimmed());
    }
}

pub fn print_notifications(response: &IpcResponse) {
    let Some(data) = payload(response) else { return };
    let notifications: Vec<Notification> = decode(&data["notifications"]).unwrap_or_default();
    header("Notifications");
    if notifications.is_empty() {
        println!("  {}", "Nothing yet.".dimmed());
    }
    for notification in &notifications {
        print_notification(notification);
    }
    footer();
}

pub fn print_dead_letters(response: &IpcResponse) {
    let Some(data) = payload(response) else { return };
    let empty = Vec::new();
    let letters = data["dead_letters"].as_array().unwrap_or(&empty);
    header(&format!("Undelivered audit entries ({})", letters.len()));
    if letters.is_empty() {
        println!("  {}", "None. Every audit entry reached the backend.".dimmed());
    }
    for letter in letters {
        println!(
            "  {} {} {} {}",
            letter["failed_at"].as_str().unwrap_or("?").dimmed(),
            truncate(letter["attempt"]["p_action"].as_str().unwrap_or("?"), 16).bright_white(),
            truncate(letter["attempt"]["p_email"].as_str().unwrap_or("?"), 26),
            letter["error"].as_str().unwrap_or("?").red(),
        );
    }
    footer();
}

pub fn print_dashboard(response: &IpcResponse) {
    let Some(data) = payload(response) else { return };
    let Some(overview) = decode::<DashboardOverview>(data) else {
        println!("{}", "✗ Unreadable dashboard data".red());
        return;
    };
    header("Security Dashboard");
    println!("  {:18} {}", "Users:".bright_cyan(), overview.users.to_string().bright_white().bold());
    println!(
        "  {:18} {} ({} compliant)",
        "Devices:".bright_cyan(),
        overview.devices.to_string().bright_white().bold(),
        overview.compliance.compliant.to_string().green()
    );
    println!("  {:18} {}", "Active policies:".bright_cyan(), overview.active_policies.to_string().bright_white().bold());
    println!(
        "  {:18} {} ({} critical)",
        "Active alerts:".bright_cyan(),
        overview.alerts.active.to_string().bright_yellow().bold(),
        overview.alerts.critical.to_string().red().bold()
    );
    println!(
        "  {:18} {} high · {} medium · {} low",
        "Trust:".bright_cyan(),
        overview.trust.high.to_string().green(),
        overview.trust.medium.to_string().yellow(),
        overview.trust.low.to_string().red()
    );
    if !overview.recent_denied.is_empty() {
        println!("  {}", "Recently denied:".bright_cyan());
        for event in &overview.recent_denied {
            println!("    {} {} {}", event.user.bright_white(), event.action, format!("on {}", event.resource).dimmed());
        }
    }
    footer();
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn uptime_formats() {
        assert_eq!(format_uptime(5), "5s");
        assert_eq!(format_uptime(125), "2m 5s");
        assert_eq!(format_uptime(3725), "1h 2m 5s");
    }

    #[test]
    fn time_ago_buckets() {
        let now = Utc::now();
        assert_eq!(time_ago(now - Duration::seconds(42), now), "42s ago");
        assert_eq!(time_ago(now - Duration::minutes(7), now), "7m ago");
        assert_eq!(time_ago(now - Duration::hours(3), now), "3h ago");
        assert_eq!(time_ago(now + Duration::seconds(5), now), "0s ago");
    }

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(truncate("abc", 5), "abc  ");
        assert_eq!(truncate("Zürich, Schweiz", 8), "Zürich..");
    }
}
