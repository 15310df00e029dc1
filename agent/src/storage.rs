use std::str::FromStr;

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use common::{ActivityLogEntry, AuthAttempt, Device, NewDevice, Profile};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

#[derive(Clone)]
pub struct Storage { pool: SqlitePool }

#[derive(Debug, Clone)]
pub struct AuthUserRow {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub salt: String,
    pub confirmed: bool,
}

#[derive(Debug, Clone)]
pub struct SessionRow {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: String,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

/// An audit entry the backend never accepted.
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetter {
    pub id: i64,
    pub attempt: AuthAttempt,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

/// Timestamps are stored as fixed-width RFC 3339 text so that `ORDER BY`
/// on the column sorts chronologically.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_enum<T: DeserializeOwned>(raw: Option<String>) -> Option<T> {
    raw.and_then(|s| serde_json::from_value(serde_json::Value::String(s)).ok())
}

type ProfileTuple = (
    String, String, Option<String>, Option<String>, Option<String>, Option<i64>,
    Option<String>, Option<String>, Option<i64>, Option<String>, Option<String>,
);

type DeviceTuple = (
    String, String, String, String, Option<String>, Option<String>,
    Option<String>, Option<String>, Option<String>,
);

fn profile_from(row: ProfileTuple) -> Profile {
    let (id, user_id, name, email, role, trust_score, status, last_login, devices, created_at, updated_at) = row;
    Profile {
        id,
        user_id,
        name,
        email,
        role,
        trust_score: trust_score.map(|v| v as i32),
        status: parse_enum(status),
        last_login: parse_ts(last_login),
        devices: devices.map(|v| v as i32),
        created_at: parse_ts(created_at),
        updated_at: parse_ts(updated_at),
    }
}

fn device_from(row: DeviceTuple) -> Device {
    let (id, user_id, name, device_type, os, status, last_seen, location, created_at) = row;
    Device {
        id,
        user_id,
        name,
        device_type,
        os,
        status: parse_enum(status),
        last_seen: parse_ts(last_seen),
        location,
        created_at: parse_ts(created_at),
    }
}

impl Storage {
pub async fn new(path: &str) -> Result<Self> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePool::connect_with(options).await?;
    Self::with_pool(pool).await
}

/// Single-connection in-memory database; the pool never recycles the
/// connection, otherwise the data would vanish with it.
pub async fn in_memory() -> Result<Self> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    Self::with_pool(pool).await
}

async fn with_pool(pool: SqlitePool) -> Result<Self> {
    // run migrations / schema
    sqlx::query(include_str!("../../sql/schema.sql")).execute(&pool).await?;
    Ok(Self { pool })
}

pub async fn insert_auth_user(&self, id: &str, email: &str, password_hash: &str, salt: &str, confirmed: bool, at: DateTime<Utc>) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO auth_users(id, email, password_hash, salt, confirmed, created_at) VALUES (?, ?, ?, ?, ?, ?)")
        .bind(id)
        .bind(email)
        .bind(password_hash)
        .bind(salt)
        .bind(confirmed)
        .bind(timestamp(at))
        .execute(&self.pool)
        .await?;
    Ok(())
}

pub async fn find_auth_user(&self, email: &str) -> Result<Option<AuthUserRow>, sqlx::Error> {
    let row = sqlx::query_as::<_, (String, String, String, String, bool)>(
        "SELECT id, email, password_hash, salt, confirmed FROM auth_users WHERE email = ?"
    )
    .bind(email)
    .fetch_optional(&self.pool)
    .await?;

    Ok(row.map(|(id, email, password_hash, salt, confirmed)| AuthUserRow { id, email, password_hash, salt, confirmed }))
}

pub async fn insert_session(&self, access_token: &str, refresh_token: &str, user_id: &str, expires_at: DateTime<Utc>) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO auth_sessions(access_token, refresh_token, user_id, expires_at, created_at) VALUES (?, ?, ?, ?, ?)")
        .bind(access_token)
        .bind(refresh_token)
        .bind(user_id)
        .bind(timestamp(expires_at))
        .bind(timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;
    Ok(())
}

/// Most recently issued session that has not expired yet.
pub async fn latest_live_session(&self, now: DateTime<Utc>) -> Result<Option<SessionRow>, sqlx::Error> {
    let row = sqlx::query_as::<_, (String, String, String, String, String)>(
        "SELECT s.access_token, s.refresh_token, s.user_id, u.email, s.expires_at \
         FROM auth_sessions s JOIN auth_users u ON u.id = s.user_id \
         WHERE s.expires_at > ? ORDER BY s.created_at DESC LIMIT 1"
    )
    .bind(timestamp(now))
    .fetch_optional(&self.pool)
    .await?;

    Ok(row.and_then(|(access_token, refresh_token, user_id, email, expires_at)| {
        parse_ts(Some(expires_at)).map(|expires_at| SessionRow { access_token, refresh_token, user_id, email, expires_at })
    }))
}

pub async fn delete_session(&self, access_token: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM auth_sessions WHERE access_token = ?")
        .bind(access_token)
        .execute(&self.pool)
        .await?;
    Ok(())
}

pub async fn insert_profile(&self, id: &str, user_id: &str, email: &str, at: DateTime<Utc>) -> Result<(), sqlx::Error> {
    let name = email.split('@').next().unwrap_or(email);
    sqlx::query("INSERT INTO profiles(id, user_id, name, email, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)")
        .bind(id)
        .bind(user_id)
        .bind(name)
        .bind(email)
        .bind(timestamp(at))
        .bind(timestamp(at))
        .execute(&self.pool)
        .await?;
    Ok(())
}

pub async fn touch_last_login(&self, user_id: &str, at: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let done = sqlx::query("UPDATE profiles SET last_login = ?, updated_at = ? WHERE user_id = ?")
        .bind(timestamp(at))
        .bind(timestamp(at))
        .bind(user_id)
        .execute(&self.pool)
        .await?;
    Ok(done.rows_affected())
}

pub async fn increment_device_count(&self, user_id: &str, at: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let done = sqlx::query("UPDATE profiles SET devices = COALESCE(devices, 0) + 1, updated_at = ? WHERE user_id = ?")
        .bind(timestamp(at))
        .bind(user_id)
        .execute(&self.pool)
        .await?;
    Ok(done.rows_affected())
}

pub async fn select_profiles(&self) -> Result<Vec<Profile>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ProfileTuple>(
        "SELECT id, user_id, name, email, role, trust_score, status, last_login, devices, created_at, updated_at \
         FROM profiles ORDER BY created_at DESC, rowid DESC"
    )
    .fetch_all(&self.pool)
    .await?;

    Ok(rows.into_iter().map(profile_from).collect())
}

pub async fn insert_device(&self, id: &str, device: &NewDevice, at: DateTime<Utc>) -> Result<Device, sqlx::Error> {
    sqlx::query("INSERT INTO devices(id, user_id, name, type, os, status, last_seen, location, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)")
        .bind(id)
        .bind(&device.user_id)
        .bind(&device.name)
        .bind(&device.device_type)
        .bind(&device.os)
        .bind(device.status.as_str())
        .bind(device.last_seen.map(timestamp))
        .bind(&device.location)
        .bind(timestamp(at))
        .execute(&self.pool)
        .await?;

    Ok(Device {
        id: id.to_string(),
        user_id: device.user_id.clone(),
        name: device.name.clone(),
        device_type: device.device_type.clone(),
        os: Some(device.os.clone()),
        status: Some(device.status),
        last_seen: device.last_seen,
        location: device.location.clone(),
        created_at: Some(at),
    })
}

pub async fn select_devices(&self) -> Result<Vec<Device>, sqlx::Error> {
    let rows = sqlx::query_as::<_, DeviceTuple>(
        "SELECT id, user_id, name, type, os, status, last_seen, location, created_at \
         FROM devices ORDER BY created_at DESC, rowid DESC"
    )
    .fetch_all(&self.pool)
    .await?;

    Ok(rows.into_iter().map(device_from).collect())
}

pub async fn insert_activity_log(&self, id: &str, user_id: Option<&str>, attempt: &AuthAttempt, at: DateTime<Utc>) -> Result<(), sqlx::Error> {
    let metadata = serde_json::json!({ "device": attempt.device }).to_string();
    sqlx::query("INSERT INTO activity_logs(id, user_id, email, action, status, reason, ip_address, metadata, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)")
        .bind(id)
        .bind(user_id)
        .bind(&attempt.email)
        .bind(&attempt.action)
        .bind(attempt.status.as_str())
        .bind(&attempt.reason)
        .bind(&attempt.ip_address)
        .bind(metadata)
        .bind(timestamp(at))
        .execute(&self.pool)
        .await?;
    Ok(())
}

pub async fn select_activity_logs(&self) -> Result<Vec<ActivityLogEntry>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (String, Option<String>, Option<String>, String, String, Option<String>, Option<String>, Option<String>, Option<String>, Option<String>)>(
        "SELECT id, user_id, email, action, status, reason, resource, ip_address, metadata, created_at \
         FROM activity_logs ORDER BY created_at DESC, rowid DESC"
    )
    .fetch_all(&self.pool)
    .await?;

    Ok(rows.into_iter().map(|(id, user_id, email, action, status, reason, resource, ip_address, metadata, created_at)| {
        ActivityLogEntry {
            id,
            user_id,
            email,
            action,
            status,
            reason,
            resource,
            ip_address,
            metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
            created_at: parse_ts(created_at),
        }
    }).collect())
}

pub async fn insert_dead_letter(&self, attempt: &AuthAttempt, error: &str, at: DateTime<Utc>) -> Result<()> {
    sqlx::query("INSERT INTO audit_dead_letters(action, email, status, reason, device, ip_address, error, failed_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)")
        .bind(&attempt.action)
        .bind(&attempt.email)
        .bind(attempt.status.as_str())
        .bind(&attempt.reason)
        .bind(&attempt.device)
        .bind(&attempt.ip_address)
        .bind(error)
        .bind(timestamp(at))
        .execute(&self.pool)
        .await?;
    Ok(())
}

pub async fn recent_dead_letters(&self, limit: i64) -> Result<Vec<DeadLetter>> {
    let rows = sqlx::query_as::<_, (i64, String, String, String, String, String, String, String, String)>(
        "SELECT id, action, email, status, reason, device, ip_address, error, failed_at \
         FROM audit_dead_letters ORDER BY id DESC LIMIT ?"
    )
    .bind(limit)
    .fetch_all(&self.pool)
    .await?;

    Ok(rows.into_iter().filter_map(|(id, action, email, status, reason, device, ip_address, error, failed_at)| {
        let status = parse_enum(Some(status))?;
        let failed_at = parse_ts(Some(failed_at))?;
        Some(DeadLetter {
            id,
            attempt: AuthAttempt { action, device, email, ip_address, reason, status },
            error,
            failed_at,
        })
    }).collect())
}

pub async fn dead_letter_count(&self) -> Result<i64> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM audit_dead_letters")
        .fetch_one(&self.pool)
        .await?;
    Ok(count.0)
}
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use common::{AttemptStatus, DeviceStatus};

    #[tokio::test]
    async fn devices_come_back_newest_first() {
        let storage = Storage::in_memory().await.unwrap();
        let base = Utc::now();
        for (i, name) in ["first", "second", "third"].iter().enumerate() {
            let device = NewDevice {
                user_id: "u1".into(),
                name: name.to_string(),
                device_type: "desktop".into(),
                os: "Linux".into(),
                status: DeviceStatus::Compliant,
                last_seen: None,
                location: None,
            };
            storage
                .insert_device(&format!("d{}", i), &device, base + Duration::seconds(i as i64))
                .await
                .unwrap();
        }

        let names: Vec<_> = storage.select_devices().await.unwrap().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["third", "second", "first"]);
    }

    #[tokio::test]
    async fn expired_sessions_are_not_recovered() {
        let storage = Storage::in_memory().await.unwrap();
        let now = Utc::now();
        storage.insert_auth_user("u1", "a@example.com", "h", "s", true, now).await.unwrap();
        storage.insert_session("old", "r-old", "u1", now - Duration::minutes(1)).await.unwrap();
        assert!(storage.latest_live_session(now).await.unwrap().is_none());

        storage.insert_session("fresh", "r-fresh", "u1", now + Duration::hours(1)).await.unwrap();
        let row = storage.latest_live_session(now).await.unwrap().unwrap();
        assert_eq!(row.access_token, "fresh");
        assert_eq!(row.email, "a@example.com");
    }

    #[tokio::test]
    async fn dead_letters_round_trip_through_the_table() {
        let storage = Storage::in_memory().await.unwrap();
        let attempt = AuthAttempt::new("Login", "a@example.com", AttemptStatus::Success, "Valid credentials provided", "Linux");
        storage.insert_dead_letter(&attempt, "transport error: refused", Utc::now()).await.unwrap();

        assert_eq!(storage.dead_letter_count().await.unwrap(), 1);
        let letters = storage.recent_dead_letters(10).await.unwrap();
        assert_eq!(letters[0].attempt, attempt);
        assert_eq!(letters[0].error, "transport error: refused");
    }
}
