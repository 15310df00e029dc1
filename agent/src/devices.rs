use std::sync::Arc;

use chrono::Utc;
use common::{Device, DeviceForm, DeviceStatus, NewDevice, SessionState};
use log::{info, warn};

use crate::backend::Backend;
use crate::error::DeviceError;
use crate::notify::Notifier;

/// The "Register Device" form. The devices list picks up the new row through
/// its own change subscription.
#[derive(Clone)]
pub struct DeviceRegistry {
    backend: Arc<dyn Backend>,
    notifier: Notifier,
}

impl DeviceRegistry {
    pub fn new(backend: Arc<dyn Backend>, notifier: Notifier) -> Self {
        Self { backend, notifier }
    }

    pub async fn register(&self, state: &SessionState, form: DeviceForm) -> Result<Device, DeviceError> {
        let name = form.name.trim();
        let device_type = form.device_type.trim();
        let os = form.os.trim();
        if name.is_empty() || device_type.is_empty() || os.is_empty() {
            self.notifier.error("Please fill in all fields", "");
            return Err(DeviceError::MissingFields);
        }

        let user = state.user().ok_or(DeviceError::NotAuthenticated)?;
        let device = NewDevice {
            user_id: user.id.clone(),
            name: name.to_string(),
            device_type: device_type.to_string(),
            os: os.to_string(),
            status: DeviceStatus::Compliant,
            last_seen: Some(Utc::now()),
            location: form.location.filter(|l| !l.trim().is_empty()),
        };

        match self.backend.insert_device(&device).await {
            Ok(created) => {
                info!("Registered device {} ({}) for {}", created.name, created.id, created.user_id);
                self.notifier.success("Device registered successfully", &created.name);
                Ok(created)
            }
            Err(e) => {
                warn!("Device registration failed: {}", e);
                self.notifier.error("Failed to register device", &e.message());
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{LocalBackend, Table};
    use crate::storage::Storage;
    use common::{Identity, Session};

    async fn signed_in() -> (DeviceRegistry, Arc<LocalBackend>, Notifier, SessionState) {
        let backend = Arc::new(LocalBackend::new(Storage::in_memory().await.unwrap(), chrono::Duration::hours(1), true));
        backend.sign_up("u1@example.com", "hunter22", "/").await.unwrap();
        let session = backend.sign_in_with_password("u1@example.com", "hunter22").await.unwrap();
        let notifier = Notifier::new(8);
        let registry = DeviceRegistry::new(backend.clone(), notifier.clone());
        (registry, backend, notifier, SessionState::Authenticated(session))
    }

    fn laptop() -> DeviceForm {
        DeviceForm {
            name: "Test Laptop".into(),
            device_type: "desktop".into(),
            os: "Linux".into(),
            location: None,
        }
    }

    #[tokio::test]
    async fn registers_compliant_device_for_current_user() {
        let (registry, backend, notifier, state) = signed_in().await;
        let device = registry.register(&state, laptop()).await.unwrap();

        assert_eq!(device.user_id, state.user().unwrap().id);
        assert_eq!(device.status, Some(DeviceStatus::Compliant));
        assert!(device.last_seen.is_some());
        assert_eq!(notifier.latest().unwrap().title, "Device registered successfully");

        let rows = backend.select_all(Table::Devices).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "Test Laptop");
    }

    #[tokio::test]
    async fn blank_fields_are_rejected_before_the_backend() {
        let (registry, backend, notifier, state) = signed_in().await;
        let form = DeviceForm { os: "  ".into(), ..laptop() };
        assert_eq!(registry.register(&state, form).await.unwrap_err(), DeviceError::MissingFields);
        assert_eq!(notifier.latest().unwrap().title, "Please fill in all fields");
        assert!(backend.select_all(Table::Devices).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn requires_a_session() {
        let (registry, _, _, _) = signed_in().await;
        let err = registry.register(&SessionState::Anonymous, laptop()).await.unwrap_err();
        assert_eq!(err, DeviceError::NotAuthenticated);
    }

    #[tokio::test]
    async fn foreign_session_is_refused_by_the_backend() {
        let (registry, _, notifier, _) = signed_in().await;
        let stranger = SessionState::Authenticated(Session {
            user: Identity { id: "someone-else".into(), email: None },
            access_token: "t".into(),
            refresh_token: None,
            expires_at: Utc::now() + chrono::Duration::hours(1),
        });
        let err = registry.register(&stranger, laptop()).await.unwrap_err();
        assert!(matches!(err, DeviceError::Backend(_)));
        assert_eq!(notifier.latest().unwrap().title, "Failed to register device");
    }
}
