use std::sync::Arc;

use common::{AttemptStatus, AuthAttempt};
use log::{error, info, warn};

use crate::audit::AuditQueue;
use crate::backend::Backend;
use crate::error::AuthError;
use crate::notify::Notifier;

/// Credential submission on top of the backend, with user-facing
/// notifications and audit entries for every transition.
#[derive(Clone)]
pub struct AuthGateway {
    backend: Arc<dyn Backend>,
    audit: AuditQueue,
    notifier: Notifier,
    redirect_url: String,
    device: String,
}

impl AuthGateway {
    pub fn new(backend: Arc<dyn Backend>, audit: AuditQueue, notifier: Notifier, redirect_url: String, device: String) -> Self {
        Self { backend, audit, notifier, redirect_url, device }
    }

    fn attempt(&self, action: &str, email: &str, status: AttemptStatus, reason: &str) -> AuthAttempt {
        AuthAttempt::new(action, email, status, reason, self.device.clone())
    }

    /// On success the session arrives through the backend's `SignedIn` push,
    /// not through this call.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), AuthError> {
        if let Err(e) = self.backend.sign_in_with_password(email, password).await {
            let message = e.message();
            self.audit
                .record(self.attempt("Login Attempt", email, AttemptStatus::Denied, &message))
                .await;
            self.notifier.error("Login Failed", &message);
            error!("Sign in error: {}", message);
            return Err(AuthError::Credential(message));
        }

        self.notifier.success("Welcome back!", "You've successfully logged in.");
        Ok(())
    }

    /// Registers an account. Does not sign the user in.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<(), AuthError> {
        if let Err(e) = self.backend.sign_up(email, password, &self.redirect_url).await {
            let message = e.message();
            self.audit
                .record(self.attempt("Signup Attempt", email, AttemptStatus::Denied, &message))
                .await;
            self.notifier.error("Signup Failed", &message);
            error!("Sign up error: {}", message);
            return Err(AuthError::Registration(message));
        }

        self.audit
            .record(self.attempt("Signup", email, AttemptStatus::Success, "Account created successfully"))
            .await;
        info!("Account created for {}", email);
        self.notifier.success("Account created!", "You can now log in with your credentials.");
        Ok(())
    }

    /// Failures are reported to the user, never to the caller. The local
    /// session is cleared by the backend's `SignedOut` push.
    pub async fn sign_out(&self) {
        match self.backend.sign_out().await {
            Ok(()) => {
                self.notifier.success("Signed out", "You've been successfully signed out.");
            }
            Err(e) => {
                let err = AuthError::SignOut(e.message());
                warn!("{}", err);
                self.notifier.error("Error signing out", err.message());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::DeadLetterLog;
    use crate::backend::{LocalBackend, Table};
    use crate::storage::Storage;
    use common::NotificationVariant;

    struct Fixture {
        gateway: AuthGateway,
        backend: Arc<LocalBackend>,
        notifier: Notifier,
        audit: AuditQueue,
    }

    async fn fixture() -> Fixture {
        let storage = Storage::in_memory().await.unwrap();
        let backend = Arc::new(LocalBackend::new(storage.clone(), chrono::Duration::hours(1), true));
        let (audit, _) = AuditQueue::start(backend.clone(), DeadLetterLog::new(storage), 8);
        let notifier = Notifier::new(16);
        let gateway = AuthGateway::new(
            backend.clone(),
            audit.clone(),
            notifier.clone(),
            "http://localhost:8080/".into(),
            "Linux".into(),
        );
        Fixture { gateway, backend, notifier, audit }
    }

    #[tokio::test]
    async fn bad_sign_in_is_audited_denied_and_surfaced_verbatim() {
        let f = fixture().await;
        let err = f.gateway.sign_in("bad@example.com", "wrong").await.unwrap_err();
        assert_eq!(err, AuthError::Credential("Invalid login credentials".into()));

        let toast = f.notifier.latest().unwrap();
        assert_eq!(toast.title, "Login Failed");
        assert_eq!(toast.description, "Invalid login credentials");
        assert_eq!(toast.variant, NotificationVariant::Destructive);

        let logs = f.backend.select_all(Table::ActivityLogs).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0]["email"], "bad@example.com");
        assert_eq!(logs[0]["action"], "Login Attempt");
        assert_eq!(logs[0]["status"], "denied");
        assert_eq!(logs[0]["reason"], "Invalid login credentials");
    }

    #[tokio::test]
    async fn sign_up_records_one_success_entry_before_confirming() {
        let f = fixture().await;
        f.gateway.sign_up("new@example.com", "hunter22").await.unwrap();

        // By the time the confirmation is visible the entry is already stored.
        assert_eq!(f.notifier.latest().unwrap().title, "Account created!");
        let logs = f.backend.select_all(Table::ActivityLogs).await.unwrap();
        let signups: Vec<_> = logs.iter().filter(|l| l["action"] == "Signup").collect();
        assert_eq!(signups.len(), 1);
        assert_eq!(signups[0]["status"], "success");
        assert_eq!(logs.len(), 1);

        assert_eq!(f.backend.get_session().await.unwrap(), None);
    }

    #[tokio::test]
    async fn rejected_sign_up_is_a_registration_error() {
        let f = fixture().await;
        f.gateway.sign_up("dup@example.com", "hunter22").await.unwrap();
        let err = f.gateway.sign_up("dup@example.com", "hunter22").await.unwrap_err();
        assert_eq!(err, AuthError::Registration("User already registered".into()));
        assert_eq!(f.notifier.latest().unwrap().title, "Signup Failed");

        let logs = f.backend.select_all(Table::ActivityLogs).await.unwrap();
        assert_eq!(logs[0]["action"], "Signup Attempt");
        assert_eq!(logs[0]["status"], "denied");
    }

    #[tokio::test]
    async fn good_sign_in_welcomes_without_writing_a_denied_entry() {
        let f = fixture().await;
        f.gateway.sign_up("a@example.com", "hunter22").await.unwrap();
        f.gateway.sign_in("a@example.com", "hunter22").await.unwrap();
        assert_eq!(f.notifier.latest().unwrap().title, "Welcome back!");

        f.audit.flush().await;
        let logs = f.backend.select_all(Table::ActivityLogs).await.unwrap();
        assert!(logs.iter().all(|l| l["status"] == "success"));
    }

    #[tokio::test]
    async fn sign_out_notifies() {
        let f = fixture().await;
        f.gateway.sign_up("a@example.com", "hunter22").await.unwrap();
        f.gateway.sign_in("a@example.com", "hunter22").await.unwrap();
        f.gateway.sign_out().await;
        assert_eq!(f.notifier.latest().unwrap().title, "Signed out");
    }
}
