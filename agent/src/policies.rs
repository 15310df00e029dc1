use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use common::{Policy, PolicyForm, PolicyStatus, PolicyType};
use log::info;
use tokio::sync::RwLock;

use crate::error::PolicyError;
use crate::notify::Notifier;

/// Access policies. Held in memory only and reseeded on every start.
#[derive(Clone)]
pub struct PolicyBook {
    policies: Arc<RwLock<Vec<Policy>>>,
    notifier: Notifier,
}

fn seed(id: &str, name: &str, description: &str, policy_type: PolicyType, status: PolicyStatus, applies_to: &str, created: (i32, u32, u32)) -> Option<Policy> {
    Some(Policy {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        policy_type,
        status,
        applies_to: applies_to.to_string(),
        created_at: NaiveDate::from_ymd_opt(created.0, created.1, created.2)?,
    })
}

fn builtin() -> Vec<Policy> {
    [
        seed(
            "1",
            "MFA Required for Admin Access",
            "All admin users must complete multi-factor authentication before accessing sensitive resources",
            PolicyType::Access,
            PolicyStatus::Active,
            "Admin users",
            (2024, 1, 15),
        ),
        seed(
            "2",
            "Compliant Devices Only",
            "Only devices with latest security patches and approved OS versions can connect",
            PolicyType::Device,
            PolicyStatus::Active,
            "All devices",
            (2024, 1, 10),
        ),
        seed(
            "3",
            "Geographic Restrictions",
            "Block access attempts from high-risk geographic locations",
            PolicyType::Network,
            PolicyStatus::Active,
            "All users",
            (2024, 1, 8),
        ),
        seed(
            "4",
            "Business Hours Only",
            "Restrict database access to business hours (9 AM - 6 PM)",
            PolicyType::Time,
            PolicyStatus::Inactive,
            "Database users",
            (2024, 1, 5),
        ),
    ]
    .into_iter()
    .flatten()
    .collect()
}

impl PolicyBook {
    pub fn new(notifier: Notifier) -> Self {
        Self {
            policies: Arc::new(RwLock::new(builtin())),
            notifier,
        }
    }

    /// In creation order.
    pub async fn list(&self) -> Vec<Policy> {
        self.policies.read().await.clone()
    }

    pub async fn active_count(&self) -> usize {
        self.policies
            .read()
            .await
            .iter()
            .filter(|p| p.status == PolicyStatus::Active)
            .count()
    }

    pub async fn create(&self, form: PolicyForm) -> Result<Policy, PolicyError> {
        let name = form.name.trim();
        let description = form.description.trim();
        let applies_to = form.applies_to.trim();
        if name.is_empty() || description.is_empty() || applies_to.is_empty() {
            self.notifier.error("Please fill in all fields", "");
            return Err(PolicyError::MissingFields);
        }

        let mut policies = self.policies.write().await;
        let policy = Policy {
            id: (policies.len() + 1).to_string(),
            name: name.to_string(),
            description: description.to_string(),
            policy_type: form.policy_type.unwrap_or(PolicyType::Access),
            status: PolicyStatus::Active,
            applies_to: applies_to.to_string(),
            created_at: Utc::now().date_naive(),
        };
        policies.push(policy.clone());
        drop(policies);

        info!("Created policy {} ({})", policy.name, policy.id);
        self.notifier.success("Policy created successfully", &policy.name);
        Ok(policy)
    }
}
