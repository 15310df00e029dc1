//! Wire format between `ztd-cli` and the agent: one JSON request per
//! connection, answered by one JSON line.

use serde::{Deserialize, Serialize};

use crate::routes::{GuardOutcome, Route};
use crate::types::{DeviceForm, PolicyForm};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum IpcRequest {
    Status,
    Navigate { path: String },
    SignIn { email: String, password: String },
    SignUp { email: String, password: String },
    SignOut,
    Whoami,
    Users,
    Devices,
    RegisterDevice(DeviceForm),
    Policies,
    CreatePolicy(PolicyForm),
    Activity {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<usize>,
    },
    Alerts,
    ResolveAlert { id: String },
    Notifications {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<usize>,
    },
    DeadLetters {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<i64>,
    },
    Dashboard,
}

impl IpcRequest {
    /// The page a request belongs to, if it is gated by a route guard.
    pub fn route(&self) -> Option<Route> {
        match self {
            IpcRequest::SignIn { .. } | IpcRequest::SignUp { .. } => Some(Route::Auth),
            IpcRequest::Users => Some(Route::Users),
            IpcRequest::Devices | IpcRequest::RegisterDevice(_) => Some(Route::Devices),
            IpcRequest::Policies | IpcRequest::CreatePolicy(_) => Some(Route::Policies),
            IpcRequest::Activity { .. } => Some(Route::Activity),
            IpcRequest::Alerts | IpcRequest::ResolveAlert { .. } => Some(Route::Alerts),
            IpcRequest::Dashboard => Some(Route::Dashboard),
            IpcRequest::Status
            | IpcRequest::Navigate { .. }
            | IpcRequest::SignOut
            | IpcRequest::Whoami
            | IpcRequest::Notifications { .. }
            | IpcRequest::DeadLetters { .. } => None,
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            IpcRequest::Status => "status",
            IpcRequest::Navigate { .. } => "navigate",
            IpcRequest::SignIn { .. } => "sign_in",
            IpcRequest::SignUp { .. } => "sign_up",
            IpcRequest::SignOut => "sign_out",
            IpcRequest::Whoami => "whoami",
            IpcRequest::Users => "users",
            IpcRequest::Devices => "devices",
            IpcRequest::RegisterDevice(_) => "register_device",
            IpcRequest::Policies => "policies",
            IpcRequest::CreatePolicy(_) => "create_policy",
            IpcRequest::Activity { .. } => "activity",
            IpcRequest::Alerts => "alerts",
            IpcRequest::ResolveAlert { .. } => "resolve_alert",
            IpcRequest::Notifications { .. } => "notifications",
            IpcRequest::DeadLetters { .. } => "dead_letters",
            IpcRequest::Dashboard => "dashboard",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct IpcResponse {
    pub success: bool,
    pub data: serde_json::Value,
}

impl IpcResponse {
    pub fn ok(data: serde_json::Value) -> Self {
        Self { success: true, data }
    }

    pub fn error(message: impl std::fmt::Display) -> Self {
        Self { success: false, data: serde_json::json!({ "error": message.to_string() }) }
    }

    /// Error text, or the guard outcome when a page refused the request.
    pub fn error_message(&self) -> Option<String> {
        if self.success {
            return None;
        }
        if let Some(message) = self.data.get("error").and_then(|e| e.as_str()) {
            return Some(message.to_string());
        }
        let guard = self
            .data
            .get("guard")
            .and_then(|g| serde_json::from_value::<GuardOutcome>(g.clone()).ok());
        Some(match guard {
            Some(GuardOutcome::Redirect(route)) => format!("Redirected to {}", route.path()),
            Some(GuardOutcome::Placeholder) => "Please wait, the session is still loading".to_string(),
            _ => "Request failed".to_string(),
        })
    }
}
