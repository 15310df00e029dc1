use thiserror::Error;

/// Failures reported by a [`Backend`](crate::backend::Backend).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend understood the request and refused it. `message` is shown
    /// to the user verbatim.
    #[error("{message}")]
    Rejected { message: String },
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("decode error: {0}")]
    Decode(String),
}

impl BackendError {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected { message: message.into() }
    }

    /// Text suitable for a notification body.
    pub fn message(&self) -> String {
        match self {
            BackendError::Rejected { message } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<sqlx::Error> for BackendError {
    fn from(e: sqlx::Error) -> Self {
        BackendError::Storage(e.to_string())
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            BackendError::Decode(e.to_string())
        } else {
            BackendError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        BackendError::Decode(e.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("sign-in rejected: {0}")]
    Credential(String),
    #[error("sign-up rejected: {0}")]
    Registration(String),
    #[error("sign-out rejected: {0}")]
    SignOut(String),
}

impl AuthError {
    pub fn message(&self) -> &str {
        match self {
            AuthError::Credential(m) | AuthError::Registration(m) | AuthError::SignOut(m) => m,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("fetching {table} failed: {source}")]
pub struct FetchError {
    pub table: &'static str,
    pub source: BackendError,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Please fill in all fields")]
    MissingFields,
    #[error("sign in to register a device")]
    NotAuthenticated,
    #[error("{0}")]
    Backend(#[from] BackendError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Please fill in all fields")]
    MissingFields,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_message_is_verbatim() {
        let e = BackendError::rejected("Invalid login credentials");
        assert_eq!(e.message(), "Invalid login credentials");
        assert_eq!(e.to_string(), "Invalid login credentials");
    }

    #[test]
    fn fetch_error_names_table() {
        let e = FetchError { table: "devices", source: BackendError::Transport("timeout".into()) };
        assert_eq!(e.to_string(), "fetching devices failed: transport error: timeout");
    }
}
