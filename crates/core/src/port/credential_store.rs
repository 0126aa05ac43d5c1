// Credential Store Port

use crate::domain::CredentialHandle;
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// Resolved login material
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub secret: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
        }
    }
}

// Secrets never reach logs
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("No credential stored for handle {0}")]
    NotFound(String),

    #[error("Credential store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn resolve(&self, handle: &CredentialHandle) -> Result<Credential, CredentialError>;
}

pub mod mocks {
    use super::*;
    use std::collections::HashMap;

    /// Fixed handle -> credential map
    #[derive(Default)]
    pub struct StaticCredentialStore {
        entries: HashMap<String, Credential>,
    }

    impl StaticCredentialStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with(mut self, handle: &str, username: &str, secret: &str) -> Self {
            self.entries
                .insert(handle.to_string(), Credential::new(username, secret));
            self
        }
    }

    #[async_trait]
    impl CredentialStore for StaticCredentialStore {
        async fn resolve(&self, handle: &CredentialHandle) -> Result<Credential, CredentialError> {
            self.entries
                .get(handle.as_str())
                .cloned()
                .ok_or_else(|| CredentialError::NotFound(handle.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secret() {
        let credential = Credential::new("admin", "hunter2");
        let rendered = format!("{:?}", credential);
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("hunter2"));
    }
}
