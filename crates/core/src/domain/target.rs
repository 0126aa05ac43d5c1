// Target Domain Model

use serde::{Deserialize, Serialize};
use std::fmt;

/// Target identity (the access point id)
pub type TargetId = String;

pub const DEFAULT_SSH_PORT: u16 = 22;

fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}

/// Opaque reference into the credential store
///
/// Never carries the secret itself; strategies resolve it at execution time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialHandle(String);

impl CredentialHandle {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CredentialHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Managed device addressed by a batch operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,
    #[serde(default)]
    pub address: Option<String>,

    // Display fields
    #[serde(default)]
    pub store_id: Option<String>,
    #[serde(default)]
    pub store_alias: Option<String>,
    #[serde(default)]
    pub retail_chain: Option<String>,
    #[serde(default)]
    pub mac_address: Option<String>,

    // Capability-specific access
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
    #[serde(default)]
    pub ssh_credential: Option<CredentialHandle>,
    #[serde(default)]
    pub web_credential: Option<CredentialHandle>,
}

impl Target {
    pub fn new(id: impl Into<String>, address: Option<String>) -> Self {
        Self {
            id: id.into(),
            address,
            store_id: None,
            store_alias: None,
            retail_chain: None,
            mac_address: None,
            ssh_port: DEFAULT_SSH_PORT,
            ssh_credential: None,
            web_credential: None,
        }
    }

    pub fn with_store(mut self, store_id: impl Into<String>) -> Self {
        self.store_id = Some(store_id.into());
        self
    }

    pub fn with_ssh_credential(mut self, handle: CredentialHandle) -> Self {
        self.ssh_credential = Some(handle);
        self
    }

    pub fn with_web_credential(mut self, handle: CredentialHandle) -> Self {
        self.web_credential = Some(handle);
        self
    }

    /// Usable address, ignoring blank values left by the registry
    pub fn address(&self) -> Option<&str> {
        self.address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
    }
}
