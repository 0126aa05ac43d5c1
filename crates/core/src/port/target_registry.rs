// Target Registry Port
// Read access to the fleet inventory used to build selections

use crate::domain::{Target, TargetId};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Registry unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

/// Free-text search over the inventory
#[derive(Debug, Clone, Default)]
pub struct TargetQuery {
    /// Matched as a substring against id, address, MAC, store id and alias
    pub text: String,
    pub limit: Option<usize>,
}

impl TargetQuery {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, target: &Target) -> bool {
        let needle = self.text.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        let fields = [
            Some(target.id.as_str()),
            target.address.as_deref(),
            target.mac_address.as_deref(),
            target.store_id.as_deref(),
            target.store_alias.as_deref(),
        ];
        fields
            .into_iter()
            .flatten()
            .any(|f| f.to_lowercase().contains(&needle))
    }
}

/// Inventory lookups, ordered by target id
#[async_trait]
pub trait TargetRegistry: Send + Sync {
    async fn search(&self, query: &TargetQuery) -> Result<Vec<Target>, RegistryError>;

    async fn find(&self, id: &TargetId) -> Result<Option<Target>, RegistryError>;
}

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// In-memory inventory
    #[derive(Default)]
    pub struct InMemoryTargetRegistry {
        targets: Mutex<Vec<Target>>,
    }

    impl InMemoryTargetRegistry {
        pub fn new(targets: Vec<Target>) -> Self {
            Self {
                targets: Mutex::new(targets),
            }
        }

        pub fn insert(&self, target: Target) {
            self.targets.lock().unwrap().push(target);
        }
    }

    #[async_trait]
    impl TargetRegistry for InMemoryTargetRegistry {
        async fn search(&self, query: &TargetQuery) -> Result<Vec<Target>, RegistryError> {
            let mut found: Vec<Target> = self
                .targets
                .lock()
                .unwrap()
                .iter()
                .filter(|t| query.matches(t))
                .cloned()
                .collect();
            found.sort_by(|a, b| a.id.cmp(&b.id));
            if let Some(limit) = query.limit {
                found.truncate(limit);
            }
            Ok(found)
        }

        async fn find(&self, id: &TargetId) -> Result<Option<Target>, RegistryError> {
            Ok(self
                .targets
                .lock()
                .unwrap()
                .iter()
                .find(|t| &t.id == id)
                .cloned())
        }
    }
}
