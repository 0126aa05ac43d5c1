// Selection Set - operator-owned accumulation of marked targets

use super::target::{Target, TargetId};
use std::collections::HashSet;
use std::sync::Arc;

/// Immutable, ordered copy of the selection frozen at run start
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    targets: Arc<[Arc<Target>]>,
}

impl Snapshot {
    pub fn from_targets<I>(targets: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Arc<Target>>,
    {
        let targets: Vec<Arc<Target>> = targets.into_iter().map(Into::into).collect();
        Self {
            targets: targets.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<Target>> {
        self.targets.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Target>> {
        self.targets.iter()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.targets.iter().map(|t| t.id.as_str()).collect()
    }
}

/// Marked targets awaiting an operation
///
/// Never touched by worker tasks, so it needs no internal locking.
#[derive(Debug, Default)]
pub struct SelectionSet {
    order: Vec<Arc<Target>>,
    ids: HashSet<TargetId>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Union `targets` into the set, returning the new total
    pub fn mark<I>(&mut self, targets: I) -> usize
    where
        I: IntoIterator,
        I::Item: Into<Arc<Target>>,
    {
        for target in targets {
            let target: Arc<Target> = target.into();
            if self.ids.insert(target.id.clone()) {
                self.order.push(target);
            }
        }
        self.order.len()
    }

    /// Remove the given identities if present, returning the remaining total
    pub fn unmark<I, S>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut removed = false;
        for id in ids {
            removed |= self.ids.remove(id.as_ref());
        }
        if removed {
            let ids = &self.ids;
            self.order.retain(|t| ids.contains(&t.id));
        }
        self.order.len()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.ids.clear();
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            targets: self.order.clone().into(),
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Target>> {
        self.order.iter()
    }
}
