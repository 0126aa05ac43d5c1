// Tab Batches - bounded, batch-recycled browser tab pool
//
// Targets are admitted into the current batch until the budget is reached.
// When the last member of a batch finishes, that member closes every tab of
// the batch and only then is the next batch admitted.

use crate::domain::CancelToken;
use crate::port::TabId;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct BatchState {
    batch: u64,
    admitted: usize,
    active: usize,
    closing: bool,
    tabs: Vec<TabId>,
}

#[derive(Debug)]
pub struct TabBatches {
    budget: usize,
    state: Mutex<BatchState>,
    advanced: watch::Sender<u64>,
}

impl TabBatches {
    pub fn new(budget: usize) -> Arc<Self> {
        let (advanced, _) = watch::channel(0);
        Arc::new(Self {
            budget: budget.max(1),
            state: Mutex::new(BatchState::default()),
            advanced,
        })
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    fn state(&self) -> MutexGuard<'_, BatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for a place in the current batch
    ///
    /// Returns `None` if `cancel` fires while waiting.
    pub async fn admit(self: &Arc<Self>, cancel: &CancelToken) -> Option<BatchSlot> {
        loop {
            // Subscribe before checking so an advance in between is not missed
            let mut advanced = self.advanced.subscribe();
            {
                let mut state = self.state();
                if !state.closing && state.admitted < self.budget {
                    state.admitted += 1;
                    state.active += 1;
                    return Some(BatchSlot {
                        pool: Arc::clone(self),
                        batch: state.batch,
                        released: false,
                    });
                }
            }
            tokio::select! {
                changed = advanced.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
                _ = cancel.cancelled() => return None,
            }
        }
    }

    fn release(self: &Arc<Self>) -> Option<BatchCloser> {
        let mut state = self.state();
        state.active = state.active.saturating_sub(1);
        if state.active > 0 {
            return None;
        }
        state.closing = true;
        Some(BatchCloser {
            pool: Arc::clone(self),
            batch: state.batch,
            tabs: std::mem::take(&mut state.tabs),
        })
    }

    fn advance(&self) {
        let batch = {
            let mut state = self.state();
            state.batch += 1;
            state.admitted = 0;
            state.active = 0;
            state.closing = false;
            state.batch
        };
        debug!(batch, "Tab batch advanced");
        self.advanced.send_replace(batch);
    }

    /// Index of the batch currently admitting
    pub fn current_batch(&self) -> u64 {
        self.state().batch
    }

    pub fn open_tabs(&self) -> usize {
        self.state().tabs.len()
    }
}

/// Membership of one target in a batch
#[derive(Debug)]
pub struct BatchSlot {
    pool: Arc<TabBatches>,
    batch: u64,
    released: bool,
}

impl BatchSlot {
    pub fn batch(&self) -> u64 {
        self.batch
    }

    /// Record a tab to be closed with this batch
    pub fn register_tab(&self, tab: TabId) {
        self.pool.state().tabs.push(tab);
    }

    /// Leave the batch; the last member receives the closer
    pub fn finish(mut self) -> Option<BatchCloser> {
        self.released = true;
        self.pool.release()
    }
}

impl Drop for BatchSlot {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        // Unwound without finishing; the batch must still advance
        if let Some(closer) = self.pool.release() {
            warn!(
                batch = closer.batch,
                tabs = closer.tabs.len(),
                "Tab batch released without closing its tabs"
            );
        }
    }
}

/// Tabs to close before the next batch; advances the pool when dropped
#[derive(Debug)]
pub struct BatchCloser {
    pool: Arc<TabBatches>,
    batch: u64,
    tabs: Vec<TabId>,
}

impl BatchCloser {
    pub fn batch(&self) -> u64 {
        self.batch
    }

    pub fn tabs(&self) -> &[TabId] {
        &self.tabs
    }
}

impl Drop for BatchCloser {
    fn drop(&mut self) {
        self.pool.advance();
    }
}
