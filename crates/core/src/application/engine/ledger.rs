// Run Ledger - coordinator-owned record of every item of one run

use crate::domain::{ExecutionItem, ItemCounts, ItemState};
use crate::error::AppError;

#[derive(Debug)]
pub(crate) struct RunLedger {
    items: Vec<ExecutionItem>,
    terminal: Vec<bool>,
    running: usize,
    completed: usize,
}

impl RunLedger {
    pub fn new(items: &[ExecutionItem]) -> Self {
        Self {
            items: items.to_vec(),
            terminal: vec![false; items.len()],
            running: 0,
            completed: 0,
        }
    }

    fn slot(&self, index: usize) -> Result<(), AppError> {
        if index >= self.items.len() {
            return Err(AppError::EngineFault(format!(
                "item index {} out of range ({} items)",
                index,
                self.items.len()
            )));
        }
        if self.terminal[index] {
            return Err(AppError::EngineFault(format!(
                "duplicate terminal transition for {}",
                self.items[index].target_id
            )));
        }
        Ok(())
    }

    /// A worker moved the item to Running
    pub fn mark_running(&mut self, item: ExecutionItem) -> Result<(), AppError> {
        self.slot(item.index)?;
        if self.items[item.index].state == ItemState::Running {
            return Err(AppError::EngineFault(format!(
                "{} started twice",
                item.target_id
            )));
        }
        self.running += 1;
        let index = item.index;
        self.items[index] = item;
        Ok(())
    }

    /// An item reached a terminal state
    pub fn record(&mut self, item: ExecutionItem) -> Result<(), AppError> {
        self.slot(item.index)?;
        if !item.state.is_terminal() {
            return Err(AppError::EngineFault(format!(
                "{} reported finished in state {}",
                item.target_id, item.state
            )));
        }
        if self.items[item.index].state == ItemState::Running {
            self.running = self.running.saturating_sub(1);
        }
        let index = item.index;
        self.terminal[index] = true;
        self.items[index] = item;
        self.completed += 1;
        Ok(())
    }

    pub fn total(&self) -> usize {
        self.items.len()
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn running(&self) -> usize {
        self.running
    }

    pub fn is_complete(&self) -> bool {
        self.completed == self.items.len()
    }

    /// Items not yet terminal, in snapshot order
    pub fn unfinished(&self) -> Vec<ExecutionItem> {
        self.items
            .iter()
            .zip(&self.terminal)
            .filter(|(_, done)| !**done)
            .map(|(item, _)| item.clone())
            .collect()
    }

    pub fn counts(&self) -> ItemCounts {
        ItemCounts::from_items(&self.items)
    }

    pub fn into_items(self) -> Vec<ExecutionItem> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Target;

    fn items(n: usize) -> Vec<ExecutionItem> {
        (0..n)
            .map(|i| ExecutionItem::new(i, &Target::new(format!("AP-{}", i), None)))
            .collect()
    }

    #[test]
    fn test_duplicate_terminal_is_fault() {
        let items = items(2);
        let mut ledger = RunLedger::new(&items);

        let mut item = items[0].clone();
        item.start(1).unwrap();
        ledger.mark_running(item.clone()).unwrap();
        assert_eq!(ledger.running(), 1);

        item.succeed(2, "ok", serde_json::json!({})).unwrap();
        ledger.record(item.clone()).unwrap();
        assert_eq!(ledger.running(), 0);
        assert_eq!(ledger.completed(), 1);

        let err = ledger.record(item).unwrap_err();
        assert!(matches!(err, AppError::EngineFault(_)));
        assert!(err.to_string().contains("duplicate terminal transition for AP-0"));
    }

    #[test]
    fn test_non_terminal_record_is_fault() {
        let items = items(1);
        let mut ledger = RunLedger::new(&items);
        assert!(ledger.record(items[0].clone()).is_err());
    }

    #[test]
    fn test_unfinished_lists_remaining() {
        let items = items(3);
        let mut ledger = RunLedger::new(&items);
        let mut skipped = items[1].clone();
        skipped.skip(1, "stopped").unwrap();
        ledger.record(skipped).unwrap();

        let ids: Vec<_> = ledger
            .unfinished()
            .into_iter()
            .map(|i| i.target_id)
            .collect();
        assert_eq!(ids, vec!["AP-0", "AP-2"]);
        assert!(!ledger.is_complete());
    }
}
