// Domain Layer - Targets, selection, run records and events

pub mod cancel;
pub mod config;
pub mod error;
pub mod event;
pub mod item;
pub mod selection;
pub mod target;

// Re-exports
pub use cancel::{stop_channel, CancelToken, StopHandle};
pub use config::{BrowserActionKind, OperationConfig, OperationKind, OperationSettings};
pub use error::DomainError;
pub use event::{ItemCounts, RunEvent, RunId, RunOutcome, RunReport, RunStatus};
pub use item::{ExecutionItem, ItemState};
pub use selection::{SelectionSet, Snapshot};
pub use target::{CredentialHandle, Target, TargetId};
