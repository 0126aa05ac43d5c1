// Application Layer - Run lifecycle, engine, strategies and progress

pub mod controller;
pub mod engine;
pub mod sink;
pub mod strategy;

// Re-exports
pub use controller::{Confirmation, RunController};
pub use engine::{ExecutionEngine, RunHandle};
pub use sink::{progress_channel, ProgressPublisher, ProgressRow, ProgressSink, ProgressTable};
pub use strategy::{
    ActivityReporter, BrowserAction, ConnectivityProbe, OperationStrategy, RemoteCommand,
    RiskAssessment, RiskPolicy, Strategy, StrategyOutcome, TargetError, Verdict,
};
