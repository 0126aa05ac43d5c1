// Operator flow for one batch run: confirm, start, watch, report

use crate::render;
use anyhow::{Context, Result};
use apbatch_core::application::{
    Confirmation, ExecutionEngine, OperationStrategy, RunController,
};
use apbatch_core::domain::{OperationConfig, RunReport, SelectionSet};
use colored::Colorize;
use std::io::{BufRead, Write};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Skip the ordinary confirmation prompt
    pub yes: bool,
    /// Acknowledge a high-risk operation without the second prompt
    pub confirm_high_risk: bool,
    /// Machine-readable report instead of live output and a table
    pub json: bool,
}

fn prompt(question: &str) -> Result<String> {
    print!("{} ", question);
    std::io::stdout().flush().context("Failed to flush stdout")?;
    let mut answer = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("Failed to read answer")?;
    Ok(answer.trim().to_string())
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Returns `None` when the operator declines
pub async fn execute(
    selection: &SelectionSet,
    strategy: Arc<dyn OperationStrategy>,
    config: OperationConfig,
    options: RunOptions,
) -> Result<Option<RunReport>> {
    if selection.is_empty() {
        anyhow::bail!("No targets selected; refine --query");
    }

    let mut controller = RunController::new(ExecutionEngine::default());
    let confirmation = controller.confirm(strategy, config)?;

    if !options.json {
        println!("{}", confirmation.description().bold());
        println!("  {} {} access points", "Targets:".bold(), selection.len());
    }

    if let Confirmation::HighRisk { risk, .. } = &confirmation {
        eprintln!("{} {}", "⚠ High-risk operation:".red().bold(), risk.summary);
        let acknowledged = options.confirm_high_risk
            || prompt("Type 'yes' to acknowledge the risk:")?.eq_ignore_ascii_case("yes");
        if !acknowledged {
            controller.cancel();
            anyhow::bail!("High-risk operation not acknowledged");
        }
        controller.acknowledge_high_risk()?;
    }

    if !options.yes && !is_yes(&prompt("Proceed? [y/N]")?) {
        controller.cancel();
        println!("{}", "Cancelled".yellow());
        return Ok(None);
    }

    let mut handle = controller.start(selection.snapshot())?;
    let mut sink = handle
        .take_sink()
        .context("Progress stream already taken")?;
    let stop = handle.stop_handle();
    info!(run_id = %handle.run_id(), "Run started");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut stopping = false;

    loop {
        tokio::select! {
            event = sink.next() => {
                let Some(event) = event else { break };
                if !options.json {
                    render::print_event(&event);
                }
                if event.is_terminal() {
                    break;
                }
            }
            signal = &mut ctrl_c, if !stopping => {
                if let Err(e) = signal {
                    warn!(error = %e, "Failed to listen for Ctrl+C");
                }
                stopping = true;
                stop.stop();
                eprintln!("{}", "Stopping: running targets finish, the rest are skipped".yellow());
            }
        }
    }

    let report = handle.wait().await?;
    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        render::print_report(&report);
    }
    Ok(Some(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use apbatch_core::application::strategy::mocks::ScriptedStrategy;
    use apbatch_core::domain::{OperationKind, Target};

    fn selection(n: usize) -> SelectionSet {
        let mut selection = SelectionSet::new();
        selection.mark((0..n).map(|i| Target::new(format!("AP-{}", i), Some(format!("10.0.0.{}", i + 1)))));
        selection
    }

    fn unattended() -> RunOptions {
        RunOptions {
            yes: true,
            confirm_high_risk: false,
            json: true,
        }
    }

    #[test]
    fn test_is_yes() {
        assert!(is_yes("y"));
        assert!(is_yes("YES"));
        assert!(!is_yes(""));
        assert!(!is_yes("no"));
    }

    #[tokio::test]
    async fn test_empty_selection_is_rejected() {
        let strategy = Arc::new(ScriptedStrategy::new(OperationKind::Connectivity));
        let result = execute(
            &SelectionSet::new(),
            strategy,
            OperationConfig::connectivity(1),
            unattended(),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_unattended_run_reports_every_target() {
        let strategy = Arc::new(ScriptedStrategy::new(OperationKind::Connectivity));
        let report = execute(
            &selection(4),
            strategy,
            OperationConfig::connectivity(1).with_parallelism(2),
            unattended(),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(report.total, 4);
        assert_eq!(report.counts.success, 4);
        assert!(report.is_consistent());
    }
}
