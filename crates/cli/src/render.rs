// Terminal rendering of run events, reports and inventory

use apbatch_core::domain::{ExecutionItem, ItemState, RunEvent, RunOutcome, RunReport, Target};
use colored::Colorize;
use tabled::{Table, Tabled};

/// Status column width before truncation
const REASON_WIDTH: usize = 60;

#[derive(Tabled)]
struct ItemRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "AP")]
    target: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Time")]
    duration: String,
    #[tabled(rename = "Result")]
    reason: String,
}

#[derive(Tabled)]
struct TargetRow {
    #[tabled(rename = "AP")]
    id: String,
    #[tabled(rename = "Store")]
    store: String,
    #[tabled(rename = "Alias")]
    alias: String,
    #[tabled(rename = "Chain")]
    chain: String,
    #[tabled(rename = "IP")]
    address: String,
    #[tabled(rename = "MAC")]
    mac: String,
}

fn or_dash(value: Option<&str>) -> String {
    value.unwrap_or("-").to_string()
}

pub fn truncate(text: &str, width: usize) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() <= width && !text.contains('\n') {
        return line.to_string();
    }
    let cut: String = line.chars().take(width.saturating_sub(3)).collect();
    format!("{}...", cut)
}

fn item_reason(item: &ExecutionItem) -> String {
    item.reason
        .as_deref()
        .or(item.error.as_deref())
        .unwrap_or_default()
        .to_string()
}

fn state_label(state: ItemState) -> String {
    let label = state.to_string();
    match state {
        ItemState::Success => label.green().to_string(),
        ItemState::Failed => label.red().to_string(),
        ItemState::Skipped => label.yellow().to_string(),
        ItemState::Running => label.cyan().to_string(),
        ItemState::Pending => label.dimmed().to_string(),
    }
}

/// One line per event, as it arrives
pub fn print_event(event: &RunEvent) {
    match event {
        RunEvent::Started {
            kind,
            total,
            workers,
            ..
        } => {
            println!(
                "{}",
                format!("▶ {} on {} targets ({} workers)", kind, total, workers)
                    .cyan()
                    .bold()
            );
        }
        RunEvent::ItemUpdated { item } => {
            let reason = truncate(&item_reason(item), REASON_WIDTH);
            match item.state {
                ItemState::Running => println!("  {} {}", "…".dimmed(), item.target_id.dimmed()),
                ItemState::Success => println!("  {} {} {}", "✓".green(), item.target_id, reason),
                ItemState::Failed => println!("  {} {} {}", "✗".red(), item.target_id, reason.red()),
                ItemState::Skipped => {
                    println!("  {} {} {}", "○".yellow(), item.target_id, reason.yellow())
                }
                ItemState::Pending => {}
            }
        }
        RunEvent::Activity {
            target_id, message, ..
        } => {
            println!("    {} {}", format!("{}:", target_id).dimmed(), message.dimmed());
        }
        RunEvent::Progress { message, .. } => {
            println!("{}", message.bold());
        }
        RunEvent::Fault { message } => {
            println!("{} {}", "✗ Run aborted:".red().bold(), message);
        }
        RunEvent::Completed { .. } => {}
    }
}

/// Final per-target table plus the summary line
pub fn print_report(report: &RunReport) {
    let rows: Vec<ItemRow> = report
        .items
        .iter()
        .map(|item| ItemRow {
            index: item.index + 1,
            target: item.target_id.clone(),
            address: or_dash(item.address.as_deref()),
            state: state_label(item.state),
            duration: item
                .duration_ms()
                .map(|ms| format!("{:.1}s", ms as f64 / 1000.0))
                .unwrap_or_else(|| "-".to_string()),
            reason: truncate(&item_reason(item), REASON_WIDTH),
        })
        .collect();

    println!();
    println!("{}", Table::new(rows));
    println!();

    let summary = report.summary();
    match &report.outcome {
        RunOutcome::Finished if report.counts.failed == 0 => println!("{}", summary.green().bold()),
        RunOutcome::Finished => println!("{}", summary.yellow().bold()),
        RunOutcome::Stopped => println!("{} {}", "■ Stopped.".yellow().bold(), summary),
        RunOutcome::Aborted { reason } => {
            println!("{} {}", "✗ Aborted:".red().bold(), reason);
            println!("{}", summary);
        }
    }
}

pub fn print_targets(targets: &[Target]) {
    if targets.is_empty() {
        println!("{}", "No access points found".yellow());
        return;
    }
    let rows: Vec<TargetRow> = targets
        .iter()
        .map(|t| TargetRow {
            id: t.id.clone(),
            store: or_dash(t.store_id.as_deref()),
            alias: or_dash(t.store_alias.as_deref()),
            chain: or_dash(t.retail_chain.as_deref()),
            address: or_dash(t.address()),
            mac: or_dash(t.mac_address.as_deref()),
        })
        .collect();
    println!("{}", Table::new(rows));
}
