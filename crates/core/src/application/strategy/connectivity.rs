// Connectivity Probe Strategy

use super::{ActivityReporter, OperationStrategy, StrategyOutcome, TargetError};
use crate::application::engine::constants::{ITEM_BUDGET_GRACE, STOPPED_BEFORE_START};
use crate::domain::{CancelToken, OperationConfig, OperationKind, OperationSettings, Target};
use crate::port::{DeviceStatus, DeviceStatusReporter, ReachabilityProber, StatusReport};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Minimum spacing between the start of consecutive probes
pub const PROBE_PACING: Duration = Duration::from_secs(1);

pub struct ConnectivityProbe {
    prober: Arc<dyn ReachabilityProber>,
    status: Arc<dyn DeviceStatusReporter>,
    pacing: Duration,
}

impl ConnectivityProbe {
    pub fn new(prober: Arc<dyn ReachabilityProber>, status: Arc<dyn DeviceStatusReporter>) -> Self {
        Self {
            prober,
            status,
            pacing: PROBE_PACING,
        }
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    fn probe_count(config: &OperationConfig) -> Result<u32, TargetError> {
        match config.settings {
            OperationSettings::Connectivity { probe_count } => Ok(probe_count),
            _ => Err(TargetError::Internal(
                "connectivity strategy given foreign settings".to_string(),
            )),
        }
    }
}

/// Tally of one target's probe series
#[derive(Debug, Default)]
struct ProbeTally {
    sent: u32,
    received: u32,
    latencies_ms: Vec<f64>,
}

impl ProbeTally {
    fn loss_percent(&self) -> f64 {
        if self.sent == 0 {
            return 100.0;
        }
        f64::from(self.sent - self.received) / f64::from(self.sent) * 100.0
    }

    fn avg_latency_ms(&self) -> Option<f64> {
        if self.latencies_ms.is_empty() {
            return None;
        }
        Some(self.latencies_ms.iter().sum::<f64>() / self.latencies_ms.len() as f64)
    }

    fn reason(&self) -> String {
        match self.avg_latency_ms() {
            None => "All probes failed".to_string(),
            Some(avg) if self.received == self.sent => format!("Online ({:.1}ms avg)", avg),
            Some(avg) => format!("{:.0}% loss ({:.1}ms avg)", self.loss_percent(), avg),
        }
    }
}

#[async_trait]
impl OperationStrategy for ConnectivityProbe {
    fn kind(&self) -> OperationKind {
        OperationKind::Connectivity
    }

    fn item_budget(&self, config: &OperationConfig) -> Option<Duration> {
        let count = Self::probe_count(config).unwrap_or(1);
        Some((config.timeout + self.pacing) * count + ITEM_BUDGET_GRACE)
    }

    fn describe(&self, config: &OperationConfig) -> String {
        let count = Self::probe_count(config).unwrap_or(0);
        format!(
            "Ping all marked APs ({} probe(s) each, {}s timeout, {} in parallel)",
            count,
            config.timeout.as_secs_f64(),
            config.parallelism
        )
    }

    async fn execute(
        &self,
        target: &Target,
        config: &OperationConfig,
        cancel: &CancelToken,
        activity: &ActivityReporter,
    ) -> Result<StrategyOutcome, TargetError> {
        if cancel.is_cancelled() {
            return Ok(StrategyOutcome::skipped(STOPPED_BEFORE_START));
        }
        let address = target.address().ok_or(TargetError::MissingAddress)?;
        let count = Self::probe_count(config)?;

        let mut tally = ProbeTally::default();
        let mut stopped = false;

        for attempt in 1..=count {
            let started = Instant::now();

            let reply = tokio::select! {
                r = self.prober.probe(address, config.timeout) => r,
                _ = cancel.cancelled() => {
                    stopped = true;
                    break;
                }
            };
            tally.sent += 1;

            match reply {
                Ok(Some(rtt)) => {
                    let ms = rtt.as_secs_f64() * 1000.0;
                    tally.received += 1;
                    tally.latencies_ms.push(ms);
                    activity.report(format!("Probe {}/{} reply ({:.1}ms)", attempt, count, ms));
                }
                Ok(None) => {
                    activity.report(format!("Probe {}/{} lost", attempt, count));
                }
                Err(e) => {
                    // Errors count as loss
                    warn!(target_id = %target.id, error = %e, "Probe failed");
                    activity.report(format!("Probe {}/{} error: {}", attempt, count, e));
                }
            }

            if attempt < count {
                let pause = self.pacing.saturating_sub(started.elapsed());
                tokio::select! {
                    _ = tokio::time::sleep(pause) => {}
                    _ = cancel.cancelled() => {
                        stopped = true;
                        break;
                    }
                }
            }
        }

        if tally.sent == 0 {
            return Ok(StrategyOutcome::skipped("Stopped before first probe"));
        }

        let avg = tally.avg_latency_ms();
        let status = if tally.received > 0 {
            DeviceStatus::Online
        } else {
            DeviceStatus::Offline
        };
        self.status.report_status(StatusReport {
            target_id: target.id.clone(),
            status,
            latency_ms: avg,
        });

        let mut reason = tally.reason();
        if stopped {
            reason.push_str(&format!(" (stopped after {}/{})", tally.sent, count));
        }
        debug!(
            target_id = %target.id,
            sent = tally.sent,
            received = tally.received,
            status = status.as_str(),
            "Probe series finished"
        );

        let payload = json!({
            "sent": tally.sent,
            "received": tally.received,
            "loss_percent": tally.loss_percent(),
            "avg_latency_ms": avg,
        });

        if tally.received > 0 {
            Ok(StrategyOutcome::pass(reason, payload))
        } else {
            Ok(StrategyOutcome::fail(reason, payload))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::strategy::Verdict;
    use crate::domain::stop_channel;
    use crate::port::device_status::mocks::RecordingStatusReporter;
    use crate::port::device_status::MockDeviceStatusReporter;
    use crate::port::reachability::mocks::{ProbeReply, ScriptedReachability};

    fn ms(n: u64) -> ProbeReply {
        ProbeReply::Reply(Duration::from_millis(n))
    }

    fn strategy(
        prober: ScriptedReachability,
    ) -> (ConnectivityProbe, Arc<ScriptedReachability>, Arc<RecordingStatusReporter>) {
        let prober = Arc::new(prober);
        let status = Arc::new(RecordingStatusReporter::default());
        let s = ConnectivityProbe::new(prober.clone(), status.clone()).with_pacing(Duration::ZERO);
        (s, prober, status)
    }

    fn ap(ip: Option<&str>) -> Target {
        Target::new("AP-1", ip.map(str::to_string))
    }

    #[tokio::test]
    async fn test_all_replies_online() {
        let (s, prober, status) =
            strategy(ScriptedReachability::new().script("10.0.0.1", vec![ms(2), ms(4)]));
        let config = OperationConfig::connectivity(4);

        let outcome = s
            .execute(&ap(Some("10.0.0.1")), &config, &CancelToken::never(), &ActivityReporter::detached())
            .await
            .unwrap();

        assert_eq!(outcome.verdict, Verdict::Pass);
        assert_eq!(prober.call_count("10.0.0.1"), 4);
        assert_eq!(outcome.payload["received"], 4);
        assert_eq!(outcome.payload["loss_percent"], 0.0);
        assert!(outcome.reason.starts_with("Online ("));
        assert_eq!(status.status_of("AP-1"), Some(DeviceStatus::Online));
    }

    #[tokio::test]
    async fn test_partial_loss_still_passes() {
        let (s, _, _) = strategy(ScriptedReachability::new().script(
            "10.0.0.1",
            vec![ms(2), ProbeReply::Lost, ProbeReply::Error("boom".into()), ms(4)],
        ));
        let outcome = s
            .execute(
                &ap(Some("10.0.0.1")),
                &OperationConfig::connectivity(4),
                &CancelToken::never(),
                &ActivityReporter::detached(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.verdict, Verdict::Pass);
        assert_eq!(outcome.reason, "50% loss (3.0ms avg)");
        assert_eq!(outcome.payload["avg_latency_ms"], 3.0);
    }

    #[tokio::test]
    async fn test_all_lost_reports_offline() {
        let (s, _, status) = strategy(ScriptedReachability::new().always_down("10.0.0.1"));
        let outcome = s
            .execute(
                &ap(Some("10.0.0.1")),
                &OperationConfig::connectivity(2),
                &CancelToken::never(),
                &ActivityReporter::detached(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.verdict, Verdict::Fail);
        assert_eq!(outcome.reason, "All probes failed");
        assert!(outcome.payload["avg_latency_ms"].is_null());
        assert_eq!(status.status_of("AP-1"), Some(DeviceStatus::Offline));
    }

    #[tokio::test]
    async fn test_missing_address_sends_no_report() {
        let prober = Arc::new(ScriptedReachability::new());
        let mut status = MockDeviceStatusReporter::new();
        status.expect_report_status().never();
        let s = ConnectivityProbe::new(prober, Arc::new(status));

        let err = s
            .execute(
                &ap(None),
                &OperationConfig::connectivity(4),
                &CancelToken::never(),
                &ActivityReporter::detached(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No IP address");
    }

    #[tokio::test]
    async fn test_cancelled_before_start_is_skipped() {
        let (stop, token) = stop_channel();
        stop.stop();
        let (s, prober, status) = strategy(ScriptedReachability::new().always_up("10.0.0.1", 1));

        let outcome = s
            .execute(&ap(Some("10.0.0.1")), &OperationConfig::connectivity(4), &token, &ActivityReporter::detached())
            .await
            .unwrap();

        assert_eq!(outcome.verdict, Verdict::Skipped);
        assert_eq!(prober.call_count("10.0.0.1"), 0);
        assert!(status.reports().is_empty());
    }

    #[tokio::test]
    async fn test_pacing_spaces_attempts() {
        let prober = Arc::new(ScriptedReachability::new().always_up("10.0.0.1", 1));
        let pacing = Duration::from_millis(50);
        let s = ConnectivityProbe::new(prober, Arc::new(RecordingStatusReporter::default()))
            .with_pacing(pacing);

        let started = Instant::now();
        s.execute(
            &ap(Some("10.0.0.1")),
            &OperationConfig::connectivity(3),
            &CancelToken::never(),
            &ActivityReporter::detached(),
        )
        .await
        .unwrap();

        assert!(started.elapsed() >= pacing * 2);
    }

    #[test]
    fn test_item_budget_covers_series() {
        let (s, _, _) = strategy(ScriptedReachability::new());
        let config = OperationConfig::connectivity(4).with_timeout(Duration::from_secs(2));
        assert_eq!(
            s.item_budget(&config),
            Some(Duration::from_secs(8) + ITEM_BUDGET_GRACE)
        );
    }
}
