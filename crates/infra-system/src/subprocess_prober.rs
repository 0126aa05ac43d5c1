// Subprocess prober - one echo request through the system `ping`

use apbatch_core::port::{ProbeError, ReachabilityProber};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, trace};

/// Extra wall-clock allowance over the ping's own deadline
const SPAWN_GRACE: Duration = Duration::from_secs(1);

pub struct SubprocessProber {
    program: String,
}

impl Default for SubprocessProber {
    fn default() -> Self {
        Self::new("ping")
    }
}

impl SubprocessProber {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn args(address: &str, timeout: Duration) -> Vec<String> {
        if cfg!(windows) {
            let ms = timeout.as_millis().max(1);
            vec!["-n".into(), "1".into(), "-w".into(), ms.to_string(), address.into()]
        } else {
            // -W takes whole seconds
            let secs = timeout.as_secs_f64().ceil().max(1.0) as u64;
            vec!["-c".into(), "1".into(), "-W".into(), secs.to_string(), address.into()]
        }
    }
}

/// Reject anything that could be read as a flag or shell syntax
fn validate_address(address: &str) -> Result<(), ProbeError> {
    let valid = !address.is_empty()
        && !address.starts_with('-')
        && address
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | ':' | '-' | '_' | '%'));
    if valid {
        Ok(())
    } else {
        Err(ProbeError::InvalidAddress(address.to_string()))
    }
}

/// Round-trip time from ping output (`time=1.23 ms`, `time<1ms`)
pub fn parse_rtt(output: &str) -> Option<Duration> {
    let idx = output.find("time=").or_else(|| output.find("time<"))?;
    let rest = &output[idx + 5..];
    let number: String = rest
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let ms: f64 = number.parse().ok()?;
    Some(Duration::from_secs_f64(ms / 1000.0))
}

#[async_trait]
impl ReachabilityProber for SubprocessProber {
    async fn probe(&self, address: &str, timeout: Duration) -> Result<Option<Duration>, ProbeError> {
        validate_address(address)?;

        let started = Instant::now();
        let child = Command::new(&self.program)
            .args(Self::args(address, timeout))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProbeError::SpawnFailed(e.to_string()))?;

        let output = match tokio::time::timeout(timeout + SPAWN_GRACE, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(ProbeError::Io(e.to_string())),
            Err(_) => {
                debug!(address, "Ping exceeded its deadline");
                return Ok(None);
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        trace!(address, stdout = %stdout, "Ping output");
        if !output.status.success() {
            return Ok(None);
        }
        // Some platforms omit the time field; fall back to wall clock
        Ok(Some(parse_rtt(&stdout).unwrap_or_else(|| started.elapsed())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rtt_linux() {
        let out = "64 bytes from 10.0.0.1: icmp_seq=1 ttl=64 time=2.47 ms";
        let rtt = parse_rtt(out).unwrap();
        assert!((rtt.as_secs_f64() * 1000.0 - 2.47).abs() < 1e-6);
    }

    #[test]
    fn test_parse_rtt_windows_sub_millisecond() {
        let out = "Reply from 10.0.0.1: bytes=32 time<1ms TTL=64";
        assert_eq!(parse_rtt(out), Some(Duration::from_millis(1)));
    }

    #[test]
    fn test_parse_rtt_missing() {
        assert_eq!(parse_rtt("Request timed out."), None);
    }

    #[test]
    fn test_address_validation() {
        tokio_test::assert_ok!(validate_address("10.0.0.1"));
        tokio_test::assert_ok!(validate_address("ap-17.store.local"));
        tokio_test::assert_ok!(validate_address("fe80::1%eth0"));
        tokio_test::assert_err!(validate_address("-f"));
        assert!(validate_address("10.0.0.1; reboot").is_err());
        assert!(validate_address("").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_unix_args_round_up_seconds() {
        let args = SubprocessProber::args("10.0.0.1", Duration::from_millis(1500));
        assert_eq!(args, vec!["-c", "1", "-W", "2", "10.0.0.1"]);
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let prober = SubprocessProber::new("apbatch-no-such-ping");
        let err = prober
            .probe("127.0.0.1", Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::SpawnFailed(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_program_means_no_reply() {
        // `false` ignores its arguments and exits 1
        let prober = SubprocessProber::new("false");
        let rtt = prober
            .probe("127.0.0.1", Duration::from_millis(100))
            .await
            .unwrap();
        assert!(rtt.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_program_falls_back_to_wall_clock() {
        let prober = SubprocessProber::new("true");
        let rtt = prober
            .probe("127.0.0.1", Duration::from_millis(100))
            .await
            .unwrap();
        assert!(rtt.is_some());
    }
}
