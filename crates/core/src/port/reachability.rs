// Reachability Port - single ICMP-style probe

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Probe spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("IO error: {0}")]
    Io(String),
}

#[async_trait]
pub trait ReachabilityProber: Send + Sync {
    /// Send one probe
    ///
    /// Returns `Ok(Some(rtt))` on reply, `Ok(None)` when no reply arrived
    /// within `timeout`.
    async fn probe(&self, address: &str, timeout: Duration) -> Result<Option<Duration>, ProbeError>;
}

pub mod mocks {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    pub enum ProbeReply {
        Reply(Duration),
        Lost,
        Error(String),
    }

    /// Per-address scripted replies; the last reply repeats once the script runs out
    #[derive(Default)]
    pub struct ScriptedReachability {
        scripts: Mutex<HashMap<String, VecDeque<ProbeReply>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedReachability {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn script(self, address: &str, replies: Vec<ProbeReply>) -> Self {
            self.scripts
                .lock()
                .unwrap()
                .insert(address.to_string(), replies.into());
            self
        }

        pub fn always_up(self, address: &str, rtt_ms: u64) -> Self {
            self.script(address, vec![ProbeReply::Reply(Duration::from_millis(rtt_ms))])
        }

        pub fn always_down(self, address: &str) -> Self {
            self.script(address, vec![ProbeReply::Lost])
        }

        pub fn call_count(&self, address: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|a| a.as_str() == address)
                .count()
        }
    }

    #[async_trait]
    impl ReachabilityProber for ScriptedReachability {
        async fn probe(
            &self,
            address: &str,
            _timeout: Duration,
        ) -> Result<Option<Duration>, ProbeError> {
            self.calls.lock().unwrap().push(address.to_string());

            let reply = {
                let mut scripts = self.scripts.lock().unwrap();
                match scripts.get_mut(address) {
                    Some(queue) if queue.len() > 1 => queue.pop_front(),
                    Some(queue) => queue.front().cloned(),
                    None => None,
                }
            };

            match reply {
                Some(ProbeReply::Reply(rtt)) => Ok(Some(rtt)),
                Some(ProbeReply::Lost) | None => Ok(None),
                Some(ProbeReply::Error(msg)) => Err(ProbeError::Io(msg)),
            }
        }
    }
}
