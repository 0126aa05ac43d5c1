// Remote Shell Port
// One non-interactive command per session

use super::credential_store::Credential;
use crate::domain::{CancelToken, TargetId};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Everything needed to run one command on one target
#[derive(Debug, Clone)]
pub struct ShellRequest {
    pub target_id: TargetId,
    pub address: String,
    pub port: u16,
    pub credential: Credential,
    pub command: String,
    /// Covers connect + execution
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: i64,
}

#[derive(Error, Debug)]
pub enum ShellError {
    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Connection timeout after {0}ms")]
    ConnectTimeout(u64),

    #[error("Command timeout after {0}ms")]
    Timeout(u64),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    /// Session torn down because stop was requested
    #[error("Cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(String),
}

#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Run a command, honouring `request.timeout` and `cancel`
    async fn run(&self, request: &ShellRequest, cancel: &CancelToken)
        -> Result<ShellOutput, ShellError>;
}

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Mock shell behavior per address
    #[derive(Debug, Clone)]
    pub enum ShellBehavior {
        Exit {
            code: i32,
            stdout: String,
            stderr: String,
        },
        AuthFailure,
        Unreachable,
        /// Sleep, then exit 0; interrupted by cancel
        Hang(Duration),
    }

    impl ShellBehavior {
        pub fn ok(stdout: &str) -> Self {
            ShellBehavior::Exit {
                code: 0,
                stdout: stdout.to_string(),
                stderr: String::new(),
            }
        }

        pub fn exit(code: i32, stderr: &str) -> Self {
            ShellBehavior::Exit {
                code,
                stdout: String::new(),
                stderr: stderr.to_string(),
            }
        }
    }

    pub struct MockRemoteShell {
        default: ShellBehavior,
        per_address: HashMap<String, ShellBehavior>,
        requests: Mutex<Vec<ShellRequest>>,
    }

    impl MockRemoteShell {
        pub fn new(default: ShellBehavior) -> Self {
            Self {
                default,
                per_address: HashMap::new(),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn with(mut self, address: &str, behavior: ShellBehavior) -> Self {
            self.per_address.insert(address.to_string(), behavior);
            self
        }

        pub fn requests(&self) -> Vec<ShellRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteShell for MockRemoteShell {
        async fn run(
            &self,
            request: &ShellRequest,
            cancel: &CancelToken,
        ) -> Result<ShellOutput, ShellError> {
            self.requests.lock().unwrap().push(request.clone());
            let behavior = self
                .per_address
                .get(&request.address)
                .unwrap_or(&self.default)
                .clone();

            match behavior {
                ShellBehavior::Exit {
                    code,
                    stdout,
                    stderr,
                } => Ok(ShellOutput {
                    exit_code: code,
                    stdout,
                    stderr,
                    duration_ms: 5,
                }),
                ShellBehavior::AuthFailure => Err(ShellError::AuthenticationFailed),
                ShellBehavior::Unreachable => Err(ShellError::Connection(format!(
                    "connect to host {} port {}: No route to host",
                    request.address, request.port
                ))),
                ShellBehavior::Hang(duration) => {
                    tokio::select! {
                        _ = tokio::time::sleep(duration.min(request.timeout)) => {
                            if duration > request.timeout {
                                Err(ShellError::Timeout(request.timeout.as_millis() as u64))
                            } else {
                                Ok(ShellOutput {
                                    exit_code: 0,
                                    stdout: String::new(),
                                    stderr: String::new(),
                                    duration_ms: duration.as_millis() as i64,
                                })
                            }
                        }
                        _ = cancel.cancelled() => Err(ShellError::Cancelled),
                    }
                }
            }
        }
    }
}
