// Subprocess remote shell - system `ssh` with password auth through `sshpass -e`
use apbatch_core::domain::CancelToken;
use apbatch_core::port::{RemoteShell, ShellError, ShellOutput, ShellRequest};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{info, warn};

use crate::process::{request_termination, TERMINATION_GRACE};

/// ssh's own exit code for connection-level failures
const SSH_CONNECTION_FAILURE: i32 = 255;
/// sshpass exit code for a rejected password
const SSHPASS_BAD_PASSWORD: i32 = 5;

/// ssh/sshpass stderr for a rejected login (lowercase)
const AUTH_PATTERNS: &[&str] = &["permission denied", "authentication failed", "incorrect password"];

/// ssh stderr for a session that never reached the remote command (lowercase)
const CONNECTION_PATTERNS: &[&str] = &[
    "ssh:",
    "connection refused",
    "connection closed",
    "connection reset",
    "no route to host",
    "could not resolve",
    "host key verification failed",
    "network is unreachable",
];

#[derive(Debug, Clone)]
pub struct SshOptions {
    pub ssh_program: String,
    pub sshpass_program: String,
    pub connect_timeout: Duration,
    /// `false` accepts unknown host keys (fleet APs are re-imaged often)
    pub strict_host_keys: bool,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            ssh_program: "ssh".to_string(),
            sshpass_program: "sshpass".to_string(),
            connect_timeout: Duration::from_secs(10),
            strict_host_keys: false,
        }
    }
}

pub struct SubprocessShell {
    options: SshOptions,
}

impl Default for SubprocessShell {
    fn default() -> Self {
        Self::new(SshOptions::default())
    }
}

enum Interrupt {
    Timeout,
    Cancelled,
}

impl SubprocessShell {
    pub fn new(options: SshOptions) -> Self {
        Self { options }
    }

    /// Arguments after the sshpass program
    fn ssh_args(&self, request: &ShellRequest) -> Vec<String> {
        let connect_secs = self.options.connect_timeout.as_secs().max(1);
        let mut args = vec![
            "-e".to_string(),
            self.options.ssh_program.clone(),
            "-o".to_string(),
            format!("ConnectTimeout={}", connect_secs),
            "-o".to_string(),
            "NumberOfPasswordPrompts=1".to_string(),
            "-o".to_string(),
            "PreferredAuthentications=password,keyboard-interactive".to_string(),
        ];
        if !self.options.strict_host_keys {
            args.extend([
                "-o".to_string(),
                "StrictHostKeyChecking=no".to_string(),
                "-o".to_string(),
                "UserKnownHostsFile=/dev/null".to_string(),
            ]);
        }
        args.extend([
            "-p".to_string(),
            request.port.to_string(),
            format!("{}@{}", request.credential.username, request.address),
            "--".to_string(),
            request.command.clone(),
        ]);
        args
    }

    fn command(&self, request: &ShellRequest) -> Command {
        let mut cmd = Command::new(&self.options.sshpass_program);
        cmd.args(self.ssh_args(request))
            .env("SSHPASS", &request.credential.secret);
        cmd
    }

    /// Spawn `cmd` and wait for it under `timeout` and `cancel`
    async fn execute(
        &self,
        mut cmd: Command,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<std::process::Output, ShellError> {
        let child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ShellError::SpawnFailed(e.to_string()))?;

        let pid = child.id();
        let output = child.wait_with_output();
        tokio::pin!(output);

        let interrupt = tokio::select! {
            result = &mut output => return result.map_err(|e| ShellError::Io(e.to_string())),
            _ = tokio::time::sleep(timeout) => Interrupt::Timeout,
            _ = cancel.cancelled() => Interrupt::Cancelled,
        };

        request_termination(pid);
        if tokio::time::timeout(TERMINATION_GRACE, &mut output).await.is_err() {
            warn!(pid = ?pid, "Process ignored SIGTERM, killing");
        }

        match interrupt {
            Interrupt::Timeout => Err(ShellError::Timeout(timeout.as_millis() as u64)),
            Interrupt::Cancelled => Err(ShellError::Cancelled),
        }
    }

    fn classify(&self, output: std::process::Output, duration_ms: i64) -> Result<ShellOutput, ShellError> {
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        // Killed by a signal: no exit code
        let exit_code = output.status.code().unwrap_or(-1);
        let lowered = stderr.to_lowercase();

        // Both codes are also valid remote exit statuses; only the
        // client's own diagnostics make them a session failure
        if exit_code == SSHPASS_BAD_PASSWORD
            && stdout.trim().is_empty()
            && (stderr.trim().is_empty() || matches_any(&lowered, AUTH_PATTERNS))
        {
            return Err(ShellError::AuthenticationFailed);
        }
        if exit_code == SSH_CONNECTION_FAILURE {
            if matches_any(&lowered, AUTH_PATTERNS) {
                return Err(ShellError::AuthenticationFailed);
            }
            if lowered.contains("timed out") {
                return Err(ShellError::ConnectTimeout(
                    self.options.connect_timeout.as_millis() as u64,
                ));
            }
            if matches_any(&lowered, CONNECTION_PATTERNS) {
                return Err(ShellError::Connection(stderr.trim().to_string()));
            }
        }

        Ok(ShellOutput {
            exit_code,
            stdout,
            stderr,
            duration_ms,
        })
    }
}

fn matches_any(text: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|p| text.contains(p))
}

#[async_trait]
impl RemoteShell for SubprocessShell {
    async fn run(&self, request: &ShellRequest, cancel: &CancelToken) -> Result<ShellOutput, ShellError> {
        info!(
            target_id = %request.target_id,
            address = %request.address,
            port = request.port,
            "Starting SSH command"
        );
        let started = Instant::now();
        let output = self
            .execute(self.command(request), request.timeout, cancel)
            .await?;
        let duration_ms = started.elapsed().as_millis() as i64;

        let result = self.classify(output, duration_ms);
        match &result {
            Ok(out) => info!(
                target_id = %request.target_id,
                exit_code = out.exit_code,
                duration_ms,
                "SSH command completed"
            ),
            Err(e) => warn!(target_id = %request.target_id, error = %e, "SSH command failed"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apbatch_core::domain::stop_channel;
    use apbatch_core::port::Credential;

    fn request(command: &str) -> ShellRequest {
        ShellRequest {
            target_id: "AP-1".to_string(),
            address: "10.0.0.1".to_string(),
            port: 2222,
            credential: Credential::new("admin", "hunter2"),
            command: command.to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    #[cfg(unix)]
    fn output_with(code: i32, stdout: &str, stderr: &str) -> std::process::Output {
        use std::os::unix::process::ExitStatusExt;
        std::process::Output {
            status: std::process::ExitStatus::from_raw(code << 8),
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    #[cfg(unix)]
    fn output(code: i32, stderr: &str) -> std::process::Output {
        output_with(code, "out", stderr)
    }

    #[test]
    fn test_args_carry_port_user_and_command() {
        let shell = SubprocessShell::default();
        let args = shell.ssh_args(&request("uptime"));

        assert_eq!(args[0], "-e");
        assert_eq!(args[1], "ssh");
        assert!(args.contains(&"ConnectTimeout=10".to_string()));
        assert!(args.contains(&"StrictHostKeyChecking=no".to_string()));
        let n = args.len();
        assert_eq!(&args[n - 5..], &["-p", "2222", "admin@10.0.0.1", "--", "uptime"]);
        // Password only travels through the environment
        assert!(!args.iter().any(|a| a.contains("hunter2")));
    }

    #[test]
    fn test_strict_host_keys_option() {
        let shell = SubprocessShell::new(SshOptions {
            strict_host_keys: true,
            ..SshOptions::default()
        });
        let args = shell.ssh_args(&request("uptime"));
        assert!(!args.iter().any(|a| a.starts_with("StrictHostKeyChecking")));
    }

    #[cfg(unix)]
    #[test]
    fn test_classify_exit_codes() {
        let shell = SubprocessShell::default();

        let ok = shell.classify(output(3, "oops"), 10).unwrap();
        assert_eq!(ok.exit_code, 3);
        assert_eq!(ok.stdout, "out");

        assert!(matches!(
            shell.classify(output_with(5, "", ""), 10),
            Err(ShellError::AuthenticationFailed)
        ));
        assert!(matches!(
            shell.classify(output(255, "Permission denied (password)."), 10),
            Err(ShellError::AuthenticationFailed)
        ));
        assert!(matches!(
            shell.classify(output(255, "connect to host 10.0.0.1 port 22: Connection timed out"), 10),
            Err(ShellError::ConnectTimeout(10_000))
        ));
        assert!(matches!(
            shell.classify(output(255, "No route to host"), 10),
            Err(ShellError::Connection(ref m)) if m == "No route to host"
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_remote_exit_codes_keep_output() {
        let shell = SubprocessShell::default();

        let out = shell
            .classify(output_with(5, "service foo: not running\n", ""), 10)
            .unwrap();
        assert_eq!(out.exit_code, 5);
        assert_eq!(out.stdout, "service foo: not running\n");

        let out = shell
            .classify(output_with(255, "", "custom-tool: bad flag"), 10)
            .unwrap();
        assert_eq!(out.exit_code, 255);
        assert_eq!(out.stderr, "custom-tool: bad flag");

        assert!(matches!(
            shell.classify(output_with(255, "", "ssh: connect to host 10.0.0.1 port 22: Connection refused"), 10),
            Err(ShellError::Connection(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_captures_output() {
        let shell = SubprocessShell::default();
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo hello; echo warn >&2; exit 4"]);

        let out = shell
            .execute(cmd, Duration::from_secs(5), &CancelToken::never())
            .await
            .unwrap();
        assert_eq!(out.status.code(), Some(4));
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "hello");
        assert_eq!(String::from_utf8_lossy(&out.stderr).trim(), "warn");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_timeout_terminates_child() {
        let shell = SubprocessShell::default();
        let mut cmd = Command::new("sleep");
        cmd.arg("30");

        let started = Instant::now();
        let err = shell
            .execute(cmd, Duration::from_millis(100), &CancelToken::never())
            .await
            .unwrap_err();
        assert!(matches!(err, ShellError::Timeout(100)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_cancel_terminates_child() {
        let shell = SubprocessShell::default();
        let (stop, cancel) = stop_channel();
        let mut cmd = Command::new("sleep");
        cmd.arg("30");

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            stop.stop();
        });
        let err = shell
            .execute(cmd, Duration::from_secs(30), &cancel)
            .await
            .unwrap_err();
        stopper.await.unwrap();
        assert!(matches!(err, ShellError::Cancelled));
    }

    #[tokio::test]
    async fn test_missing_sshpass_is_spawn_error() {
        let shell = SubprocessShell::new(SshOptions {
            sshpass_program: "apbatch-no-such-sshpass".to_string(),
            ..SshOptions::default()
        });
        let err = shell
            .run(&request("uptime"), &CancelToken::never())
            .await
            .unwrap_err();
        assert!(matches!(err, ShellError::SpawnFailed(_)));
    }
}
