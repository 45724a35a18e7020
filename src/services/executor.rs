use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::models::job::Job;

/// Cap on captured stdout/stderr per stream.
const MAX_CAPTURE_BYTES: usize = 64 * 1024;

/// Classified result of running a job's command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Succeeded,
    Failed { message: String },
    TimedOut { message: String },
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Succeeded)
    }

    /// Text recorded as the job's `last_error`.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            ExecutionOutcome::Succeeded => None,
            ExecutionOutcome::Failed { message } | ExecutionOutcome::TimedOut { message } => {
                Some(message)
            }
        }
    }
}

#[derive(Debug)]
pub struct ExecutionResult {
    pub outcome: ExecutionOutcome,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

/// Runs job commands through the host shell with a hard timeout.
///
/// On Unix each job gets its own process group, so a timeout kills the shell
/// and everything it spawned.
#[derive(Debug, Clone)]
pub struct JobExecutor {
    shell: String,
}

impl Default for JobExecutor {
    fn default() -> Self {
        Self::new("sh")
    }
}

impl JobExecutor {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    pub async fn execute(&self, job: &Job) -> ExecutionResult {
        self.run(&job.id, &job.command, job.timeout_seconds).await
    }

    pub async fn run(&self, job_id: &str, command: &str, timeout_seconds: u64) -> ExecutionResult {
        tracing::info!(job_id, command, timeout_seconds, "Executing job");
        let started = Instant::now();

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(job_id, error = %e, "Failed to spawn job");
                return ExecutionResult {
                    outcome: ExecutionOutcome::Failed {
                        message: e.to_string(),
                    },
                    exit_code: None,
                    stdout: String::new(),
                    stderr: String::new(),
                    duration: started.elapsed(),
                };
            }
        };
        let pid = child.id();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let completion = async {
            let (stdout, stderr, status) =
                tokio::join!(read_capped(stdout), read_capped(stderr), child.wait());
            status.map(|status| (status, stdout, stderr))
        };

        let deadline = Duration::from_secs(timeout_seconds);
        let result = match tokio::time::timeout(deadline, completion).await {
            Ok(Ok((status, stdout, stderr))) => ExecutionResult {
                outcome: classify(status),
                exit_code: status.code(),
                stdout,
                stderr,
                duration: started.elapsed(),
            },
            Ok(Err(e)) => ExecutionResult {
                outcome: ExecutionOutcome::Failed {
                    message: e.to_string(),
                },
                exit_code: None,
                stdout: String::new(),
                stderr: String::new(),
                duration: started.elapsed(),
            },
            Err(_) => {
                // The shell itself is killed when `child` is dropped.
                if let Some(pid) = pid {
                    kill_process_group(pid);
                }
                ExecutionResult {
                    outcome: ExecutionOutcome::TimedOut {
                        message: format!("Job exceeded {}s timeout", timeout_seconds),
                    },
                    exit_code: None,
                    stdout: String::new(),
                    stderr: String::new(),
                    duration: started.elapsed(),
                }
            }
        };

        tracing::info!(
            job_id,
            success = result.outcome.is_success(),
            exit_code = ?result.exit_code,
            duration_ms = result.duration.as_millis() as u64,
            "Job finished"
        );
        if !result.stderr.is_empty() {
            tracing::debug!(job_id, stderr = %result.stderr, "Job stderr");
        }

        result
    }
}

fn classify(status: ExitStatus) -> ExecutionOutcome {
    if status.success() {
        return ExecutionOutcome::Succeeded;
    }
    if let Some(code) = status.code() {
        return ExecutionOutcome::Failed {
            message: format!("Exit code {}", code),
        };
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return ExecutionOutcome::Failed {
                message: format!("Terminated by signal {}", signal),
            };
        }
    }
    ExecutionOutcome::Failed {
        message: "Terminated abnormally".to_string(),
    }
}

/// Keep the first `MAX_CAPTURE_BYTES` of a pipe and discard the rest, so the
/// child never blocks on a full pipe.
async fn read_capped<R>(pipe: Option<R>) -> String
where
    R: AsyncRead + Unpin,
{
    let Some(mut pipe) = pipe else {
        return String::new();
    };
    let mut buf = Vec::new();
    if let Err(e) = (&mut pipe)
        .take(MAX_CAPTURE_BYTES as u64)
        .read_to_end(&mut buf)
        .await
    {
        tracing::debug!(error = %e, "Failed to read job output");
    }
    if let Err(e) = tokio::io::copy(&mut pipe, &mut tokio::io::sink()).await {
        tracing::debug!(error = %e, "Failed to drain job output");
    }
    String::from_utf8_lossy(&buf).trim_end().to_string()
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    // The child was started with process_group(0), so its pid is the pgid.
    let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
    if rc != 0 {
        tracing::debug!(
            pid,
            error = %std::io::Error::last_os_error(),
            "killpg failed, process group already gone"
        );
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exit_zero_succeeds_with_output() {
        let result = JobExecutor::default().run("ok", "echo hello", 5).await;
        assert_eq!(result.outcome, ExecutionOutcome::Succeeded);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.stdout, "hello");
        assert!(result.outcome.error_message().is_none());
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_failure() {
        let result = JobExecutor::default()
            .run("bad", "echo oops >&2; exit 3", 5)
            .await;
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.outcome.error_message(), Some("Exit code 3"));
        assert_eq!(result.stderr, "oops");
    }

    #[tokio::test]
    async fn test_timeout_kills_command() {
        let started = Instant::now();
        let result = JobExecutor::default().run("slow", "sleep 30", 1).await;
        assert_eq!(
            result.outcome,
            ExecutionOutcome::TimedOut {
                message: "Job exceeded 1s timeout".to_string()
            }
        );
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_timeout_kills_background_descendants() {
        // The backgrounded sleep holds the stdout pipe; only a group kill releases it.
        let started = Instant::now();
        let result = JobExecutor::default()
            .run("tree", "sleep 30 & sleep 30; wait", 1)
            .await;
        assert!(matches!(result.outcome, ExecutionOutcome::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_output_capture_is_capped() {
        let result = JobExecutor::default()
            .run("chatty", "head -c 1000000 /dev/zero | tr '\\0' a; echo done >&2", 10)
            .await;
        assert_eq!(result.outcome, ExecutionOutcome::Succeeded);
        assert_eq!(result.stdout.len(), MAX_CAPTURE_BYTES);
        assert!(result.stdout.bytes().all(|b| b == b'a'));
        assert_eq!(result.stderr, "done");
    }

    #[tokio::test]
    async fn test_missing_shell_is_failure() {
        let result = JobExecutor::new("/nonexistent/shell").run("x", "true", 5).await;
        assert!(matches!(result.outcome, ExecutionOutcome::Failed { .. }));
        assert_eq!(result.exit_code, None);
    }

    #[tokio::test]
    async fn test_killed_by_signal() {
        let result = JobExecutor::default().run("sig", "kill -9 $$", 5).await;
        assert_eq!(
            result.outcome.error_message(),
            Some("Terminated by signal 9")
        );
    }
}
