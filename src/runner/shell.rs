//! Shell subprocess runner - runs `<shell> -c <command>` with tokio

use crate::runner::{
    CommandInvocation, CommandOutput, CommandRunner, OutputSink, OutputStream, RunnerError,
};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Default number of bytes kept per stream
pub const DEFAULT_CAPTURE_LIMIT: usize = 1024 * 1024;

/// How long output is still read after the shell has exited
const OUTPUT_GRACE: Duration = Duration::from_millis(250);

/// Runs step commands as shell subprocesses
#[derive(Debug, Clone)]
pub struct ShellRunner {
    /// Bytes of stdout/stderr kept per command (the tail is kept)
    capture_limit: usize,
}

impl ShellRunner {
    pub fn new() -> Self {
        Self {
            capture_limit: DEFAULT_CAPTURE_LIMIT,
        }
    }

    /// Keep at most `bytes` of each stream in the returned output
    pub fn with_capture_limit(mut self, bytes: usize) -> Self {
        self.capture_limit = bytes;
        self
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    /// Run a command through the invocation's shell
    ///
    /// # Errors
    /// Returns `RunnerError` if:
    /// - The shell cannot be spawned
    /// - The command outlives its timeout (the child is killed)
    /// - Waiting on the child fails
    async fn run(
        &self,
        invocation: &CommandInvocation,
        sink: Option<&dyn OutputSink>,
    ) -> Result<CommandOutput, RunnerError> {
        debug!(
            "Spawning {} -c for step {}: {}",
            invocation.shell, invocation.step_id, invocation.command
        );
        let started = Instant::now();

        let mut command = Command::new(&invocation.shell);
        command
            .arg("-c")
            .arg(&invocation.command)
            .envs(&invocation.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &invocation.working_dir {
            command.current_dir(dir);
        }

        // Own process group, so a timeout takes background children down too
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| RunnerError::Spawn {
            program: invocation.shell.clone(),
            source,
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let step_id = invocation.step_id.as_str();
        let limit = self.capture_limit;
        let mut stdout_text = String::new();
        let mut stderr_text = String::new();

        let finished = {
            // Both pipes are drained while waiting so a chatty child cannot block
            let readers = async {
                tokio::join!(
                    drain(stdout, OutputStream::Stdout, step_id, sink, limit, &mut stdout_text),
                    drain(stderr, OutputStream::Stderr, step_id, sink, limit, &mut stderr_text),
                )
            };
            tokio::pin!(readers);
            let mut drained = false;

            // The exit of the shell ends the step, not EOF on its pipes
            let waited = async {
                loop {
                    tokio::select! {
                        status = child.wait() => break status,
                        _ = &mut readers, if !drained => drained = true,
                    }
                }
            };

            let status = match invocation.timeout {
                Some(deadline) => timeout(deadline, waited).await.ok(),
                None => Some(waited.await),
            };

            // A background process may hold the pipes open after the shell exits
            if status.is_some()
                && !drained
                && timeout(OUTPUT_GRACE, &mut readers).await.is_err()
            {
                debug!(
                    "Step {} left a process holding its output open, not waiting for it",
                    invocation.step_id
                );
            }
            status
        };

        let Some(status) = finished else {
            let secs = invocation.timeout.map(|t| t.as_secs()).unwrap_or_default();
            warn!("Step {} timed out after {}s, killing it", invocation.step_id, secs);
            kill_process_group(&child);
            if let Err(e) = child.kill().await {
                debug!("Failed to kill step {}: {}", invocation.step_id, e);
            }
            return Err(RunnerError::Timeout(secs));
        };

        let status = status?;

        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;

        let output = CommandOutput {
            exit_code: status.code(),
            signal,
            stdout: stdout_text,
            stderr: stderr_text,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        debug!(
            "Step {} exited with {} after {}ms ({} bytes stdout, {} bytes stderr)",
            invocation.step_id,
            output.status_code(),
            output.duration_ms,
            output.stdout.len(),
            output.stderr.len()
        );

        Ok(output)
    }
}

/// Kill every process in the child's group
///
/// The child leads its own group, so its ID is also the group ID.
fn kill_process_group(child: &Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: killpg only sends a signal; an exited group yields ESRCH
        let result = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
        if result != 0 {
            debug!(
                "Failed to kill process group {}: {}",
                pid,
                std::io::Error::last_os_error()
            );
        }
    }
    #[cfg(not(unix))]
    let _ = child;
}

/// Read a pipe to EOF, forwarding each line to the sink and keeping the tail
///
/// Lines land in `collected` as they are read, so whatever arrived is kept
/// even when the caller stops waiting for EOF.
async fn drain<R>(
    reader: Option<R>,
    stream: OutputStream,
    step_id: &str,
    sink: Option<&dyn OutputSink>,
    limit: usize,
    collected: &mut String,
) where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return;
    };

    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                let line = text.trim_end_matches(|c| c == '\n' || c == '\r');
                if let Some(sink) = sink {
                    sink.on_line(step_id, stream, line);
                }
                collected.push_str(line);
                collected.push('\n');
                truncate_front(collected, limit);
            }
            Err(e) => {
                debug!("Stopped reading {:?} of step {}: {}", stream, step_id, e);
                break;
            }
        }
    }
}

/// Drop bytes from the front until `text` fits in `limit`
fn truncate_front(text: &mut String, limit: usize) {
    if text.len() <= limit {
        return;
    }
    let mut cut = text.len() - limit;
    while !text.is_char_boundary(cut) {
        cut += 1;
    }
    text.drain(..cut);
}
