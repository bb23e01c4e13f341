use std::{path::Path, process::Stdio, time::Duration};

use tokio::{
    process::{Child, Command},
    time,
};
use tracing::{debug, info, warn};

use crate::{
    console::ConsoleSink, Finding, Invocation, LineSink, OutputMultiplexer, ReportValidator,
    RunnerConfig, RunnerError, ScanEnd,
};

/// Everything a finished run produced. Only built for plugins that exited
/// through the normal exit path, whatever their exit code.
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    /// Raw stdout, delimiters included.
    pub stdout: Vec<u8>,
    pub exit_code: i32,
    pub findings: Vec<Finding>,
}

impl CapturedOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn report_is_valid(&self) -> bool {
        self.findings.is_empty()
    }
}

/// Supervises one plugin process at a time: spawn, stream, wait or cancel, validate.
#[derive(Debug, Clone)]
pub struct PluginRunner {
    config: RunnerConfig,
    validator: ReportValidator,
}

impl PluginRunner {
    pub fn new(config: RunnerConfig, validator: ReportValidator) -> Self {
        Self { config, validator }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Runs the plugin, mirroring its output to the terminal.
    pub async fn run_console(&self, invocation: &Invocation) -> Result<CapturedOutput, RunnerError> {
        self.run(invocation, ConsoleSink::stdout()).await
    }

    /// Runs the plugin with every output line handed to `sink` as it arrives.
    ///
    /// Returns `Aborted`/`Timeout` when the invocation's token fires or the
    /// configured timeout elapses; the child is killed in both cases and the
    /// captured bytes are discarded without validation.
    pub async fn run<S: LineSink>(
        &self,
        invocation: &Invocation,
        sink: S,
    ) -> Result<CapturedOutput, RunnerError> {
        let mut command = Command::new(invocation.program());
        command
            .args(invocation.arguments())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(
            program = %invocation.program().display(),
            args = invocation.arguments().len(),
            "spawning plugin"
        );
        let mut child = spawn_with_retry(&mut command, invocation.program()).await?;
        info!(pid = ?child.id(), "plugin started");

        let stdout = child.stdout.take().ok_or(RunnerError::MissingStdout)?;
        let stderr = child.stderr.take().ok_or(RunnerError::MissingStderr)?;
        let mut mux = OutputMultiplexer::spawn(stdout, stderr, self.config.limits, sink);

        let cancel = invocation.cancellation();
        let deadline = deadline(self.config.timeout);
        tokio::pin!(deadline);

        let waited = tokio::select! {
            status = child.wait() => Ok(status),
            _ = cancel.cancelled() => Err(RunnerError::Aborted),
            timeout = &mut deadline => Err(RunnerError::Timeout { timeout }),
        };
        let status = match waited {
            Ok(Ok(status)) => status,
            Ok(Err(err)) => {
                self.shutdown(&mut child, &mut mux).await;
                return Err(RunnerError::Wait(err));
            }
            Err(reason) => {
                warn!(reason = %reason, "stopping plugin");
                self.shutdown(&mut child, &mut mux).await;
                return Err(reason);
            }
        };
        debug!(status = %status, "plugin exited");

        // A grandchild can keep the pipes open after the plugin itself exits.
        let drained = tokio::select! {
            out = mux.join() => out?,
            _ = cancel.cancelled() => {
                warn!("aborting while plugin output is still open");
                mux.abort();
                return Err(RunnerError::Aborted);
            }
            timeout = &mut deadline => {
                warn!("timed out while plugin output is still open");
                mux.abort();
                return Err(RunnerError::Timeout { timeout });
            }
        };

        let Some(exit_code) = status.code() else {
            return Err(RunnerError::AbnormalExit(status.to_string()));
        };
        if let ScanEnd::ReadError(message) = drained.primary.end {
            return Err(RunnerError::StdoutRead(message));
        }

        let stdout = drained.primary.captured;
        let findings = self.validator.validate(&stdout);
        debug!(
            exit_code,
            stdout_bytes = stdout.len(),
            findings = findings.len(),
            "plugin output validated"
        );

        Ok(CapturedOutput {
            stdout,
            exit_code,
            findings,
        })
    }

    async fn shutdown(&self, child: &mut Child, mux: &mut OutputMultiplexer) {
        if let Err(err) = child.kill().await {
            warn!(error = %err, "failed to kill plugin process");
        }
        if time::timeout(self.config.drain_grace, mux.join())
            .await
            .is_err()
        {
            warn!(
                grace = ?self.config.drain_grace,
                "plugin output still open after kill; abandoning streams"
            );
            mux.abort();
        }
    }
}

async fn deadline(timeout: Option<Duration>) -> Duration {
    match timeout {
        Some(timeout) => {
            time::sleep(timeout).await;
            timeout
        }
        None => std::future::pending().await,
    }
}

const SPAWN_ATTEMPTS: u32 = 5;
const SPAWN_BACKOFF_MAX: Duration = Duration::from_millis(50);

/// Spawns `command`, retrying while the executable is still held open for writing
/// (ETXTBSY), which happens when a plugin script was just written.
async fn spawn_with_retry(command: &mut Command, binary: &Path) -> Result<Child, RunnerError> {
    let mut backoff = Duration::from_millis(2);
    let mut attempt = 1;
    loop {
        let source = match command.spawn() {
            Ok(child) => return Ok(child),
            Err(source) => source,
        };
        let busy = source.kind() == std::io::ErrorKind::ExecutableFileBusy
            || source.raw_os_error() == Some(26);
        if !busy || attempt >= SPAWN_ATTEMPTS {
            return Err(RunnerError::Spawn {
                binary: binary.to_path_buf(),
                source,
            });
        }
        debug!(attempt, ?backoff, "plugin executable busy; retrying spawn");
        time::sleep(backoff).await;
        backoff = (backoff * 2).min(SPAWN_BACKOFF_MAX);
        attempt += 1;
    }
}
