//! Phase executor that delegates to an external program.
//!
//! The program receives the phase inputs as JSON on stdin and as `QAFLOW_*`
//! environment variables, runs with the workspace as its working directory,
//! and writes its artifacts there. Its stdout becomes the phase summary.
//! Every stdout and stderr line is forwarded to observers as it arrives.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tokio::time::timeout;
use tracing::debug;

use super::{PhaseExecutor, PhaseInputs, PhaseLog, PhaseOutput};

/// How to launch a phase program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Program to execute
    pub program: String,

    /// Arguments passed verbatim
    #[serde(default)]
    pub args: Vec<String>,

    /// Kill the program after this many seconds
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout_seconds: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }
}

/// Executor that runs a subprocess per phase
pub struct CommandExecutor {
    name: String,
    spec: CommandSpec,
}

impl CommandExecutor {
    pub fn new(spec: CommandSpec) -> Self {
        Self {
            name: format!("command:{}", spec.program),
            spec,
        }
    }

    async fn run_subprocess(&self, inputs: &PhaseInputs, log: &PhaseLog) -> Result<String> {
        let payload =
            serde_json::to_vec(inputs).context("Failed to serialize phase inputs")?;

        let mut command = Command::new(&self.spec.program);
        command
            .args(&self.spec.args)
            .current_dir(&inputs.workspace)
            .env("QAFLOW_PHASE", inputs.phase.as_str())
            .env("QAFLOW_RUN_ID", &inputs.run_id)
            .env("QAFLOW_BASE_URL", &inputs.target_url)
            .env("QAFLOW_WORKSPACE", &inputs.workspace)
            .env("QAFLOW_TARGET_PAGE_COUNT", inputs.target_page_count.to_string())
            .env("QAFLOW_HEADLESS", inputs.headless.to_string())
            .env("QAFLOW_FORCE", inputs.force.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().with_context(|| {
            format!(
                "Failed to spawn '{}' for phase '{}'",
                self.spec.program, inputs.phase
            )
        })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take().context("Phase program stdout not captured")?;
        let stderr = child.stderr.take().context("Phase program stderr not captured")?;

        // Stdin, both output pipes and exit are driven together so a program
        // that writes before reading its inputs cannot stall on a full pipe.
        let io = async {
            let (fed, out, err, status) = tokio::join!(
                feed_stdin(stdin, &payload),
                forward_lines(stdout, log),
                forward_lines(stderr, log),
                child.wait(),
            );
            fed?;
            let status: ExitStatus =
                status.with_context(|| format!("Failed to wait for '{}'", self.spec.program))?;
            let out = out.context("Failed to read phase program stdout")?;
            let err = err.context("Failed to read phase program stderr")?;
            Ok::<_, anyhow::Error>((status, out, err))
        };

        let (status, stdout, stderr) = match self.spec.timeout_seconds {
            Some(seconds) => {
                let limit = Duration::from_secs(seconds);
                timeout(limit, io).await.with_context(|| {
                    format!(
                        "Phase '{}' program '{}' timed out after {:?}",
                        inputs.phase, self.spec.program, limit
                    )
                })??
            }
            None => io.await?,
        };

        if !status.success() {
            let exit_code = status.code().unwrap_or(-1);
            anyhow::bail!(
                "Phase '{}' program '{}' failed with exit code {}: {}",
                inputs.phase,
                self.spec.program,
                exit_code,
                stderr.trim()
            );
        }

        debug!(phase = %inputs.phase, bytes = stdout.len(), "Phase program finished");
        Ok(stdout)
    }
}

/// Write the inputs payload, then close stdin
async fn feed_stdin(stdin: Option<ChildStdin>, payload: &[u8]) -> Result<()> {
    let Some(mut stdin) = stdin else {
        return Ok(());
    };
    match stdin.write_all(payload).await {
        Ok(()) => Ok(()),
        // Program exited or closed stdin without reading its inputs
        Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
        Err(e) => Err(e).context("Failed to write phase inputs to stdin"),
    }
}

/// Forward each line to the phase log and return everything read.
///
/// Invalid UTF-8 is replaced rather than rejected so the pipe is always
/// drained to EOF.
async fn forward_lines<R>(reader: R, log: &PhaseLog) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut collected = String::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']);
        if !line.trim().is_empty() {
            log.line(line).await;
        }
        collected.push_str(line);
        collected.push('\n');
    }
    Ok(collected)
}

#[async_trait]
impl PhaseExecutor for CommandExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, inputs: &PhaseInputs, log: &PhaseLog) -> Result<PhaseOutput> {
        let stdout = self.run_subprocess(inputs, log).await?;
        Ok(PhaseOutput::new(stdout.trim().to_string()))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::{BroadcastHub, ChannelSubscriber};
    use crate::domain::{EventKind, Phase};
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn inputs(workspace: &std::path::Path) -> PhaseInputs {
        PhaseInputs {
            phase: Phase::Exploration,
            run_id: "run_cmd".to_string(),
            target_url: "https://example.com".to_string(),
            instructions: String::new(),
            workspace: workspace.to_path_buf(),
            target_page_count: 5,
            headless: true,
            force: false,
            prior_artifacts: BTreeMap::new(),
            resume_hints: None,
        }
    }

    fn quiet_log() -> PhaseLog {
        PhaseLog::new(Arc::new(BroadcastHub::new()), "test", "run_cmd", Phase::Exploration)
    }

    #[test]
    fn test_executor_name() {
        let executor = CommandExecutor::new(CommandSpec::new("explore.sh"));
        assert_eq!(executor.name(), "command:explore.sh");
    }

    #[tokio::test]
    async fn test_program_writes_artifacts_in_workspace() {
        let temp = TempDir::new().unwrap();
        let spec = CommandSpec::new("sh").with_args([
            "-c",
            "cat > inputs.json && echo \"$QAFLOW_PHASE for $QAFLOW_RUN_ID\"",
        ]);

        let output = CommandExecutor::new(spec)
            .execute(&inputs(temp.path()), &quiet_log())
            .await
            .unwrap();

        assert_eq!(output.summary, "exploration for run_cmd");
        let written = std::fs::read_to_string(temp.path().join("inputs.json")).unwrap();
        let parsed: PhaseInputs = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed.target_page_count, 5);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_error() {
        let temp = TempDir::new().unwrap();
        let spec = CommandSpec::new("sh").with_args(["-c", "echo broken >&2; exit 3"]);

        let err = CommandExecutor::new(spec)
            .execute(&inputs(temp.path()), &quiet_log())
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("exit code 3"), "{message}");
        assert!(message.contains("broken"), "{message}");
    }

    #[tokio::test]
    async fn test_timeout_is_error() {
        let temp = TempDir::new().unwrap();
        let spec = CommandSpec::new("sh")
            .with_args(["-c", "sleep 5"])
            .with_timeout(0);

        let err = CommandExecutor::new(spec)
            .execute(&inputs(temp.path()), &quiet_log())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_output_lines_are_broadcast_as_they_arrive() {
        let temp = TempDir::new().unwrap();
        let hub = Arc::new(BroadcastHub::new());
        let (subscriber, mut rx) = ChannelSubscriber::new("observer", 16);
        hub.register(Arc::new(subscriber)).await;

        let executor =
            CommandExecutor::new(CommandSpec::new("sh").with_args(["-c", "echo a; echo b >&2"]));
        let log = PhaseLog::new(Arc::clone(&hub), executor.name(), "run_cmd", Phase::Exploration);
        let output = executor.execute(&inputs(temp.path()), &log).await.unwrap();
        assert_eq!(output.summary, "a");

        let mut lines = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if event.phase == Some(Phase::Exploration) {
                assert_eq!(event.kind, EventKind::Log);
                assert_eq!(event.source, "command:sh");
                assert_eq!(event.run_id.as_deref(), Some("run_cmd"));
                lines.push(event.message);
            }
        }
        lines.sort();
        assert_eq!(lines, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_large_inputs_with_early_output_do_not_stall() {
        let temp = TempDir::new().unwrap();
        let mut phase_inputs = inputs(temp.path());
        phase_inputs.instructions = "x".repeat(1 << 20);

        // Fills the stdout pipe before reading any of stdin
        let spec = CommandSpec::new("sh")
            .with_args(["-c", "yes line | head -n 20000; cat > /dev/null; echo done"])
            .with_timeout(30);

        let output = CommandExecutor::new(spec)
            .execute(&phase_inputs, &quiet_log())
            .await
            .unwrap();
        assert!(output.summary.ends_with("done"));
        assert_eq!(output.summary.lines().count(), 20001);
    }
}
