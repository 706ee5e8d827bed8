//! Helpers for running external commands from async code.
//!
//! Search tools can be extremely chatty on large trees. Buffering everything a
//! child prints can exhaust memory, so this crate captures stdout/stderr up to
//! a per-stream limit and can bound the child with a wall-clock timeout.

use std::{
    fmt, io,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
    time::Duration,
};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};

/// Captured stdout/stderr from a command, truncated to a maximum size.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BoundedOutput {
    pub stdout: String,
    pub stderr: String,
    /// Set when either stdout or stderr had more bytes than were captured.
    pub truncated: bool,
}

/// Options controlling command execution.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Kill the process if it hasn't exited after this duration.
    pub timeout: Option<Duration>,
    /// Maximum bytes to capture *per stream* (stdout and stderr).
    pub max_bytes: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            // 16MiB per stream keeps memory bounded while still holding the
            // results of a scan over a large tree.
            max_bytes: 16 * 1024 * 1024,
        }
    }
}

/// A full command invocation (cwd + program + args).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub cwd: PathBuf,
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(cwd: &Path, program: &Path, args: &[String]) -> Self {
        Self {
            cwd: cwd.to_path_buf(),
            program: program.to_path_buf(),
            args: args.to_vec(),
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Human-readable only; not meant to round-trip through a shell.
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            if arg.contains(' ') || arg.contains('\t') {
                write!(f, " \"{}\"", arg.replace('"', "\\\""))?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Result of running a command with bounded output capture.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub status: ExitStatus,
    pub output: BoundedOutput,
    pub timed_out: bool,
}

impl CommandResult {
    /// Exit code, or `None` when the process was killed by a signal.
    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }
}

/// Run a command, capturing at most `opts.max_bytes` bytes of stdout and stderr
/// each.
///
/// The process `ExitStatus` is always returned. When the timeout elapses the
/// process is killed and `timed_out` is set.
pub async fn run_command(
    cwd: &Path,
    program: &Path,
    args: &[String],
    opts: RunOptions,
) -> io::Result<CommandResult> {
    let command = CommandSpec::new(cwd, program, args);
    run_command_spec(&command, opts).await
}

pub async fn run_command_spec(command: &CommandSpec, opts: RunOptions) -> io::Result<CommandResult> {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .current_dir(&command.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    tracing::debug!(target: "tagtree.process", command = %command, "spawning command");
    let mut child = cmd.spawn()?;

    let Some(stdout) = child.stdout.take() else {
        return Err(io::Error::other("child stdout was not captured"));
    };
    let Some(stderr) = child.stderr.take() else {
        return Err(io::Error::other("child stderr was not captured"));
    };

    let max_bytes = opts.max_bytes;
    let stdout_task = tokio::spawn(read_bounded(stdout, max_bytes));
    let stderr_task = tokio::spawn(read_bounded(stderr, max_bytes));

    let (status, timed_out) = match opts.timeout {
        Some(timeout) => match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => (status?, false),
            Err(_) => {
                tracing::warn!(
                    target: "tagtree.process",
                    command = %command,
                    timeout_ms = timeout.as_millis() as u64,
                    "command timed out; killing it"
                );
                (terminate(&mut child).await?, true)
            }
        },
        None => (child.wait().await?, false),
    };

    let (stdout_bytes, stdout_truncated) = join_reader(stdout_task, "stdout").await??;
    let (stderr_bytes, stderr_truncated) = join_reader(stderr_task, "stderr").await??;

    Ok(CommandResult {
        status,
        output: BoundedOutput {
            stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
            stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
            truncated: stdout_truncated || stderr_truncated,
        },
        timed_out,
    })
}

async fn terminate(child: &mut Child) -> io::Result<ExitStatus> {
    // The child may already have exited between the select and the kill.
    let _ = child.start_kill();
    child.wait().await
}

async fn join_reader(
    handle: tokio::task::JoinHandle<io::Result<(Vec<u8>, bool)>>,
    stream: &'static str,
) -> io::Result<io::Result<(Vec<u8>, bool)>> {
    handle
        .await
        .map_err(|_| io::Error::other(format!("{stream} reader task panicked")))
}

async fn read_bounded<R>(mut reader: R, max_bytes: usize) -> io::Result<(Vec<u8>, bool)>
where
    R: AsyncRead + Unpin,
{
    let mut out = Vec::new();
    let mut truncated = false;
    let mut buf = [0u8; 8 * 1024];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }

        if out.len() < max_bytes {
            let remaining = max_bytes - out.len();
            let to_store = remaining.min(n);
            out.extend_from_slice(&buf[..to_store]);
            if to_store < n {
                truncated = true;
            }
        } else {
            truncated = true;
        }
    }

    Ok((out, truncated))
}
