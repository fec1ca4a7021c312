//! External process execution with a timeout and process-group cleanup.
//!
//! Both the solver and the plot program run through [`run_process`]: argument
//! vector, no shell, piped output, and on timeout the whole process group is
//! killed so no descendant outlives the run.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

/// Time allowed for output readers to drain once the process has gone.
const READER_GRACE: Duration = Duration::from_secs(2);

/// What to run and where.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub timeout: Duration,
}

impl ProcessSpec {
    /// Command line as shown in logs.
    pub fn display_command(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// How the process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessExit {
    /// Exited on its own. `code` is `None` when terminated by a signal.
    Exited { code: Option<i32>, signal: Option<i32> },
    /// Killed after exceeding the timeout.
    TimedOut,
    /// Never started.
    SpawnFailed(String),
}

/// Captured result of one process run.
#[derive(Debug, Clone)]
pub struct ProcessCapture {
    pub exit: ProcessExit,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl ProcessCapture {
    pub fn success(&self) -> bool {
        matches!(self.exit, ProcessExit::Exited { code: Some(0), .. })
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self.exit {
            ProcessExit::Exited { code, .. } => code,
            _ => None,
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed.as_millis() as u64
    }

    /// Empty capture for a run that was never attempted.
    pub fn not_started(reason: impl Into<String>) -> Self {
        Self {
            exit: ProcessExit::SpawnFailed(reason.into()),
            stdout: String::new(),
            stderr: String::new(),
            elapsed: Duration::ZERO,
        }
    }
}

/// Resolve a program so it still points at the same file once the working
/// directory changes. Bare names are left for `PATH` lookup.
pub fn resolve_program(program: &str) -> PathBuf {
    let path = Path::new(program);
    if path.is_absolute() || path.components().count() < 2 {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

/// Truncate `time` to whole seconds. Used as the freshness cutoff for
/// files a process writes, since some filesystems store coarse mtimes.
pub fn whole_seconds(time: SystemTime) -> SystemTime {
    match time.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => UNIX_EPOCH + Duration::from_secs(elapsed.as_secs()),
        Err(_) => time,
    }
}

type SharedBuf = Arc<Mutex<Vec<u8>>>;

fn spawn_reader<R>(mut reader: R, buf: SharedBuf) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if let Ok(mut data) = buf.lock() {
                        data.extend_from_slice(&chunk[..n]);
                    }
                }
            }
        }
    })
}

fn take_text(buf: &SharedBuf) -> String {
    match buf.lock() {
        Ok(data) => String::from_utf8_lossy(&data).into_owned(),
        Err(poisoned) => String::from_utf8_lossy(&poisoned.into_inner()).into_owned(),
    }
}

async fn drain(handle: Option<JoinHandle<()>>) {
    if let Some(mut handle) = handle {
        if tokio::time::timeout(READER_GRACE, &mut handle).await.is_err() {
            // A descendant outside the group still holds the pipe.
            handle.abort();
        }
    }
}

/// Send SIGKILL to every process in the group led by `pid`.
#[cfg(unix)]
async fn kill_process_group(pid: u32) {
    let target = format!("-{pid}");
    let result = Command::new("kill")
        .args(["-s", "KILL", "--", target.as_str()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    if let Err(e) = result {
        tracing::warn!(event = "process.group_kill_failed", pid = pid, error = %e);
    }
}

#[cfg(not(unix))]
async fn kill_process_group(_pid: u32) {}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

/// Run a process to completion or until its timeout.
///
/// Never fails: spawn errors are reported as [`ProcessExit::SpawnFailed`].
/// Output written before a timeout is kept.
pub async fn run_process(spec: &ProcessSpec) -> ProcessCapture {
    let start = Instant::now();

    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .current_dir(&spec.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            let mut capture = ProcessCapture::not_started(format!(
                "failed to spawn {}: {}",
                spec.program.display(),
                e
            ));
            capture.elapsed = start.elapsed();
            return capture;
        }
    };

    let pid = child.id();
    let stdout_buf = SharedBuf::default();
    let stderr_buf = SharedBuf::default();
    let stdout_task = child
        .stdout
        .take()
        .map(|out| spawn_reader(out, stdout_buf.clone()));
    let stderr_task = child
        .stderr
        .take()
        .map(|err| spawn_reader(err, stderr_buf.clone()));

    let exit = match tokio::time::timeout(spec.timeout, child.wait()).await {
        Ok(Ok(status)) => ProcessExit::Exited {
            code: status.code(),
            signal: exit_signal(&status),
        },
        Ok(Err(e)) => ProcessExit::SpawnFailed(format!("failed to wait for process: {e}")),
        Err(_) => {
            if let Some(pid) = pid {
                kill_process_group(pid).await;
            }
            let _ = child.kill().await;
            ProcessExit::TimedOut
        }
    };

    drain(stdout_task).await;
    drain(stderr_task).await;

    ProcessCapture {
        exit,
        stdout: take_text(&stdout_buf),
        stderr: take_text(&stderr_buf),
        elapsed: start.elapsed(),
    }
}

/// Write a run log: `key: value` header lines, then the stdout and stderr
/// sections.
pub fn write_log(
    path: &Path,
    header: &[(&str, String)],
    capture: &ProcessCapture,
) -> std::io::Result<()> {
    let mut text = String::new();
    for (key, value) in header {
        let _ = writeln!(text, "{key}: {value}");
    }
    let _ = writeln!(text, "\n--- stdout ---");
    text.push_str(&capture.stdout);
    if !capture.stdout.is_empty() && !capture.stdout.ends_with('\n') {
        text.push('\n');
    }
    let _ = writeln!(text, "\n--- stderr ---");
    text.push_str(&capture.stderr);
    if !capture.stderr.is_empty() && !capture.stderr.ends_with('\n') {
        text.push('\n');
    }
    std::fs::write(path, text)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn spec(program: &str, args: &[&str], timeout: Duration) -> ProcessSpec {
        ProcessSpec {
            program: PathBuf::from(program),
            args: args.iter().map(|s| s.to_string()).collect(),
            cwd: std::env::temp_dir(),
            timeout,
        }
    }

    #[test]
    fn test_whole_seconds_truncates() {
        let time = UNIX_EPOCH + Duration::from_millis(1_700_000_000_750);
        assert_eq!(
            whole_seconds(time),
            UNIX_EPOCH + Duration::from_secs(1_700_000_000)
        );
    }

    #[tokio::test]
    async fn test_captures_output_and_exit_code() {
        let capture = run_process(&spec(
            "sh",
            &["-c", "echo hello; echo oops >&2; exit 3"],
            Duration::from_secs(10),
        ))
        .await;
        assert_eq!(capture.exit_code(), Some(3));
        assert!(!capture.success());
        assert!(capture.stdout.contains("hello"));
        assert!(capture.stderr.contains("oops"));
    }

    #[tokio::test]
    async fn test_timeout_keeps_partial_output() {
        let capture = run_process(&spec(
            "sh",
            &["-c", "echo started; sleep 30"],
            Duration::from_millis(300),
        ))
        .await;
        assert_eq!(capture.exit, ProcessExit::TimedOut);
        assert!(capture.stdout.contains("started"));
        assert!(capture.elapsed < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_spawn_failure_reported() {
        let capture = run_process(&spec(
            "/nonexistent/valrun-solver",
            &[],
            Duration::from_secs(1),
        ))
        .await;
        assert!(matches!(capture.exit, ProcessExit::SpawnFailed(_)));
    }

    #[test]
    fn test_resolve_program() {
        assert_eq!(resolve_program("SU2_CFD"), PathBuf::from("SU2_CFD"));
        assert_eq!(resolve_program("/opt/su2"), PathBuf::from("/opt/su2"));
        assert!(resolve_program("bin/solver").is_absolute());
    }

    #[test]
    fn test_write_log_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        let capture = ProcessCapture {
            exit: ProcessExit::Exited {
                code: Some(0),
                signal: None,
            },
            stdout: "iter 1".to_string(),
            stderr: String::new(),
            elapsed: Duration::from_millis(5),
        };
        write_log(&path, &[("mesh", "047".to_string())], &capture).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("mesh: 047\n"));
        assert!(text.contains("--- stdout ---\niter 1\n"));
        assert!(text.contains("--- stderr ---"));
    }
}
