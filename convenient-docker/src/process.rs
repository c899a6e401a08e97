//! Process boundary
//!
//! Every runtime operation is expressed as an [`Invocation`] and handed to a
//! [`ProcessRunner`]. The production runner spawns real child processes
//! through `tokio::process`; tests swap in a scripted runner.

use crate::error::{DriverError, DriverResult};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Split};
use tokio::process::{Child, Command};
use tracing::debug;

/// What happens to the output of a spawned process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Stdout and stderr are captured line by line
    #[default]
    Piped,
    /// Output goes to `/dev/null`
    Discard,
}

/// One command line of the runtime executable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: PathBuf,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    output: OutputMode,
}

impl Invocation {
    /// Invocation of `program` without arguments
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            output: OutputMode::Piped,
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run inside `dir`
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Discard stdout and stderr
    pub fn discard_output(mut self) -> Self {
        self.output = OutputMode::Discard;
        self
    }

    /// Executable
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Working directory, if any
    pub fn working_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    /// Output mode
    pub fn output_mode(&self) -> OutputMode {
        self.output
    }

    /// Arguments joined by spaces, without the program
    pub fn args_line(&self) -> String {
        self.args.join(" ")
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Stream a line was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
}

/// One line of process output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    /// Origin of the line
    pub stream: Stream,
    /// Line content without the trailing newline
    pub text: String,
}

impl OutputLine {
    /// Line read from stdout
    pub fn stdout(text: impl Into<String>) -> Self {
        Self {
            stream: Stream::Stdout,
            text: text.into(),
        }
    }

    /// Line read from stderr
    pub fn stderr(text: impl Into<String>) -> Self {
        Self {
            stream: Stream::Stderr,
            text: text.into(),
        }
    }
}

/// Exit status and captured output of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Exit code, `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    /// Interleaved output in arrival order
    pub lines: Vec<OutputLine>,
}

impl ProcessOutcome {
    /// Exit status 0
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// All lines joined by newlines
    pub fn output(&self) -> String {
        self.lines
            .iter()
            .map(|line| line.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Stdout lines only
    pub fn stdout_lines(&self) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .filter(|line| line.stream == Stream::Stdout)
            .map(|line| line.text.as_str())
    }
}

/// Callback receiving output lines while a process runs
pub type LineSink<'a> = &'a mut (dyn FnMut(&OutputLine) + Send);

/// Handle of a spawned process
#[async_trait::async_trait]
pub trait RuntimeProcess: Send {
    /// Wait for exit, forwarding each output line to `on_line` as it arrives
    async fn wait(&mut self, on_line: LineSink<'_>) -> DriverResult<ProcessOutcome>;

    /// Kill the process; a process that already exited is left alone
    async fn stop(&mut self) -> DriverResult<()>;
}

/// Spawns invocations
#[async_trait::async_trait]
pub trait ProcessRunner: Send + Sync + fmt::Debug {
    /// Start the invocation and return its handle
    async fn spawn(&self, invocation: &Invocation) -> DriverResult<Box<dyn RuntimeProcess>>;

    /// Run the invocation to completion on the current thread
    ///
    /// Used where no runtime is available, e.g. from `Drop`.
    /// Output is discarded; returns the exit code.
    fn run_blocking(&self, invocation: &Invocation) -> DriverResult<Option<i32>>;
}

/// Runner backed by `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

#[async_trait::async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn spawn(&self, invocation: &Invocation) -> DriverResult<Box<dyn RuntimeProcess>> {
        debug!("Spawning {}", invocation);

        let mut command = Command::new(invocation.program());
        let _ = command
            .args(invocation.arguments())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = invocation.working_dir() {
            let _ = command.current_dir(dir);
        }
        match invocation.output_mode() {
            OutputMode::Piped => {
                let _ = command.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
            OutputMode::Discard => {
                let _ = command.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }

        let child = command.spawn().map_err(|e| DriverError::SpawnFailed {
            command: invocation.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Box::new(TokioProcess { child }))
    }

    fn run_blocking(&self, invocation: &Invocation) -> DriverResult<Option<i32>> {
        debug!("Running {} synchronously", invocation);

        let mut command = std::process::Command::new(invocation.program());
        let _ = command
            .args(invocation.arguments())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(dir) = invocation.working_dir() {
            let _ = command.current_dir(dir);
        }

        let status = command.status().map_err(|e| DriverError::SpawnFailed {
            command: invocation.to_string(),
            reason: e.to_string(),
        })?;
        Ok(status.code())
    }
}

struct TokioProcess {
    child: Child,
}

type LineReader<R> = Option<Split<BufReader<R>>>;

fn line_reader<R: AsyncRead + Unpin>(stream: Option<R>) -> LineReader<R> {
    stream.map(|s| BufReader::new(s).split(b'\n'))
}

/// Next line of an optional reader; pending forever once the reader is gone
///
/// Bytes that are not UTF-8 are replaced, never reported as an error.
async fn next_line<R: AsyncRead + Unpin>(reader: &mut LineReader<R>) -> std::io::Result<Option<String>> {
    let Some(segments) = reader else {
        return std::future::pending().await;
    };
    let Some(mut bytes) = segments.next_segment().await? else {
        return Ok(None);
    };
    if bytes.last() == Some(&b'\r') {
        let _ = bytes.pop();
    }
    Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
}

#[async_trait::async_trait]
impl RuntimeProcess for TokioProcess {
    async fn wait(&mut self, on_line: LineSink<'_>) -> DriverResult<ProcessOutcome> {
        let mut stdout = line_reader(self.child.stdout.take());
        let mut stderr = line_reader(self.child.stderr.take());
        let mut lines = Vec::new();

        while stdout.is_some() || stderr.is_some() {
            let (stream, line) = tokio::select! {
                line = next_line(&mut stdout) => (Stream::Stdout, line?),
                line = next_line(&mut stderr) => (Stream::Stderr, line?),
            };

            match (line, stream) {
                (Some(text), stream) => {
                    let line = OutputLine { stream, text };
                    on_line(&line);
                    lines.push(line);
                }
                (None, Stream::Stdout) => stdout = None,
                (None, Stream::Stderr) => stderr = None,
            }
        }

        let status = self.child.wait().await?;
        Ok(ProcessOutcome {
            exit_code: status.code(),
            lines,
        })
    }

    async fn stop(&mut self) -> DriverResult<()> {
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }
        self.child.kill().await?;
        Ok(())
    }
}
