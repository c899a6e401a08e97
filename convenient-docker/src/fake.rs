//! Scripted in-memory runner for tests
//!
//! [`ScriptedRunner`] records every invocation and answers with the first
//! rule whose needle occurs in the argument line. Unmatched invocations
//! exit 0 without output.

use crate::error::{DriverError, DriverResult};
use crate::process::{Invocation, LineSink, OutputLine, ProcessOutcome, ProcessRunner, RuntimeProcess};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Exit code reported by a process that was stopped
pub const STOPPED_EXIT_CODE: i32 = 137;

/// How a scripted process behaves
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Behaviour {
    /// Print `lines` on stdout, then exit with `code`
    Exit {
        /// Exit code
        code: i32,
        /// Stdout lines
        lines: Vec<String>,
    },
    /// Never exit on its own
    Hang,
    /// Fail to spawn
    SpawnError(String),
}

impl Behaviour {
    /// Exit with `code` and no output
    pub fn exit(code: i32) -> Self {
        Behaviour::Exit {
            code,
            lines: Vec::new(),
        }
    }

    /// Exit 0 printing `lines`
    pub fn print<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Behaviour::Exit {
            code: 0,
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug)]
struct Rule {
    needle: String,
    behaviour: Behaviour,
    remaining: Option<usize>,
}

#[derive(Debug, Default)]
struct Script {
    rules: Vec<Rule>,
    invocations: Vec<Invocation>,
    blocking: Vec<Invocation>,
    stopped: Vec<String>,
}

impl Script {
    fn behaviour_for(&mut self, invocation: &Invocation) -> Behaviour {
        let line = invocation.args_line();
        let position = self
            .rules
            .iter()
            .position(|rule| rule.remaining != Some(0) && line.contains(&rule.needle));

        match position {
            Some(index) => {
                let rule = &mut self.rules[index];
                if let Some(remaining) = rule.remaining.as_mut() {
                    *remaining -= 1;
                }
                rule.behaviour.clone()
            }
            None => Behaviour::exit(0),
        }
    }
}

/// Records invocations and replays scripted behaviours
#[derive(Debug, Clone, Default)]
pub struct ScriptedRunner {
    script: Arc<Mutex<Script>>,
}

impl ScriptedRunner {
    /// Runner where every command succeeds silently
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answer invocations whose argument line contains `needle`
    pub fn on(&self, needle: impl Into<String>, behaviour: Behaviour) -> &Self {
        self.lock().rules.push(Rule {
            needle: needle.into(),
            behaviour,
            remaining: None,
        });
        self
    }

    /// Like [`on`](Self::on), but only for the next matching invocation
    pub fn once(&self, needle: impl Into<String>, behaviour: Behaviour) -> &Self {
        self.lock().rules.push(Rule {
            needle: needle.into(),
            behaviour,
            remaining: Some(1),
        });
        self
    }

    /// Every spawned invocation, in order
    pub fn invocations(&self) -> Vec<Invocation> {
        self.lock().invocations.clone()
    }

    /// Argument lines of every spawned invocation
    pub fn commands(&self) -> Vec<String> {
        self.lock().invocations.iter().map(Invocation::args_line).collect()
    }

    /// Argument lines of blocking invocations
    pub fn blocking_commands(&self) -> Vec<String> {
        self.lock().blocking.iter().map(Invocation::args_line).collect()
    }

    /// Argument lines of processes that were stopped
    pub fn stopped(&self) -> Vec<String> {
        self.lock().stopped.clone()
    }

    /// Index of the first spawned command containing `needle`
    pub fn position(&self, needle: &str) -> Option<usize> {
        self.commands().iter().position(|command| command.contains(needle))
    }
}

#[async_trait::async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn spawn(&self, invocation: &Invocation) -> DriverResult<Box<dyn RuntimeProcess>> {
        let mut script = self.lock();
        script.invocations.push(invocation.clone());
        match script.behaviour_for(invocation) {
            Behaviour::SpawnError(reason) => Err(DriverError::SpawnFailed {
                command: invocation.to_string(),
                reason,
            }),
            behaviour => Ok(Box::new(ScriptedProcess {
                command: invocation.args_line(),
                behaviour,
                stopped: false,
                script: Arc::clone(&self.script),
            })),
        }
    }

    fn run_blocking(&self, invocation: &Invocation) -> DriverResult<Option<i32>> {
        let mut script = self.lock();
        script.blocking.push(invocation.clone());
        match script.behaviour_for(invocation) {
            Behaviour::Exit { code, .. } => Ok(Some(code)),
            Behaviour::Hang => Ok(None),
            Behaviour::SpawnError(reason) => Err(DriverError::SpawnFailed {
                command: invocation.to_string(),
                reason,
            }),
        }
    }
}

struct ScriptedProcess {
    command: String,
    behaviour: Behaviour,
    stopped: bool,
    script: Arc<Mutex<Script>>,
}

#[async_trait::async_trait]
impl RuntimeProcess for ScriptedProcess {
    async fn wait(&mut self, on_line: LineSink<'_>) -> DriverResult<ProcessOutcome> {
        if self.stopped {
            return Ok(ProcessOutcome {
                exit_code: Some(STOPPED_EXIT_CODE),
                lines: Vec::new(),
            });
        }

        match &self.behaviour {
            Behaviour::Exit { code, lines } => {
                let lines: Vec<OutputLine> = lines.iter().map(OutputLine::stdout).collect();
                for line in &lines {
                    on_line(line);
                }
                Ok(ProcessOutcome {
                    exit_code: Some(*code),
                    lines,
                })
            }
            Behaviour::Hang | Behaviour::SpawnError(_) => std::future::pending().await,
        }
    }

    async fn stop(&mut self) -> DriverResult<()> {
        self.stopped = true;
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stopped
            .push(self.command.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn invocation(args: &[&str]) -> Invocation {
        Invocation::new("docker").args(args.iter().copied())
    }

    #[tokio::test]
    async fn test_rules_and_recording() {
        let runner = ScriptedRunner::new();
        let _ = runner
            .on("images", Behaviour::print(["a", "b"]))
            .once("rmi", Behaviour::exit(1));

        let mut process = runner.spawn(&invocation(&["images", "-q"])).await.unwrap();
        let outcome = process.wait(&mut |_| {}).await.unwrap();
        assert_eq!(outcome.output(), "a\nb");

        let mut first = runner.spawn(&invocation(&["rmi", "x"])).await.unwrap();
        assert_eq!(first.wait(&mut |_| {}).await.unwrap().exit_code, Some(1));
        let mut second = runner.spawn(&invocation(&["rmi", "x"])).await.unwrap();
        assert_eq!(second.wait(&mut |_| {}).await.unwrap().exit_code, Some(0));

        assert_eq!(runner.commands(), vec!["images -q", "rmi x", "rmi x"]);
        assert_eq!(runner.position("rmi"), Some(1));
    }

    #[tokio::test]
    async fn test_hanging_process_can_be_stopped() {
        let runner = ScriptedRunner::new();
        let _ = runner.on("wait", Behaviour::Hang);

        let mut process = runner.spawn(&invocation(&["run", "wait"])).await.unwrap();
        let waited = tokio::time::timeout(Duration::from_millis(20), process.wait(&mut |_| {})).await;
        assert!(waited.is_err());

        process.stop().await.unwrap();
        let outcome = process.wait(&mut |_| {}).await.unwrap();
        assert_eq!(outcome.exit_code, Some(STOPPED_EXIT_CODE));
        assert_eq!(runner.stopped(), vec!["run wait"]);
    }

    #[tokio::test]
    async fn test_spawn_error() {
        let runner = ScriptedRunner::new();
        let _ = runner.on("build", Behaviour::SpawnError("no docker".into()));
        assert!(runner.spawn(&invocation(&["build"])).await.is_err());
        assert!(runner.run_blocking(&invocation(&["build"])).is_err());
        assert_eq!(runner.blocking_commands(), vec!["build"]);
    }
}
