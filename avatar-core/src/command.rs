//! External command spec and the synchronous runner every collaborator goes through.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// One external invocation: program, ordered arguments, optional working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl ExternalCommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy())
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }

    /// Value following `flag`, if present.
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    /// Shell-like rendering for logs.
    pub fn display(&self) -> String {
        let mut s = self.program.clone();
        for a in &self.args {
            s.push(' ');
            if a.contains(char::is_whitespace) {
                s.push('"');
                s.push_str(a);
                s.push('"');
            } else {
                s.push_str(a);
            }
        }
        s
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{program}: command not found")]
    NotFound { program: String },

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {}s", after.as_secs())]
    TimedOut { program: String, after: Duration },

    #[error("failed waiting for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Runs an [`ExternalCommandSpec`] to completion. Implementations never retry.
pub trait CommandRunner: Send + Sync {
    fn run(&self, spec: &ExternalCommandSpec) -> Result<CommandOutput, CommandError>;
}

/// Spawns real processes, optionally bounded by a timeout.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    timeout: Option<Duration>,
}

impl SystemRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(50);

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &ExternalCommandSpec) -> Result<CommandOutput, CommandError> {
        debug!(command = %spec.display(), cwd = ?spec.working_dir, "running external command");

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }
        let mut child = cmd.spawn().map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                CommandError::NotFound {
                    program: spec.program.clone(),
                }
            } else {
                CommandError::Spawn {
                    program: spec.program.clone(),
                    source,
                }
            }
        })?;

        // Drain both pipes while waiting so a chatty child cannot block on a full pipe.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let code = wait_bounded(&mut child, self.timeout).map_err(|e| match e {
            WaitFailure::TimedOut(after) => CommandError::TimedOut {
                program: spec.program.clone(),
                after,
            },
            WaitFailure::Io(source) => CommandError::Wait {
                program: spec.program.clone(),
                source,
            },
        })?;

        let output = CommandOutput {
            code,
            stdout: join_drain(stdout),
            stderr: join_drain(stderr),
        };
        if !output.stdout.is_empty() {
            debug!(program = %spec.program, stdout = %output.stdout.trim_end(), "command stdout");
        }
        debug!(program = %spec.program, code = ?output.code, "command finished");
        Ok(output)
    }
}

enum WaitFailure {
    TimedOut(Duration),
    Io(std::io::Error),
}

fn wait_bounded(child: &mut Child, timeout: Option<Duration>) -> Result<Option<i32>, WaitFailure> {
    let Some(timeout) = timeout else {
        return child.wait().map(|s| s.code()).map_err(WaitFailure::Io);
    };
    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status.code()),
            Ok(None) => {
                if start.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(WaitFailure::TimedOut(timeout));
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => return Err(WaitFailure::Io(e)),
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut r| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = r.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn join_drain(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}
