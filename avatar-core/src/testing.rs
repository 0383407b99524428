//! Recording runner for unit tests: no process is ever spawned.

use crate::command::{CommandError, CommandOutput, CommandRunner, ExternalCommandSpec};
use std::sync::Mutex;

type Handler = Box<dyn Fn(&ExternalCommandSpec) -> Result<CommandOutput, CommandError> + Send + Sync>;

pub(crate) struct RecordingRunner {
    calls: Mutex<Vec<ExternalCommandSpec>>,
    handler: Handler,
}

impl RecordingRunner {
    pub(crate) fn new<F>(handler: F) -> Self
    where
        F: Fn(&ExternalCommandSpec) -> Result<CommandOutput, CommandError> + Send + Sync + 'static,
    {
        Self {
            calls: Mutex::new(Vec::new()),
            handler: Box::new(handler),
        }
    }

    /// Every command exits 0 without side effects.
    pub(crate) fn succeeding() -> Self {
        Self::new(|_| Ok(exit(0, "")))
    }

    pub(crate) fn calls(&self) -> Vec<ExternalCommandSpec> {
        self.calls.lock().unwrap().clone()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, spec: &ExternalCommandSpec) -> Result<CommandOutput, CommandError> {
        self.calls.lock().unwrap().push(spec.clone());
        (self.handler)(spec)
    }
}

pub(crate) fn exit(code: i32, stderr: &str) -> CommandOutput {
    CommandOutput {
        code: Some(code),
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

/// Write `contents` to the path following `flag`, mimicking a tool that honours it.
pub(crate) fn write_flag_target(spec: &ExternalCommandSpec, flag: &str, contents: &[u8]) {
    if let Some(p) = spec.flag_value(flag) {
        std::fs::write(p, contents).unwrap();
    }
}
