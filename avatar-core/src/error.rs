//! Error taxonomy for request dispatch.
//!
//! Everything except [`GenerationError::Resource`] is recovered at the request
//! facade and turned into a failed [`PipelineOutcome`](crate::PipelineOutcome).

use crate::audio::AudioError;
use crate::command::CommandError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    /// A required input file is missing.
    #[error("{what} not found: {}", path.display())]
    InputNotFound { what: &'static str, path: PathBuf },

    /// Neither or both of audio file and text were given.
    #[error("{0}")]
    AmbiguousAudioSource(&'static str),

    /// A required external collaborator is not installed.
    #[error("{tool} is not available: {hint}")]
    ToolMissing { tool: String, hint: String },

    #[error("speech synthesis failed: {0}")]
    Synthesis(String),

    /// External process exited non-zero.
    #[error("{program} exited with {}: {}", exit_label(*code), stderr_or_placeholder(stderr))]
    PipelineProcess {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    /// Process reported success but no output file was found.
    #[error("{0}")]
    OutputNotProduced(String),

    #[error("checkpoint download from {url} failed: {reason}")]
    CheckpointDownload { url: String, reason: String },

    #[error("{program} did not finish within {}s", after.as_secs())]
    TimedOut { program: String, after: Duration },

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("lost track of {program} while waiting for it to exit: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The requested output location cannot be created.
    #[error("cannot create output directory {}: {source}", path.display())]
    OutputNotWritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Local resource exhaustion (temp files, directories). Fatal.
    #[error("resource error: {0}")]
    Resource(#[from] std::io::Error),
}

impl GenerationError {
    /// Stable taxonomy name, used as the diagnostic prefix.
    pub fn kind(&self) -> &'static str {
        match self {
            GenerationError::InputNotFound { .. } => "InputNotFound",
            GenerationError::AmbiguousAudioSource(_) => "AmbiguousAudioSource",
            GenerationError::ToolMissing { .. } => "ToolMissing",
            GenerationError::Synthesis(_) => "SynthesisError",
            GenerationError::PipelineProcess { .. } => "PipelineProcessError",
            GenerationError::OutputNotProduced(_) => "OutputNotProduced",
            GenerationError::CheckpointDownload { .. } => "CheckpointDownloadError",
            GenerationError::TimedOut { .. } => "TimedOut",
            GenerationError::Spawn { .. } => "SpawnError",
            GenerationError::Wait { .. } => "WaitError",
            GenerationError::OutputNotWritable { .. } => "OutputNotWritable",
            GenerationError::Resource(_) => "ResourceError",
        }
    }

    /// `"<Kind>: <message>"`, surfaced verbatim by the CLI and the daemon.
    pub fn diagnostic(&self) -> String {
        format!("{}: {}", self.kind(), self)
    }

    /// Map a runner failure into the taxonomy; `hint` is shown when the program is missing.
    pub(crate) fn from_command(err: CommandError, hint: &str) -> Self {
        match err {
            CommandError::NotFound { program } => GenerationError::ToolMissing {
                tool: program,
                hint: hint.to_string(),
            },
            CommandError::TimedOut { program, after } => GenerationError::TimedOut { program, after },
            CommandError::Spawn { program, source } => GenerationError::Spawn { program, source },
            CommandError::Wait { program, source } => GenerationError::Wait { program, source },
        }
    }
}

impl From<AudioError> for GenerationError {
    fn from(err: AudioError) -> Self {
        match err {
            AudioError::NotFound(path) => GenerationError::InputNotFound { what: "audio file", path },
            AudioError::ToolMissing { tool } => GenerationError::ToolMissing {
                hint: tts_install_hint(&tool),
                tool,
            },
            AudioError::Synthesis(msg) => GenerationError::Synthesis(msg),
            AudioError::TimedOut { program, after } => GenerationError::TimedOut { program, after },
            AudioError::Resource(e) => GenerationError::Resource(e),
        }
    }
}

fn tts_install_hint(program: &str) -> String {
    let name = Path::new(program).file_name().and_then(|n| n.to_str()).unwrap_or(program);
    if name == "edge-tts" {
        "install it with `pip install edge-tts`".to_string()
    } else {
        format!("install `{}` or point `tts.program` at an installed synthesizer", program)
    }
}

fn exit_label(code: Option<i32>) -> String {
    match code {
        Some(c) => format!("status {}", c),
        None => "a signal".to_string(),
    }
}

fn stderr_or_placeholder(stderr: &str) -> &str {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        "(no stderr output)"
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_is_prefixed_with_kind() {
        let err = GenerationError::InputNotFound {
            what: "video",
            path: PathBuf::from("face.mp4"),
        };
        assert_eq!(err.diagnostic(), "InputNotFound: video not found: face.mp4");
    }

    #[test]
    fn process_error_carries_stderr() {
        let err = GenerationError::PipelineProcess {
            program: "python".into(),
            code: Some(2),
            stderr: "CUDA out of memory\n".into(),
        };
        let d = err.diagnostic();
        assert!(d.starts_with("PipelineProcessError:"));
        assert!(d.contains("status 2"));
        assert!(d.contains("CUDA out of memory"));
    }

    #[test]
    fn empty_stderr_still_gives_message() {
        let err = GenerationError::PipelineProcess {
            program: "python".into(),
            code: None,
            stderr: String::new(),
        };
        assert!(err.to_string().contains("(no stderr output)"));
    }

    #[test]
    fn wait_failure_has_its_own_kind() {
        let err = GenerationError::from_command(
            CommandError::Wait {
                program: "python".into(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "ECHILD"),
            },
            "unused",
        );
        assert_eq!(err.kind(), "WaitError");
        assert!(err.diagnostic().starts_with("WaitError: lost track of python"));
    }

    #[test]
    fn tts_hint_follows_configured_program() {
        let default: GenerationError = AudioError::ToolMissing { tool: "edge-tts".into() }.into();
        assert!(default.to_string().contains("pip install edge-tts"));

        let pathed: GenerationError = AudioError::ToolMissing { tool: "/opt/bin/edge-tts".into() }.into();
        assert!(pathed.to_string().contains("pip install edge-tts"));

        let other: GenerationError = AudioError::ToolMissing { tool: "piper".into() }.into();
        let msg = other.to_string();
        assert!(!msg.contains("edge-tts"));
        assert!(msg.contains("`piper`"));
        assert!(msg.contains("tts.program"));
    }

    #[test]
    fn command_not_found_maps_to_tool_missing() {
        let err = GenerationError::from_command(
            CommandError::NotFound { program: "wget".into() },
            "install wget",
        );
        assert_eq!(err.kind(), "ToolMissing");
        assert!(err.to_string().contains("install wget"));
    }
}
