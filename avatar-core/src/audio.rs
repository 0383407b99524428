//! Audio resolution: pass an existing file through or synthesize text into a
//! temporary file that is released exactly once.

use crate::command::{CommandError, CommandRunner, ExternalCommandSpec};
use crate::config::TtsConfig;
use crate::request::AudioSource;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempPath;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("audio file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("{tool} not found")]
    ToolMissing { tool: String },

    #[error("{0}")]
    Synthesis(String),

    #[error("{program} did not finish within {}s", after.as_secs())]
    TimedOut { program: String, after: Duration },

    /// Temp file allocation failed.
    #[error("could not allocate temporary audio file: {0}")]
    Resource(#[from] std::io::Error),
}

/// Text-to-speech collaborator.
pub trait SpeechSynthesizer: Send + Sync {
    fn name(&self) -> &str;
    fn synthesize(&self, text: &str, voice: &str, output: &Path) -> Result<(), AudioError>;
}

/// `edge-tts --text T --voice V --write-media P`.
pub struct EdgeTts {
    program: String,
    runner: Arc<dyn CommandRunner>,
}

impl EdgeTts {
    pub fn new(program: impl Into<String>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            program: program.into(),
            runner,
        }
    }

    pub fn command(&self, text: &str, voice: &str, output: &Path) -> ExternalCommandSpec {
        ExternalCommandSpec::new(&self.program)
            .args(["--text", text, "--voice", voice, "--write-media"])
            .path_arg(output)
    }
}

impl SpeechSynthesizer for EdgeTts {
    fn name(&self) -> &str {
        &self.program
    }

    fn synthesize(&self, text: &str, voice: &str, output: &Path) -> Result<(), AudioError> {
        let spec = self.command(text, voice, output);
        let out = self.runner.run(&spec).map_err(|e| match e {
            CommandError::NotFound { program } => AudioError::ToolMissing { tool: program },
            CommandError::TimedOut { program, after } => AudioError::TimedOut { program, after },
            other => AudioError::Synthesis(other.to_string()),
        })?;
        if !out.success() {
            return Err(AudioError::Synthesis(format!(
                "{} exited with {:?}: {}",
                self.program,
                out.code,
                out.stderr.trim()
            )));
        }
        Ok(())
    }
}

/// Materialized audio input. A temporary file is deleted by [`release`](Self::release)
/// or, failing that, when the value is dropped.
#[derive(Debug)]
pub struct ResolvedAudio {
    path: PathBuf,
    temp: Option<TempPath>,
}

impl ResolvedAudio {
    pub fn existing(path: PathBuf) -> Self {
        Self { path, temp: None }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_temporary(&self) -> bool {
        self.temp.is_some()
    }

    /// Delete the file if temporary. Consumes self, so it runs at most once.
    pub fn release(mut self) -> std::io::Result<()> {
        match self.temp.take() {
            Some(temp) => match temp.close() {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
                _ => {
                    debug!(path = %self.path.display(), "released temporary audio");
                    Ok(())
                }
            },
            None => Ok(()),
        }
    }
}

pub struct AudioResolver {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    default_voice: String,
    temp_dir: Option<PathBuf>,
}

impl AudioResolver {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        default_voice: impl Into<String>,
        temp_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            synthesizer,
            default_voice: default_voice.into(),
            temp_dir,
        }
    }

    pub fn from_config(config: &TtsConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self::new(
            Arc::new(EdgeTts::new(&config.program, runner)),
            &config.voice,
            config.temp_dir.clone(),
        )
    }

    pub fn default_voice(&self) -> &str {
        &self.default_voice
    }

    pub fn resolve(&self, source: &AudioSource, voice: Option<&str>) -> Result<ResolvedAudio, AudioError> {
        match source {
            AudioSource::File(path) => {
                if !path.is_file() {
                    return Err(AudioError::NotFound(path.clone()));
                }
                Ok(ResolvedAudio::existing(path.clone()))
            }
            AudioSource::Text(text) => self.synthesize(text, voice.unwrap_or(&self.default_voice)),
        }
    }

    fn synthesize(&self, text: &str, voice: &str) -> Result<ResolvedAudio, AudioError> {
        let temp = self.allocate()?;
        let path = temp.to_path_buf();
        info!(
            voice,
            tool = self.synthesizer.name(),
            chars = text.chars().count(),
            "synthesizing speech"
        );

        let result = self
            .synthesizer
            .synthesize(text, voice, &path)
            .and_then(|()| match std::fs::metadata(&path) {
                Ok(m) if m.len() > 0 => Ok(()),
                _ => Err(AudioError::Synthesis(format!(
                    "{} reported success but wrote no audio",
                    self.synthesizer.name()
                ))),
            });

        match result {
            Ok(()) => Ok(ResolvedAudio {
                path,
                temp: Some(temp),
            }),
            Err(e) => {
                if let Err(close_err) = temp.close() {
                    warn!(path = %path.display(), error = %close_err, "failed to remove temporary audio");
                }
                Err(e)
            }
        }
    }

    fn allocate(&self) -> std::io::Result<TempPath> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("tts_").suffix(".wav");
        let file = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        Ok(file.into_temp_path())
    }
}
