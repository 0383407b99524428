//! Request and outcome types.

use crate::error::GenerationError;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Which generation path a request goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Pipeline {
    /// Deterministic-output 2D lip-sync.
    Fast,
    /// 3D-aware generation; output naming is chosen by the tool.
    Quality,
}

impl Pipeline {
    pub const ALL: [Pipeline; 2] = [Pipeline::Fast, Pipeline::Quality];

    pub fn as_str(&self) -> &'static str {
        match self {
            Pipeline::Fast => "fast",
            Pipeline::Quality => "quality",
        }
    }

    /// Name of the underlying model, for status messages.
    pub fn label(&self) -> &'static str {
        match self {
            Pipeline::Fast => "Wav2Lip",
            Pipeline::Quality => "SadTalker",
        }
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Pipeline {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" | "wav2lip" => Ok(Pipeline::Fast),
            "quality" | "sadtalker" => Ok(Pipeline::Quality),
            other => Err(format!("unknown pipeline '{}', expected fast or quality", other)),
        }
    }
}

/// Exactly one source of speech for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    File(PathBuf),
    Text(String),
}

impl AudioSource {
    /// Build from two optional parts, enforcing that exactly one is present.
    /// Blank text counts as absent.
    pub fn from_parts(file: Option<PathBuf>, text: Option<String>) -> Result<Self, GenerationError> {
        let text = text.filter(|t| !t.trim().is_empty());
        match (file, text) {
            (Some(path), None) => Ok(AudioSource::File(path)),
            (None, Some(text)) => Ok(AudioSource::Text(text)),
            (None, None) => Err(GenerationError::AmbiguousAudioSource(
                "must provide either an audio file or text",
            )),
            (Some(_), Some(_)) => Err(GenerationError::AmbiguousAudioSource(
                "provide an audio file or text, not both",
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationOptions {
    /// Quality pipeline only: run the face enhancer.
    pub use_enhancer: bool,
    /// TTS voice; the configured default when `None`.
    pub voice: Option<String>,
    /// Fast pipeline only: write here instead of the templated path.
    pub output_path: Option<PathBuf>,
}

/// One user action. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pipeline: Pipeline,
    source_media: PathBuf,
    audio: AudioSource,
    options: GenerationOptions,
}

impl GenerationRequest {
    pub fn new(
        pipeline: Pipeline,
        source_media: impl Into<PathBuf>,
        audio: AudioSource,
        options: GenerationOptions,
    ) -> Self {
        Self {
            pipeline,
            source_media: source_media.into(),
            audio,
            options,
        }
    }

    pub fn pipeline(&self) -> Pipeline {
        self.pipeline
    }

    pub fn source_media(&self) -> &Path {
        &self.source_media
    }

    pub fn audio(&self) -> &AudioSource {
        &self.audio
    }

    pub fn options(&self) -> &GenerationOptions {
        &self.options
    }
}

/// Terminal result of one request. `output_path` is set iff `success`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineOutcome {
    success: bool,
    output_path: Option<PathBuf>,
    diagnostic: String,
}

impl PipelineOutcome {
    pub fn succeeded(output_path: PathBuf, message: impl Into<String>) -> Self {
        Self {
            success: true,
            output_path: Some(output_path),
            diagnostic: message.into(),
        }
    }

    pub fn failed(diagnostic: impl Into<String>) -> Self {
        let mut diagnostic = diagnostic.into();
        if diagnostic.trim().is_empty() {
            diagnostic = "generation failed without a diagnostic".to_string();
        }
        Self {
            success: false,
            output_path: None,
            diagnostic,
        }
    }

    pub fn from_error(err: &GenerationError) -> Self {
        Self::failed(err.diagnostic())
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }

    pub fn diagnostic(&self) -> &str {
        &self.diagnostic
    }
}
