//! Pipeline invocation: build the external command for a pipeline, run it, and
//! locate what it produced.

use crate::audio::ResolvedAudio;
use crate::command::{CommandError, CommandOutput, CommandRunner, ExternalCommandSpec};
use crate::config::{AvatarConfig, FastPipelineConfig, ProjectLayout, QualityPipelineConfig};
use crate::error::GenerationError;
use crate::locator::{locate, LocateStrategy};
use crate::request::{GenerationOptions, Pipeline, PipelineOutcome};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

const INTERPRETER_HINT: &str = "install Python and the model's requirements";

pub struct PipelineInvoker {
    layout: ProjectLayout,
    fast: FastPipelineConfig,
    quality: QualityPipelineConfig,
    runner: Arc<dyn CommandRunner>,
    /// Serializes the one-time checkpoint download across concurrent requests.
    download_lock: Mutex<()>,
}

impl PipelineInvoker {
    pub fn new(config: &AvatarConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            layout: config.layout(),
            fast: config.fast.clone(),
            quality: config.quality.clone(),
            runner,
            download_lock: Mutex::new(()),
        }
    }

    pub fn model_dir(&self, pipeline: Pipeline) -> PathBuf {
        match pipeline {
            Pipeline::Fast => self.layout.resolve(&self.fast.model_dir),
            Pipeline::Quality => self.layout.resolve(&self.quality.model_dir),
        }
    }

    pub fn interpreter(&self, pipeline: Pipeline) -> &str {
        match pipeline {
            Pipeline::Fast => &self.fast.interpreter,
            Pipeline::Quality => &self.quality.interpreter,
        }
    }

    /// Run `pipeline` and report the outcome. Never returns an error.
    pub fn invoke(
        &self,
        pipeline: Pipeline,
        source_media: &Path,
        audio: &ResolvedAudio,
        options: &GenerationOptions,
        output_dir: &Path,
    ) -> PipelineOutcome {
        match self.run(pipeline, source_media, audio, options, output_dir) {
            Ok(path) => PipelineOutcome::succeeded(path, success_message(pipeline)),
            Err(e) => PipelineOutcome::from_error(&e),
        }
    }

    /// Like [`invoke`](Self::invoke), keeping the error so callers can tell
    /// fatal resource failures apart.
    pub fn run(
        &self,
        pipeline: Pipeline,
        source_media: &Path,
        audio: &ResolvedAudio,
        options: &GenerationOptions,
        output_dir: &Path,
    ) -> Result<PathBuf, GenerationError> {
        info!(%pipeline, source = %source_media.display(), audio = %audio.path().display(), "invoking pipeline");
        let result = match pipeline {
            Pipeline::Fast => self.run_fast(source_media, audio.path(), options, output_dir),
            Pipeline::Quality => self.run_quality(source_media, audio.path(), options, output_dir),
        };
        match &result {
            Ok(path) => info!(%pipeline, output = %path.display(), "pipeline produced output"),
            Err(e) => warn!(%pipeline, kind = e.kind(), error = %e, "pipeline failed"),
        }
        result
    }

    fn run_fast(
        &self,
        source: &Path,
        audio: &Path,
        options: &GenerationOptions,
        output_dir: &Path,
    ) -> Result<PathBuf, GenerationError> {
        let model_dir = self.require_model_dir(Pipeline::Fast)?;
        let checkpoint = self.ensure_checkpoint(&model_dir)?;

        let output = match &options.output_path {
            Some(path) => path.clone(),
            None => fast_output_path(output_dir, &self.fast.output_prefix, source),
        };
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            // Caller-chosen locations fail the request; our own directories are fatal.
            fs::create_dir_all(parent).map_err(|source| match options.output_path {
                Some(_) => GenerationError::OutputNotWritable {
                    path: parent.to_path_buf(),
                    source,
                },
                None => GenerationError::Resource(source),
            })?;
        }

        let spec = self.fast_command(&model_dir, &checkpoint, source, audio, &output);
        let out = self.execute(&spec)?;
        locate_output(&LocateStrategy::Exact(output.clone())).ok_or_else(|| {
            GenerationError::OutputNotProduced(format!(
                "{} exited successfully but {} was not written{}",
                Pipeline::Fast.label(),
                output.display(),
                stderr_suffix(&out)
            ))
        })
    }

    fn run_quality(
        &self,
        source: &Path,
        audio: &Path,
        options: &GenerationOptions,
        output_dir: &Path,
    ) -> Result<PathBuf, GenerationError> {
        let model_dir = self.require_model_dir(Pipeline::Quality)?;
        let result_dir = if self.quality.isolate_runs {
            output_dir.join(uuid::Uuid::new_v4().to_string())
        } else {
            output_dir.to_path_buf()
        };
        fs::create_dir_all(&result_dir)?;

        let spec = self.quality_command(&model_dir, source, audio, &result_dir, options.use_enhancer);
        let result = self.execute(&spec).and_then(|out| {
            let strategy = LocateStrategy::most_recent(&result_dir, &self.quality.output_glob);
            locate_output(&strategy).ok_or_else(|| {
                GenerationError::OutputNotProduced(format!(
                    "no file matching {} in {}{}",
                    self.quality.output_glob,
                    result_dir.display(),
                    stderr_suffix(&out)
                ))
            })
        });
        if result.is_err() && self.quality.isolate_runs {
            // Only succeeds when the tool left nothing behind.
            let _ = fs::remove_dir(&result_dir);
        }
        result
    }

    pub fn fast_command(
        &self,
        model_dir: &Path,
        checkpoint: &Path,
        source: &Path,
        audio: &Path,
        output: &Path,
    ) -> ExternalCommandSpec {
        ExternalCommandSpec::new(&self.fast.interpreter)
            .path_arg(&absolute(&model_dir.join("inference.py")))
            .arg("--checkpoint_path")
            .path_arg(&absolute(checkpoint))
            .arg("--face")
            .path_arg(&absolute(source))
            .arg("--audio")
            .path_arg(&absolute(audio))
            .arg("--outfile")
            .path_arg(&absolute(output))
            .arg("--pads")
            .args(self.fast.pads.iter().map(|p| p.to_string()))
            .arg("--resize_factor")
            .arg(self.fast.resize_factor.to_string())
            .current_dir(absolute(model_dir))
    }

    pub fn quality_command(
        &self,
        model_dir: &Path,
        source: &Path,
        audio: &Path,
        result_dir: &Path,
        use_enhancer: bool,
    ) -> ExternalCommandSpec {
        let spec = ExternalCommandSpec::new(&self.quality.interpreter)
            .path_arg(&absolute(&model_dir.join("inference.py")))
            .arg("--driven_audio")
            .path_arg(&absolute(audio))
            .arg("--source_image")
            .path_arg(&absolute(source))
            .arg("--result_dir")
            .path_arg(&absolute(result_dir));
        let spec = if use_enhancer {
            spec.arg("--enhancer").arg(&self.quality.enhancer)
        } else {
            spec
        };
        spec.current_dir(absolute(model_dir))
    }

    fn require_model_dir(&self, pipeline: Pipeline) -> Result<PathBuf, GenerationError> {
        let dir = self.model_dir(pipeline);
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(GenerationError::ToolMissing {
                tool: pipeline.label().to_string(),
                hint: format!("expected a checkout at {}; run the setup script first", dir.display()),
            })
        }
    }

    /// Download the checkpoint if it is missing. One attempt; a failure removes
    /// any partial file and fails the request.
    fn ensure_checkpoint(&self, model_dir: &Path) -> Result<PathBuf, GenerationError> {
        let checkpoint = model_dir.join(&self.fast.checkpoint);
        let _guard = self.download_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if checkpoint.is_file() {
            return Ok(checkpoint);
        }

        info!(url = %self.fast.checkpoint_url, dest = %checkpoint.display(), "downloading Wav2Lip checkpoint");
        if let Some(parent) = checkpoint.parent() {
            fs::create_dir_all(parent)?;
        }
        let spec = ExternalCommandSpec::new(&self.fast.downloader)
            .arg(&self.fast.checkpoint_url)
            .arg("-O")
            .path_arg(&checkpoint);

        let reason = match self.runner.run(&spec) {
            Ok(out) if out.success() => {
                if fs::metadata(&checkpoint).map(|m| m.len() > 0).unwrap_or(false) {
                    return Ok(checkpoint);
                }
                "download finished but the checkpoint is empty".to_string()
            }
            Ok(out) => format!(
                "{} exited with {:?}: {}",
                self.fast.downloader,
                out.code,
                out.stderr.trim()
            ),
            Err(CommandError::NotFound { program }) => {
                return Err(GenerationError::ToolMissing {
                    tool: program,
                    hint: format!("install it or place the checkpoint at {}", checkpoint.display()),
                })
            }
            Err(e) => e.to_string(),
        };
        let _ = fs::remove_file(&checkpoint);
        Err(GenerationError::CheckpointDownload {
            url: self.fast.checkpoint_url.clone(),
            reason,
        })
    }

    fn execute(&self, spec: &ExternalCommandSpec) -> Result<CommandOutput, GenerationError> {
        let out = self
            .runner
            .run(spec)
            .map_err(|e| GenerationError::from_command(e, INTERPRETER_HINT))?;
        if !out.success() {
            return Err(GenerationError::PipelineProcess {
                program: spec.program.clone(),
                code: out.code,
                stderr: out.stderr,
            });
        }
        Ok(out)
    }
}

/// `<output_dir>/<prefix><source stem>.mp4`.
pub fn fast_output_path(output_dir: &Path, prefix: &str, source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    output_dir.join(format!("{}{}.mp4", prefix, stem))
}

pub fn success_message(pipeline: Pipeline) -> String {
    format!("{} generation successful!", pipeline.label())
}

fn locate_output(strategy: &LocateStrategy) -> Option<PathBuf> {
    let found = locate(strategy);
    debug!(strategy = strategy.name(), found = ?found, "located pipeline output");
    found
}

// The tools run inside their model directory.
fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn stderr_suffix(out: &CommandOutput) -> String {
    let stderr = out.stderr.trim();
    if stderr.is_empty() {
        String::new()
    } else {
        format!("; stderr: {}", stderr)
    }
}
