//! Single entry point for the CLI and the daemon.

use crate::audio::AudioResolver;
use crate::command::{CommandRunner, SystemRunner};
use crate::config::{AvatarConfig, ProjectLayout};
use crate::error::GenerationError;
use crate::invoker::{success_message, PipelineInvoker};
use crate::request::{GenerationRequest, PipelineOutcome};
use std::sync::Arc;
use tracing::{info, warn};

pub struct Generator {
    layout: ProjectLayout,
    resolver: AudioResolver,
    invoker: PipelineInvoker,
}

impl Generator {
    /// Real processes, bounded by the configured timeout.
    pub fn new(config: &AvatarConfig) -> Self {
        Self::with_runner(config, Arc::new(SystemRunner::new(config.timeout())))
    }

    pub fn with_runner(config: &AvatarConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self::from_parts(
            config.layout(),
            AudioResolver::from_config(&config.tts, Arc::clone(&runner)),
            PipelineInvoker::new(config, runner),
        )
    }

    pub fn from_parts(layout: ProjectLayout, resolver: AudioResolver, invoker: PipelineInvoker) -> Self {
        Self {
            layout,
            resolver,
            invoker,
        }
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    pub fn invoker(&self) -> &PipelineInvoker {
        &self.invoker
    }

    pub fn default_voice(&self) -> &str {
        self.resolver.default_voice()
    }

    /// Resolve audio, run the pipeline, release temporary audio, report.
    ///
    /// Every recoverable failure comes back as a failed outcome; only local
    /// resource exhaustion is returned as `Err`.
    pub fn handle_request(&self, request: &GenerationRequest) -> std::io::Result<PipelineOutcome> {
        match self.try_handle(request) {
            Ok(outcome) => Ok(outcome),
            Err(GenerationError::Resource(e)) => Err(e),
            Err(e) => {
                warn!(pipeline = %request.pipeline(), kind = e.kind(), error = %e, "request failed");
                Ok(PipelineOutcome::from_error(&e))
            }
        }
    }

    fn try_handle(&self, request: &GenerationRequest) -> Result<PipelineOutcome, GenerationError> {
        let pipeline = request.pipeline();
        let source = request.source_media();
        info!(%pipeline, source = %source.display(), "handling generation request");

        if !source.is_file() {
            return Err(GenerationError::InputNotFound {
                what: "video",
                path: source.to_path_buf(),
            });
        }

        let audio = self
            .resolver
            .resolve(request.audio(), request.options().voice.as_deref())?;
        let result = self.invoker.run(
            pipeline,
            source,
            &audio,
            request.options(),
            &self.layout.videos_dir,
        );
        let temporary = audio.is_temporary();
        if let Err(e) = audio.release() {
            warn!(error = %e, "failed to release temporary audio");
        } else if temporary {
            info!("temporary audio released");
        }

        let output = result?;
        Ok(PipelineOutcome::succeeded(output, success_message(pipeline)))
    }
}
