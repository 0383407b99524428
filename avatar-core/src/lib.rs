//! Avatar core: request dispatch and result resolution for external
//! talking-head generation pipelines.

pub mod audio;
pub mod command;
pub mod config;
pub mod error;
pub mod facade;
pub mod invoker;
pub mod locator;
pub mod request;

#[cfg(test)]
mod testing;

pub use audio::{AudioError, AudioResolver, EdgeTts, ResolvedAudio, SpeechSynthesizer};
pub use command::{CommandError, CommandOutput, CommandRunner, ExternalCommandSpec, SystemRunner};
pub use config::{AvatarConfig, ConfigError, ProjectLayout};
pub use error::GenerationError;
pub use facade::Generator;
pub use invoker::{fast_output_path, PipelineInvoker};
pub use locator::{locate, LocateStrategy};
pub use request::{AudioSource, GenerationOptions, GenerationRequest, Pipeline, PipelineOutcome};
