use avatar_core::{AvatarConfig, CommandRunner, Generator};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub generator: Arc<Generator>,
    pub config: Arc<AvatarConfig>,
}

impl AppState {
    pub fn new(config: AvatarConfig) -> Self {
        let generator = Generator::new(&config);
        Self::from_parts(config, generator)
    }

    /// Same as `new`, with external processes going through `runner`.
    pub fn with_runner(config: AvatarConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let generator = Generator::with_runner(&config, runner);
        Self::from_parts(config, generator)
    }

    fn from_parts(config: AvatarConfig, generator: Generator) -> Self {
        Self {
            generator: Arc::new(generator),
            config: Arc::new(config),
        }
    }
}
