//! Avatar CLI: lip-sync a face video to an audio file or to synthesized text
//! with the fast (Wav2Lip) pipeline.

use avatar_core::{
    AudioSource, AvatarConfig, GenerationOptions, GenerationRequest, Generator, Pipeline,
};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "avatar-cli",
    version,
    about = "Generate a lip-synced talking-head video with the fast pipeline"
)]
struct Cli {
    /// Input video file
    #[arg(long)]
    video: PathBuf,

    /// Audio file (if not using --text)
    #[arg(long)]
    audio: Option<PathBuf>,

    /// Text to synthesize (if not using --audio)
    #[arg(long)]
    text: Option<String>,

    /// Voice for the TTS tool (default from config: en-US-AriaNeural)
    #[arg(long)]
    voice: Option<String>,

    /// Output video file
    #[arg(long)]
    output: PathBuf,

    /// Config file (default: ./avatar.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Project root, overriding the config file
    #[arg(long)]
    root: Option<PathBuf>,

    /// Upper bound in seconds for each external process
    #[arg(long)]
    timeout: Option<u64>,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // --help and --version are not failures
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("avatar_core=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// `Ok(false)` for a validation or pipeline failure already reported on stderr.
fn run(cli: Cli) -> anyhow::Result<bool> {
    let mut config = AvatarConfig::load(cli.config.as_deref())?;
    if let Some(root) = cli.root {
        config.root = root;
    }
    if let Some(secs) = cli.timeout {
        config.timeout_secs = Some(secs);
    }
    tracing::debug!(?config, "configuration loaded");

    let audio = match AudioSource::from_parts(cli.audio, cli.text) {
        Ok(audio) => audio,
        Err(e) => {
            eprintln!("{}", e.diagnostic());
            return Ok(false);
        }
    };

    let generator = Generator::new(&config);
    if let AudioSource::Text(text) = &audio {
        let voice = cli.voice.as_deref().unwrap_or(generator.default_voice());
        eprintln!("Generating audio from text: '{}'", preview(text, 50));
        eprintln!("  Using voice: {}", voice);
    }

    let request = GenerationRequest::new(
        Pipeline::Fast,
        cli.video,
        audio,
        GenerationOptions {
            use_enhancer: false,
            voice: cli.voice,
            output_path: Some(cli.output),
        },
    );
    eprintln!("Running {}...", Pipeline::Fast.label());
    eprintln!("  Video: {}", request.source_media().display());

    let outcome = generator.handle_request(&request)?;
    match outcome.output_path() {
        Some(path) if outcome.success() => {
            eprintln!("Video generated: {}", path.display());
            Ok(true)
        }
        _ => {
            eprintln!("{}", outcome.diagnostic());
            Ok(false)
        }
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    let mut s: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        s.push_str("...");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_text_request() {
        let cli = Cli::try_parse_from([
            "avatar-cli",
            "--video",
            "face.mp4",
            "--text",
            "Hello",
            "--output",
            "out.mp4",
        ])
        .unwrap();
        assert_eq!(cli.video, PathBuf::from("face.mp4"));
        assert_eq!(cli.text.as_deref(), Some("Hello"));
        assert!(cli.audio.is_none());
        assert!(cli.voice.is_none());
    }

    #[test]
    fn output_is_required() {
        let err = Cli::try_parse_from(["avatar-cli", "--video", "face.mp4", "--text", "Hi"]).unwrap_err();
        assert!(err.use_stderr());
    }

    #[test]
    fn preview_truncates_long_text() {
        assert_eq!(preview("short", 50), "short");
        assert_eq!(preview("abcdef", 3), "abc...");
    }
}
