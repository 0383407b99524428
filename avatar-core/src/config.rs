//! Configuration file (avatar.toml) and the project directory layout.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Looked up in the working directory when no explicit path is given.
pub const DEFAULT_CONFIG_FILE: &str = "avatar.toml";

pub const WAV2LIP_CHECKPOINT_URL: &str = "https://iiitaphyd-my.sharepoint.com/personal/radrabha_m_research_iiit_ac_in/_layouts/15/download.aspx?share=EdjI7bZlgApMqsVoEUUXpLsBxqXbn5z8VTmoxp55YNDcIA";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AvatarConfig {
    /// Project root; relative paths below resolve against it.
    pub root: PathBuf,
    /// Upper bound for any single external process. Unbounded when absent.
    pub timeout_secs: Option<u64>,
    pub fast: FastPipelineConfig,
    pub quality: QualityPipelineConfig,
    pub tts: TtsConfig,
    pub server: ServerConfig,
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            timeout_secs: None,
            fast: FastPipelineConfig::default(),
            quality: QualityPipelineConfig::default(),
            tts: TtsConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

/// Wav2Lip invocation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FastPipelineConfig {
    pub interpreter: String,
    pub model_dir: PathBuf,
    /// Relative to `model_dir`.
    pub checkpoint: PathBuf,
    pub checkpoint_url: String,
    pub downloader: String,
    /// Top, bottom, left, right.
    pub pads: [i32; 4],
    pub resize_factor: u32,
    pub output_prefix: String,
}

impl Default for FastPipelineConfig {
    fn default() -> Self {
        Self {
            interpreter: "python".to_string(),
            model_dir: PathBuf::from("external/Wav2Lip"),
            checkpoint: PathBuf::from("checkpoints/wav2lip_gan.pth"),
            checkpoint_url: WAV2LIP_CHECKPOINT_URL.to_string(),
            downloader: "wget".to_string(),
            pads: [0, 10, 0, 0],
            resize_factor: 1,
            output_prefix: "wav2lip_".to_string(),
        }
    }
}

/// SadTalker invocation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QualityPipelineConfig {
    pub interpreter: String,
    pub model_dir: PathBuf,
    pub enhancer: String,
    pub output_glob: String,
    /// Give every run its own result directory under the videos dir.
    pub isolate_runs: bool,
}

impl Default for QualityPipelineConfig {
    fn default() -> Self {
        Self {
            interpreter: "python".to_string(),
            model_dir: PathBuf::from("external/SadTalker"),
            enhancer: "gfpgan".to_string(),
            output_glob: "*.mp4".to_string(),
            isolate_runs: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub program: String,
    pub voice: String,
    /// Where synthesized audio is staged; system temp dir when absent.
    pub temp_dir: Option<PathBuf>,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            program: "edge-tts".to_string(),
            voice: "en-US-AriaNeural".to_string(),
            temp_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 7860,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl AvatarConfig {
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Load from `path`, which must exist. Without a path, `avatar.toml` in the
    /// working directory is used if present, otherwise defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let p = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !p.exists() {
                    return Ok(Self::default());
                }
                p
            }
        };
        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Self::from_toml(&content).map_err(|source| ConfigError::Parse { path, source })
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn layout(&self) -> ProjectLayout {
        ProjectLayout::new(&self.root)
    }
}

/// Under `data/processed`.
const PROCESSED_SUBDIRS: [&str; 3] = ["frames", "masks", "colmap"];
/// Under `models`.
const MODEL_SUBDIRS: [&str; 3] = ["tts", "gfpgan", "wav2vec"];

/// Directories under the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    pub root: PathBuf,
    pub data_dir: PathBuf,
    pub raw_data_dir: PathBuf,
    pub processed_data_dir: PathBuf,
    pub models_dir: PathBuf,
    pub external_dir: PathBuf,
    pub output_dir: PathBuf,
    pub videos_dir: PathBuf,
    pub avatars_dir: PathBuf,
    pub demos_dir: PathBuf,
}

impl ProjectLayout {
    /// A leading `.` is dropped, so paths are reported relative to the working
    /// directory as `outputs/videos/...`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        let root = match root.strip_prefix(".") {
            Ok(rest) => rest.to_path_buf(),
            Err(_) => root,
        };
        let data_dir = root.join("data");
        let output_dir = root.join("outputs");
        Self {
            raw_data_dir: data_dir.join("raw"),
            processed_data_dir: data_dir.join("processed"),
            models_dir: root.join("models"),
            external_dir: root.join("external"),
            videos_dir: output_dir.join("videos"),
            avatars_dir: output_dir.join("avatars"),
            demos_dir: output_dir.join("demos"),
            data_dir,
            output_dir,
            root,
        }
    }

    /// Create every directory if absent. Idempotent; call once at startup.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        let mut dirs = vec![self.raw_data_dir.clone()];
        dirs.extend(PROCESSED_SUBDIRS.iter().map(|d| self.processed_data_dir.join(d)));
        dirs.extend(MODEL_SUBDIRS.iter().map(|d| self.models_dir.join(d)));
        dirs.extend([
            self.external_dir.clone(),
            self.videos_dir.clone(),
            self.avatars_dir.clone(),
            self.demos_dir.clone(),
        ]);
        for dir in &dirs {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Join relative paths onto the root; absolute paths pass through.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_upstream_tools() {
        let c = AvatarConfig::default();
        assert_eq!(c.fast.pads, [0, 10, 0, 0]);
        assert_eq!(c.fast.resize_factor, 1);
        assert_eq!(c.quality.enhancer, "gfpgan");
        assert_eq!(c.tts.voice, "en-US-AriaNeural");
        assert_eq!(c.server.port, 7860);
        assert!(c.timeout().is_none());
    }

    #[test]
    fn from_toml_partial_keeps_defaults() {
        let c = AvatarConfig::from_toml(
            r#"
root = "/srv/avatar"
timeout_secs = 600

[fast]
interpreter = "python3"

[tts]
voice = "en-GB-SoniaNeural"
"#,
        )
        .unwrap();
        assert_eq!(c.root, PathBuf::from("/srv/avatar"));
        assert_eq!(c.timeout(), Some(Duration::from_secs(600)));
        assert_eq!(c.fast.interpreter, "python3");
        assert_eq!(c.fast.model_dir, PathBuf::from("external/Wav2Lip"));
        assert_eq!(c.tts.voice, "en-GB-SoniaNeural");
        assert_eq!(c.tts.program, "edge-tts");
        assert!(c.quality.isolate_runs);
    }

    #[test]
    fn from_toml_invalid_fails() {
        assert!(AvatarConfig::from_toml("root = [").is_err());
        assert!(AvatarConfig::from_toml("[fast]\npads = 3").is_err());
    }

    #[test]
    fn load_missing_explicit_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = AvatarConfig::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn load_reports_parse_errors_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("avatar.toml");
        std::fs::write(&path, "[server]\nport = \"high\"").unwrap();
        let err = AvatarConfig::load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("avatar.toml"));
    }

    #[test]
    fn layout_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ProjectLayout::new(dir.path());
        layout.ensure_directories().unwrap();
        layout.ensure_directories().unwrap();
        assert!(dir.path().join("outputs/videos").is_dir());
        assert!(dir.path().join("data/raw").is_dir());
        assert!(dir.path().join("external").is_dir());
        for sub in ["data/processed/frames", "data/processed/masks", "data/processed/colmap"] {
            assert!(dir.path().join(sub).is_dir(), "{}", sub);
        }
        for sub in ["models/tts", "models/gfpgan", "models/wav2vec"] {
            assert!(dir.path().join(sub).is_dir(), "{}", sub);
        }
    }

    #[test]
    fn default_root_yields_plain_relative_paths() {
        let layout = AvatarConfig::default().layout();
        assert_eq!(layout.videos_dir, PathBuf::from("outputs/videos"));
        assert_eq!(
            crate::invoker::fast_output_path(&layout.videos_dir, "wav2lip_", Path::new("/in/face.mp4")),
            PathBuf::from("outputs/videos/wav2lip_face.mp4")
        );
        assert_eq!(layout.resolve(Path::new("external/Wav2Lip")), PathBuf::from("external/Wav2Lip"));
        assert_eq!(ProjectLayout::new("./proj").root, PathBuf::from("proj"));
        assert_eq!(ProjectLayout::new("/srv/avatar").root, PathBuf::from("/srv/avatar"));
    }

    #[test]
    fn resolve_joins_relative_only() {
        let layout = ProjectLayout::new("/proj");
        assert_eq!(layout.resolve(Path::new("external/Wav2Lip")), PathBuf::from("/proj/external/Wav2Lip"));
        assert_eq!(layout.resolve(Path::new("/opt/w2l")), PathBuf::from("/opt/w2l"));
    }
}
