//! Integration tests: full requests against shell scripts standing in for the
//! external tools.

#![cfg(unix)]

use avatar_core::{
    AudioSource, AvatarConfig, GenerationOptions, GenerationRequest, Generator, Pipeline,
};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

const FAKE_TTS: &str = r#"#!/bin/sh
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    --write-media) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
printf 'RIFF' > "$out"
"#;

const FAKE_WAV2LIP: &str = r#"
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    --outfile) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
pwd > last_cwd.txt
printf 'mp4' > "$out"
"#;

const FAKE_SADTALKER: &str = r#"
dir=""
echo "$@" > last_args.txt
while [ $# -gt 0 ]; do
  case "$1" in
    --result_dir) dir="$2"; shift 2 ;;
    *) shift ;;
  esac
done
printf 'mp4' > "$dir/2024_01_01_12.00.00.mp4"
"#;

const FAILING_TOOL: &str = "echo 'Face not detected! Ensure the video contains a face in all the frames.' >&2\nexit 1\n";

struct Project {
    dir: tempfile::TempDir,
    config: AvatarConfig,
}

impl Project {
    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn temp_entries(&self) -> usize {
        fs::read_dir(self.root().join("tmp")).unwrap().count()
    }
}

fn write_executable(path: &Path, body: &str) {
    fs::write(path, body).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

fn project(wav2lip: &str, sadtalker: &str) -> Project {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    let w2l = root.join("external/Wav2Lip");
    fs::create_dir_all(w2l.join("checkpoints")).unwrap();
    fs::write(w2l.join("checkpoints/wav2lip_gan.pth"), b"weights").unwrap();
    fs::write(w2l.join("inference.py"), wav2lip).unwrap();

    let sad = root.join("external/SadTalker");
    fs::create_dir_all(&sad).unwrap();
    fs::write(sad.join("inference.py"), sadtalker).unwrap();

    fs::create_dir_all(root.join("tmp")).unwrap();
    write_executable(&root.join("fake-tts"), FAKE_TTS);
    fs::write(root.join("face.mp4"), b"video").unwrap();

    let mut config = AvatarConfig {
        root: root.to_path_buf(),
        ..AvatarConfig::default()
    };
    config.fast.interpreter = "sh".into();
    config.quality.interpreter = "sh".into();
    config.tts.program = root.join("fake-tts").to_string_lossy().into_owned();
    config.tts.temp_dir = Some(root.join("tmp"));
    config.timeout_secs = Some(30);
    config.layout().ensure_directories().unwrap();
    Project { dir, config }
}

fn request(project: &Project, pipeline: Pipeline, audio: AudioSource, use_enhancer: bool) -> GenerationRequest {
    GenerationRequest::new(
        pipeline,
        project.root().join("face.mp4"),
        audio,
        GenerationOptions {
            use_enhancer,
            ..GenerationOptions::default()
        },
    )
}

#[test]
fn fast_pipeline_from_text() {
    let p = project(FAKE_WAV2LIP, FAKE_SADTALKER);
    let generator = Generator::new(&p.config);

    let outcome = generator
        .handle_request(&request(&p, Pipeline::Fast, AudioSource::Text("Hello".into()), false))
        .unwrap();

    assert!(outcome.success(), "{}", outcome.diagnostic());
    let expected = p.root().join("outputs/videos/wav2lip_face.mp4");
    assert_eq!(outcome.output_path(), Some(expected.as_path()));
    assert_eq!(fs::read(&expected).unwrap(), b"mp4");
    assert_eq!(p.temp_entries(), 0);

    let cwd = fs::read_to_string(p.root().join("external/Wav2Lip/last_cwd.txt")).unwrap();
    assert_eq!(
        fs::canonicalize(cwd.trim()).unwrap(),
        fs::canonicalize(p.root().join("external/Wav2Lip")).unwrap()
    );
}

#[test]
fn fast_pipeline_failure_surfaces_stderr_and_cleans_up() {
    let p = project(FAILING_TOOL, FAKE_SADTALKER);
    let generator = Generator::new(&p.config);

    let outcome = generator
        .handle_request(&request(&p, Pipeline::Fast, AudioSource::Text("Hello".into()), false))
        .unwrap();

    assert!(!outcome.success());
    assert!(outcome.output_path().is_none());
    assert!(outcome.diagnostic().contains("Face not detected!"));
    assert_eq!(p.temp_entries(), 0);
}

#[test]
fn quality_pipeline_with_enhancer() {
    let p = project(FAKE_WAV2LIP, FAKE_SADTALKER);
    let wav = p.root().join("speech.wav");
    fs::write(&wav, b"RIFF").unwrap();
    let generator = Generator::new(&p.config);

    let outcome = generator
        .handle_request(&request(&p, Pipeline::Quality, AudioSource::File(wav.clone()), true))
        .unwrap();

    assert!(outcome.success(), "{}", outcome.diagnostic());
    let out = outcome.output_path().unwrap();
    assert_eq!(out.file_name().unwrap(), "2024_01_01_12.00.00.mp4");
    assert!(out.starts_with(p.root().join("outputs/videos")));
    assert!(wav.exists());

    let args = fs::read_to_string(p.root().join("external/SadTalker/last_args.txt")).unwrap();
    assert!(args.contains("--enhancer gfpgan"));
}

#[test]
fn quality_pipeline_that_writes_nothing() {
    let p = project(FAKE_WAV2LIP, "exit 0\n");
    let generator = Generator::new(&p.config);

    let outcome = generator
        .handle_request(&request(&p, Pipeline::Quality, AudioSource::Text("Hi".into()), false))
        .unwrap();

    assert!(!outcome.success());
    assert!(outcome.diagnostic().starts_with("OutputNotProduced"));
    assert_eq!(p.temp_entries(), 0);
}

#[test]
fn hung_tool_is_bounded_by_timeout() {
    let mut p = project("sleep 10\n", FAKE_SADTALKER);
    p.config.timeout_secs = Some(1);
    let wav = p.root().join("speech.wav");
    fs::write(&wav, b"RIFF").unwrap();
    let generator = Generator::new(&p.config);

    let outcome = generator
        .handle_request(&request(&p, Pipeline::Fast, AudioSource::File(wav), false))
        .unwrap();

    assert!(outcome.diagnostic().starts_with("TimedOut"));
}

#[test]
fn missing_tts_tool_is_reported_as_tool_missing() {
    let mut p = project(FAKE_WAV2LIP, FAKE_SADTALKER);
    p.config.tts.program = "edge-tts-not-installed-7c1e".into();
    let generator = Generator::new(&p.config);

    let outcome = generator
        .handle_request(&request(&p, Pipeline::Fast, AudioSource::Text("Hello".into()), false))
        .unwrap();

    assert!(outcome.diagnostic().starts_with("ToolMissing"));
    assert!(outcome.diagnostic().contains("`edge-tts-not-installed-7c1e`"));
    assert!(outcome.diagnostic().contains("tts.program"));
    assert_eq!(p.temp_entries(), 0);
    assert!(!p.root().join("outputs/videos/wav2lip_face.mp4").exists());
}
