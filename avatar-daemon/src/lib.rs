//! Avatar daemon library: app builder for testing and serving.

mod state;

use avatar_core::{AudioSource, GenerationOptions, GenerationRequest, Pipeline};
use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::path::{Component, PathBuf};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub use state::AppState;

/// Build the axum Router with the given state (used by main and tests).
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/pipelines", get(list_pipelines))
        .route("/generate/:pipeline", post(generate_named))
        .route("/outputs/*path", get(get_output))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(serde::Serialize)]
struct PipelineInfo {
    name: Pipeline,
    label: &'static str,
    model_dir: PathBuf,
    model_dir_exists: bool,
    interpreter: String,
    interpreter_found: bool,
}

async fn list_pipelines(State(state): State<AppState>) -> impl IntoResponse {
    let invoker = state.generator.invoker();
    let pipelines: Vec<PipelineInfo> = Pipeline::ALL
        .iter()
        .map(|&p| {
            let model_dir = invoker.model_dir(p);
            let interpreter = invoker.interpreter(p).to_string();
            PipelineInfo {
                name: p,
                label: p.label(),
                model_dir_exists: model_dir.is_dir(),
                model_dir,
                interpreter_found: which::which(&interpreter).is_ok(),
                interpreter,
            }
        })
        .collect();
    let tts = &state.config.tts.program;
    Json(serde_json::json!({
        "pipelines": pipelines,
        "tts": {
            "program": tts,
            "found": which::which(tts).is_ok(),
            "default_voice": state.generator.default_voice(),
        },
    }))
}

#[derive(Debug, serde::Deserialize)]
struct GenerateBody {
    video: PathBuf,
    audio: Option<PathBuf>,
    text: Option<String>,
    voice: Option<String>,
    /// Quality only; on unless set to false.
    use_enhancer: Option<bool>,
}

#[derive(Debug, serde::Serialize)]
struct GenerateResponse {
    video_path: Option<String>,
    status: String,
}

fn failure(code: StatusCode, diagnostic: &str) -> (StatusCode, Json<GenerateResponse>) {
    (
        code,
        Json(GenerateResponse {
            video_path: None,
            status: format!("❌ Error: {}", diagnostic),
        }),
    )
}

/// `fast` / `quality`, or the model names `wav2lip` / `sadtalker`.
async fn generate_named(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Result<Json<GenerateBody>, JsonRejection>,
) -> impl IntoResponse {
    match name.parse::<Pipeline>() {
        Ok(pipeline) => generate(state, pipeline, body).await,
        Err(e) => failure(StatusCode::NOT_FOUND, &e),
    }
}

async fn generate(
    state: AppState,
    pipeline: Pipeline,
    body: Result<Json<GenerateBody>, JsonRejection>,
) -> (StatusCode, Json<GenerateResponse>) {
    let body = match body {
        Ok(Json(b)) => b,
        Err(rejection) => return failure(StatusCode::BAD_REQUEST, &rejection.body_text()),
    };
    let audio = match AudioSource::from_parts(body.audio, body.text) {
        Ok(a) => a,
        Err(e) => return failure(StatusCode::UNPROCESSABLE_ENTITY, &e.diagnostic()),
    };
    let options = GenerationOptions {
        use_enhancer: pipeline == Pipeline::Quality && body.use_enhancer.unwrap_or(true),
        voice: body.voice,
        output_path: None,
    };
    let request = GenerationRequest::new(pipeline, body.video, audio, options);

    let generator = Arc::clone(&state.generator);
    match tokio::task::spawn_blocking(move || generator.handle_request(&request)).await {
        Ok(Ok(outcome)) => match outcome.output_path() {
            Some(path) if outcome.success() => {
                info!(%pipeline, output = %path.display(), "generation finished");
                (
                    StatusCode::OK,
                    Json(GenerateResponse {
                        video_path: Some(path.to_string_lossy().into_owned()),
                        status: format!("✅ {}", outcome.diagnostic()),
                    }),
                )
            }
            _ => failure(StatusCode::UNPROCESSABLE_ENTITY, outcome.diagnostic()),
        },
        Ok(Err(e)) => {
            error!(%pipeline, error = %e, "generation aborted");
            failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("ResourceError: {}", e),
            )
        }
        Err(e) => {
            error!(%pipeline, error = %e, "generation task panicked");
            failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("generation task failed: {}", e),
            )
        }
    }
}

async fn get_output(State(state): State<AppState>, Path(path): Path<String>) -> Response {
    let rel = std::path::Path::new(&path);
    let normal = rel.components().next().is_some()
        && rel.components().all(|c| matches!(c, Component::Normal(_)));
    if !normal {
        return (StatusCode::BAD_REQUEST, "invalid output path").into_response();
    }
    let full = state.generator.layout().videos_dir.join(rel);
    match tokio::fs::read(&full).await {
        Ok(bytes) => {
            let content_type = match full.extension().and_then(|e| e.to_str()) {
                Some("mp4") => "video/mp4",
                _ => "application/octet-stream",
            };
            let mut res = Response::new(Body::from(bytes));
            res.headers_mut().insert(
                header::CONTENT_TYPE,
                header::HeaderValue::from_static(content_type),
            );
            res
        }
        Err(_) => (StatusCode::NOT_FOUND, "output not found").into_response(),
    }
}
