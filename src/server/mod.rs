// Web front end - prompt form, generation endpoint and artifact downloads

mod page;

use crate::studio::{GenerationRequest, Studio, StudioError, StudioImage};
use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use imagent::ComputeDevice;
use serde::Serialize;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    /// One model handle for the whole process; requests take turns
    studio: Arc<Mutex<Studio>>,
    device: ComputeDevice,
}

#[derive(Debug)]
pub struct ApiError {
    pub code: StatusCode,
    pub message: String,
}

impl ApiError {
    fn internal(message: impl Into<String>) -> Self {
        Self {
            code: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<StudioError> for ApiError {
    fn from(err: StudioError) -> Self {
        if err.is_validation() {
            ApiError {
                code: StatusCode::UNPROCESSABLE_ENTITY,
                message: err.to_string(),
            }
        } else {
            tracing::error!("Generation request failed: {}", err);
            ApiError::internal(err.to_string())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.code,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct GeneratedImageDto {
    pub index: usize,
    pub png: String,
    pub jpg: String,
    pub metadata: String,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub device: ComputeDevice,
    pub images: Vec<GeneratedImageDto>,
}

fn output_url(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("/outputs/{name}")
}

impl From<&StudioImage> for GeneratedImageDto {
    fn from(result: &StudioImage) -> Self {
        Self {
            index: result.index,
            png: output_url(&result.artifact.png_path),
            jpg: output_url(&result.artifact.jpg_path),
            metadata: output_url(&result.artifact.metadata_path),
        }
    }
}

/// Build the application router around a loaded studio
pub fn router(studio: Studio) -> Router {
    let device = studio.device();
    let output_dir = studio.writer().base_dir().to_path_buf();

    let state = AppState {
        studio: Arc::new(Mutex::new(studio)),
        device,
    };

    Router::new()
        .route("/", get(index))
        .route("/api/generate", post(generate))
        .nest_service("/outputs", ServeDir::new(output_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process is stopped
pub async fn serve(studio: Studio, addr: SocketAddr) -> anyhow::Result<()> {
    std::fs::create_dir_all(studio.writer().base_dir())?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(studio)).await?;
    Ok(())
}

async fn index(State(state): State<AppState>) -> Html<String> {
    Html(page::render(state.device))
}

async fn generate(
    State(state): State<AppState>,
    payload: Result<Json<GenerationRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| ApiError {
        code: StatusCode::UNPROCESSABLE_ENTITY,
        message: rejection.body_text(),
    })?;

    let studio = state.studio.clone();
    let results = tokio::task::spawn_blocking(move || {
        let mut studio = studio.blocking_lock();
        studio.run(&request)
    })
    .await
    .map_err(|e| ApiError::internal(format!("Generation task failed: {e}")))??;

    Ok(Json(GenerateResponse {
        device: state.device,
        images: results.iter().map(GeneratedImageDto::from).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::studio::{ArtifactWriter, WatermarkFont, Watermarker};
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, header};
    use imagent::PreviewGenerator;
    use tower::ServiceExt;

    fn app(dir: &Path) -> Router {
        router(Studio::new(
            Box::new(PreviewGenerator::new()),
            Watermarker::new("AI GENERATED", WatermarkFont::bundled().unwrap()),
            ArtifactWriter::new(dir),
        ))
    }

    fn post_json(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/generate")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_index_page_lists_controls() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(html.contains("Cartoon / Anime"));
        assert!(html.contains("Negative prompt"));
        assert!(html.contains(">cpu<"));
    }

    #[tokio::test]
    async fn test_denylisted_prompt_is_unprocessable() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(post_json(serde_json::json!({ "prompt": "gore everywhere" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("content guidelines"));
    }

    #[tokio::test]
    async fn test_unknown_style_is_unprocessable() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(post_json(
                serde_json::json!({ "prompt": "a fox", "style": "Watercolor" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(response).await;
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_generate_then_download() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        let response = app
            .clone()
            .oneshot(post_json(serde_json::json!({
                "prompt": "a fox in the snow",
                "style": "Cartoon / Anime",
                "num_images": 2,
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["device"], "cpu");
        let images = body["images"].as_array().unwrap();
        assert_eq!(images.len(), 2);

        let png_url = images[0]["png"].as_str().unwrap().to_string();
        assert!(png_url.starts_with("/outputs/img_"));
        assert!(png_url.ends_with(".png"));

        let response = app
            .oneshot(Request::get(png_url.as_str()).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_requests_take_turns() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());
        let request = || post_json(serde_json::json!({ "prompt": "a lighthouse" }));

        let (first, second) = tokio::join!(
            app.clone().oneshot(request()),
            app.clone().oneshot(request())
        );
        let (first, second) = (first.unwrap(), second.unwrap());
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(second.status(), StatusCode::OK);

        let first = json_body(first).await;
        let second = json_body(second).await;
        let first_png = first["images"][0]["png"].as_str().unwrap();
        let second_png = second["images"][0]["png"].as_str().unwrap();
        assert_ne!(first_png, second_png);

        for url in [first_png, second_png] {
            let name = url.trim_start_matches("/outputs/");
            assert!(dir.path().join(name).exists());
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 6);
    }
}
