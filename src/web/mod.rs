// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! HTTP surface: scanning, listing and browsing e-waste items

pub mod pages;

use axum::{
    body::{Body, Bytes},
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
        DefaultBodyLimit, Multipart,
        Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Json, Redirect, Response},
    routing::{get, post},
    Router,
};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::camera::ffmpeg::FfmpegOpener;
use crate::camera::{CaptureService, FRAME_BOUNDARY};
use crate::classifier::{Classification, ClassifierClient};
use crate::config::AppConfig;
use crate::normalize::coerce_recyclable;
use crate::store::{ItemFilter, ItemStore};
use crate::{Result, ScannerError};

/// Largest accepted request body (uploaded photos)
pub const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Fields `/list-item` refuses to store without
const REQUIRED_FIELDS: [&str; 3] = ["product_name", "toxicity_level", "recyclable"];

/// Shared application state
pub struct AppState {
    pub store: ItemStore,
    pub classifier: ClassifierClient,
    pub camera: CaptureService,
    pub config: AppConfig,
}

impl AppState {
    /// Build the production state: JSON store, HTTP classifier, ffmpeg camera
    pub fn from_config(config: AppConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.storage.uploads_dir)?;
        let store = ItemStore::open(&config.storage.items_path)?;
        let classifier = ClassifierClient::new(config.classifier.clone())?;
        let camera = CaptureService::new(
            Box::new(FfmpegOpener::new(&config.camera)),
            config.camera.index,
        );

        Ok(Self { store, classifier, camera, config })
    }

    fn uploads_dir(&self) -> &Path {
        Path::new(&self.config.storage.uploads_dir)
    }
}

impl IntoResponse for ScannerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ScannerError::Validation(_) => StatusCode::BAD_REQUEST,
            ScannerError::NotFound(_) => StatusCode::NOT_FOUND,
            ScannerError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = self.to_string();
        if status.is_server_error() {
            error!(status = %status, message = %message, "Request error");
        } else {
            debug!(status = %status, message = %message, "Request rejected");
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Create the web application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Pages
        .route("/", get(pages::index_page))
        .route("/scanner", get(pages::scanner_page))
        .route("/buyer-dashboard", get(pages::buyer_dashboard_page))
        .route("/logout", get(logout))
        // Camera and classification
        .route("/video_feed", get(video_feed))
        .route("/capture", post(capture))
        .route("/upload", post(upload))
        // Item store
        .route("/list-item", post(list_item))
        .route("/get-items", get(get_items))
        .route("/search-items", get(search_items))
        .route("/delete-item", post(delete_item))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// === Camera Handlers ===

async fn video_feed(State(state): State<Arc<AppState>>) -> Response {
    match state.camera.stream_frames().await {
        Ok(frames) => {
            let body = Body::from_stream(frames.map(|part| Ok::<_, Infallible>(Bytes::from(part))));
            (
                [(
                    header::CONTENT_TYPE,
                    format!("multipart/x-mixed-replace; boundary={}", FRAME_BOUNDARY),
                )],
                body,
            )
                .into_response()
        }
        Err(e) => {
            warn!("Video feed unavailable: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error accessing webcam: {}", e),
            )
                .into_response()
        }
    }
}

async fn capture(State(state): State<Arc<AppState>>) -> Result<Json<Classification>> {
    // Only open failures carry the prefix; read failures keep their own message.
    state.camera.acquire().await.map_err(|e| match e {
        ScannerError::Camera(msg) => ScannerError::Camera(format!("Webcam error: {}", msg)),
        other => other,
    })?;
    let jpeg = state.camera.capture_jpeg().await?;

    let path = state
        .uploads_dir()
        .join(format!("capture_{}.jpg", Uuid::new_v4().simple()));
    if let Err(e) = tokio::fs::write(&path, &jpeg).await {
        error!("Failed to write capture {:?}: {}", path, e);
        return Err(ScannerError::Store("Failed to save captured image".to_string()));
    }

    let result = state.classifier.classify(&path).await;
    remove_scratch(&path).await;

    Ok(Json(result?))
}

async fn upload(
    State(state): State<Arc<AppState>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<Classification>> {
    let no_file = || ScannerError::Validation("No file provided".to_string());
    let mut multipart = multipart.map_err(|_| no_file())?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(read_error)? {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or_default().to_string();
            let data = field.bytes().await.map_err(read_error)?;
            upload = Some((filename, data));
            break;
        }
    }

    let (filename, data) = upload.ok_or_else(no_file)?;
    if filename.is_empty() {
        return Err(ScannerError::Validation("No file selected".to_string()));
    }
    if !state.config.storage.is_allowed_file(&filename) {
        return Err(ScannerError::Validation("Invalid file type".to_string()));
    }

    let path = scratch_path(state.uploads_dir(), &filename);
    tokio::fs::write(&path, &data).await?;
    info!("Classifying upload {:?}", filename);

    let result = state.classifier.classify(&path).await;
    remove_scratch(&path).await;

    Ok(Json(result?))
}

/// Body-limit overruns keep their 413; any other malformed body means no file
fn read_error(e: MultipartError) -> ScannerError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ScannerError::PayloadTooLarge(e.body_text())
    } else {
        ScannerError::Validation("No file provided".to_string())
    }
}

async fn logout(State(state): State<Arc<AppState>>) -> Redirect {
    state.camera.release().await;
    Redirect::to("/")
}

// === Item Handlers ===

async fn list_item(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>> {
    let no_data = || ScannerError::Validation("No data provided".to_string());
    let Json(body) = body.map_err(|_| no_data())?;
    let draft = match body {
        Value::Object(fields) if !fields.is_empty() => fields,
        _ => return Err(no_data()),
    };

    if let Some(missing) = REQUIRED_FIELDS.iter().find(|f| !draft.contains_key(**f)) {
        return Err(ScannerError::Validation(format!("Missing required field: {}", missing)));
    }

    state.store.insert(&draft).map_err(|e| {
        error!("{}", e);
        ScannerError::Store("Failed to save item".to_string())
    })?;

    Ok(Json(json!({ "success": true, "message": "Item listed successfully" })))
}

async fn get_items(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "items": state.store.load_all() }))
}

#[derive(Deserialize)]
struct SearchQuery {
    search: Option<String>,
    toxicity_level: Option<String>,
    recyclable: Option<String>,
}

async fn search_items(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Json<Value> {
    let filter = ItemFilter {
        query: query.search,
        toxicity_level: query.toxicity_level,
        recyclable: query
            .recyclable
            .filter(|r| !r.is_empty())
            .map(|r| coerce_recyclable(&Value::String(r))),
    };

    let items = state.store.search(&filter);
    Json(json!({ "count": items.len(), "items": items }))
}

async fn delete_item(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>> {
    let id = body
        .ok()
        .and_then(|Json(body)| body.get("id").cloned())
        .ok_or_else(|| ScannerError::Validation("Item ID is required".to_string()))?;

    let removed = state.store.delete_by_id(&id).map_err(|e| {
        error!("{}", e);
        ScannerError::Store("Failed to save changes".to_string())
    })?;

    if !removed {
        return Err(ScannerError::NotFound("Item not found".to_string()));
    }

    Ok(Json(json!({ "success": true, "message": "Item deleted successfully" })))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "items": state.store.count(),
        "camera_active": state.camera.is_active().await,
    }))
}

// === Scratch Files ===

/// Reduce a client filename to a safe ASCII basename
pub fn sanitize_filename(name: &str) -> String {
    let spaced: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");

    joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect::<String>()
        .trim_matches(|c| c == '.' || c == '_')
        .to_string()
}

/// Unique scratch location for an upload named `filename`
fn scratch_path(uploads_dir: &Path, filename: &str) -> PathBuf {
    let clean = sanitize_filename(filename);
    let clean = if clean.is_empty() { "upload".to_string() } else { clean };
    uploads_dir.join(format!("{}_{}", Uuid::new_v4().simple(), clean))
}

async fn remove_scratch(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!("Failed to remove scratch file {:?}: {}", path, e);
    }
}

/// Start the web server and run until Ctrl+C or SIGTERM
pub async fn start_server(config: AppConfig) -> Result<()> {
    let addr = format!("{}:{}", config.web.host, config.web.port);
    let state = Arc::new(AppState::from_config(config)?);

    info!("Item store: {:?}", state.store.path());
    info!("Vision model: {}", state.classifier.model());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Web UI available at http://{}", addr);

    let router = create_router(Arc::clone(&state));
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ScannerError::Config(format!("Server error: {}", e)))?;

    state.camera.release().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("My Phone.JPG"), "My_Phone.JPG");
        assert_eq!(sanitize_filename("../../etc/passwd.png"), "etc_passwd.png");
        assert_eq!(sanitize_filename("C:\\Users\\me\\board.jpeg"), "C_Users_me_board.jpeg");
        assert_eq!(sanitize_filename("télé.png"), "tl.png");
        assert_eq!(sanitize_filename("..."), "");
    }

    #[test]
    fn test_scratch_path_is_unique_and_inside_uploads() {
        let dir = Path::new("uploads");
        let a = scratch_path(dir, "a.jpg");
        let b = scratch_path(dir, "a.jpg");
        assert_ne!(a, b);
        assert!(a.starts_with(dir));
        assert!(a.to_string_lossy().ends_with("_a.jpg"));

        let fallback = scratch_path(dir, "///");
        assert!(fallback.to_string_lossy().ends_with("_upload"));
    }

    #[test]
    fn test_error_status_codes() {
        let cases = [
            (ScannerError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (ScannerError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ScannerError::PayloadTooLarge("x".into()), StatusCode::PAYLOAD_TOO_LARGE),
            (ScannerError::Camera("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (ScannerError::Store("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
