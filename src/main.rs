// Main entry point for the panel inpainting, OCR and translation service

use panelpachi_ai::{
    core::{
        errors::{ImagingError, ValidationError},
        parse_selections, ColorImage, Config, InpaintResponse, Mask, OcrItem, TranslatedItem,
        TranslationItem,
    },
    orchestration::{InpaintOrchestrator, OcrOrchestrator, TranslationRelay},
    services::{DeeplClient, InpaintModel, LamaInpainter, ModelSlot, OcrModel, OcrService},
    utils::{decode_rgb_upload_async, decode_upload_async, encode_png_base64_async, Metrics},
};

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use image::DynamicImage;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    inpainter: Arc<InpaintOrchestrator>,
    ocr: Arc<OcrOrchestrator>,
    translator: Arc<TranslationRelay>,
    deepl: Arc<DeeplClient>,
    metrics: Metrics,
}

type ApiError = (StatusCode, String);

#[tokio::main]
async fn main() -> Result<()> {
    let config = Arc::new(Config::new()?);

    use tracing_subscriber::EnvFilter;

    let level = match config.log_level() {
        tracing::Level::TRACE => "trace",
        tracing::Level::DEBUG => "debug",
        tracing::Level::INFO => "info",
        tracing::Level::WARN => "warn",
        tracing::Level::ERROR => "error",
    };
    let filter = EnvFilter::new(format!("panelpachi_ai={level},tower_http={level},ort=off"));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("=== PANELPACHI AI SERVICES ===");
    info!(
        "Config: inpaint_model={} stride={} ocr_models={} translate={}->{}",
        config.inpaint.model_path.display(),
        config.pad_stride(),
        config.ocr.models_dir.display(),
        config.translation.source_lang,
        config.translation.target_lang
    );

    let metrics = Metrics::new();

    // Models load lazily on first use; a failed load is cached until restart
    let inpaint_config = config.inpaint.clone();
    let inpaint_slot: ModelSlot<dyn InpaintModel> = ModelSlot::new("inpainting", move || {
        let model = LamaInpainter::new(
            &inpaint_config.model_path,
            inpaint_config.inference_backend.as_deref(),
        )?;
        Ok(Arc::new(model) as Arc<dyn InpaintModel>)
    });

    let ocr_dir = config.ocr.models_dir.clone();
    let ocr_backend = config.inpaint.inference_backend.clone();
    let ocr_slot: ModelSlot<dyn OcrModel> = ModelSlot::new("ocr", move || {
        let model = OcrService::new(&ocr_dir, ocr_backend.as_deref())?;
        Ok(Arc::new(model) as Arc<dyn OcrModel>)
    });

    let deepl = Arc::new(DeeplClient::new(&config.translation, Some(metrics.clone()))?);

    let state = AppState {
        inpainter: Arc::new(InpaintOrchestrator::new(
            Arc::new(inpaint_slot),
            config.pad_stride(),
            Some(metrics.clone()),
        )),
        ocr: Arc::new(OcrOrchestrator::new(Arc::new(ocr_slot), Some(metrics.clone()))),
        translator: Arc::new(TranslationRelay::new(deepl.clone())),
        deepl,
        metrics,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/stats", get(stats_endpoint))
        .route("/inpaint", post(inpaint_endpoint))
        .route("/ocr", post(ocr_endpoint))
        .route("/translate", post(translate_endpoint))
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.max_upload_bytes()))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.server_host(), config.server_port());
    info!("{}", "=".repeat(70));
    info!("Server starting on http://{}", addr);
    info!("{}", "-".repeat(70));
    info!("Endpoints:");
    info!("  GET  /          - Root endpoint");
    info!("  GET  /health    - Health check with model state");
    info!("  GET  /metrics   - Prometheus metrics");
    info!("  GET  /stats     - Detailed statistics");
    info!("  POST /inpaint   - Inpaint masked regions (multipart: image, mask)");
    info!("  POST /ocr       - Recognize text in selections (multipart: image, selections)");
    info!("  POST /translate - Translate a batch of texts (JSON list of {{id, text}})");
    info!("{}", "=".repeat(70));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Welcome to PanelPachi AI API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

fn model_health<M: ?Sized + Send + Sync>(slot: &ModelSlot<M>) -> serde_json::Value {
    serde_json::json!({
        "state": slot.state(),
        "error": slot.load_error(),
    })
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let inpainting = state.inpainter.model();
    let ocr = state.ocr.model();

    // Liveness stays "ok"; model problems show up per model
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "models": {
            "inpainting": model_health(inpainting),
            "ocr": model_health(ocr),
        },
        "translation": {
            "configured": state.deepl.is_configured(),
            "circuit": state.deepl.circuit_breaker().state(),
        },
    }))
}

/// Prometheus metrics endpoint
async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        state.metrics.to_prometheus(),
    )
}

/// Detailed statistics endpoint (JSON)
async fn stats_endpoint(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let snapshot = serde_json::to_value(state.metrics.snapshot()).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to serialize metrics: {}", e),
        )
    })?;

    Ok(Json(serde_json::json!({
        "metrics": snapshot,
        "translation_circuit": state.deepl.circuit_breaker().stats(),
    })))
}

/// Collect every named part of a multipart form
async fn read_form(mut multipart: Multipart) -> Result<HashMap<String, Bytes>, ApiError> {
    let mut parts = HashMap::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, format!("Read error: {}", e)))?;
        parts.insert(name, data);
    }
    Ok(parts)
}

fn required(parts: &mut HashMap<String, Bytes>, name: &'static str) -> Result<Bytes, ApiError> {
    parts
        .remove(name)
        .ok_or_else(|| validation_rejection(ValidationError::MissingField(name)))
}

fn validation_rejection(e: ValidationError) -> ApiError {
    warn!("Rejected request: {}", e);
    (StatusCode::BAD_REQUEST, e.to_string())
}

fn imaging_rejection(e: ImagingError) -> ApiError {
    warn!("Rejected upload: {}", e);
    (e.status_code(), e.to_string())
}

/// Inpaint endpoint
///
/// # Request Format:
/// - multipart/form-data with an "image" file and a "mask" file
///
/// # Response:
/// - `{success, message, image, format}`; `image` is a base64 PNG.
///   Failures keep the same shape with `success: false` and the error's status.
async fn inpaint_endpoint(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<InpaintResponse>), ApiError> {
    state.metrics.record_endpoint_request("/inpaint");

    let mut parts = read_form(multipart).await?;
    let image_bytes = required(&mut parts, "image")?;
    let mask_bytes = required(&mut parts, "mask")?;

    let (image, mask) = tokio::try_join!(
        decode_upload_async(image_bytes.to_vec(), "image"),
        decode_upload_async(mask_bytes.to_vec(), "mask"),
    )
    .map_err(imaging_rejection)?;

    info!(
        "Inpainting {}x{} image with {}x{} mask",
        image.width(),
        image.height(),
        mask.width(),
        mask.height()
    );

    let image = ColorImage::from_dynamic(&image);
    let mask = Mask::from_dynamic(&mask);

    match state.inpainter.inpaint(image, mask).await {
        Ok(result) => {
            let encoded = encode_png_base64_async(DynamicImage::ImageRgb8(result.into_rgb()))
                .await
                .map_err(|e| {
                    error!("PNG encoding failed: {:#}", e);
                    (StatusCode::INTERNAL_SERVER_ERROR, format!("Encoding failed: {}", e))
                })?;
            Ok((StatusCode::OK, Json(InpaintResponse::completed(encoded, "png"))))
        }
        Err(e) => {
            error!("Inpainting failed: {}", e);
            let (status, body) = InpaintResponse::from_error(&e);
            Ok((status, Json(body)))
        }
    }
}

/// OCR endpoint
///
/// # Request Format:
/// - multipart/form-data with an "image" file and a "selections" field
///   holding a JSON list of `{id, left, top, width, height}`
///
/// # Response:
/// - One `{id, text}` per selection, in request order
async fn ocr_endpoint(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<Vec<OcrItem>>, ApiError> {
    state.metrics.record_endpoint_request("/ocr");

    let mut parts = read_form(multipart).await?;
    let image_bytes = required(&mut parts, "image")?;
    let raw_selections = required(&mut parts, "selections")?;

    let raw_selections = std::str::from_utf8(&raw_selections)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Selections must be UTF-8: {}", e)))?;
    let selections = parse_selections(raw_selections).map_err(validation_rejection)?;
    info!("Received {} selections", selections.len());

    let image = decode_rgb_upload_async(image_bytes.to_vec(), "image")
        .await
        .map_err(imaging_rejection)?;

    let items = state
        .ocr
        .recognize_all(Arc::new(image), selections)
        .await
        .map_err(|e| {
            error!("OCR processing failed: {}", e);
            (e.status_code(), format!("OCR processing failed: {}", e))
        })?;

    Ok(Json(items))
}

/// Translate endpoint
///
/// # Request Format:
/// - JSON list of `{id, text}`
///
/// # Response:
/// - One `{id, original, translated}` per item, or an error for the whole batch
async fn translate_endpoint(
    State(state): State<AppState>,
    Json(items): Json<Vec<TranslationItem>>,
) -> Result<Json<Vec<TranslatedItem>>, ApiError> {
    state.metrics.record_endpoint_request("/translate");

    let results = state.translator.translate_batch(&items).await.map_err(|e| {
        error!("Translation failed: {}", e);
        (e.status_code(), format!("Translation failed: {}", e))
    })?;

    Ok(Json(results))
}
