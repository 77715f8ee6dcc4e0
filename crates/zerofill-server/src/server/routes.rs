use crate::server::{error::ApiResult, service::handler::GenerateService};
use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::Response,
    routing::{get, post},
};
use serde_json::Value;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use zerofill::FileEntry;

/// Builds the HTTP surface:
///
/// - `POST /generate`: start a job and stream its progress as NDJSON.
/// - `GET /files`: list generated files.
/// - `GET /all-files/{name}`: download a generated file.
/// - `GET /health`: liveness, `503` once shutdown has begun.
pub fn router(service: GenerateService) -> Router {
    let config = service.generator().config();
    let url_prefix = config.url_prefix.trim_end_matches('/').to_string();
    let files = ServeDir::new(&config.output_dir);

    Router::new()
        .route("/generate", post(generate))
        .route("/files", get(list_files))
        .route("/health", get(health))
        .nest_service(&url_prefix, files)
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
        .with_state(service)
}

async fn generate(
    State(service): State<GenerateService>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(body) = body?;
    service.generate(&body)
}

async fn list_files(State(service): State<GenerateService>) -> ApiResult<Json<Vec<FileEntry>>> {
    Ok(Json(service.list().await?))
}

async fn health(State(service): State<GenerateService>) -> (StatusCode, &'static str) {
    if service.is_shutting_down() {
        (StatusCode::SERVICE_UNAVAILABLE, "shutting down")
    } else {
        (StatusCode::OK, "ok")
    }
}
