/**
 * Route Configuration
 *
 * Health and shell routes. The health handler never touches any state so
 * it stays cheap enough to be probed every few seconds by every client.
 */

use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

const INDEX_HTML: &str = "<!doctype html>\n<html><head><title>offline-sync</title>\
<link rel=\"manifest\" href=\"/manifest.json\"></head><body><main id=\"app\"></main></body></html>\n";

const OFFLINE_HTML: &str = "<!doctype html>\n<html><head><title>Offline</title></head>\
<body><h1>You are offline</h1><p>Changes you make are saved and will sync when the connection returns.</p></body></html>\n";

const MANIFEST_JSON: &str = r#"{"name":"offline-sync","short_name":"offline-sync","start_url":"/","display":"standalone","icons":[{"src":"/icon.png","sizes":"1x1","type":"image/png"}]}"#;

/// 1x1 transparent PNG
const ICON_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4,
    0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00,
    0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE,
    0x42, 0x60, 0x82,
];

/// Health probe body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

/// Create and configure the Axum application
pub fn create_app() -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/", get(|| async { Html(INDEX_HTML) }))
        .route("/offline.html", get(|| async { Html(OFFLINE_HTML) }))
        .route(
            "/manifest.json",
            get(|| async { ([(CONTENT_TYPE, "application/manifest+json")], MANIFEST_JSON) }),
        )
        .route("/icon.png", get(|| async { ([(CONTENT_TYPE, "image/png")], ICON_PNG) }))
}

async fn health() -> impl IntoResponse {
    let body = HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    ([(CACHE_CONTROL, "no-store")], Json(body))
}
