//! In-process HTTP proxy the renderer uses as a media `src`. Honors `Range` for video streaming via
//! `tower_http::services::ServeFile`; never returns `202 Pending` — a file
//! not yet downloaded is a plain `404`, so renderer-side fallbacks stay
//! simple.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use sig_types::CacheKind;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::cache::{CacheManager, Resource};

pub fn router(cache: Arc<CacheManager>) -> Router {
    Router::new()
        .route("/cache/{kind}/{id}", get(serve_media))
        .route(
            "/cache/widget/{layout_id}/{region_id}/{widget_id}",
            get(serve_widget),
        )
        .with_state(cache)
}

async fn serve_media(
    State(cache): State<Arc<CacheManager>>,
    Path((kind, id)): Path<(String, String)>,
    request: Request<axum::body::Body>,
) -> Response {
    let Some(kind) = CacheKind::from_wire_code(&wire_code(&kind)) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match cache.get_file(kind, &id).await {
        Ok(Some(Resource::LocalFile { path, media_type })) => {
            serve_file_with_range(&path, &media_type, request).await
        }
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            tracing::error!(error = %e, "cache proxy lookup failed");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

async fn serve_widget(
    State(cache): State<Arc<CacheManager>>,
    Path((layout_id, region_id, widget_id)): Path<(i64, String, String)>,
    request: Request<axum::body::Body>,
) -> Response {
    let path = cache.widget_html_path(layout_id, &region_id, &widget_id);
    if !path.exists() {
        return StatusCode::NOT_FOUND.into_response();
    }
    serve_file_with_range(&path, "text/html", request).await
}

async fn serve_file_with_range(
    path: &std::path::Path,
    media_type: &str,
    request: Request<axum::body::Body>,
) -> Response {
    let service = ServeFile::new(path);
    match service.oneshot(request).await {
        Ok(mut response) => {
            if let Ok(value) = HeaderValue::from_str(media_type) {
                response.headers_mut().insert(axum::http::header::CONTENT_TYPE, value);
            }
            response.into_response()
        }
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Accepts both the XMDS wire codes (`L`/`M`/`R`) and their lowercase
/// spelled-out forms (`layout`/`media`/`resource`) in the proxy path, since
/// the renderer constructs URLs from the idiomatic [`CacheKind`] while
/// XMDS clients may still pass the raw wire code.
fn wire_code(segment: &str) -> String {
    match segment {
        "layout" => "L".to_string(),
        "media" => "M".to_string(),
        "resource" => "R".to_string(),
        other => other.to_uppercase(),
    }
}
