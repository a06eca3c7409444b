//! Static frontend files from the public root.
//!
//! Paths are vetted here, then handed to [`ServeFile`] which takes care of
//! content types, `Last-Modified` and conditional requests.

use std::path::{Component, Path as StdPath, PathBuf};

use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::header::CACHE_CONTROL;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::debug;

use super::AppState;
use crate::constants::ASSET_CACHE_CONTROL;
use crate::error::StorybookError;

/// Resolves `requested` under `root`, refusing anything that could leave it.
///
/// Only plain path segments are accepted, and the canonical result must
/// still sit under the canonical root so symlinks cannot escape either.
pub(crate) async fn resolve_asset(
    root: &StdPath,
    requested: &str,
) -> Result<PathBuf, StorybookError> {
    let not_found = || StorybookError::NotFound(requested.to_string());
    let relative = StdPath::new(requested);
    if requested.is_empty()
        || requested.contains('\\')
        || relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_)))
    {
        debug!("Refusing asset path {requested:?}");
        return Err(not_found());
    }

    let (canonical_root, canonical) = match tokio::try_join!(
        tokio::fs::canonicalize(root),
        tokio::fs::canonicalize(root.join(relative))
    ) {
        Ok(paths) => paths,
        Err(err) => {
            debug!("Asset {requested:?} did not resolve: {err}");
            return Err(not_found());
        }
    };
    if !canonical.starts_with(&canonical_root) {
        debug!("Asset {requested:?} resolved outside the public root");
        return Err(not_found());
    }
    let is_file = tokio::fs::metadata(&canonical)
        .await
        .map(|metadata| metadata.is_file())
        .unwrap_or(false);
    if !is_file {
        return Err(not_found());
    }
    Ok(canonical)
}

async fn serve_file(
    root: &StdPath,
    requested: &str,
    request: Request,
) -> Result<Response, StorybookError> {
    let path = resolve_asset(root, requested).await?;
    let response = match ServeFile::new(&path).oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    };
    // removed between the check and the read
    if response.status() == StatusCode::NOT_FOUND {
        return Err(StorybookError::NotFound(requested.to_string()));
    }

    let mut response = response.map(Body::new).into_response();
    if response.status() == StatusCode::OK {
        response
            .headers_mut()
            .insert(CACHE_CONTROL, HeaderValue::from_static(ASSET_CACHE_CONTROL));
    }
    Ok(response)
}

/// handles GET /
pub(crate) async fn index_handler(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, StorybookError> {
    serve_file(&state.public_dir, "index.html", request).await
}

/// handles GET /{page}.html
pub(crate) async fn page_handler(
    State(state): State<AppState>,
    Path(page): Path<String>,
    request: Request,
) -> Result<Response, StorybookError> {
    if !page.ends_with(".html") {
        return Err(StorybookError::NotFound(page));
    }
    serve_file(&state.public_dir, &page, request).await
}

/// handles GET /static/{*path}
pub(crate) async fn static_handler(
    State(state): State<AppState>,
    Path(path): Path<String>,
    request: Request,
) -> Result<Response, StorybookError> {
    serve_file(&state.static_dir(), &path, request).await
}

/// Anything no route matched.
pub(crate) async fn not_found_handler(uri: axum::http::Uri) -> StorybookError {
    StorybookError::NotFound(uri.path().to_string())
}
