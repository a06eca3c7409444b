//! JSON endpoints.

use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use axum::http::header::{HOST, ORIGIN};

use super::prelude::*;
use crate::checkout::{CheckoutRequest, CheckoutResponse, start_checkout};
use crate::illustration::{Illustration, IllustrationRequest, illustrate};
use crate::story::{PageRequest, StoryPage, compose_page};

/// handles POST /api/generate-story
pub(crate) async fn generate_story_handler(
    State(state): State<AppState>,
    payload: Result<Json<PageRequest>, JsonRejection>,
) -> Result<Json<StoryPage>, StorybookError> {
    let Json(page) = payload
        .map_err(|err| StorybookError::internal("Failed to generate story", err.body_text()))?;
    compose_page(state.storyteller.as_ref(), &page).await.map(Json)
}

/// handles POST /api/generate-image
pub(crate) async fn generate_image_handler(
    State(state): State<AppState>,
    payload: Result<Json<IllustrationRequest>, JsonRejection>,
) -> Result<Json<Illustration>, StorybookError> {
    let Json(request) = payload
        .map_err(|err| StorybookError::internal("Failed to generate image", err.body_text()))?;
    illustrate(state.storyteller.as_ref(), &state.image_dir(), &request)
        .await
        .map(Json)
}

/// Origin the browser called us from, used for default redirect targets.
fn request_origin(headers: &HeaderMap) -> String {
    if let Some(origin) = headers
        .get(ORIGIN)
        .and_then(|value| value.to_str().ok())
        .filter(|origin| !origin.is_empty() && *origin != "null")
    {
        return origin.to_string();
    }
    headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .map(|host| format!("http://{host}"))
        .unwrap_or_default()
}

/// handles POST /create-checkout-session
pub(crate) async fn create_checkout_session_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<Json<CheckoutResponse>, StorybookError> {
    let request = match payload {
        Ok(Json(request)) => request,
        // every field is optional, so a bare POST is fine
        Err(JsonRejection::MissingJsonContentType(_)) => CheckoutRequest::default(),
        Err(err) => {
            return Err(StorybookError::internal(
                "Failed to create checkout session",
                err.body_text(),
            ));
        }
    };
    let order = request.into_order(&request_origin(&headers));
    info!(
        "Creating {} checkout session for {}",
        state.checkout.name(),
        order.price_id
    );
    Ok(Json(start_checkout(state.checkout.as_ref(), &order).await))
}
