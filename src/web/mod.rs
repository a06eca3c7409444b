//! HTTP surface: routing, shared state and the server loop.

use std::num::NonZeroU16;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::checkout::CheckoutGateway;
use crate::config::Settings;
use crate::genai::Storyteller;

mod api;
mod assets;
mod prelude;
mod views;

use api::{create_checkout_session_handler, generate_image_handler, generate_story_handler};
use assets::{index_handler, not_found_handler, page_handler, static_handler};
use views::{cancel_handler, pro_handler, success_handler};

/// Shared, read-only state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    storyteller: Arc<dyn Storyteller>,
    checkout: Arc<dyn CheckoutGateway>,
    public_dir: PathBuf,
    publishable_key: Option<String>,
}

impl AppState {
    /// Bundles the capabilities picked at startup with the asset settings.
    pub fn new(
        settings: &Settings,
        storyteller: Arc<dyn Storyteller>,
        checkout: Arc<dyn CheckoutGateway>,
    ) -> Self {
        Self {
            storyteller,
            checkout,
            public_dir: settings.public_dir.clone(),
            publishable_key: settings.stripe_publishable_key.clone(),
        }
    }

    pub(crate) fn static_dir(&self) -> PathBuf {
        self.public_dir.join("static")
    }

    pub(crate) fn image_dir(&self) -> PathBuf {
        self.static_dir().join("images")
    }
}

fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(index_handler))
        .route("/{page}", get(page_handler))
        .route("/static/{*path}", get(static_handler))
        .route("/api/generate-story", post(generate_story_handler))
        .route("/api/generate-image", post(generate_image_handler))
        .route("/pro", get(pro_handler))
        .route("/success", get(success_handler))
        .route("/cancel", get(cancel_handler))
        .route(
            "/create-checkout-session",
            post(create_checkout_session_handler),
        )
        .fallback(not_found_handler)
}

/// Builds the full application with middleware applied.
pub fn app(state: AppState) -> Router {
    create_router()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", err);
    }
    info!("Shutting down");
}

/// Binds the listener and serves until ctrl-c.
pub async fn setup_server(
    listen_addr: &str,
    port: NonZeroU16,
    state: AppState,
) -> Result<(), anyhow::Error> {
    let app = app(state);

    let addr = format!("{}:{}", listen_addr, port);
    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, IF_MODIFIED_SINCE, LAST_MODIFIED};
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::checkout::{CheckoutError, CheckoutOrder, CheckoutResponse, MockGateway};
    use crate::constants::{FALLBACK_CONTINUATIONS, NEXT_PROMPT_TEXT, PLACEHOLDER_COLORS};
    use crate::genai::{GenerationError, OfflineStoryteller};
    use crate::illustration::image_file_name;
    use crate::story::PageRequest;

    /// Counts calls and fails or succeeds on demand.
    #[derive(Default)]
    struct FakeStoryteller {
        calls: AtomicUsize,
        image: Option<Vec<u8>>,
        fail_text: bool,
    }

    #[async_trait]
    impl Storyteller for FakeStoryteller {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn narrate(&self, page: &PageRequest) -> Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_text {
                return Err(GenerationError::Api(429, "quota exceeded".to_string()));
            }
            Ok(format!("  The model wrote page {}.  ", page.page_number))
        }

        async fn describe_scene(&self, _story_text: &str) -> Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_text {
                return Err(GenerationError::Network("connection reset".to_string()));
            }
            Ok("A small fox holding a glowing lantern".to_string())
        }

        async fn paint(&self, _prompt: &str) -> Result<Vec<u8>, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.image
                .clone()
                .ok_or_else(|| GenerationError::Blocked("SAFETY".to_string()))
        }
    }

    struct FailingGateway;

    #[async_trait]
    impl CheckoutGateway for FailingGateway {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn create_session(
            &self,
            _order: &CheckoutOrder,
        ) -> Result<CheckoutResponse, CheckoutError> {
            Err(CheckoutError::Api(400, "No such price".to_string()))
        }
    }

    fn tiny_png() -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        image::RgbImage::from_pixel(2, 2, image::Rgb([253, 121, 168]))
            .write_to(&mut out, image::ImageFormat::Png)
            .expect("encode png");
        out.into_inner()
    }

    fn setup_public() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        let public = dir.path().join("public");
        std::fs::create_dir_all(public.join("static/css")).expect("mkdir css");
        std::fs::write(public.join("index.html"), "<h1>Storybook</h1>").expect("index");
        std::fs::write(public.join("about.html"), "<h1>About</h1>").expect("about");
        std::fs::write(public.join("static/css/base.css"), "body{}").expect("css");
        std::fs::write(dir.path().join("secret.txt"), "top secret").expect("secret");
        dir
    }

    fn state_with(
        dir: &tempfile::TempDir,
        storyteller: Arc<dyn Storyteller>,
        checkout: Arc<dyn CheckoutGateway>,
    ) -> AppState {
        AppState {
            storyteller,
            checkout,
            public_dir: dir.path().join("public"),
            publishable_key: Some("pk_test_51Abc".to_string()),
        }
    }

    fn offline_state(dir: &tempfile::TempDir) -> AppState {
        state_with(dir, Arc::new(OfflineStoryteller), Arc::new(MockGateway))
    }

    async fn read_body(response: axum::response::Response) -> String {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        String::from_utf8_lossy(&bytes).to_string()
    }

    async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .header("host", "localhost:5000")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = read_body(response).await;
        (status, serde_json::from_str(&body).expect("json body"))
    }

    async fn get_uri(app: Router, uri: &str) -> axum::response::Response {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        app.oneshot(request).await.unwrap()
    }

    #[tokio::test]
    async fn story_requires_idea_without_calling_out() {
        let dir = setup_public();
        let fake = Arc::new(FakeStoryteller::default());
        let app = app(state_with(&dir, fake.clone(), Arc::new(MockGateway)));

        let (status, body) =
            post_json(app, "/api/generate-story", json!({"pageNumber": 1})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Story idea is required");
        assert_eq!(fake.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn offline_story_embeds_idea() {
        let dir = setup_public();
        let app = app(offline_state(&dir));

        let (status, body) = post_json(
            app,
            "/api/generate-story",
            json!({"storyIdea": "a dragon", "pageNumber": 1}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["pageNumber"], 1);
        assert_eq!(body["promptText"], NEXT_PROMPT_TEXT);
        assert!(body["storyText"].as_str().unwrap().contains("a dragon"));
    }

    #[tokio::test]
    async fn offline_continuation_is_deterministic() {
        let dir = setup_public();
        let app = app(offline_state(&dir));
        let request = json!({
            "storyIdea": "a dragon",
            "userResponse": "open the door",
            "previousStory": "Ember lived in a cave.",
            "pageNumber": 7,
        });

        let (_, first) = post_json(app.clone(), "/api/generate-story", request.clone()).await;
        let (_, second) = post_json(app, "/api/generate-story", request).await;
        let text = first["storyText"].as_str().unwrap();
        assert!(text.contains(FALLBACK_CONTINUATIONS[7 % FALLBACK_CONTINUATIONS.len()]));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn failing_model_falls_back_to_canned_story() {
        let dir = setup_public();
        let fake = Arc::new(FakeStoryteller {
            fail_text: true,
            ..Default::default()
        });
        let app = app(state_with(&dir, fake.clone(), Arc::new(MockGateway)));

        let (status, body) = post_json(
            app,
            "/api/generate-story",
            json!({"storyIdea": "a dragon", "pageNumber": 3, "userResponse": "run"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert!(body["storyText"]
            .as_str()
            .unwrap()
            .contains(FALLBACK_CONTINUATIONS[3]));
        assert_eq!(fake.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn model_story_is_trimmed() {
        let dir = setup_public();
        let app = app(state_with(
            &dir,
            Arc::new(FakeStoryteller::default()),
            Arc::new(MockGateway),
        ));

        let (_, body) = post_json(
            app,
            "/api/generate-story",
            json!({"storyIdea": "a dragon", "pageNumber": 2}),
        )
        .await;
        assert_eq!(body["storyText"], "The model wrote page 2.");
    }

    #[tokio::test]
    async fn malformed_story_body_is_generic_500() {
        let dir = setup_public();
        let app = app(offline_state(&dir));

        let request = Request::builder()
            .method("POST")
            .uri("/api/generate-story")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = serde_json::from_str(&read_body(response).await).unwrap();
        assert_eq!(body["error"], "Failed to generate story");
    }

    #[tokio::test]
    async fn image_requires_story_text() {
        let dir = setup_public();
        let app = app(offline_state(&dir));

        let (status, body) =
            post_json(app, "/api/generate-image", json!({"pageNumber": 2})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn failed_image_uses_placeholder_palette() {
        let dir = setup_public();
        let fake = Arc::new(FakeStoryteller::default());
        let app = app(state_with(&dir, fake, Arc::new(MockGateway)));

        for page in [1u32, 5, 6, 11] {
            let request = json!({"storyText": "A fox found a lantern.", "pageNumber": page});
            let (status, first) =
                post_json(app.clone(), "/api/generate-image", request.clone()).await;
            let (_, second) = post_json(app.clone(), "/api/generate-image", request).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(first["success"], true);
            assert_eq!(first["method"], "placeholder");
            let url = first["imageUrl"].as_str().unwrap();
            let color = PLACEHOLDER_COLORS[page as usize % 6];
            assert!(url.contains(&format!("/{color}/")), "{url}");
            assert_eq!(first["imageUrl"], second["imageUrl"]);
        }
    }

    #[tokio::test]
    async fn generated_image_is_saved_and_served() {
        let dir = setup_public();
        let png = tiny_png();
        let fake = Arc::new(FakeStoryteller {
            image: Some(png.clone()),
            ..Default::default()
        });
        let app = app(state_with(&dir, fake, Arc::new(MockGateway)));

        let (status, body) = post_json(
            app.clone(),
            "/api/generate-image",
            json!({"storyText": "A fox found a lantern.", "pageNumber": 2}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["method"], "generated");
        let prompt = body["prompt"].as_str().unwrap();
        assert!(prompt.starts_with("A small fox holding a glowing lantern, "));
        let file_name = image_file_name(2, prompt);
        assert_eq!(body["imageUrl"], format!("/static/images/{file_name}"));

        let saved = dir.path().join("public/static/images").join(&file_name);
        assert_eq!(std::fs::read(&saved).expect("saved image"), png);

        let response = get_uri(app, &format!("/static/images/{file_name}")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), "image/png");
    }

    #[tokio::test]
    async fn page_zero_image_is_placeholder() {
        let dir = setup_public();
        let app = app(offline_state(&dir));

        let (status, body) = post_json(
            app,
            "/api/generate-image",
            json!({"storyText": "A fox found a lantern.", "pageNumber": 0}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["method"], "placeholder");
        let url = body["imageUrl"].as_str().unwrap();
        assert!(url.contains(&format!("/{}/", PLACEHOLDER_COLORS[0])), "{url}");
        assert!(url.ends_with("text=Story+Page+0"), "{url}");
    }

    #[tokio::test]
    async fn undecodable_image_uses_placeholder() {
        let dir = setup_public();
        let fake = Arc::new(FakeStoryteller {
            image: Some(b"definitely not a png".to_vec()),
            fail_text: true,
            ..Default::default()
        });
        let app = app(state_with(&dir, fake, Arc::new(MockGateway)));

        let (status, body) = post_json(
            app,
            "/api/generate-image",
            json!({"storyText": "A fox found a lantern.", "pageNumber": 3}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["method"], "placeholder");
        assert!(body["prompt"]
            .as_str()
            .unwrap()
            .starts_with("A fox found a lantern, "));
    }

    #[tokio::test]
    async fn mock_checkout_appends_flag() {
        let dir = setup_public();
        let app = app(offline_state(&dir));

        let (status, body) = post_json(
            app.clone(),
            "/create-checkout-session",
            json!({"priceId": "price_pro_monthly", "successUrl": "https://example.org/success"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["url"], "https://example.org/success?mock=true");
        assert_eq!(body["mock"], true);

        let (_, body) = post_json(app, "/create-checkout-session", json!({})).await;
        assert_eq!(body["url"], "http://localhost:5000/success?mock=true");
    }

    #[tokio::test]
    async fn failing_gateway_degrades_to_mock() {
        let dir = setup_public();
        let app = app(state_with(
            &dir,
            Arc::new(OfflineStoryteller),
            Arc::new(FailingGateway),
        ));

        let (status, body) = post_json(
            app,
            "/create-checkout-session",
            json!({"successUrl": "https://example.org/success"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["url"], "https://example.org/success?mock=true");
        assert_eq!(body["mock"], true);
    }

    #[tokio::test]
    async fn bare_checkout_post_uses_defaults() {
        let dir = setup_public();
        let app = app(offline_state(&dir));

        let request = Request::builder()
            .method("POST")
            .uri("/create-checkout-session")
            .header("host", "localhost:5000")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&read_body(response).await).unwrap();
        assert_eq!(body["mock"], true);
    }

    #[tokio::test]
    async fn static_pages_are_served() {
        let dir = setup_public();
        let app = app(offline_state(&dir));

        let response = get_uri(app.clone(), "/").await;
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers().get(CONTENT_TYPE).unwrap();
        assert!(content_type.to_str().unwrap().starts_with("text/html"));
        assert!(response.headers().contains_key(CACHE_CONTROL));
        assert!(read_body(response).await.contains("Storybook"));

        let response = get_uri(app.clone(), "/about.html").await;
        assert!(read_body(response).await.contains("About"));

        let response = get_uri(app.clone(), "/static/css/base.css").await;
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers().get(CONTENT_TYPE).unwrap();
        assert!(content_type.to_str().unwrap().starts_with("text/css"));

        let response = get_uri(app, "/missing.html").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: Value = serde_json::from_str(&read_body(response).await).unwrap();
        assert_eq!(body["error"], "Not found");
    }

    #[tokio::test]
    async fn static_route_refuses_traversal() {
        let dir = setup_public();
        let app = app(offline_state(&dir));

        for uri in [
            "/static/../../secret.txt",
            "/static/%2e%2e/%2e%2e/secret.txt",
            "/static/css/..%2F..%2F..%2Fsecret.txt",
            "/..%2Fsecret.txt",
            "/static/css",
        ] {
            let response = get_uri(app.clone(), uri).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
            assert!(!read_body(response).await.contains("top secret"));
        }
    }

    #[tokio::test]
    async fn echoed_last_modified_is_not_modified() {
        let dir = setup_public();
        let app = app(offline_state(&dir));

        // the file's mtime has sub-second precision, the header does not
        let response = get_uri(app.clone(), "/static/css/base.css").await;
        assert_eq!(response.status(), StatusCode::OK);
        let last_modified = response
            .headers()
            .get(LAST_MODIFIED)
            .expect("last-modified")
            .clone();

        let request = Request::builder()
            .method("GET")
            .uri("/static/css/base.css")
            .header(IF_MODIFIED_SINCE, last_modified)
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    }

    #[tokio::test]
    async fn result_pages_render() {
        let dir = setup_public();
        let app = app(offline_state(&dir));

        let body = read_body(get_uri(app.clone(), "/pro").await).await;
        assert!(body.contains("Unlock Storybook Pro"));
        assert!(body.contains("pk_test_51Abc"));
        assert!(!body.contains("Payment cancelled"));

        let body = read_body(get_uri(app.clone(), "/cancel").await).await;
        assert!(body.contains("Payment cancelled"));

        let body = read_body(get_uri(app.clone(), "/success?mock=true").await).await;
        assert!(body.contains("Payment successful"));
        assert!(body.contains("test checkout"));

        let body = read_body(get_uri(app, "/success?session_id=cs_test_123").await).await;
        assert!(!body.contains("test checkout"));
    }
}
