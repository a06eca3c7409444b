//! Generative capabilities behind the story and illustration endpoints.
//!
//! Handlers only see the [`Storyteller`] trait. [`GeminiStoryteller`] talks
//! to the hosted API, [`OfflineStoryteller`] answers deterministically without
//! any network access. One of them is picked at startup by [`select_storyteller`].

mod gemini;
mod offline;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::story::PageRequest;

pub use gemini::GeminiStoryteller;
pub use offline::OfflineStoryteller;

/// Why a generation call did not produce a usable result.
#[derive(Debug)]
pub enum GenerationError {
    /// No remote model is configured
    Offline,
    /// The request never got a response
    Network(String),
    /// The API answered with a non-success status
    Api(u16, String),
    /// The model refused the prompt or filtered the output
    Blocked(String),
    /// The API answered but returned nothing usable
    Empty,
    /// The response body could not be decoded
    Decode(String),
}

impl std::fmt::Display for GenerationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Offline => write!(f, "generation is not configured"),
            Self::Network(err) => write!(f, "network error: {err}"),
            Self::Api(status, body) => write!(f, "API error {status}: {body}"),
            Self::Blocked(reason) => write!(f, "content blocked: {reason}"),
            Self::Empty => write!(f, "no content returned"),
            Self::Decode(err) => write!(f, "failed to decode response: {err}"),
        }
    }
}

impl std::error::Error for GenerationError {}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GenerationError::Decode(err.to_string())
        } else {
            GenerationError::Network(err.to_string())
        }
    }
}

/// Text and image generation for story pages.
#[async_trait]
pub trait Storyteller: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Writes the prose for one story page.
    async fn narrate(&self, page: &PageRequest) -> Result<String, GenerationError>;

    /// Turns story prose into a short description of an illustration.
    async fn describe_scene(&self, story_text: &str) -> Result<String, GenerationError>;

    /// Renders one image for the prompt, returning the encoded image bytes.
    async fn paint(&self, prompt: &str) -> Result<Vec<u8>, GenerationError>;
}

/// Picks the storyteller for this process.
///
/// With a Gemini key configured the text model is checked once; if that fails
/// the offline storyteller is used for the lifetime of the process.
pub async fn select_storyteller(
    settings: &Settings,
    client: reqwest::Client,
) -> Arc<dyn Storyteller> {
    let Some(gemini) = settings.gemini.clone() else {
        warn!("Missing GOOGLE_API_KEY, using offline story data.");
        return Arc::new(OfflineStoryteller);
    };

    let storyteller = GeminiStoryteller::new(client, gemini);
    if settings.startup_check {
        match storyteller.generate_text("Say hello!").await {
            Ok(reply) => info!("Text model check successful: {}", reply.trim()),
            Err(err) => {
                error!("Text model check failed, using offline story data: {err}");
                return Arc::new(OfflineStoryteller);
            }
        }
    }
    info!("Gemini storyteller initialized");
    Arc::new(storyteller)
}

/// Builds the shared HTTP client used for every outbound call.
pub fn http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(
            crate::constants::OUTBOUND_TIMEOUT_SECONDS,
        ))
        .build()
}
