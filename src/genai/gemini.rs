use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::{GenerationError, Storyteller};
use crate::config::GeminiSettings;
use crate::constants::{IMAGE_ASPECT_RATIO, IMAGE_SAFETY_FILTER};
use crate::illustration::scene_instruction;
use crate::story::{PageRequest, page_instruction};

/// Storyteller backed by the Gemini text API and the Imagen predict API.
#[derive(Clone, Debug)]
pub struct GeminiStoryteller {
    client: reqwest::Client,
    settings: GeminiSettings,
}

// -----------------------------
// generateContent (text)
// -----------------------------

#[derive(Serialize, Debug)]
struct GenerateContentRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize, Debug)]
struct Content<'a> {
    parts: [TextPart<'a>; 1],
}

#[derive(Serialize, Debug)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize, Debug)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

impl GenerateContentResponse {
    fn into_text(self) -> Result<String, GenerationError> {
        if let Some(reason) = self.prompt_feedback.and_then(|feedback| feedback.block_reason) {
            return Err(GenerationError::Blocked(reason));
        }
        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or(GenerationError::Empty)?;
        if candidate.finish_reason.as_deref() == Some("SAFETY") {
            return Err(GenerationError::Blocked("SAFETY".to_string()));
        }
        let text: String = candidate
            .content
            .map(|content| content.parts)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|part| part.text)
            .collect();
        if text.trim().is_empty() {
            return Err(GenerationError::Empty);
        }
        Ok(text)
    }
}

// -----------------------------
// predict (images)
// -----------------------------

#[derive(Serialize, Debug)]
struct PredictRequest<'a> {
    instances: [PredictInstance<'a>; 1],
    parameters: PredictParameters,
}

#[derive(Serialize, Debug)]
struct PredictInstance<'a> {
    prompt: &'a str,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PredictParameters {
    sample_count: u8,
    aspect_ratio: &'static str,
    safety_filter_level: &'static str,
    person_generation: &'static str,
}

impl Default for PredictParameters {
    fn default() -> Self {
        Self {
            sample_count: 1,
            aspect_ratio: IMAGE_ASPECT_RATIO,
            safety_filter_level: IMAGE_SAFETY_FILTER,
            person_generation: "dont_allow",
        }
    }
}

#[derive(Deserialize, Debug, Default)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    #[serde(default)]
    bytes_base64_encoded: Option<String>,
    #[serde(default)]
    rai_filtered_reason: Option<String>,
}

impl PredictResponse {
    fn into_image(self) -> Result<Vec<u8>, GenerationError> {
        let first = self
            .predictions
            .into_iter()
            .next()
            .ok_or(GenerationError::Empty)?;
        if let Some(reason) = first.rai_filtered_reason {
            return Err(GenerationError::Blocked(reason));
        }
        let encoded = first.bytes_base64_encoded.ok_or(GenerationError::Empty)?;
        general_purpose::STANDARD
            .decode(encoded)
            .map_err(|err| GenerationError::Decode(err.to_string()))
    }
}

impl GeminiStoryteller {
    /// Wraps a shared HTTP client with the configured models.
    pub fn new(client: reqwest::Client, settings: GeminiSettings) -> Self {
        Self { client, settings }
    }

    fn model_url(&self, model: &str, method: &str) -> Result<Url, GenerationError> {
        self.settings
            .api_base
            .join(&format!("models/{model}:{method}"))
            .map_err(|err| GenerationError::Network(err.to_string()))
    }

    async fn post_json<B, R>(&self, url: Url, body: &B) -> Result<R, GenerationError>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let resp = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.settings.api_key)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            return Err(GenerationError::Api(
                status.as_u16(),
                String::from_utf8_lossy(&bytes).into_owned(),
            ));
        }
        serde_json::from_slice(&bytes).map_err(|err| GenerationError::Decode(err.to_string()))
    }

    /// Sends a single prompt to the text model and returns its reply untrimmed.
    pub async fn generate_text(&self, prompt: &str) -> Result<String, GenerationError> {
        let url = self.model_url(&self.settings.text_model, "generateContent")?;
        let body = GenerateContentRequest {
            contents: [Content {
                parts: [TextPart { text: prompt }],
            }],
        };
        debug!("Sending {} byte prompt to {}", prompt.len(), self.settings.text_model);
        let response: GenerateContentResponse = self.post_json(url, &body).await?;
        response.into_text()
    }

    /// Asks the image model for exactly one image.
    pub async fn generate_image(&self, prompt: &str) -> Result<Vec<u8>, GenerationError> {
        let url = self.model_url(&self.settings.image_model, "predict")?;
        let body = PredictRequest {
            instances: [PredictInstance { prompt }],
            parameters: PredictParameters::default(),
        };
        let response: PredictResponse = self.post_json(url, &body).await?;
        response.into_image()
    }
}

#[async_trait]
impl Storyteller for GeminiStoryteller {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn narrate(&self, page: &PageRequest) -> Result<String, GenerationError> {
        let text = self.generate_text(&page_instruction(page)).await?;
        Ok(text.trim().to_string())
    }

    async fn describe_scene(&self, story_text: &str) -> Result<String, GenerationError> {
        let text = self.generate_text(&scene_instruction(story_text)).await?;
        Ok(text.trim().to_string())
    }

    async fn paint(&self, prompt: &str) -> Result<Vec<u8>, GenerationError> {
        self.generate_image(prompt).await
    }
}
