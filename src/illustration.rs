//! Illustrations for story pages: prompt derivation, rendering and the
//! placeholder fallback.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::constants::{
    GENERATED_IMAGE_PREFIX, ILLUSTRATION_EXCERPT_CHARS, ILLUSTRATION_STYLE, IMAGE_HASH_LENGTH,
    PLACEHOLDER_COLORS,
};
use crate::error::StorybookError;
use crate::genai::{GenerationError, Storyteller};

fn first_page() -> u32 {
    1
}

/// Body of `POST /api/generate-image`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IllustrationRequest {
    /// Prose of the page to illustrate
    #[serde(default)]
    pub story_text: Option<String>,
    /// 1-based page number
    #[serde(default = "first_page")]
    pub page_number: u32,
}

/// How the returned image was produced.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IllustrationMethod {
    /// Rendered by the image model and saved under the static images route
    Generated,
    /// A solid colour stand-in
    Placeholder,
}

/// Response body of `POST /api/generate-image`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Illustration {
    /// Always true, failures upstream are reported through `method`
    pub success: bool,
    /// Where the browser can load the image
    pub image_url: String,
    /// Generated or placeholder
    pub method: IllustrationMethod,
    /// The prompt the image was (or would have been) rendered from
    pub prompt: String,
}

/// Instruction asking the text model for an illustration description.
pub fn scene_instruction(story_text: &str) -> String {
    format!(
        "Describe one illustration for this part of a children's story in one or two sentences. \
         Focus on the characters, the setting and what is happening. Keep it gentle and suitable \
         for children aged 6-12, and do not ask for any words or letters in the picture.\n\n\
         Story: {story_text}"
    )
}

/// The first few hundred characters of the story, cut on a char boundary.
pub fn story_excerpt(story_text: &str) -> String {
    let story_text = story_text.trim();
    match story_text.char_indices().nth(ILLUSTRATION_EXCERPT_CHARS) {
        Some((end, _)) => story_text[..end].trim_end().to_string(),
        None => story_text.to_string(),
    }
}

fn with_style(description: &str) -> String {
    format!("{}, {}", description.trim().trim_end_matches('.'), ILLUSTRATION_STYLE.join(", "))
}

/// Builds the image prompt for a page. Never fails: if the model cannot
/// describe the scene the story excerpt is used instead.
pub async fn derive_prompt(storyteller: &dyn Storyteller, story_text: &str) -> String {
    match storyteller.describe_scene(story_text).await {
        Ok(description) if !description.trim().is_empty() => with_style(&description),
        Ok(_) => with_style(&story_excerpt(story_text)),
        Err(err) => {
            debug!("Scene description failed, using excerpt: {err}");
            with_style(&story_excerpt(story_text))
        }
    }
}

/// Solid colour stand-in, the colour is picked by `page_number % 6`.
pub fn placeholder_url(page_number: u32) -> String {
    let color = PLACEHOLDER_COLORS[page_number as usize % PLACEHOLDER_COLORS.len()];
    format!("https://via.placeholder.com/400x300/{color}/ffffff?text=Story+Page+{page_number}")
}

/// File name for a generated image, derived from the page and the prompt.
pub fn image_file_name(page_number: u32, prompt: &str) -> String {
    let digest = hex::encode(Sha256::digest(prompt.as_bytes()));
    format!(
        "{GENERATED_IMAGE_PREFIX}_{page_number}_{}.png",
        &digest[..IMAGE_HASH_LENGTH]
    )
}

/// Ensures image bytes are a valid PNG, converting if possible.
fn normalize_image_to_png(bytes: &[u8]) -> Result<Vec<u8>, GenerationError> {
    if bytes.len() < 4 {
        return Err(GenerationError::Decode("image is too short".to_string()));
    }

    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|err| GenerationError::Decode(err.to_string()))?;
    let format = reader.format();
    let image = reader
        .decode()
        .map_err(|err| GenerationError::Decode(err.to_string()))?;

    if format == Some(image::ImageFormat::Png) {
        return Ok(bytes.to_vec());
    }

    let mut output = Cursor::new(Vec::new());
    image
        .write_to(&mut output, image::ImageFormat::Png)
        .map_err(|err| GenerationError::Decode(err.to_string()))?;
    Ok(output.into_inner())
}

#[derive(Debug)]
enum RenderError {
    Generation(GenerationError),
    Write(PathBuf, std::io::Error),
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Generation(err) => err.fmt(f),
            Self::Write(path, err) => write!(f, "failed to write {}: {err}", path.display()),
        }
    }
}

async fn render_to_disk(
    storyteller: &dyn Storyteller,
    image_dir: &Path,
    page_number: u32,
    prompt: &str,
) -> Result<String, RenderError> {
    let bytes = storyteller
        .paint(prompt)
        .await
        .and_then(|bytes| normalize_image_to_png(&bytes))
        .map_err(RenderError::Generation)?;

    let file_name = image_file_name(page_number, prompt);
    let path = image_dir.join(&file_name);
    tokio::fs::create_dir_all(image_dir)
        .await
        .map_err(|err| RenderError::Write(image_dir.to_path_buf(), err))?;
    // concurrent requests for the same prompt simply overwrite each other
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|err| RenderError::Write(path.clone(), err))?;
    info!("Saved illustration {}", path.display());
    Ok(format!("/static/images/{file_name}"))
}

/// Validates the request and produces an illustration, degrading to a
/// placeholder on any generation or storage failure.
pub async fn illustrate(
    storyteller: &dyn Storyteller,
    image_dir: &Path,
    request: &IllustrationRequest,
) -> Result<Illustration, StorybookError> {
    let story_text = request
        .story_text
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .ok_or(StorybookError::BadRequest("Story text is required"))?;

    let prompt = derive_prompt(storyteller, story_text).await;
    let (image_url, method) =
        match render_to_disk(storyteller, image_dir, request.page_number, &prompt).await {
            Ok(url) => (url, IllustrationMethod::Generated),
            Err(RenderError::Generation(GenerationError::Offline)) => (
                placeholder_url(request.page_number),
                IllustrationMethod::Placeholder,
            ),
            Err(err) => {
                warn!(
                    "{} could not illustrate page {}, using placeholder: {err}",
                    storyteller.name(),
                    request.page_number
                );
                (
                    placeholder_url(request.page_number),
                    IllustrationMethod::Placeholder,
                )
            }
        };

    Ok(Illustration {
        success: true,
        image_url,
        method,
        prompt,
    })
}
