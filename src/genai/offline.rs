use async_trait::async_trait;

use super::{GenerationError, Storyteller};
use crate::illustration::story_excerpt;
use crate::story::{PageRequest, fallback_page};

/// Storyteller used when no model is reachable.
///
/// Pages come from the canned fallback narrative and images are never
/// produced, so callers always end up on the placeholder path.
#[derive(Clone, Copy, Debug, Default)]
pub struct OfflineStoryteller;

#[async_trait]
impl Storyteller for OfflineStoryteller {
    fn name(&self) -> &'static str {
        "offline"
    }

    async fn narrate(&self, page: &PageRequest) -> Result<String, GenerationError> {
        Ok(fallback_page(page))
    }

    async fn describe_scene(&self, story_text: &str) -> Result<String, GenerationError> {
        Ok(story_excerpt(story_text))
    }

    async fn paint(&self, _prompt: &str) -> Result<Vec<u8>, GenerationError> {
        Err(GenerationError::Offline)
    }
}
