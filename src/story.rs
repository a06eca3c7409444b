//! Story page composition.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::constants::{FALLBACK_CONTINUATIONS, NEXT_PROMPT_TEXT};
use crate::error::StorybookError;
use crate::genai::Storyteller;

fn first_page() -> u32 {
    1
}

/// Body of `POST /api/generate-story`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    /// Premise of the story, required on every page
    #[serde(default)]
    pub story_idea: Option<String>,
    /// The reader's latest choice
    #[serde(default)]
    pub user_response: Option<String>,
    /// Prose of the pages so far, as accumulated by the frontend
    #[serde(default)]
    pub previous_story: Option<String>,
    /// 1-based page number
    #[serde(default = "first_page")]
    pub page_number: u32,
}

impl PageRequest {
    /// The story idea, trimmed. Empty when missing.
    pub fn idea(&self) -> &str {
        self.story_idea.as_deref().map(str::trim).unwrap_or_default()
    }

    fn choice(&self) -> Option<&str> {
        non_blank(self.user_response.as_deref())
    }

    fn history(&self) -> Option<&str> {
        non_blank(self.previous_story.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// Response body of `POST /api/generate-story`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoryPage {
    /// Always true, failures upstream are replaced by fallback prose
    pub success: bool,
    /// The page prose
    pub story_text: String,
    /// Invitation for the reader's next choice
    pub prompt_text: String,
    /// Page number echoed back
    pub page_number: u32,
}

/// Builds the instruction sent to the text model for a page.
pub fn page_instruction(page: &PageRequest) -> String {
    if page.page_number <= 1 {
        return format!(
            "Create the beginning of a children's story (ages 6-12) based on this idea: \"{}\". \
             Write 2-3 sentences that introduce the main character and setting. \
             Make it engaging and age-appropriate.",
            page.idea()
        );
    }

    let mut instruction = format!(
        "Continue a children's story (ages 6-12) that started from this idea: \"{}\".",
        page.idea()
    );
    if let Some(history) = page.history() {
        instruction.push_str(&format!("\n\nThe story so far:\n{history}"));
    }
    match page.choice() {
        Some(choice) => instruction.push_str(&format!(
            "\n\nThe reader chose what happens next: \"{choice}\"."
        )),
        None => instruction.push_str("\n\nThe reader did not choose, so pick an exciting turn."),
    }
    instruction.push_str(
        "\n\nWrite 2-3 sentences that advance the plot. \
         Make it engaging and age-appropriate for ages 6-12.",
    );
    instruction
}

/// Canned prose used when the model cannot write the page.
///
/// Later pages pick their beat with `page_number % len`, so the same page
/// always gets the same text.
pub fn fallback_page(page: &PageRequest) -> String {
    if page.page_number <= 1 {
        return format!(
            "Once upon a time, in a magical world filled with wonder, there was a brave adventurer \
             who discovered something amazing: \"{}\". The journey was about to begin, and every \
             choice would shape the destiny of this incredible tale.",
            page.idea()
        );
    }
    let beat = FALLBACK_CONTINUATIONS[page.page_number as usize % FALLBACK_CONTINUATIONS.len()];
    format!(
        "Following the previous adventure, {beat} This opened up new possibilities and exciting \
         challenges ahead."
    )
}

/// Validates the request and produces the page, degrading to canned prose
/// on any generation failure.
pub async fn compose_page(
    storyteller: &dyn Storyteller,
    page: &PageRequest,
) -> Result<StoryPage, StorybookError> {
    if page.idea().is_empty() {
        return Err(StorybookError::BadRequest("Story idea is required"));
    }
    if page.page_number == 0 {
        return Err(StorybookError::BadRequest("Page number must be at least 1"));
    }

    let story_text = match storyteller.narrate(page).await {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => {
            warn!("{} returned an empty page, using fallback", storyteller.name());
            fallback_page(page)
        }
        Err(err) => {
            warn!("{} failed to write page {}: {err}", storyteller.name(), page.page_number);
            fallback_page(page)
        }
    };

    Ok(StoryPage {
        success: true,
        story_text,
        prompt_text: NEXT_PROMPT_TEXT.to_string(),
        page_number: page.page_number,
    })
}
