//! Shared constants for prompts, fallbacks and caching
//!

/// Default base URL for the generative language API.
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/";

/// Stripe API base.
pub const STRIPE_API_BASE: &str = "https://api.stripe.com/v1/";

/// Timeout applied to every outbound API call.
pub const OUTBOUND_TIMEOUT_SECONDS: u64 = 120;

/// Invitation returned with every story page.
pub const NEXT_PROMPT_TEXT: &str = "What happens next in your adventure? Choose something exciting!";

/// Canned story beats used for pages after the first when the model is unavailable.
pub const FALLBACK_CONTINUATIONS: [&str; 5] = [
    "The brave adventurer decided to explore the mysterious path ahead.",
    "A wise old wizard appeared with an important message.",
    "The adventurer discovered a hidden treasure chest.",
    "A friendly dragon offered to help on the journey.",
    "The path led to a magical forest filled with talking animals.",
];

/// Placeholder image background colours, picked by page number.
pub const PLACEHOLDER_COLORS: [&str; 6] = ["6c5ce7", "74b9ff", "fd79a8", "fdcb6e", "00b894", "e17055"];

/// Style words appended to every illustration prompt.
pub const ILLUSTRATION_STYLE: [&str; 6] = [
    "children's storybook illustration",
    "soft watercolor style",
    "bright cheerful colors",
    "whimsical",
    "friendly and warm",
    "safe for kids",
];

/// Longest story excerpt used when the prompt has to be built without the model.
pub const ILLUSTRATION_EXCERPT_CHARS: usize = 200;

/// Generated illustrations are named `<prefix>_<page>_<hash>.png`.
pub const GENERATED_IMAGE_PREFIX: &str = "story_page";

/// Hex digits of the prompt hash kept in image filenames.
pub const IMAGE_HASH_LENGTH: usize = 12;

/// Aspect ratio requested from the image model.
pub const IMAGE_ASPECT_RATIO: &str = "4:3";

/// Safety filter level requested from the image model.
pub const IMAGE_SAFETY_FILTER: &str = "block_low_and_above";

/// Price used when the checkout request does not name one.
pub const DEFAULT_PRICE_ID: &str = "price_pro_monthly";

/// Metadata attached to every checkout session.
pub const CHECKOUT_METADATA: [(&str, &str); 2] =
    [("product", "storybook_pro"), ("source", "storybook_web")];

/// Cache-Control value for static asset responses: an hour fresh, a day stale.
pub const ASSET_CACHE_CONTROL: &str = "public, max-age=3600, stale-while-revalidate=86400";
