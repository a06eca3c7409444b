//! Config handling

use std::path::PathBuf;

use tracing::log::LevelFilter;
use url::Url;

use crate::cli::CliOptions;

/// Sets up logging based on the debug flag
pub fn setup_logging(debug: bool) -> Result<(), Box<std::io::Error>> {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut logger = simple_logger::SimpleLogger::new().with_level(level);
    if !debug {
        logger = logger
            .with_module_level("tracing", LevelFilter::Warn)
            .with_module_level("rustls", LevelFilter::Info)
            .with_module_level("hyper_util", LevelFilter::Info)
            .with_module_level("reqwest", LevelFilter::Info)
            .with_module_level("h2", LevelFilter::Info);
    }
    logger.init().map_err(|err| {
        eprintln!("Failed to initialize logger: {}", err);
        Box::new(std::io::Error::other(err))
    })
}

/// Gemini connection details, present only when an API key was supplied.
#[derive(Clone, Debug)]
pub struct GeminiSettings {
    /// API key sent as `x-goog-api-key`
    pub api_key: String,
    /// Text model name
    pub text_model: String,
    /// Image model name
    pub image_model: String,
    /// API base, always ending in `/`
    pub api_base: Url,
}

/// Runtime settings derived from the command line and environment.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Root of the frontend assets
    pub public_dir: PathBuf,
    /// Gemini settings, `None` runs the offline storyteller
    pub gemini: Option<GeminiSettings>,
    /// Stripe secret, `None` when missing or a placeholder
    pub stripe_secret_key: Option<String>,
    /// Stripe publishable key, `None` when missing or a placeholder
    pub stripe_publishable_key: Option<String>,
    /// Whether to check the text model at startup
    pub startup_check: bool,
}

impl Settings {
    /// Builds settings from parsed CLI options.
    pub fn from_cli(cli: &CliOptions) -> Result<Self, url::ParseError> {
        let gemini = match cli.google_api_key.as_deref().map(str::trim) {
            Some(key) if !looks_like_placeholder(key, "") => Some(GeminiSettings {
                api_key: key.to_string(),
                text_model: cli.text_model.clone(),
                image_model: cli.image_model.clone(),
                api_base: normalize_base(&cli.gemini_api_base)?,
            }),
            _ => None,
        };

        Ok(Self {
            public_dir: cli.public_dir.clone(),
            gemini,
            stripe_secret_key: usable_key(cli.stripe_secret_key.as_deref(), "sk_"),
            stripe_publishable_key: usable_key(cli.stripe_publishable_key.as_deref(), "pk_"),
            startup_check: !cli.skip_startup_check,
        })
    }

    /// Directory generated illustrations are written to.
    pub fn image_dir(&self) -> PathBuf {
        self.public_dir.join("static").join("images")
    }
}

/// Parses an API base URL, adding the trailing slash `Url::join` needs.
pub fn normalize_base(base: &str) -> Result<Url, url::ParseError> {
    let mut base = base.trim().to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    Url::parse(&base)
}

fn usable_key(key: Option<&str>, prefix: &str) -> Option<String> {
    let key = key?.trim();
    if looks_like_placeholder(key, prefix) {
        None
    } else {
        Some(key.to_string())
    }
}

/// Returns true for empty keys, keys without the expected prefix, and the
/// sample values people paste from docs and templates.
pub fn looks_like_placeholder(key: &str, prefix: &str) -> bool {
    let key = key.trim();
    if key.is_empty() || !key.starts_with(prefix) {
        return true;
    }
    let lowered = key.to_ascii_lowercase();
    ["your", "placeholder", "changeme", "replace", "xxxx", "..."]
        .iter()
        .any(|marker| lowered.contains(marker))
}
