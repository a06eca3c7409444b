//! CLI parser
use clap::Parser;
use std::num::NonZeroU16;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
/// CLI Options
pub struct CliOptions {
    #[clap(long, help = "Enable debug logging", env = "STORYBOOK_DEBUG")]
    /// Enable debug logging. Env: STORYBOOK_DEBUG
    pub debug: bool,
    #[clap(long, short, default_value = "5000", env = "STORYBOOK_PORT")]
    /// http listener, defaults to `5000`.
    /// Env: STORYBOOK_PORT
    pub port: NonZeroU16,
    #[clap(
        long,
        short,
        default_value = "127.0.0.1",
        env = "STORYBOOK_LISTEN_ADDRESS"
    )]
    /// Listen address, defaults to `127.0.0.1`.
    /// Env: STORYBOOK_LISTEN_ADDRESS
    pub listen_address: String,

    #[clap(long, default_value = "./public", env = "STORYBOOK_PUBLIC_DIR")]
    /// Root of the frontend assets, `index.html` lives here and generated
    /// images go under `static/images`.
    /// Env: STORYBOOK_PUBLIC_DIR
    pub public_dir: PathBuf,

    #[clap(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    /// Gemini API key. Without it the offline storyteller is used.
    pub google_api_key: Option<String>,

    #[clap(long, default_value = "gemini-2.5-flash", env = "STORYBOOK_TEXT_MODEL")]
    /// Model used for story text and illustration descriptions
    pub text_model: String,

    #[clap(
        long,
        default_value = "imagen-3.0-generate-002",
        env = "STORYBOOK_IMAGE_MODEL"
    )]
    /// Model used to render illustrations
    pub image_model: String,

    #[clap(
        long,
        default_value = crate::constants::GEMINI_API_BASE,
        env = "STORYBOOK_GEMINI_API_BASE"
    )]
    /// Base URL of the generative language API
    pub gemini_api_base: String,

    #[clap(long, env = "STRIPE_SECRET_KEY", hide_env_values = true)]
    /// Stripe secret key. Missing or placeholder values enable mock checkout.
    pub stripe_secret_key: Option<String>,

    #[clap(long, env = "STRIPE_PUBLISHABLE_KEY")]
    /// Stripe publishable key, rendered into the paywall page
    pub stripe_publishable_key: Option<String>,

    #[clap(long, env = "STORYBOOK_SKIP_STARTUP_CHECK")]
    /// Skip the "Say hello!" check against the text model at startup
    pub skip_startup_check: bool,
}
