//! Stripe checkout sessions, with a mock gateway for unconfigured deployments.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

use crate::config::Settings;
use crate::constants::{CHECKOUT_METADATA, DEFAULT_PRICE_ID, STRIPE_API_BASE};

/// Body of `POST /create-checkout-session`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    /// Stripe price to subscribe to
    #[serde(default)]
    pub price_id: Option<String>,
    /// Where Stripe sends the browser after paying
    #[serde(default)]
    pub success_url: Option<String>,
    /// Where Stripe sends the browser after backing out
    #[serde(default)]
    pub cancel_url: Option<String>,
}

/// A checkout request with defaults applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutOrder {
    /// Stripe price id
    pub price_id: String,
    /// Redirect after success
    pub success_url: String,
    /// Redirect after cancel
    pub cancel_url: String,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

impl CheckoutRequest {
    /// Fills in missing fields; redirect targets default to pages on `origin`.
    pub fn into_order(self, origin: &str) -> CheckoutOrder {
        let origin = origin.trim_end_matches('/');
        CheckoutOrder {
            price_id: non_blank(self.price_id).unwrap_or_else(|| DEFAULT_PRICE_ID.to_string()),
            success_url: non_blank(self.success_url)
                .unwrap_or_else(|| format!("{origin}/success")),
            cancel_url: non_blank(self.cancel_url).unwrap_or_else(|| format!("{origin}/cancel")),
        }
    }
}

/// Response body of `POST /create-checkout-session`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckoutResponse {
    /// Where to send the browser
    pub url: String,
    /// Set when no real session was created
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub mock: bool,
}

impl CheckoutResponse {
    /// Mock redirect straight to the success page.
    pub fn mock(order: &CheckoutOrder) -> Self {
        Self {
            url: format!("{}?mock=true", order.success_url),
            mock: true,
        }
    }
}

/// Why a checkout session could not be created.
#[derive(Debug)]
pub enum CheckoutError {
    /// The request never got a response
    Network(String),
    /// Stripe rejected the request
    Api(u16, String),
    /// Stripe answered without a hosted URL
    MissingUrl,
}

impl std::fmt::Display for CheckoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network(err) => write!(f, "network error: {err}"),
            Self::Api(status, message) => write!(f, "Stripe error {status}: {message}"),
            Self::MissingUrl => write!(f, "checkout session has no url"),
        }
    }
}

impl std::error::Error for CheckoutError {}

impl From<reqwest::Error> for CheckoutError {
    fn from(err: reqwest::Error) -> Self {
        CheckoutError::Network(err.to_string())
    }
}

/// Creates hosted checkout sessions.
#[async_trait]
pub trait CheckoutGateway: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Creates a session for the order.
    async fn create_session(&self, order: &CheckoutOrder)
    -> Result<CheckoutResponse, CheckoutError>;
}

/// Gateway used when Stripe is not configured; never leaves the process.
#[derive(Clone, Copy, Debug, Default)]
pub struct MockGateway;

#[async_trait]
impl CheckoutGateway for MockGateway {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn create_session(
        &self,
        order: &CheckoutOrder,
    ) -> Result<CheckoutResponse, CheckoutError> {
        Ok(CheckoutResponse::mock(order))
    }
}

/// Gateway backed by the Stripe Checkout Sessions API.
#[derive(Clone, Debug)]
pub struct StripeGateway {
    client: reqwest::Client,
    secret_key: String,
    api_base: Url,
}

#[derive(Deserialize, Debug)]
struct StripeSession {
    id: String,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Deserialize, Debug)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Deserialize, Debug)]
struct StripeErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

impl StripeGateway {
    /// Builds a gateway against the public Stripe API.
    pub fn new(client: reqwest::Client, secret_key: String) -> Result<Self, url::ParseError> {
        Ok(Self {
            client,
            secret_key,
            api_base: Url::parse(STRIPE_API_BASE)?,
        })
    }

    /// Form fields for a subscription session.
    fn session_form(order: &CheckoutOrder) -> Vec<(String, String)> {
        let mut form = vec![
            ("mode".to_string(), "subscription".to_string()),
            ("payment_method_types[0]".to_string(), "card".to_string()),
            ("line_items[0][price]".to_string(), order.price_id.clone()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("success_url".to_string(), order.success_url.clone()),
            ("cancel_url".to_string(), order.cancel_url.clone()),
        ];
        form.extend(
            CHECKOUT_METADATA
                .iter()
                .map(|(key, value)| (format!("metadata[{key}]"), value.to_string())),
        );
        form
    }
}

#[async_trait]
impl CheckoutGateway for StripeGateway {
    fn name(&self) -> &'static str {
        "stripe"
    }

    async fn create_session(
        &self,
        order: &CheckoutOrder,
    ) -> Result<CheckoutResponse, CheckoutError> {
        let url = self
            .api_base
            .join("checkout/sessions")
            .map_err(|err| CheckoutError::Network(err.to_string()))?;
        let resp = self
            .client
            .post(url)
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&Self::session_form(order))
            .send()
            .await?;

        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            let message = serde_json::from_slice::<StripeErrorBody>(&bytes)
                .ok()
                .and_then(|body| body.error.message)
                .unwrap_or_else(|| String::from_utf8_lossy(&bytes).into_owned());
            return Err(CheckoutError::Api(status.as_u16(), message));
        }

        let session: StripeSession = serde_json::from_slice(&bytes)
            .map_err(|err| CheckoutError::Api(status.as_u16(), err.to_string()))?;
        info!("Created checkout session {}", session.id);
        Ok(CheckoutResponse {
            url: session.url.ok_or(CheckoutError::MissingUrl)?,
            mock: false,
        })
    }
}

/// Picks the gateway for this process.
pub fn select_gateway(settings: &Settings, client: reqwest::Client) -> Arc<dyn CheckoutGateway> {
    let Some(secret) = settings.stripe_secret_key.clone() else {
        warn!("Stripe secret key missing or a placeholder, checkout runs in mock mode.");
        return Arc::new(MockGateway);
    };
    match StripeGateway::new(client, secret) {
        Ok(gateway) => Arc::new(gateway),
        Err(err) => {
            warn!("Could not set up Stripe, checkout runs in mock mode: {err}");
            Arc::new(MockGateway)
        }
    }
}

/// Creates a session, degrading to the mock redirect if the gateway fails.
pub async fn start_checkout(gateway: &dyn CheckoutGateway, order: &CheckoutOrder) -> CheckoutResponse {
    match gateway.create_session(order).await {
        Ok(response) => response,
        Err(err) => {
            warn!("{} checkout failed, using mock session: {err}", gateway.name());
            CheckoutResponse::mock(order)
        }
    }
}
