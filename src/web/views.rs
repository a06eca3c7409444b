//! Server-rendered checkout result pages.

use super::prelude::*;

#[derive(Template, WebTemplate)]
#[template(path = "paywall.html")]
pub(crate) struct PaywallTemplate {
    pub(crate) cancelled: bool,
    pub(crate) has_publishable_key: bool,
    pub(crate) publishable_key: String,
}

impl PaywallTemplate {
    fn new(state: &AppState, cancelled: bool) -> Self {
        Self {
            cancelled,
            has_publishable_key: state.publishable_key.is_some(),
            publishable_key: state.publishable_key.clone().unwrap_or_default(),
        }
    }
}

#[derive(Template, WebTemplate)]
#[template(path = "success.html")]
pub(crate) struct SuccessTemplate {
    pub(crate) mock: bool,
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct SuccessQuery {
    #[serde(default)]
    mock: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
}

/// handles GET /pro
pub(crate) async fn pro_handler(State(state): State<AppState>) -> PaywallTemplate {
    PaywallTemplate::new(&state, false)
}

/// handles GET /cancel
pub(crate) async fn cancel_handler(State(state): State<AppState>) -> PaywallTemplate {
    info!("Checkout cancelled");
    PaywallTemplate::new(&state, true)
}

/// handles GET /success
pub(crate) async fn success_handler(Query(query): Query<SuccessQuery>) -> SuccessTemplate {
    let mock = query.mock.is_some_and(|flag| flag != "false");
    if mock {
        info!("Mock checkout completed");
    } else if let Some(session_id) = query.session_id.as_deref() {
        info!("Checkout completed for session {session_id}");
    }
    SuccessTemplate { mock }
}
