use clap::Parser;
use storybook::checkout::select_gateway;
use storybook::config::{Settings, setup_logging};
use storybook::genai::{http_client, select_storyteller};
use storybook::web::AppState;
use tracing::error;

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = storybook::cli::CliOptions::parse();

    if setup_logging(cli.debug).is_err() {
        return;
    }

    let settings = match Settings::from_cli(&cli) {
        Ok(settings) => settings,
        Err(err) => {
            error!("Invalid configuration: {}", err);
            return;
        }
    };

    let client = match http_client() {
        Ok(client) => client,
        Err(err) => {
            error!("Failed to build HTTP client: {}", err);
            return;
        }
    };

    let storyteller = select_storyteller(&settings, client.clone()).await;
    let checkout = select_gateway(&settings, client);
    let state = AppState::new(&settings, storyteller, checkout);

    if let Err(err) = storybook::web::setup_server(&cli.listen_address, cli.port, state).await {
        error!("Application error: {}", err);
    }
}
