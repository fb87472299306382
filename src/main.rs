mod config;
mod entity;
mod error;
mod plugins;
mod prelude;
mod state;
mod sv;
mod utils;

use tracing_subscriber::{
  EnvFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::{config::Config, prelude::*, state::AppState, sv::rail::CryptoBot};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  dotenvy::dotenv().ok();

  tracing_subscriber::registry()
    .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
      "storefront=debug,tower_http=debug,sea_orm=warn".into()
    }))
    .with(tracing_subscriber::fmt::layer())
    .init();

  let config = Config::from_env()?;
  info!("Starting Storefront v{}", env!("CARGO_PKG_VERSION"));

  let rail = CryptoBot::new(
    config.cryptobot_token.clone(),
    config.cryptobot_testnet,
    config.rail_timeout,
  )?;

  let app = Arc::new(AppState::new(config, Arc::new(rail)).await?);

  plugins::App::new()
    .register(plugins::server::Plugin)
    .register(plugins::cron::Reconcile)
    .run(app)
    .await;

  Ok(())
}
