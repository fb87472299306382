use std::env;

use crate::prelude::*;

/// Smallest payout the rail will accept, in cents.
pub const MIN_PAYOUT: i64 = 100;

#[derive(Debug, Clone)]
pub struct Config {
  pub database_url: String,
  pub port: u16,
  /// Shared secret the order source signs webhook bodies with.
  pub webhook_secret: String,
  pub cryptobot_token: String,
  pub cryptobot_testnet: bool,
  pub min_payout: i64,
  /// How long a pending payout blocks new requests before it is reconciled.
  pub payout_lock_timeout: Duration,
  pub rail_timeout: Duration,
  pub reconcile_interval: Duration,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      database_url: "sqlite:storefront.db?mode=rwc".into(),
      port: 3000,
      webhook_secret: String::new(),
      cryptobot_token: String::new(),
      cryptobot_testnet: false,
      min_payout: MIN_PAYOUT,
      payout_lock_timeout: Duration::from_secs(5 * 60),
      rail_timeout: Duration::from_secs(15),
      reconcile_interval: Duration::from_secs(60),
    }
  }
}

impl Config {
  pub fn from_env() -> anyhow::Result<Self> {
    let defaults = Self::default();

    let config = Self {
      database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
      port: var_parsed("PORT")?.unwrap_or(defaults.port),
      webhook_secret: env::var("WEBHOOK_SECRET")
        .context("WEBHOOK_SECRET not set")?,
      cryptobot_token: env::var("CRYPTOBOT_API_TOKEN")
        .context("CRYPTOBOT_API_TOKEN not set")?,
      cryptobot_testnet: var_parsed("CRYPTOBOT_TESTNET")?
        .unwrap_or(defaults.cryptobot_testnet),
      min_payout: var_parsed("MIN_PAYOUT_CENTS")?
        .unwrap_or(defaults.min_payout),
      payout_lock_timeout: var_duration("PAYOUT_LOCK_TIMEOUT")?
        .unwrap_or(defaults.payout_lock_timeout),
      rail_timeout: var_duration("RAIL_TIMEOUT")?
        .unwrap_or(defaults.rail_timeout),
      reconcile_interval: var_duration("RECONCILE_INTERVAL")?
        .unwrap_or(defaults.reconcile_interval),
    };

    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> anyhow::Result<()> {
    if self.webhook_secret.trim().is_empty() {
      anyhow::bail!("WEBHOOK_SECRET must not be empty");
    }
    if self.min_payout <= 0 {
      anyhow::bail!("MIN_PAYOUT_CENTS must be positive");
    }
    Ok(())
  }
}

fn var_parsed<T>(key: &str) -> anyhow::Result<Option<T>>
where
  T: std::str::FromStr,
  T::Err: std::error::Error + Send + Sync + 'static,
{
  match env::var(key) {
    Ok(raw) if !raw.trim().is_empty() => raw
      .trim()
      .parse()
      .map(Some)
      .with_context(|| format!("Invalid {key} value `{raw}`")),
    _ => Ok(None),
  }
}

/// Durations use humantime syntax: `30s`, `5m`, `1h30m`.
fn var_duration(key: &str) -> anyhow::Result<Option<Duration>> {
  match env::var(key) {
    Ok(raw) if !raw.trim().is_empty() => humantime::parse_duration(raw.trim())
      .map(Some)
      .with_context(|| format!("Invalid {key} duration `{raw}`")),
    _ => Ok(None),
  }
}
