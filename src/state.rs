use sea_orm::ConnectOptions;

use crate::{
  config::Config,
  prelude::*,
  sv::{self, payout::PayoutLocks, rail::PaymentRail},
};

pub struct AppState {
  pub db: DatabaseConnection,
  pub config: Config,
  pub rail: Arc<dyn PaymentRail>,
  pub payout_locks: PayoutLocks,
}

pub struct Services<'a> {
  pub user: sv::User<'a>,
  pub brand: sv::Brand<'a>,
  pub access: sv::Access<'a>,
  pub commission: sv::Commission<'a>,
  pub affiliate: sv::Affiliate<'a>,
  pub referral: sv::Referral<'a>,
  pub ledger: sv::Ledger<'a>,
  pub payout: sv::Payout<'a>,
  pub activity: sv::Activity<'a, DatabaseConnection>,
}

impl AppState {
  /// Connects to the database and brings the schema up to date.
  pub async fn new(
    config: Config,
    rail: Arc<dyn PaymentRail>,
  ) -> anyhow::Result<Self> {
    let mut options = ConnectOptions::new(&config.database_url);
    options.sqlx_logging(false);

    let db = Database::connect(options)
      .await
      .with_context(|| format!("Failed to connect to {}", config.database_url))?;
    Migrator::up(&db, None).await.context("Failed to run migrations")?;

    Ok(Self::from_parts(db, config, rail))
  }

  pub fn from_parts(
    db: DatabaseConnection,
    config: Config,
    rail: Arc<dyn PaymentRail>,
  ) -> Self {
    Self { db, config, rail, payout_locks: PayoutLocks::default() }
  }

  pub fn sv(&self) -> Services<'_> {
    Services {
      user: sv::User::new(&self.db),
      brand: sv::Brand::new(&self.db),
      access: sv::Access::new(&self.db),
      commission: sv::Commission::new(&self.db),
      affiliate: sv::Affiliate::new(&self.db),
      referral: sv::Referral::new(&self.db),
      ledger: sv::Ledger::new(&self.db),
      payout: sv::Payout::new(
        &self.db,
        self.rail.as_ref(),
        &self.payout_locks,
        &self.config,
      ),
      activity: sv::Activity::new(&self.db),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sv::test_utils::rail::{MockRail, Outcome};

  #[tokio::test]
  async fn test_fresh_database_file_is_migrated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("storefront.db");
    let config = Config {
      database_url: format!("sqlite:{}?mode=rwc", path.display()),
      ..Config::default()
    };

    let app = AppState::new(config, Arc::new(MockRail::new(Outcome::Succeed)))
      .await
      .unwrap();
    let user = app.sv().user.get_or_create("ann@shop.io").await.unwrap();
    assert_eq!(user.id, 1);
    assert!(path.exists());
  }
}
