use std::sync::Arc;

use async_trait::async_trait;

use crate::{plugins::Plugin, prelude::*, state::AppState};

/// Settles payouts the rail never answered for.
pub struct Reconcile;

#[async_trait]
impl Plugin for Reconcile {
  async fn start(&self, app: Arc<AppState>) -> anyhow::Result<()> {
    let every = app.config.reconcile_interval;
    if every.is_zero() {
      info!("Payout reconciliation disabled via config (0 interval)");
      return Ok(());
    }

    info!(
      "Payout reconciliation started (every {}, stale after {})",
      humantime::format_duration(every),
      humantime::format_duration(app.config.payout_lock_timeout)
    );

    let mut interval = tokio::time::interval(every);
    loop {
      interval.tick().await;

      match app.sv().payout.reconcile_stale().await {
        Ok(report) if report == Default::default() => {
          trace!("no stale payouts");
        }
        Ok(report) => info!(
          "Reconciled payouts: {} completed, {} released, {} unresolved",
          report.completed, report.released, report.unresolved
        ),
        Err(err) => error!("Payout reconciliation failed: {err}"),
      }
    }
  }
}
