//! Payouts: turning available earnings into a transfer on the payment rail.
//!
//! A request reserves the user's unpaid balances (bumping the per-source
//! `*_paid` counters and writing a pending payout with its allocations) in
//! one transaction, then calls the rail outside of it. A definitive rail
//! rejection releases the reservation; an ambiguous failure leaves the
//! payout pending until `reconcile_stale` asks the rail what happened.

use sea_orm::sea_query::Expr;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::{
  config::Config,
  entity::{
    AllocationSource, PayoutStatus, affiliate, brand, payment_method, payout,
    payout_allocation, user,
  },
  prelude::*,
  sv::{
    activity::{Activity, Event},
    ledger::Ledger,
    rail::{PaymentRail, RailError, TransferRequest},
    user::{User, is_unique_violation},
  },
  utils::{format_age, format_usd},
};

pub type PayoutLocks = DashMap<i32, Arc<Mutex<()>>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
  pub payout_id: i32,
  pub transfer_id: String,
  pub amount: i64,
}

enum Settled {
  Completed,
  Released,
  Unresolved,
  Busy,
  Already,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
  pub completed: usize,
  pub released: usize,
  pub unresolved: usize,
}

/// Key the rail deduplicates transfers by. The sequence is the number of
/// payouts the user had before this one.
pub fn idempotency_key(user_id: i32, sequence: u64) -> String {
  let mut hasher = Sha256::new();
  hasher.update(format!("payout:{user_id}:{sequence}"));
  hex::encode(hasher.finalize())
}

async fn shift_paid<C: ConnectionTrait>(
  db: &C,
  user_id: i32,
  source: AllocationSource,
  source_id: Option<i32>,
  delta: i64,
) -> Result<()> {
  let missing_id =
    || Error::Internal(format!("{source:?} allocation without a source id"));

  match source {
    AllocationSource::Brand => {
      brand::Entity::update_many()
        .col_expr(
          brand::Column::TotalPaid,
          Expr::col(brand::Column::TotalPaid).add(delta),
        )
        .filter(brand::Column::Id.eq(source_id.ok_or_else(missing_id)?))
        .exec(db)
        .await?;
    }
    AllocationSource::Affiliate => {
      affiliate::Entity::update_many()
        .col_expr(
          affiliate::Column::TotalPaid,
          Expr::col(affiliate::Column::TotalPaid).add(delta),
        )
        .filter(affiliate::Column::Id.eq(source_id.ok_or_else(missing_id)?))
        .exec(db)
        .await?;
    }
    AllocationSource::Referral => {
      user::Entity::update_many()
        .col_expr(
          user::Column::ReferralPaid,
          Expr::col(user::Column::ReferralPaid).add(delta),
        )
        .filter(user::Column::Id.eq(user_id))
        .exec(db)
        .await?;
    }
  }
  Ok(())
}

pub struct Payout<'a> {
  db: &'a DatabaseConnection,
  rail: &'a dyn PaymentRail,
  locks: &'a PayoutLocks,
  config: &'a Config,
}

impl<'a> Payout<'a> {
  pub fn new(
    db: &'a DatabaseConnection,
    rail: &'a dyn PaymentRail,
    locks: &'a PayoutLocks,
    config: &'a Config,
  ) -> Self {
    Self { db, rail, locks, config }
  }

  fn lock_window(&self) -> TimeDelta {
    TimeDelta::from_std(self.config.payout_lock_timeout)
      .unwrap_or(TimeDelta::minutes(5))
  }

  pub async fn request(&self, user_id: i32) -> Result<Receipt> {
    let lock = self.locks.entry(user_id).or_default().clone();
    let result = match lock.clone().try_lock_owned() {
      Ok(_guard) => self.request_locked(user_id).await,
      Err(_) => Err(Error::conflict("payout already in progress")),
    };

    drop(lock);
    self.forget_lock(user_id);
    result
  }

  /// Drops the user's lock entry unless another request still holds it.
  fn forget_lock(&self, user_id: i32) {
    self.locks.remove_if(&user_id, |_, lock| Arc::strong_count(lock) == 1);
  }

  async fn request_locked(&self, user_id: i32) -> Result<Receipt> {
    let user = user::Entity::find_by_id(user_id)
      .one(self.db)
      .await?
      .ok_or(Error::NotFound("user"))?;

    let method = User::new(self.db)
      .payment_method(user_id, self.rail.provider())
      .await?
      .ok_or_else(|| Error::validation("configure payout destination first"))?;

    let payout = self.reserve(&user, &method).await?;
    self.settle(&user, payout).await
  }

  async fn reserve(
    &self,
    user: &user::Model,
    method: &payment_method::Model,
  ) -> Result<payout::Model> {
    let txn = self.db.begin().await?;

    let cutoff = Utc::now().naive_utc() - self.lock_window();
    let in_flight = payout::Entity::find()
      .filter(payout::Column::UserId.eq(user.id))
      .filter(payout::Column::Status.eq(PayoutStatus::Pending))
      .filter(payout::Column::CreatedAt.gt(cutoff))
      .count(&txn)
      .await?;
    if in_flight > 0 {
      return Err(Error::conflict("payout already in progress"));
    }

    let claims = Ledger::new(&txn).claims(user).await?;
    let amount: i64 = claims.iter().map(|claim| claim.amount).sum();
    if amount < self.config.min_payout {
      return Err(Error::validation(format!(
        "available {} is below the minimum payout of {}",
        format_usd(amount),
        format_usd(self.config.min_payout)
      )));
    }

    let sequence = payout::Entity::find()
      .filter(payout::Column::UserId.eq(user.id))
      .count(&txn)
      .await?;

    let payout = payout::ActiveModel {
      id: NotSet,
      user_id: Set(user.id),
      amount: Set(amount),
      status: Set(PayoutStatus::Pending),
      idempotency_key: Set(idempotency_key(user.id, sequence)),
      provider: Set(method.provider.clone()),
      destination: Set(method.destination.clone()),
      transfer_id: Set(None),
      failure: Set(None),
      created_at: Set(Utc::now().naive_utc()),
      settled_at: Set(None),
    }
    .insert(&txn)
    .await
    .map_err(|err| {
      if is_unique_violation(&err) {
        Error::conflict("payout already in progress")
      } else {
        err.into()
      }
    })?;

    for claim in &claims {
      payout_allocation::ActiveModel {
        id: NotSet,
        payout_id: Set(payout.id),
        source: Set(claim.source),
        source_id: Set(claim.source_id),
        amount: Set(claim.amount),
      }
      .insert(&txn)
      .await?;
      shift_paid(&txn, user.id, claim.source, claim.source_id, claim.amount)
        .await?;
    }

    Activity::new(&txn)
      .record(Event::PayoutRequested {
        payout_id: payout.id,
        user_email: user.email.clone(),
        amount,
      })
      .await?;

    txn.commit().await?;

    info!(
      user_id = user.id,
      payout_id = payout.id,
      "reserved {} from {} source(s)",
      format_usd(amount),
      claims.len()
    );
    Ok(payout)
  }

  async fn settle(
    &self,
    user: &user::Model,
    payout: payout::Model,
  ) -> Result<Receipt> {
    let req = TransferRequest {
      idempotency_key: payout.idempotency_key.clone(),
      destination: payout.destination.clone(),
      amount: payout.amount,
      comment: Some(format!("Payout #{}", payout.id)),
    };

    let outcome =
      tokio::time::timeout(self.config.rail_timeout, self.rail.transfer(&req))
        .await
        .unwrap_or_else(|_| {
          Err(RailError::Unavailable("rail call timed out".into()))
        });

    match outcome {
      Ok(transfer) => {
        self.complete(&payout, &user.email, &transfer.transfer_id).await?;
        Ok(Receipt {
          payout_id: payout.id,
          transfer_id: transfer.transfer_id,
          amount: payout.amount,
        })
      }
      Err(RailError::Rejected(reason)) => {
        self.release(&payout, &user.email, &reason).await?;
        Err(Error::External(reason))
      }
      Err(RailError::Unavailable(reason)) => {
        warn!(
          user_id = user.id,
          payout_id = payout.id,
          "rail gave no answer ({reason}), leaving payout for reconciliation"
        );
        Err(Error::External(reason))
      }
    }
  }

  /// Marks a pending payout completed. `false` if it was already settled.
  async fn complete(
    &self,
    payout: &payout::Model,
    email: &str,
    transfer_id: &str,
  ) -> Result<bool> {
    let txn = self.db.begin().await?;

    let updated = payout::Entity::update_many()
      .col_expr(payout::Column::Status, Expr::value(PayoutStatus::Completed))
      .col_expr(payout::Column::TransferId, Expr::value(transfer_id))
      .col_expr(payout::Column::SettledAt, Expr::value(Utc::now().naive_utc()))
      .filter(payout::Column::Id.eq(payout.id))
      .filter(payout::Column::Status.eq(PayoutStatus::Pending))
      .exec(&txn)
      .await?;
    if updated.rows_affected == 0 {
      return Ok(false);
    }

    Activity::new(&txn)
      .record(Event::PayoutCompleted {
        payout_id: payout.id,
        user_email: email.to_string(),
        amount: payout.amount,
        transfer_id: transfer_id.to_string(),
      })
      .await?;
    txn.commit().await?;

    info!(
      payout_id = payout.id,
      "paid {} to {} (transfer {transfer_id})",
      format_usd(payout.amount),
      email
    );
    Ok(true)
  }

  /// Fails a pending payout and hands its allocations back to the
  /// counters they came from. `false` if it was already settled.
  async fn release(
    &self,
    payout: &payout::Model,
    email: &str,
    reason: &str,
  ) -> Result<bool> {
    let txn = self.db.begin().await?;

    let updated = payout::Entity::update_many()
      .col_expr(payout::Column::Status, Expr::value(PayoutStatus::Failed))
      .col_expr(payout::Column::Failure, Expr::value(reason))
      .col_expr(payout::Column::SettledAt, Expr::value(Utc::now().naive_utc()))
      .filter(payout::Column::Id.eq(payout.id))
      .filter(payout::Column::Status.eq(PayoutStatus::Pending))
      .exec(&txn)
      .await?;
    if updated.rows_affected == 0 {
      return Ok(false);
    }

    let allocations = payout_allocation::Entity::find()
      .filter(payout_allocation::Column::PayoutId.eq(payout.id))
      .all(&txn)
      .await?;
    for allocation in allocations {
      shift_paid(
        &txn,
        payout.user_id,
        allocation.source,
        allocation.source_id,
        -allocation.amount,
      )
      .await?;
    }

    Activity::new(&txn)
      .record(Event::PayoutFailed {
        payout_id: payout.id,
        user_email: email.to_string(),
        amount: payout.amount,
        reason: reason.to_string(),
      })
      .await?;
    txn.commit().await?;

    warn!(
      payout_id = payout.id,
      "payout of {} to {email} failed: {reason}",
      format_usd(payout.amount)
    );
    Ok(true)
  }

  /// Settles payouts the rail never gave a definitive answer for, once
  /// they are older than the payout lock window.
  pub async fn reconcile_stale(&self) -> Result<ReconcileReport> {
    let cutoff = Utc::now().naive_utc() - self.lock_window();
    let stale = payout::Entity::find()
      .filter(payout::Column::Status.eq(PayoutStatus::Pending))
      .filter(payout::Column::CreatedAt.lte(cutoff))
      .order_by_asc(payout::Column::Id)
      .all(self.db)
      .await?;

    let mut report = ReconcileReport::default();
    for payout in stale {
      let user_id = payout.user_id;
      let lock = self.locks.entry(user_id).or_default().clone();
      let settled = match lock.clone().try_lock_owned() {
        Ok(_guard) => self.reconcile_one(payout).await,
        Err(_) => Ok(Settled::Busy),
      };
      drop(lock);
      self.forget_lock(user_id);

      match settled? {
        Settled::Completed => report.completed += 1,
        Settled::Released => report.released += 1,
        Settled::Busy | Settled::Unresolved => report.unresolved += 1,
        Settled::Already => {}
      }
    }

    Ok(report)
  }

  async fn reconcile_one(&self, payout: payout::Model) -> Result<Settled> {
    let email = user::Entity::find_by_id(payout.user_id)
      .one(self.db)
      .await?
      .map(|user| user.email)
      .unwrap_or_default();

    debug!(
      payout_id = payout.id,
      "reconciling payout pending for {}",
      format_age(payout.created_at)
    );

    Ok(match self.rail.find_transfer(&payout.idempotency_key).await {
      Ok(Some(transfer)) => {
        if self.complete(&payout, &email, &transfer.transfer_id).await? {
          Settled::Completed
        } else {
          Settled::Already
        }
      }
      Ok(None) => {
        if self.release(&payout, &email, "transfer not found on rail").await? {
          Settled::Released
        } else {
          Settled::Already
        }
      }
      Err(err) => {
        warn!(payout_id = payout.id, "reconcile lookup failed: {err}");
        Settled::Unresolved
      }
    })
  }

  pub async fn history(&self, user_id: i32) -> Result<Vec<payout::Model>> {
    Ok(
      payout::Entity::find()
        .filter(payout::Column::UserId.eq(user_id))
        .order_by_desc(payout::Column::Id)
        .all(self.db)
        .await?,
    )
  }
}
