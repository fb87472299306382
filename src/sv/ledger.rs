//! Earnings ledger.
//!
//! Writes keep running counters on brands, affiliates and referrals so reads
//! are cheap; every counter can also be recomputed from the immutable order
//! log, which is what the derived views and `verify_*` checks do.

use sea_orm::{
  Select,
  sea_query::{Expr, OnConflict},
};
use serde::Serialize;

use crate::{
  entity::{
    AllocationSource, PayoutStatus, ReferralStatus, affiliate, brand, order,
    payout, platform_referral, user,
  },
  prelude::*,
  sv::{
    Access,
    access::Role,
    activity::{Activity, Event},
    attribution::{Attributed, Attribution, OrderEvent},
    commission::{Commission, Shares},
  },
  utils::format_usd,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
  New(order::Model),
  Duplicate(order::Model),
}

impl Recorded {
  pub fn order(&self) -> &order::Model {
    match self {
      Recorded::New(order) | Recorded::Duplicate(order) => order,
    }
  }

  pub fn is_duplicate(&self) -> bool {
    matches!(self, Recorded::Duplicate(_))
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
  pub total_earnings: i64,
  pub available_for_payout: i64,
  pub pending_earnings: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandEarning {
  pub brand_id: i32,
  pub name: String,
  pub total_sales: i64,
  pub total_earnings: i64,
  pub carved_out: i64,
  pub net_earnings: i64,
  pub total_paid: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralEarning {
  pub referred_email: String,
  pub status: ReferralStatus,
  pub earnings: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AffiliateEarning {
  pub affiliate_id: i32,
  pub brand_id: i32,
  pub code: String,
  pub clicks: i64,
  pub conversions: u64,
  pub conversion_rate: f64,
  pub total_sales: i64,
  pub total_due: i64,
  pub total_paid: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakdown {
  pub brand_earnings: Vec<BrandEarning>,
  pub referral_earnings: Vec<ReferralEarning>,
  pub affiliate_earnings: Vec<AffiliateEarning>,
}

/// Unpaid balance of one earnings source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claim {
  pub source: AllocationSource,
  pub source_id: Option<i32>,
  pub amount: i64,
}

/// A counter next to the same figure recomputed from the order log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Drift {
  pub counter: i64,
  pub derived: i64,
}

impl Drift {
  pub fn is_consistent(&self) -> bool {
    self.counter == self.derived
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BrandCheck {
  pub sales: Drift,
  pub earnings: Drift,
  pub carved: Drift,
}

impl BrandCheck {
  pub fn is_consistent(&self) -> bool {
    self.sales.is_consistent()
      && self.earnings.is_consistent()
      && self.carved.is_consistent()
  }
}

pub struct Ledger<'a, C = DatabaseConnection> {
  db: &'a C,
}

impl<'a, C: ConnectionTrait + TransactionTrait> Ledger<'a, C> {
  /// Resolves, prices and records one order in a single transaction.
  /// Redelivery of a known order id is reported as `Duplicate`.
  pub async fn ingest(&self, event: OrderEvent) -> Result<Recorded> {
    event.validate()?;

    let txn = self.db.begin().await?;

    if let Some(existing) =
      order::Entity::find_by_id(event.external_order_id.clone()).one(&txn).await?
    {
      debug!(order_id = %existing.id, "duplicate order delivery");
      return Ok(Recorded::Duplicate(existing));
    }

    let attributed = Attribution::new(&txn).resolve(&event).await?;
    let shares = Commission::new(&txn).quote(&attributed, event.total_amount).await?;
    let recorded = Ledger::new(&txn).record_order(&event, &attributed, &shares).await?;

    txn.commit().await?;

    if let Recorded::New(order) = &recorded {
      info!(
        order_id = %order.id,
        brand_id = order.brand_id,
        "recorded order {} (brand {}, platform {})",
        format_usd(order.total_amount),
        format_usd(order.brand_earnings),
        format_usd(order.platform_share)
      );
    }
    Ok(recorded)
  }
}

impl<'a, C: ConnectionTrait> Ledger<'a, C> {
  pub fn new(db: &'a C) -> Self {
    Self { db }
  }

  /// Inserts the order and bumps every affected counter. Must run inside a
  /// transaction; counters only move when the insert actually happened.
  pub async fn record_order(
    &self,
    event: &OrderEvent,
    attributed: &Attributed,
    shares: &Shares,
  ) -> Result<Recorded> {
    let brand_id = attributed.brand.id;
    let affiliate_id = attributed.affiliate.as_ref().map(|a| a.id);

    let row = order::ActiveModel {
      id: Set(event.external_order_id.clone()),
      brand_id: Set(brand_id),
      total_amount: Set(event.total_amount),
      brand_rate: Set(shares.brand_rate),
      brand_earnings: Set(shares.brand_earnings),
      platform_share: Set(shares.platform_share),
      affiliate_id: Set(affiliate_id),
      affiliate_due: Set(shares.affiliate_due),
      referrer_email: Set(attributed.referrer_email.clone()),
      referral_earnings: Set(shares.referral_earnings),
      customer_email: Set(event.customer_email.clone()),
      created_at: Set(Utc::now().naive_utc()),
    };

    let inserted = order::Entity::insert(row)
      .on_conflict(OnConflict::column(order::Column::Id).do_nothing().to_owned())
      .exec_without_returning(self.db)
      .await?;

    let order = order::Entity::find_by_id(event.external_order_id.clone())
      .one(self.db)
      .await?
      .ok_or(Error::NotFound("order"))?;
    if inserted == 0 {
      return Ok(Recorded::Duplicate(order));
    }

    brand::Entity::update_many()
      .col_expr(
        brand::Column::TotalSales,
        Expr::col(brand::Column::TotalSales).add(event.total_amount),
      )
      .col_expr(
        brand::Column::TotalEarnings,
        Expr::col(brand::Column::TotalEarnings).add(shares.brand_earnings),
      )
      .col_expr(
        brand::Column::TotalCarved,
        Expr::col(brand::Column::TotalCarved)
          .add(shares.affiliate_due + shares.referral_earnings),
      )
      .filter(brand::Column::Id.eq(brand_id))
      .exec(self.db)
      .await?;

    if let Some(affiliate_id) = affiliate_id {
      affiliate::Entity::update_many()
        .col_expr(
          affiliate::Column::TotalSales,
          Expr::col(affiliate::Column::TotalSales).add(event.total_amount),
        )
        .col_expr(
          affiliate::Column::TotalDue,
          Expr::col(affiliate::Column::TotalDue).add(shares.affiliate_due),
        )
        .filter(affiliate::Column::Id.eq(affiliate_id))
        .exec(self.db)
        .await?;
    }

    if let (Some(referrer), Some(seller)) =
      (&attributed.referrer_email, &attributed.earning_account)
    {
      platform_referral::Entity::update_many()
        .col_expr(
          platform_referral::Column::Earnings,
          Expr::col(platform_referral::Column::Earnings)
            .add(shares.referral_earnings),
        )
        .col_expr(
          platform_referral::Column::Status,
          Expr::value(ReferralStatus::Completed),
        )
        .filter(platform_referral::Column::ReferrerEmail.eq(referrer))
        .filter(platform_referral::Column::ReferredEmail.eq(seller))
        .exec(self.db)
        .await?;
    }

    Activity::new(self.db)
      .record(Event::OrderRecorded {
        order_id: order.id.clone(),
        brand_id,
        total_amount: order.total_amount,
        brand_earnings: order.brand_earnings,
        affiliate_id: order.affiliate_id,
        affiliate_due: order.affiliate_due,
        referrer_email: order.referrer_email.clone(),
        referral_earnings: order.referral_earnings,
      })
      .await?;

    Ok(Recorded::New(order))
  }

  async fn sum<E: EntityTrait>(
    &self,
    select: Select<E>,
    column: E::Column,
  ) -> Result<i64> {
    let total: Option<Option<i64>> = select
      .select_only()
      .column_as(Expr::col(column).sum(), "total")
      .into_tuple()
      .one(self.db)
      .await?;
    Ok(total.flatten().unwrap_or(0))
  }

  /// Referral earnings attributed to `email`, from the order log.
  pub async fn referral_earnings(&self, email: &str) -> Result<i64> {
    self
      .sum(
        order::Entity::find().filter(order::Column::ReferrerEmail.eq(email)),
        order::Column::ReferralEarnings,
      )
      .await
  }

  /// Affiliate commission owed across `affiliate_ids`, from the order log.
  pub async fn affiliate_earnings(&self, affiliate_ids: &[i32]) -> Result<i64> {
    if affiliate_ids.is_empty() {
      return Ok(0);
    }
    self
      .sum(
        order::Entity::find()
          .filter(order::Column::AffiliateId.is_in(affiliate_ids.to_vec())),
        order::Column::AffiliateDue,
      )
      .await
  }

  pub async fn conversions(&self, affiliate_id: i32) -> Result<u64> {
    Ok(
      order::Entity::find()
        .filter(order::Column::AffiliateId.eq(affiliate_id))
        .count(self.db)
        .await?,
    )
  }

  async fn user(&self, user_id: i32) -> Result<user::Model> {
    user::Entity::find_by_id(user_id)
      .one(self.db)
      .await?
      .ok_or(Error::NotFound("user"))
  }

  async fn affiliates_of(&self, user_id: i32) -> Result<Vec<affiliate::Model>> {
    Ok(
      affiliate::Entity::find()
        .filter(affiliate::Column::UserId.eq(user_id))
        .order_by_asc(affiliate::Column::Id)
        .all(self.db)
        .await?,
    )
  }

  /// Per-source unpaid balances, in the order payouts consume them.
  pub async fn claims(&self, user: &user::Model) -> Result<Vec<Claim>> {
    let mut claims = Vec::new();

    for brand in Access::new(self.db).owned_brands(&user.email).await? {
      claims.push(Claim {
        source: AllocationSource::Brand,
        source_id: Some(brand.id),
        amount: brand.unpaid(),
      });
    }
    for affiliate in self.affiliates_of(user.id).await? {
      claims.push(Claim {
        source: AllocationSource::Affiliate,
        source_id: Some(affiliate.id),
        amount: affiliate.unpaid(),
      });
    }
    claims.push(Claim {
      source: AllocationSource::Referral,
      source_id: None,
      amount: self.referral_earnings(&user.email).await? - user.referral_paid,
    });

    claims.retain(|claim| claim.amount > 0);
    Ok(claims)
  }

  pub async fn summary(&self, user_id: i32) -> Result<Summary> {
    let user = self.user(user_id).await?;

    let brand_total: i64 = Access::new(self.db)
      .owned_brands(&user.email)
      .await?
      .iter()
      .map(|brand| brand.net_earnings())
      .sum();
    let affiliate_ids: Vec<i32> =
      self.affiliates_of(user.id).await?.iter().map(|a| a.id).collect();
    let total_earnings = brand_total
      + self.referral_earnings(&user.email).await?
      + self.affiliate_earnings(&affiliate_ids).await?;

    let available_for_payout =
      self.claims(&user).await?.iter().map(|claim| claim.amount).sum();

    let pending_earnings = self
      .sum(
        payout::Entity::find()
          .filter(payout::Column::UserId.eq(user.id))
          .filter(payout::Column::Status.eq(PayoutStatus::Pending)),
        payout::Column::Amount,
      )
      .await?;

    Ok(Summary { total_earnings, available_for_payout, pending_earnings })
  }

  pub async fn breakdown(&self, user_id: i32) -> Result<Breakdown> {
    let user = self.user(user_id).await?;

    let brand_earnings = Access::new(self.db)
      .owned_brands(&user.email)
      .await?
      .into_iter()
      .map(|brand| BrandEarning {
        brand_id: brand.id,
        net_earnings: brand.net_earnings(),
        name: brand.name,
        total_sales: brand.total_sales,
        total_earnings: brand.total_earnings,
        carved_out: brand.total_carved,
        total_paid: brand.total_paid,
      })
      .collect();

    let referral_earnings = platform_referral::Entity::find()
      .filter(platform_referral::Column::ReferrerEmail.eq(&user.email))
      .order_by_asc(platform_referral::Column::Id)
      .all(self.db)
      .await?
      .into_iter()
      .map(|referral| ReferralEarning {
        referred_email: referral.referred_email,
        status: referral.status,
        earnings: referral.earnings,
      })
      .collect();

    let mut affiliate_earnings = Vec::new();
    for affiliate in self.affiliates_of(user.id).await? {
      let conversions = self.conversions(affiliate.id).await?;
      affiliate_earnings.push(AffiliateEarning {
        affiliate_id: affiliate.id,
        brand_id: affiliate.brand_id,
        code: affiliate.code,
        clicks: affiliate.click_count,
        conversions,
        conversion_rate: conversion_rate(conversions, affiliate.click_count),
        total_sales: affiliate.total_sales,
        total_due: affiliate.total_due,
        total_paid: affiliate.total_paid,
      });
    }

    Ok(Breakdown { brand_earnings, referral_earnings, affiliate_earnings })
  }

  /// Latest orders of a brand, for its members and admins.
  pub async fn recent_orders(
    &self,
    brand_id: i32,
    viewer: &str,
    limit: u64,
  ) -> Result<Vec<order::Model>> {
    let access = Access::new(self.db);
    access.live_brand(brand_id).await?;
    access.require(brand_id, viewer, Role::Manager).await?;

    Ok(
      order::Entity::find()
        .filter(order::Column::BrandId.eq(brand_id))
        .order_by_desc(order::Column::CreatedAt)
        .limit(limit)
        .all(self.db)
        .await?,
    )
  }

  /// Replays the order log of a brand against its counters.
  pub async fn verify_brand(&self, brand_id: i32) -> Result<BrandCheck> {
    let brand = brand::Entity::find_by_id(brand_id)
      .one(self.db)
      .await?
      .ok_or(Error::NotFound("brand"))?;

    let orders = || order::Entity::find().filter(order::Column::BrandId.eq(brand_id));
    let check = BrandCheck {
      sales: Drift {
        counter: brand.total_sales,
        derived: self.sum(orders(), order::Column::TotalAmount).await?,
      },
      earnings: Drift {
        counter: brand.total_earnings,
        derived: self.sum(orders(), order::Column::BrandEarnings).await?,
      },
      carved: Drift {
        counter: brand.total_carved,
        derived: self.sum(orders(), order::Column::AffiliateDue).await?
          + self.sum(orders(), order::Column::ReferralEarnings).await?,
      },
    };

    if !check.is_consistent() {
      warn!(brand_id, "brand counters drifted from order log: {check:?}");
    }
    Ok(check)
  }

  pub async fn verify_affiliate(&self, affiliate_id: i32) -> Result<Drift> {
    let affiliate = affiliate::Entity::find_by_id(affiliate_id)
      .one(self.db)
      .await?
      .ok_or(Error::NotFound("affiliate"))?;

    Ok(Drift {
      counter: affiliate.total_due,
      derived: self.affiliate_earnings(&[affiliate_id]).await?,
    })
  }

  pub async fn verify_referrals(&self, referrer_email: &str) -> Result<Drift> {
    let counter = self
      .sum(
        platform_referral::Entity::find()
          .filter(platform_referral::Column::ReferrerEmail.eq(referrer_email)),
        platform_referral::Column::Earnings,
      )
      .await?;

    Ok(Drift { counter, derived: self.referral_earnings(referrer_email).await? })
  }
}

pub fn conversion_rate(conversions: u64, clicks: i64) -> f64 {
  if clicks <= 0 { 0.0 } else { conversions as f64 / clicks as f64 }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    entity::AffiliateStatus,
    sv::{Referral, test_utils::test_db},
  };

  fn event(id: &str, brand_id: i32, total: i64, code: Option<&str>) -> OrderEvent {
    OrderEvent {
      external_order_id: id.into(),
      brand_id,
      total_amount: total,
      customer_email: Some("buyer@mail.io".into()),
      referral_code: code.map(str::to_string),
    }
  }

  async fn enrol(db: &DatabaseConnection, brand_id: i32, email: &str) -> i32 {
    let user = test_db::user(db, email).await;
    affiliate::ActiveModel {
      id: NotSet,
      brand_id: Set(brand_id),
      user_id: Set(user.id),
      code: Set("AFF".into()),
      commission_rate: Set(2000),
      status: Set(AffiliateStatus::Active),
      click_count: Set(4),
      total_sales: Set(0),
      total_due: Set(0),
      total_paid: Set(0),
      created_at: Set(Utc::now().naive_utc()),
    }
    .insert(db)
    .await
    .unwrap()
    .id
  }

  #[tokio::test]
  async fn test_duplicate_delivery_counts_once() {
    let db = test_db::setup().await;
    let brand = test_db::brand(&db, "seller@shop.io").await;
    let ledger = Ledger::new(&db);

    let first = ledger.ingest(event("o-1", brand.id, 10_000, None)).await.unwrap();
    let second = ledger.ingest(event("o-1", brand.id, 10_000, None)).await.unwrap();

    assert!(!first.is_duplicate());
    assert!(second.is_duplicate());
    assert_eq!(first.order(), second.order());

    let brand = brand::Entity::find_by_id(brand.id).one(&db).await.unwrap().unwrap();
    assert_eq!(brand.total_sales, 10_000);
    assert_eq!(brand.total_earnings, 5_000);
    assert_eq!(order::Entity::find().count(&db).await.unwrap(), 1);
  }

  #[tokio::test]
  async fn test_record_order_is_idempotent_by_itself() {
    let db = test_db::setup().await;
    let brand = test_db::brand(&db, "seller@shop.io").await;
    let event = event("o-1", brand.id, 10_000, None);

    let attributed = Attribution::new(&db).resolve(&event).await.unwrap();
    let shares = Commission::new(&db).quote(&attributed, 10_000).await.unwrap();
    let ledger = Ledger::new(&db);

    ledger.record_order(&event, &attributed, &shares).await.unwrap();
    let again = ledger.record_order(&event, &attributed, &shares).await.unwrap();

    assert!(again.is_duplicate());
    assert!(ledger.verify_brand(brand.id).await.unwrap().is_consistent());
  }

  #[tokio::test]
  async fn test_full_attribution_and_derived_views_match_counters() {
    let db = test_db::setup().await;
    test_db::user(&db, "scout@shop.io").await;
    Referral::new(&db)
      .register("scout@shop.io", "seller@shop.io", "link-1")
      .await
      .unwrap();
    let brand = test_db::brand(&db, "seller@shop.io").await;
    let affiliate_id = enrol(&db, brand.id, "aff@shop.io").await;
    let ledger = Ledger::new(&db);

    ledger.ingest(event("o-1", brand.id, 10_000, Some("AFF"))).await.unwrap();
    ledger.ingest(event("o-2", brand.id, 3_333, None)).await.unwrap();

    let orders = order::Entity::find().all(&db).await.unwrap();
    for order in &orders {
      assert_eq!(order.brand_earnings + order.platform_share, order.total_amount);
    }
    let first = orders.iter().find(|o| o.id == "o-1").unwrap();
    assert_eq!(first.affiliate_due, 1_000);
    assert_eq!(first.referral_earnings, 250);

    assert!(ledger.verify_brand(brand.id).await.unwrap().is_consistent());
    assert!(ledger.verify_affiliate(affiliate_id).await.unwrap().is_consistent());
    let referrals = ledger.verify_referrals("scout@shop.io").await.unwrap();
    assert!(referrals.is_consistent());
    assert_eq!(referrals.derived, 250 + 83);

    let referral = platform_referral::Entity::find().one(&db).await.unwrap().unwrap();
    assert_eq!(referral.status, ReferralStatus::Completed);

    let scout = test_db::user(&db, "scout@shop.io").await;
    let summary = ledger.summary(scout.id).await.unwrap();
    assert_eq!(summary.total_earnings, 333);
    assert_eq!(summary.available_for_payout, 333);

    let aff = test_db::user(&db, "aff@shop.io").await;
    let breakdown = ledger.breakdown(aff.id).await.unwrap();
    assert_eq!(breakdown.affiliate_earnings[0].conversions, 1);
    assert_eq!(breakdown.affiliate_earnings[0].conversion_rate, 0.25);
    assert_eq!(ledger.summary(aff.id).await.unwrap().total_earnings, 1_000);
  }

  #[tokio::test]
  async fn test_payable_balances_never_exceed_the_order() {
    let db = test_db::setup().await;
    test_db::user(&db, "scout@shop.io").await;
    Referral::new(&db)
      .register("scout@shop.io", "seller@shop.io", "link-1")
      .await
      .unwrap();
    let brand = test_db::brand(&db, "seller@shop.io").await;
    enrol(&db, brand.id, "aff@shop.io").await;
    let ledger = Ledger::new(&db);

    let recorded =
      ledger.ingest(event("o-1", brand.id, 10_000, Some("AFF"))).await.unwrap();
    let order = recorded.order();

    let mut payable = 0;
    for email in ["seller@shop.io", "aff@shop.io", "scout@shop.io"] {
      let user = test_db::user(&db, email).await;
      let summary = ledger.summary(user.id).await.unwrap();
      assert_eq!(summary.total_earnings, summary.available_for_payout);
      payable += summary.available_for_payout;
    }
    assert_eq!(order.platform_share + payable, order.total_amount);

    let seller = test_db::user(&db, "seller@shop.io").await;
    assert_eq!(ledger.summary(seller.id).await.unwrap().available_for_payout, 3_750);
    let breakdown = ledger.breakdown(seller.id).await.unwrap();
    assert_eq!(breakdown.brand_earnings[0].total_earnings, 5_000);
    assert_eq!(breakdown.brand_earnings[0].carved_out, 1_250);
    assert_eq!(breakdown.brand_earnings[0].net_earnings, 3_750);

    let check = ledger.verify_brand(brand.id).await.unwrap();
    assert!(check.is_consistent());
    assert_eq!(check.carved.derived, 1_250);
  }

  #[tokio::test]
  async fn test_summary_for_owner() {
    let db = test_db::setup().await;
    let brand = test_db::brand(&db, "seller@shop.io").await;
    let ledger = Ledger::new(&db);
    ledger.ingest(event("o-1", brand.id, 10_000, None)).await.unwrap();

    let seller = test_db::user(&db, "seller@shop.io").await;
    let summary = ledger.summary(seller.id).await.unwrap();
    assert_eq!(
      summary,
      Summary {
        total_earnings: 5_000,
        available_for_payout: 5_000,
        pending_earnings: 0,
      }
    );

    let breakdown = ledger.breakdown(seller.id).await.unwrap();
    assert_eq!(breakdown.brand_earnings.len(), 1);
    assert!(breakdown.referral_earnings.is_empty());
  }

  #[tokio::test]
  async fn test_rejected_events_leave_no_trace() {
    let db = test_db::setup().await;
    let brand = test_db::brand(&db, "seller@shop.io").await;
    let ledger = Ledger::new(&db);

    let zero = ledger.ingest(event("o-1", brand.id, 0, None)).await;
    assert!(matches!(zero, Err(Error::Validation(_))));
    let missing = ledger.ingest(event("o-2", 999, 100, None)).await;
    assert!(matches!(missing, Err(Error::NotFound("brand"))));

    assert_eq!(order::Entity::find().count(&db).await.unwrap(), 0);
  }

  #[tokio::test]
  async fn test_recent_orders_are_gated() {
    let db = test_db::setup().await;
    let brand = test_db::brand(&db, "seller@shop.io").await;
    let ledger = Ledger::new(&db);
    ledger.ingest(event("o-1", brand.id, 500, None)).await.unwrap();

    let orders = ledger.recent_orders(brand.id, "seller@shop.io", 10).await.unwrap();
    assert_eq!(orders.len(), 1);

    let outsider = ledger.recent_orders(brand.id, "x@shop.io", 10).await;
    assert!(matches!(outsider, Err(Error::Forbidden(_))));
  }
}
