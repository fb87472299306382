//! Commission schedules and the per-order split.
//!
//! Rates are basis points (10 000 = 100%). All shares are floored and the
//! platform takes the remainder, so `brand + platform == total` exactly.

use sea_orm::sea_query::{Expr, OnConflict};
use serde::{Deserialize, Serialize};

use crate::{
  entity::{brand, brand_commission, commission_tier, genre},
  prelude::*,
  sv::{
    Access,
    access::Role,
    activity::{Activity, Event},
    attribution::Attributed,
  },
};

pub const BPS: i32 = 10_000;
pub const DEFAULT_BRAND_RATE: i32 = 5_000;
/// Platform referrer cut of the brand's earnings.
pub const REFERRAL_RATE: i32 = 500;

fn apply(amount: i64, rate: i32) -> i64 {
  (i128::from(amount) * i128::from(rate) / i128::from(BPS)) as i64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Shares {
  pub brand_rate: i32,
  pub brand_earnings: i64,
  pub platform_share: i64,
  pub affiliate_due: i64,
  pub referral_earnings: i64,
}

/// Splits one order. Affiliate and referral cuts are carved out of the
/// brand's earnings and never touch the platform share.
pub fn split(
  total: i64,
  brand_rate: i32,
  affiliate_rate: Option<i32>,
  has_referrer: bool,
) -> Result<Shares> {
  if total <= 0 {
    return Err(Error::validation("order total must be positive"));
  }
  if !(0..=BPS).contains(&brand_rate) {
    return Err(Error::validation(format!("brand rate {brand_rate} out of range")));
  }

  let brand_earnings = apply(total, brand_rate);
  let platform_share = total - brand_earnings;
  let affiliate_due = affiliate_rate
    .map(|rate| apply(brand_earnings, rate.clamp(0, BPS)))
    .unwrap_or(0);
  let mut referral_earnings =
    if has_referrer { apply(brand_earnings, REFERRAL_RATE) } else { 0 };

  let pool = brand_earnings - affiliate_due;
  if referral_earnings > pool {
    warn!(
      "carve-outs exceed brand earnings ({affiliate_due} + {referral_earnings} \
       > {brand_earnings}), capping referral at {pool}"
    );
    referral_earnings = pool;
  }

  Ok(Shares {
    brand_rate,
    brand_earnings,
    platform_share,
    affiliate_due,
    referral_earnings,
  })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tier {
  pub name: String,
  pub min_sales: i64,
  pub rate: i32,
}

/// Everything that decides a brand's rate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
  pub base_rate: Option<i32>,
  pub genre_rate: Option<i32>,
  pub min_rate: Option<i32>,
  pub max_rate: Option<i32>,
  pub is_automatic: bool,
  pub tiers: Vec<Tier>,
}

impl Schedule {
  /// Rate for the next order given the brand's sales before it.
  pub fn rate_for(&self, prior_sales: i64) -> i32 {
    let tier = self
      .is_automatic
      .then(|| {
        self
          .tiers
          .iter()
          .filter(|tier| tier.min_sales <= prior_sales)
          .max_by_key(|tier| tier.min_sales)
      })
      .flatten();

    let rate = tier
      .map(|tier| tier.rate)
      .or(self.base_rate)
      .or(self.genre_rate)
      .unwrap_or(DEFAULT_BRAND_RATE);

    let rate = self.min_rate.map_or(rate, |min| rate.max(min));
    self.max_rate.map_or(rate, |max| rate.min(max))
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionConfig {
  pub brand_id: i32,
  pub base_rate: i32,
  pub min_rate: Option<i32>,
  pub max_rate: Option<i32>,
  pub is_automatic: bool,
  pub tiers: Vec<Tier>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionUpdate {
  pub base_rate: i32,
  #[serde(default)]
  pub min_rate: Option<i32>,
  #[serde(default)]
  pub max_rate: Option<i32>,
  #[serde(default)]
  pub is_automatic: bool,
  #[serde(default)]
  pub tiers: Vec<Tier>,
}

fn check_rate(name: &str, rate: i32) -> Result<()> {
  if (0..=BPS).contains(&rate) {
    Ok(())
  } else {
    Err(Error::validation(format!("{name} must be within 0..={BPS}")))
  }
}

impl CommissionUpdate {
  pub fn validate(&self) -> Result<()> {
    check_rate("baseRate", self.base_rate)?;
    if let Some(min) = self.min_rate {
      check_rate("minRate", min)?;
      if self.base_rate < min {
        return Err(Error::validation("baseRate is below minRate"));
      }
    }
    if let Some(max) = self.max_rate {
      check_rate("maxRate", max)?;
      if self.base_rate > max {
        return Err(Error::validation("baseRate is above maxRate"));
      }
    }

    let mut seen = HashSet::new();
    for tier in &self.tiers {
      check_rate("tier rate", tier.rate)?;
      if tier.min_sales < 0 {
        return Err(Error::validation("tier minSales must not be negative"));
      }
      if !seen.insert(tier.min_sales) {
        return Err(Error::validation(format!(
          "duplicate tier threshold {}",
          tier.min_sales
        )));
      }
    }
    Ok(())
  }
}

pub struct Commission<'a, C = DatabaseConnection> {
  db: &'a C,
}

impl<'a, C: ConnectionTrait> Commission<'a, C> {
  pub fn new(db: &'a C) -> Self {
    Self { db }
  }

  pub async fn schedule(&self, brand: &brand::Model) -> Result<Schedule> {
    let genre_rate = match brand.genre_id {
      Some(id) => {
        genre::Entity::find_by_id(id).one(self.db).await?.and_then(|g| g.base_rate)
      }
      None => None,
    };

    let Some(config) =
      brand_commission::Entity::find_by_id(brand.id).one(self.db).await?
    else {
      return Ok(Schedule { genre_rate, ..Default::default() });
    };

    let tiers = commission_tier::Entity::find()
      .filter(commission_tier::Column::BrandId.eq(brand.id))
      .order_by_asc(commission_tier::Column::MinSales)
      .all(self.db)
      .await?
      .into_iter()
      .map(|t| Tier { name: t.name, min_sales: t.min_sales, rate: t.rate })
      .collect();

    Ok(Schedule {
      base_rate: Some(config.base_rate),
      genre_rate,
      min_rate: config.min_rate,
      max_rate: config.max_rate,
      is_automatic: config.is_automatic,
      tiers,
    })
  }

  /// Shares of a new order for an already attributed sale. Tier thresholds
  /// use the brand's sales before this order.
  pub async fn quote(&self, attributed: &Attributed, total: i64) -> Result<Shares> {
    let schedule = self.schedule(&attributed.brand).await?;
    let rate = schedule.rate_for(attributed.brand.total_sales);

    split(
      total,
      rate,
      attributed.affiliate.as_ref().map(|a| a.commission_rate),
      attributed.referrer_email.is_some(),
    )
  }

  pub async fn config(&self, brand_id: i32) -> Result<CommissionConfig> {
    let brand = Access::new(self.db).live_brand(brand_id).await?;
    let schedule = self.schedule(&brand).await?;

    Ok(CommissionConfig {
      brand_id,
      base_rate: schedule
        .base_rate
        .or(schedule.genre_rate)
        .unwrap_or(DEFAULT_BRAND_RATE),
      min_rate: schedule.min_rate,
      max_rate: schedule.max_rate,
      is_automatic: schedule.is_automatic,
      tiers: schedule.tiers,
    })
  }
}

impl<'a, C: ConnectionTrait + TransactionTrait> Commission<'a, C> {
  /// Replaces the brand's schedule and its tiers in one step.
  pub async fn update_config(
    &self,
    brand_id: i32,
    actor: &str,
    update: CommissionUpdate,
  ) -> Result<CommissionConfig> {
    let access = Access::new(self.db);
    access.live_brand(brand_id).await?;
    access.require(brand_id, actor, Role::Owner).await?;
    update.validate()?;

    let txn = self.db.begin().await?;

    let row = brand_commission::ActiveModel {
      brand_id: Set(brand_id),
      base_rate: Set(update.base_rate),
      min_rate: Set(update.min_rate),
      max_rate: Set(update.max_rate),
      is_automatic: Set(update.is_automatic),
      updated_at: Set(Utc::now().naive_utc()),
    };
    brand_commission::Entity::insert(row)
      .on_conflict(
        OnConflict::column(brand_commission::Column::BrandId)
          .update_columns([
            brand_commission::Column::BaseRate,
            brand_commission::Column::MinRate,
            brand_commission::Column::MaxRate,
            brand_commission::Column::IsAutomatic,
            brand_commission::Column::UpdatedAt,
          ])
          .to_owned(),
      )
      .exec_without_returning(&txn)
      .await?;

    commission_tier::Entity::delete_many()
      .filter(commission_tier::Column::BrandId.eq(brand_id))
      .exec(&txn)
      .await?;

    for tier in &update.tiers {
      commission_tier::ActiveModel {
        id: NotSet,
        brand_id: Set(brand_id),
        name: Set(tier.name.clone()),
        min_sales: Set(tier.min_sales),
        rate: Set(tier.rate),
      }
      .insert(&txn)
      .await?;
    }

    Activity::new(&txn)
      .record(Event::CommissionUpdated {
        brand_id: Some(brand_id),
        genre_id: None,
        actor: actor.to_string(),
        base_rate: update.base_rate,
      })
      .await?;

    txn.commit().await?;

    info!(brand_id, "commission updated by {actor}: base {}", update.base_rate);
    self.config(brand_id).await
  }

  /// Default rate for brands in a genre without their own schedule.
  pub async fn set_genre_rate(
    &self,
    genre_id: i32,
    actor: &str,
    base_rate: i32,
  ) -> Result<genre::Model> {
    check_rate("baseRate", base_rate)?;

    let actor_role = crate::entity::user::Entity::find()
      .filter(crate::entity::user::Column::Email.eq(actor))
      .one(self.db)
      .await?
      .map(|user| Role::from(user.role))
      .unwrap_or(Role::User);
    if !actor_role.is_admin() {
      return Err(Error::forbidden("requires platform admin"));
    }

    let txn = self.db.begin().await?;
    let updated = genre::Entity::update_many()
      .col_expr(genre::Column::BaseRate, Expr::value(base_rate))
      .filter(genre::Column::Id.eq(genre_id))
      .exec(&txn)
      .await?;
    if updated.rows_affected == 0 {
      return Err(Error::NotFound("genre"));
    }

    Activity::new(&txn)
      .record(Event::CommissionUpdated {
        brand_id: None,
        genre_id: Some(genre_id),
        actor: actor.to_string(),
        base_rate,
      })
      .await?;
    txn.commit().await?;

    genre::Entity::find_by_id(genre_id)
      .one(self.db)
      .await?
      .ok_or(Error::NotFound("genre"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{entity::UserRole, sv::test_utils::test_db};

  fn tiered() -> Schedule {
    Schedule {
      base_rate: Some(5000),
      is_automatic: true,
      tiers: vec![
        Tier { name: "Starter".into(), min_sales: 0, rate: 5000 },
        Tier { name: "Growth".into(), min_sales: 1_000_000, rate: 5500 },
        Tier { name: "Scale".into(), min_sales: 5_000_000, rate: 6000 },
      ],
      ..Default::default()
    }
  }

  #[test]
  fn test_tier_uses_sales_before_the_order() {
    let schedule = tiered();
    // $12,000 of prior sales lands in the $10,000 tier
    assert_eq!(schedule.rate_for(1_200_000), 5500);
    assert_eq!(schedule.rate_for(999_999), 5000);
    assert_eq!(schedule.rate_for(5_000_000), 6000);

    let shares = split(10_000, schedule.rate_for(1_200_000), None, false).unwrap();
    assert_eq!(shares.brand_earnings, 5500);
    assert_eq!(shares.platform_share, 4500);
  }

  #[test]
  fn test_manual_schedule_ignores_tiers() {
    let schedule = Schedule { is_automatic: false, ..tiered() };
    assert_eq!(schedule.rate_for(9_000_000), 5000);
  }

  #[test]
  fn test_rate_fallbacks_and_clamp() {
    assert_eq!(Schedule::default().rate_for(0), DEFAULT_BRAND_RATE);

    let genre = Schedule { genre_rate: Some(4200), ..Default::default() };
    assert_eq!(genre.rate_for(0), 4200);

    let clamped = Schedule {
      min_rate: Some(5200),
      max_rate: Some(5800),
      ..tiered()
    };
    assert_eq!(clamped.rate_for(0), 5200);
    assert_eq!(clamped.rate_for(6_000_000), 5800);
  }

  #[test]
  fn test_carve_outs() {
    let shares = split(10_000, 5500, Some(2000), true).unwrap();
    assert_eq!(shares.affiliate_due, 1100);
    assert_eq!(shares.referral_earnings, 275);
    assert_eq!(shares.platform_share, 4500);
    assert_eq!(shares.brand_earnings + shares.platform_share, 10_000);
  }

  #[test]
  fn test_conservation_with_rounding() {
    for total in [1, 7, 99, 333, 10_001, 123_457] {
      for rate in [0, 1, 3333, 5000, 6667, 10_000] {
        let shares = split(total, rate, Some(3333), true).unwrap();
        assert_eq!(shares.brand_earnings + shares.platform_share, total);
        assert!(shares.platform_share >= 0);
        assert!(shares.affiliate_due + shares.referral_earnings
          <= shares.brand_earnings);
      }
    }
  }

  #[test]
  fn test_referral_capped_by_remaining_pool() {
    let shares = split(10_000, 5000, Some(BPS), true).unwrap();
    assert_eq!(shares.affiliate_due, 5000);
    assert_eq!(shares.referral_earnings, 0);
  }

  #[test]
  fn test_non_positive_total_rejected() {
    assert!(matches!(split(0, 5000, None, false), Err(Error::Validation(_))));
    assert!(matches!(split(-5, 5000, None, false), Err(Error::Validation(_))));
  }

  #[test]
  fn test_update_validation() {
    let ok = CommissionUpdate {
      base_rate: 5000,
      min_rate: Some(4000),
      max_rate: Some(6000),
      is_automatic: true,
      tiers: tiered().tiers,
    };
    assert!(ok.validate().is_ok());

    let bad_bounds = CommissionUpdate { min_rate: Some(5500), ..ok.clone() };
    assert!(matches!(bad_bounds.validate(), Err(Error::Validation(_))));

    let bad_rate = CommissionUpdate { base_rate: 10_001, ..ok.clone() };
    assert!(bad_rate.validate().is_err());

    let mut dup = ok.clone();
    dup.tiers.push(Tier { name: "Again".into(), min_sales: 0, rate: 1 });
    assert!(dup.validate().is_err());
  }

  #[tokio::test]
  async fn test_update_config_replaces_tiers() {
    let db = test_db::setup().await;
    let brand = test_db::brand(&db, "a@shop.io").await;
    let commission = Commission::new(&db);

    assert_eq!(commission.config(brand.id).await.unwrap().base_rate, 5000);

    let update = CommissionUpdate {
      base_rate: 5000,
      min_rate: None,
      max_rate: None,
      is_automatic: true,
      tiers: tiered().tiers,
    };
    commission.update_config(brand.id, "a@shop.io", update).await.unwrap();

    let update = CommissionUpdate {
      base_rate: 6000,
      min_rate: None,
      max_rate: None,
      is_automatic: false,
      tiers: vec![Tier { name: "Only".into(), min_sales: 0, rate: 6000 }],
    };
    let config =
      commission.update_config(brand.id, "a@shop.io", update).await.unwrap();

    assert_eq!(config.base_rate, 6000);
    assert!(!config.is_automatic);
    assert_eq!(config.tiers.len(), 1);
  }

  #[tokio::test]
  async fn test_update_config_requires_owner() {
    let db = test_db::setup().await;
    let brand = test_db::brand(&db, "a@shop.io").await;

    let update = CommissionUpdate {
      base_rate: 9000,
      min_rate: None,
      max_rate: None,
      is_automatic: false,
      tiers: vec![],
    };
    let result =
      Commission::new(&db).update_config(brand.id, "x@shop.io", update).await;
    assert!(matches!(result, Err(Error::Forbidden(_))));
  }

  #[tokio::test]
  async fn test_genre_rate_applies_to_brands_without_schedule() {
    let db = test_db::setup().await;
    test_db::make_admin(&db, "root@shop.io", UserRole::PlatformAdmin).await;

    let genre = genre::ActiveModel {
      id: NotSet,
      name: Set("Apparel".into()),
      base_rate: Set(None),
    }
    .insert(&db)
    .await
    .unwrap();

    let brand = test_db::brand(&db, "a@shop.io").await;
    let brand = brand::ActiveModel { genre_id: Set(Some(genre.id)), ..brand.into() }
      .update(&db)
      .await
      .unwrap();

    let commission = Commission::new(&db);
    let denied = commission.set_genre_rate(genre.id, "a@shop.io", 4000).await;
    assert!(matches!(denied, Err(Error::Forbidden(_))));

    commission.set_genre_rate(genre.id, "root@shop.io", 4000).await.unwrap();
    let schedule = commission.schedule(&brand).await.unwrap();
    assert_eq!(schedule.rate_for(0), 4000);
  }
}
