use sea_orm::sea_query::Expr;
use serde::{Deserialize, Serialize};

use crate::{
  entity::{AffiliateStatus, affiliate},
  prelude::*,
  sv::{
    Access,
    access::Role,
    commission::BPS,
    ledger::{Ledger, conversion_rate},
    user::{User, is_unique_violation},
  },
};

pub struct Affiliate<'a> {
  db: &'a DatabaseConnection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrolment {
  pub user_email: String,
  pub commission_rate: i32,
  #[serde(default)]
  pub code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AffiliateStats {
  pub clicks: i64,
  pub conversions: u64,
  pub conversion_rate: f64,
  pub earnings: i64,
}

fn generate_code() -> String {
  uuid::Uuid::new_v4().simple().to_string()[..8].to_uppercase()
}

impl<'a> Affiliate<'a> {
  pub fn new(db: &'a DatabaseConnection) -> Self {
    Self { db }
  }

  /// Enrols a user as an affiliate of the brand. Brand managers decide the
  /// commission, which is a share of the brand's earnings.
  pub async fn enrol(
    &self,
    brand_id: i32,
    actor: &str,
    enrolment: Enrolment,
  ) -> Result<affiliate::Model> {
    let access = Access::new(self.db);
    access.live_brand(brand_id).await?;
    access.require(brand_id, actor, Role::Manager).await?;

    if !(0..=BPS).contains(&enrolment.commission_rate) {
      return Err(Error::validation(format!(
        "commission rate must be within 0..={BPS}"
      )));
    }
    let code = match enrolment.code.as_deref().map(str::trim) {
      Some(code) if code.is_empty() || code.len() > 32 => {
        return Err(Error::validation("affiliate code must be 1-32 characters"));
      }
      Some(code) => code.to_string(),
      None => generate_code(),
    };

    let user = User::new(self.db).get_or_create(&enrolment.user_email).await?;

    let affiliate = affiliate::ActiveModel {
      id: NotSet,
      brand_id: Set(brand_id),
      user_id: Set(user.id),
      code: Set(code),
      commission_rate: Set(enrolment.commission_rate),
      status: Set(AffiliateStatus::Active),
      click_count: Set(0),
      total_sales: Set(0),
      total_due: Set(0),
      total_paid: Set(0),
      created_at: Set(Utc::now().naive_utc()),
    }
    .insert(self.db)
    .await
    .map_err(|err| {
      if is_unique_violation(&err) {
        Error::conflict("affiliate code taken or user already enrolled")
      } else {
        err.into()
      }
    })?;

    info!(brand_id, "{} enrolled as affiliate {}", user.email, affiliate.code);
    Ok(affiliate)
  }

  pub async fn set_status(
    &self,
    affiliate_id: i32,
    actor: &str,
    status: AffiliateStatus,
  ) -> Result<affiliate::Model> {
    let affiliate = affiliate::Entity::find_by_id(affiliate_id)
      .one(self.db)
      .await?
      .ok_or(Error::NotFound("affiliate"))?;
    Access::new(self.db).require(affiliate.brand_id, actor, Role::Manager).await?;

    Ok(
      affiliate::ActiveModel { status: Set(status), ..affiliate.into() }
        .update(self.db)
        .await?,
    )
  }

  pub async fn by_code(&self, code: &str) -> Result<Option<affiliate::Model>> {
    Ok(
      affiliate::Entity::find()
        .filter(affiliate::Column::Code.eq(code.trim()))
        .one(self.db)
        .await?,
    )
  }

  /// Counts a click on an active affiliate link.
  pub async fn record_click(&self, code: &str) -> Result<()> {
    let updated = affiliate::Entity::update_many()
      .col_expr(
        affiliate::Column::ClickCount,
        Expr::col(affiliate::Column::ClickCount).add(1),
      )
      .filter(affiliate::Column::Code.eq(code.trim()))
      .filter(affiliate::Column::Status.eq(AffiliateStatus::Active))
      .exec(self.db)
      .await?;

    if updated.rows_affected == 0 {
      return Err(Error::NotFound("affiliate"));
    }
    trace!("click on affiliate {code}");
    Ok(())
  }

  pub async fn stats(&self, affiliate_id: i32) -> Result<AffiliateStats> {
    let affiliate = affiliate::Entity::find_by_id(affiliate_id)
      .one(self.db)
      .await?
      .ok_or(Error::NotFound("affiliate"))?;

    let ledger = Ledger::new(self.db);
    let conversions = ledger.conversions(affiliate.id).await?;

    Ok(AffiliateStats {
      clicks: affiliate.click_count,
      conversions,
      conversion_rate: conversion_rate(conversions, affiliate.click_count),
      earnings: ledger.affiliate_earnings(&[affiliate.id]).await?,
    })
  }
}
