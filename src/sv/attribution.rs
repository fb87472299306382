use serde::{Deserialize, Serialize};

use crate::{
  entity::{AffiliateStatus, affiliate, brand, user},
  prelude::*,
  sv::Access,
};

/// A completed sale as delivered by the order source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEvent {
  pub external_order_id: String,
  pub brand_id: i32,
  /// Cents.
  pub total_amount: i64,
  #[serde(default)]
  pub customer_email: Option<String>,
  /// Affiliate code carried by the checkout link, if any.
  #[serde(default)]
  pub referral_code: Option<String>,
}

impl OrderEvent {
  pub fn validate(&self) -> Result<()> {
    if self.external_order_id.trim().is_empty() {
      return Err(Error::validation("external order id is required"));
    }
    if self.total_amount <= 0 {
      return Err(Error::validation("order total must be positive"));
    }
    Ok(())
  }
}

#[derive(Debug, Clone)]
pub struct Attributed {
  pub brand: brand::Model,
  pub affiliate: Option<affiliate::Model>,
  /// Account the brand earnings accrue to: the brand's current owner.
  pub earning_account: Option<String>,
  /// Platform referrer of the earning account.
  pub referrer_email: Option<String>,
}

pub struct Attribution<'a, C = DatabaseConnection> {
  db: &'a C,
}

impl<'a, C: ConnectionTrait> Attribution<'a, C> {
  pub fn new(db: &'a C) -> Self {
    Self { db }
  }

  /// Works out who shares in an order. Reads only, so it is safe to rerun
  /// when a delivery is retried.
  pub async fn resolve(&self, event: &OrderEvent) -> Result<Attributed> {
    let access = Access::new(self.db);
    let brand = access.live_brand(event.brand_id).await?;

    let affiliate = match event.referral_code.as_deref().map(str::trim) {
      Some(code) if !code.is_empty() => self.affiliate(brand.id, code).await?,
      _ => None,
    };

    let earning_account =
      access.owner(brand.id).await?.map(|row| row.user_email);

    let referrer_email = match &earning_account {
      Some(email) => user::Entity::find()
        .filter(user::Column::Email.eq(email))
        .one(self.db)
        .await?
        .and_then(|user| user.referred_by_email)
        .filter(|referrer| referrer != email),
      None => None,
    };

    Ok(Attributed { brand, affiliate, earning_account, referrer_email })
  }

  async fn affiliate(
    &self,
    brand_id: i32,
    code: &str,
  ) -> Result<Option<affiliate::Model>> {
    let found = affiliate::Entity::find()
      .filter(affiliate::Column::BrandId.eq(brand_id))
      .filter(affiliate::Column::Code.eq(code))
      .one(self.db)
      .await?;

    match found {
      Some(affiliate) if affiliate.status == AffiliateStatus::Active => {
        Ok(Some(affiliate))
      }
      Some(affiliate) => {
        debug!(brand_id, "affiliate {code} is {:?}, ignoring", affiliate.status);
        Ok(None)
      }
      None => {
        debug!(brand_id, "no affiliate with code {code}");
        Ok(None)
      }
    }
  }
}
