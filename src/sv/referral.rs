use serde::Serialize;

use crate::{
  entity::{ReferralStatus, platform_referral, user},
  prelude::*,
  sv::user::{User, is_unique_violation, normalize_email},
};

pub struct Referral<'a> {
  db: &'a DatabaseConnection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralStats {
  pub referred: u64,
  pub completed: u64,
  pub total_earnings: i64,
}

impl<'a> Referral<'a> {
  pub fn new(db: &'a DatabaseConnection) -> Self {
    Self { db }
  }

  /// Links `referred` to the platform referrer who recruited them. A user
  /// has at most one referrer and it never changes once set.
  pub async fn register(
    &self,
    referrer: &str,
    referred: &str,
    link_id: &str,
  ) -> Result<platform_referral::Model> {
    let referrer = normalize_email(referrer)?;
    let referred = normalize_email(referred)?;
    if referrer == referred {
      return Err(Error::validation("cannot refer yourself"));
    }

    let users = User::new(self.db);
    users.by_email(&referrer).await?.ok_or(Error::NotFound("referrer"))?;
    let user = users.get_or_create(&referred).await?;
    if user.referred_by_email.is_some() {
      return Err(Error::conflict("user already has a referrer"));
    }

    let txn = self.db.begin().await?;

    user::ActiveModel {
      referred_by_email: Set(Some(referrer.clone())),
      ..user.into()
    }
    .update(&txn)
    .await?;

    let referral = platform_referral::ActiveModel {
      id: NotSet,
      referrer_email: Set(referrer.clone()),
      referred_email: Set(referred.clone()),
      referral_link_id: Set(link_id.to_string()),
      earnings: Set(0),
      status: Set(ReferralStatus::Pending),
      created_at: Set(Utc::now().naive_utc()),
    }
    .insert(&txn)
    .await
    .map_err(|err| {
      if is_unique_violation(&err) {
        Error::conflict("user already has a referrer")
      } else {
        err.into()
      }
    })?;

    txn.commit().await?;

    info!("{referrer} referred {referred} via {link_id}");
    Ok(referral)
  }

  pub async fn by_referrer(
    &self,
    referrer: &str,
  ) -> Result<Vec<platform_referral::Model>> {
    Ok(
      platform_referral::Entity::find()
        .filter(platform_referral::Column::ReferrerEmail.eq(referrer))
        .order_by_desc(platform_referral::Column::CreatedAt)
        .all(self.db)
        .await?,
    )
  }

  pub async fn stats(&self, referrer: &str) -> Result<ReferralStats> {
    let referrals = self.by_referrer(referrer).await?;

    Ok(ReferralStats {
      referred: referrals.len() as u64,
      completed: referrals
        .iter()
        .filter(|r| r.status == ReferralStatus::Completed)
        .count() as u64,
      total_earnings: referrals.iter().map(|r| r.earnings).sum(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sv::test_utils::test_db;

  #[tokio::test]
  async fn test_register_referral() {
    let db = test_db::setup().await;
    test_db::user(&db, "scout@shop.io").await;
    let sv = Referral::new(&db);

    let referral =
      sv.register("scout@shop.io", "Seller@shop.io", "spring").await.unwrap();
    assert_eq!(referral.referred_email, "seller@shop.io");
    assert_eq!(referral.status, ReferralStatus::Pending);

    let seller = test_db::user(&db, "seller@shop.io").await;
    assert_eq!(seller.referred_by_email.as_deref(), Some("scout@shop.io"));

    let stats = sv.stats("scout@shop.io").await.unwrap();
    assert_eq!(stats, ReferralStats { referred: 1, completed: 0, total_earnings: 0 });
  }

  #[tokio::test]
  async fn test_referrer_is_set_once() {
    let db = test_db::setup().await;
    test_db::user(&db, "scout@shop.io").await;
    test_db::user(&db, "rival@shop.io").await;
    let sv = Referral::new(&db);

    sv.register("scout@shop.io", "seller@shop.io", "l1").await.unwrap();
    let again = sv.register("rival@shop.io", "seller@shop.io", "l2").await;
    assert!(matches!(again, Err(Error::Conflict(_))));

    let own = sv.register("scout@shop.io", "scout@shop.io", "l3").await;
    assert!(matches!(own, Err(Error::Validation(_))));

    let ghost = sv.register("ghost@shop.io", "new@shop.io", "l4").await;
    assert!(matches!(ghost, Err(Error::NotFound("referrer"))));
  }
}
