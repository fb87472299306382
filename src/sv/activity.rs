//! Audit trail of money and access changes.
//!
//! Each event is a closed variant with typed fields; the row keeps the
//! searchable keys in columns and the full event as JSON.

use serde::{Deserialize, Serialize};

use crate::{
  entity::{AccessRole, activity},
  prelude::*,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
  BrandCreated {
    brand_id: i32,
    owner_email: String,
  },
  OrderRecorded {
    order_id: String,
    brand_id: i32,
    total_amount: i64,
    brand_earnings: i64,
    affiliate_id: Option<i32>,
    affiliate_due: i64,
    referrer_email: Option<String>,
    referral_earnings: i64,
  },
  AccessGranted {
    brand_id: i32,
    granted_by: String,
    user_email: String,
    role: AccessRole,
  },
  AccessRevoked {
    brand_id: i32,
    revoked_by: String,
    user_email: String,
  },
  OwnershipTransferred {
    brand_id: i32,
    actor: String,
    from_email: String,
    to_email: String,
  },
  CommissionUpdated {
    brand_id: Option<i32>,
    genre_id: Option<i32>,
    actor: String,
    base_rate: i32,
  },
  PayoutRequested {
    payout_id: i32,
    user_email: String,
    amount: i64,
  },
  PayoutCompleted {
    payout_id: i32,
    user_email: String,
    amount: i64,
    transfer_id: String,
  },
  PayoutFailed {
    payout_id: i32,
    user_email: String,
    amount: i64,
    reason: String,
  },
}

impl Event {
  pub fn kind(&self) -> &'static str {
    match self {
      Self::BrandCreated { .. } => "brand_created",
      Self::OrderRecorded { .. } => "order_recorded",
      Self::AccessGranted { .. } => "access_granted",
      Self::AccessRevoked { .. } => "access_revoked",
      Self::OwnershipTransferred { .. } => "ownership_transferred",
      Self::CommissionUpdated { .. } => "commission_updated",
      Self::PayoutRequested { .. } => "payout_requested",
      Self::PayoutCompleted { .. } => "payout_completed",
      Self::PayoutFailed { .. } => "payout_failed",
    }
  }

  fn brand_id(&self) -> Option<i32> {
    match self {
      Self::BrandCreated { brand_id, .. }
      | Self::OrderRecorded { brand_id, .. }
      | Self::AccessGranted { brand_id, .. }
      | Self::AccessRevoked { brand_id, .. }
      | Self::OwnershipTransferred { brand_id, .. } => Some(*brand_id),
      Self::CommissionUpdated { brand_id, .. } => *brand_id,
      _ => None,
    }
  }

  fn user_email(&self) -> Option<&str> {
    match self {
      Self::BrandCreated { owner_email, .. } => Some(owner_email),
      Self::AccessGranted { user_email, .. }
      | Self::AccessRevoked { user_email, .. }
      | Self::PayoutRequested { user_email, .. }
      | Self::PayoutCompleted { user_email, .. }
      | Self::PayoutFailed { user_email, .. } => Some(user_email),
      Self::OwnershipTransferred { to_email, .. } => Some(to_email),
      Self::CommissionUpdated { actor, .. } => Some(actor),
      Self::OrderRecorded { .. } => None,
    }
  }

  fn order_id(&self) -> Option<&str> {
    match self {
      Self::OrderRecorded { order_id, .. } => Some(order_id),
      _ => None,
    }
  }
}

pub struct Activity<'a, C> {
  db: &'a C,
}

impl<'a, C: ConnectionTrait> Activity<'a, C> {
  pub fn new(db: &'a C) -> Self {
    Self { db }
  }

  pub async fn record(&self, event: Event) -> Result<()> {
    let payload = json::to_string(&event)
      .map_err(|e| Error::Internal(format!("encode activity: {e}")))?;

    activity::ActiveModel {
      id: NotSet,
      kind: Set(event.kind().to_string()),
      brand_id: Set(event.brand_id()),
      user_email: Set(event.user_email().map(str::to_string)),
      order_id: Set(event.order_id().map(str::to_string)),
      payload: Set(payload),
      created_at: Set(Utc::now().naive_utc()),
    }
    .insert(self.db)
    .await?;

    Ok(())
  }

  /// Newest first.
  pub async fn by_brand(&self, brand_id: i32, limit: u64) -> Result<Vec<Event>> {
    let rows = activity::Entity::find()
      .filter(activity::Column::BrandId.eq(brand_id))
      .order_by_desc(activity::Column::Id)
      .limit(limit)
      .all(self.db)
      .await?;

    rows
      .into_iter()
      .map(|row| {
        json::from_str(&row.payload).map_err(|e| {
          Error::Internal(format!("decode activity #{}: {e}", row.id))
        })
      })
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sv::test_utils::test_db;

  #[tokio::test]
  async fn test_events_round_trip_through_storage() {
    let db = test_db::setup().await;
    let activity = Activity::new(&db);

    activity
      .record(Event::AccessGranted {
        brand_id: 7,
        granted_by: "owner@shop.io".into(),
        user_email: "helper@shop.io".into(),
        role: AccessRole::Manager,
      })
      .await
      .unwrap();
    activity
      .record(Event::AccessRevoked {
        brand_id: 7,
        revoked_by: "owner@shop.io".into(),
        user_email: "helper@shop.io".into(),
      })
      .await
      .unwrap();

    let events = activity.by_brand(7, 10).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind(), "access_revoked");
    assert!(matches!(
      &events[1],
      Event::AccessGranted { role: AccessRole::Manager, .. }
    ));

    let row = activity::Entity::find().one(&db).await.unwrap().unwrap();
    assert_eq!(row.user_email.as_deref(), Some("helper@shop.io"));
  }
}
