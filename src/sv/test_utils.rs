//! Shared test utilities for database setup

pub mod test_db {
  use sea_orm::{Database, DatabaseConnection};

  use crate::{
    entity::{AccessRole, UserRole, brand, brand_access, user},
    prelude::*,
  };

  /// Creates an in-memory SQLite database migrated to the latest schema
  pub async fn setup() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    db
  }

  pub async fn user(db: &DatabaseConnection, email: &str) -> user::Model {
    crate::sv::User::new(db).get_or_create(email).await.unwrap()
  }

  pub async fn make_admin(
    db: &DatabaseConnection,
    email: &str,
    role: UserRole,
  ) -> user::Model {
    let user = user(db, email).await;
    user::ActiveModel { role: Set(role), ..user.into() }
      .update(db)
      .await
      .unwrap()
  }

  /// Approved, visible brand with `owner` as its single owner.
  pub async fn brand(db: &DatabaseConnection, owner: &str) -> brand::Model {
    user(db, owner).await;

    let brand = brand::ActiveModel {
      id: NotSet,
      name: Set(format!("{owner}'s brand")),
      genre_id: Set(None),
      total_sales: Set(0),
      total_earnings: Set(0),
      total_carved: Set(0),
      total_paid: Set(0),
      is_approved: Set(true),
      is_hidden: Set(false),
      is_deleted: Set(false),
      created_at: Set(Utc::now().naive_utc()),
    }
    .insert(db)
    .await
    .unwrap();

    brand_access::ActiveModel {
      brand_id: Set(brand.id),
      user_email: Set(owner.to_string()),
      role: Set(AccessRole::Owner),
      created_at: Set(Utc::now().naive_utc()),
    }
    .insert(db)
    .await
    .unwrap();

    brand
  }

  pub async fn owners(db: &DatabaseConnection, brand_id: i32) -> Vec<String> {
    brand_access::Entity::find()
      .filter(brand_access::Column::BrandId.eq(brand_id))
      .filter(brand_access::Column::Role.eq(AccessRole::Owner))
      .all(db)
      .await
      .unwrap()
      .into_iter()
      .map(|row| row.user_email)
      .collect()
  }
}

pub mod rail {
  use std::sync::Mutex;

  use async_trait::async_trait;

  use crate::sv::rail::{PaymentRail, RailError, Transfer, TransferRequest};

  #[derive(Debug, Clone, Copy, PartialEq, Eq)]
  pub enum Outcome {
    Succeed,
    Reject,
    Timeout,
  }

  /// In-memory rail: records every call and answers with a fixed outcome.
  pub struct MockRail {
    outcome: Mutex<Outcome>,
    pub transfers: Mutex<Vec<TransferRequest>>,
    /// Keys the rail reports as settled when asked by `find_transfer`.
    pub settled: Mutex<Vec<String>>,
  }

  impl MockRail {
    pub fn new(outcome: Outcome) -> Self {
      Self {
        outcome: Mutex::new(outcome),
        transfers: Mutex::new(Vec::new()),
        settled: Mutex::new(Vec::new()),
      }
    }

    pub fn set_outcome(&self, outcome: Outcome) {
      *self.outcome.lock().unwrap() = outcome;
    }

    pub fn calls(&self) -> usize {
      self.transfers.lock().unwrap().len()
    }
  }

  #[async_trait]
  impl PaymentRail for MockRail {
    fn provider(&self) -> &'static str {
      "cryptobot"
    }

    async fn transfer(
      &self,
      req: &TransferRequest,
    ) -> Result<Transfer, RailError> {
      self.transfers.lock().unwrap().push(req.clone());
      let outcome = *self.outcome.lock().unwrap();

      match outcome {
        Outcome::Succeed => {
          self.settled.lock().unwrap().push(req.idempotency_key.clone());
          Ok(Transfer {
            transfer_id: format!("tx-{}", self.calls()),
            amount: req.amount,
          })
        }
        Outcome::Reject => Err(RailError::Rejected("INSUFFICIENT_FUNDS".into())),
        Outcome::Timeout => Err(RailError::Unavailable("timed out".into())),
      }
    }

    async fn find_transfer(
      &self,
      idempotency_key: &str,
    ) -> Result<Option<Transfer>, RailError> {
      let settled = self.settled.lock().unwrap();
      let found = settled.iter().any(|key| key == idempotency_key);
      Ok(found.then(|| Transfer {
        transfer_id: format!("found-{}", &idempotency_key[..8]),
        amount: 0,
      }))
    }
  }
}
