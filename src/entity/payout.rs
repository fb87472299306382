use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::{payout_allocation, user};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[derive(EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
  /// Earnings reserved, transfer not yet confirmed.
  #[sea_orm(string_value = "pending")]
  #[default]
  Pending,
  #[sea_orm(string_value = "completed")]
  Completed,
  #[sea_orm(string_value = "failed")]
  Failed,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payouts")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  pub user_id: i32,
  pub amount: i64,
  pub status: PayoutStatus,
  #[sea_orm(unique)]
  pub idempotency_key: String,
  pub provider: String,
  pub destination: String,
  pub transfer_id: Option<String>,
  pub failure: Option<String>,
  pub created_at: DateTime,
  pub settled_at: Option<DateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(
    belongs_to = "user::Entity",
    from = "Column::UserId",
    to = "user::Column::Id"
  )]
  User,
  #[sea_orm(has_many = "payout_allocation::Entity")]
  Allocations,
}

impl Related<user::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::User.def()
  }
}

impl Related<payout_allocation::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Allocations.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
