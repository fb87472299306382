use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::{affiliate, payment_method, payout};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[derive(EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
  #[sea_orm(string_value = "user")]
  #[default]
  User,
  #[sea_orm(string_value = "platform_admin")]
  PlatformAdmin,
  #[sea_orm(string_value = "super_admin")]
  SuperAdmin,
}

impl UserRole {
  pub fn is_admin(self) -> bool {
    matches!(self, Self::PlatformAdmin | Self::SuperAdmin)
  }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  #[sea_orm(unique)]
  pub email: String,
  pub role: UserRole,
  pub referred_by_email: Option<String>,
  pub referral_paid: i64,
  pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(has_many = "affiliate::Entity")]
  Affiliates,
  #[sea_orm(has_many = "payment_method::Entity")]
  PaymentMethods,
  #[sea_orm(has_many = "payout::Entity")]
  Payouts,
}

impl Related<affiliate::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Affiliates.def()
  }
}

impl Related<payment_method::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::PaymentMethods.def()
  }
}

impl Related<payout::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Payouts.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
