use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::payout;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[derive(EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum AllocationSource {
  #[sea_orm(string_value = "brand")]
  Brand,
  #[sea_orm(string_value = "affiliate")]
  Affiliate,
  #[sea_orm(string_value = "referral")]
  Referral,
}

/// Part of a payout drawn from one earnings counter.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payout_allocations")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  pub payout_id: i32,
  pub source: AllocationSource,
  /// Brand or affiliate id; `None` for referral earnings.
  pub source_id: Option<i32>,
  pub amount: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(
    belongs_to = "payout::Entity",
    from = "Column::PayoutId",
    to = "payout::Column::Id",
    on_delete = "Cascade"
  )]
  Payout,
}

impl Related<payout::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Payout.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
