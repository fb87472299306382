use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::brand_commission;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "commission_tiers")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  pub brand_id: i32,
  pub name: String,
  /// Cumulative brand sales (cents) required before this rate applies.
  pub min_sales: i64,
  pub rate: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(
    belongs_to = "brand_commission::Entity",
    from = "Column::BrandId",
    to = "brand_commission::Column::BrandId",
    on_delete = "Cascade"
  )]
  Commission,
}

impl Related<brand_commission::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Commission.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
