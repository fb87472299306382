use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::{brand, commission_tier};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "brand_commissions")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub brand_id: i32,
  pub base_rate: i32,
  pub min_rate: Option<i32>,
  pub max_rate: Option<i32>,
  pub is_automatic: bool,
  pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(
    belongs_to = "brand::Entity",
    from = "Column::BrandId",
    to = "brand::Column::Id",
    on_delete = "Cascade"
  )]
  Brand,
  #[sea_orm(has_many = "commission_tier::Entity")]
  Tiers,
}

impl Related<brand::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Brand.def()
  }
}

impl Related<commission_tier::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Tiers.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
