use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::brand;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[derive(EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum AccessRole {
  #[sea_orm(string_value = "owner")]
  Owner,
  #[sea_orm(string_value = "manager")]
  Manager,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "brand_access")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub brand_id: i32,
  #[sea_orm(primary_key, auto_increment = false)]
  pub user_email: String,
  pub role: AccessRole,
  pub created_at: DateTime,
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
}

impl Related<brand::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Brand.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
