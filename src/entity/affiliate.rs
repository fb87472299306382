use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::{brand, user};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[derive(EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum AffiliateStatus {
  #[sea_orm(string_value = "active")]
  #[default]
  Active,
  #[sea_orm(string_value = "paused")]
  Paused,
  #[sea_orm(string_value = "inactive")]
  Inactive,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "affiliates")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  pub brand_id: i32,
  pub user_id: i32,
  #[sea_orm(unique)]
  pub code: String,
  pub commission_rate: i32,
  pub status: AffiliateStatus,
  pub click_count: i64,
  pub total_sales: i64,
  pub total_due: i64,
  pub total_paid: i64,
  pub created_at: DateTime,
}

impl Model {
  pub fn unpaid(&self) -> i64 {
    self.total_due - self.total_paid
  }
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
  #[sea_orm(
    belongs_to = "user::Entity",
    from = "Column::UserId",
    to = "user::Column::Id",
    on_delete = "Cascade"
  )]
  User,
}

impl Related<brand::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Brand.def()
  }
}

impl Related<user::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::User.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
