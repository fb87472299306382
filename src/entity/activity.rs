use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "activities")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  pub kind: String,
  pub brand_id: Option<i32>,
  pub user_email: Option<String>,
  pub order_id: Option<String>,
  #[sea_orm(column_type = "Text")]
  pub payload: String,
  pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
