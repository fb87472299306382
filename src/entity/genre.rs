use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::brand;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "genres")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  pub name: String,
  /// Default brand rate in basis points for brands of this genre.
  pub base_rate: Option<i32>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(has_many = "brand::Entity")]
  Brands,
}

impl Related<brand::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Brands.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
