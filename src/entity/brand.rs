use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::{affiliate, brand_access, brand_commission, genre, order};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "brands")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i32,
  pub name: String,
  pub genre_id: Option<i32>,
  pub total_sales: i64,
  pub total_earnings: i64,
  /// Affiliate and referral commission paid out of `total_earnings`.
  pub total_carved: i64,
  pub total_paid: i64,
  pub is_approved: bool,
  pub is_hidden: bool,
  pub is_deleted: bool,
  pub created_at: DateTime,
}

impl Model {
  pub fn is_public(&self) -> bool {
    self.is_approved && !self.is_hidden && !self.is_deleted
  }

  /// What the owner keeps once affiliates and referrers are paid.
  pub fn net_earnings(&self) -> i64 {
    self.total_earnings - self.total_carved
  }

  pub fn unpaid(&self) -> i64 {
    self.net_earnings() - self.total_paid
  }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(
    belongs_to = "genre::Entity",
    from = "Column::GenreId",
    to = "genre::Column::Id"
  )]
  Genre,
  #[sea_orm(has_many = "brand_access::Entity")]
  Access,
  #[sea_orm(has_one = "brand_commission::Entity")]
  Commission,
  #[sea_orm(has_many = "affiliate::Entity")]
  Affiliates,
  #[sea_orm(has_many = "order::Entity")]
  Orders,
}

impl Related<genre::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Genre.def()
  }
}

impl Related<brand_access::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Access.def()
  }
}

impl Related<brand_commission::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Commission.def()
  }
}

impl Related<affiliate::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Affiliates.def()
  }
}

impl Related<order::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Orders.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
