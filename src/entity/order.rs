use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::brand;

/// Immutable record of an ingested sale. The primary key is the external
/// order id, which doubles as the idempotency key of the ingestion path.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub id: String,
  pub brand_id: i32,
  pub total_amount: i64,
  pub brand_rate: i32,
  pub brand_earnings: i64,
  pub platform_share: i64,
  pub affiliate_id: Option<i32>,
  pub affiliate_due: i64,
  pub referrer_email: Option<String>,
  pub referral_earnings: i64,
  pub customer_email: Option<String>,
  pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(
    belongs_to = "brand::Entity",
    from = "Column::BrandId",
    to = "brand::Column::Id"
  )]
  Brand,
}

impl Related<brand::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Brand.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
