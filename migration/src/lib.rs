pub use sea_orm_migration::prelude::*;

mod m20260201_000001_create_users;
mod m20260201_000002_create_brands;
mod m20260201_000003_create_affiliates;
mod m20260201_000004_create_orders;
mod m20260201_000005_create_payouts;
mod m20260201_000006_create_activities;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
  fn migrations() -> Vec<Box<dyn MigrationTrait>> {
    vec![
      Box::new(m20260201_000001_create_users::Migration),
      Box::new(m20260201_000002_create_brands::Migration),
      Box::new(m20260201_000003_create_affiliates::Migration),
      Box::new(m20260201_000004_create_orders::Migration),
      Box::new(m20260201_000005_create_payouts::Migration),
      Box::new(m20260201_000006_create_activities::Migration),
    ]
  }
}
