use sea_orm_migration::prelude::*;

use super::{
  m20260201_000001_create_users::Users,
  m20260201_000002_create_brands::Brands,
};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(Affiliates::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(Affiliates::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(Affiliates::BrandId).integer().not_null())
          .col(ColumnDef::new(Affiliates::UserId).integer().not_null())
          .col(ColumnDef::new(Affiliates::Code).string().not_null().unique_key())
          .col(
            ColumnDef::new(Affiliates::CommissionRate)
              .integer()
              .not_null()
              .default(1000),
          )
          .col(
            ColumnDef::new(Affiliates::Status)
              .string()
              .not_null()
              .default("active"),
          )
          .col(
            ColumnDef::new(Affiliates::ClickCount)
              .big_integer()
              .not_null()
              .default(0),
          )
          .col(
            ColumnDef::new(Affiliates::TotalSales)
              .big_integer()
              .not_null()
              .default(0),
          )
          .col(
            ColumnDef::new(Affiliates::TotalDue)
              .big_integer()
              .not_null()
              .default(0),
          )
          .col(
            ColumnDef::new(Affiliates::TotalPaid)
              .big_integer()
              .not_null()
              .default(0),
          )
          .col(ColumnDef::new(Affiliates::CreatedAt).date_time().not_null())
          .foreign_key(
            ForeignKey::create()
              .name("fk_affiliates_brand")
              .from(Affiliates::Table, Affiliates::BrandId)
              .to(Brands::Table, Brands::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .foreign_key(
            ForeignKey::create()
              .name("fk_affiliates_user")
              .from(Affiliates::Table, Affiliates::UserId)
              .to(Users::Table, Users::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_affiliates_brand_user")
          .table(Affiliates::Table)
          .col(Affiliates::BrandId)
          .col(Affiliates::UserId)
          .unique()
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(Affiliates::Table).to_owned())
      .await
  }
}

#[derive(DeriveIden)]
pub enum Affiliates {
  Table,
  Id,
  BrandId,
  UserId,
  Code,
  CommissionRate,
  Status,
  ClickCount,
  TotalSales,
  TotalDue,
  TotalPaid,
  CreatedAt,
}
