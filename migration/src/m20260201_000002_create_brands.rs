use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(Genres::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(Genres::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(Genres::Name).string().not_null())
          .col(ColumnDef::new(Genres::BaseRate).integer().null())
          .to_owned(),
      )
      .await?;

    manager
      .create_table(
        Table::create()
          .table(Brands::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(Brands::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(Brands::Name).string().not_null())
          .col(ColumnDef::new(Brands::GenreId).integer().null())
          .col(
            ColumnDef::new(Brands::TotalSales)
              .big_integer()
              .not_null()
              .default(0),
          )
          .col(
            ColumnDef::new(Brands::TotalEarnings)
              .big_integer()
              .not_null()
              .default(0),
          )
          .col(
            ColumnDef::new(Brands::TotalCarved)
              .big_integer()
              .not_null()
              .default(0),
          )
          .col(
            ColumnDef::new(Brands::TotalPaid)
              .big_integer()
              .not_null()
              .default(0),
          )
          .col(
            ColumnDef::new(Brands::IsApproved)
              .boolean()
              .not_null()
              .default(false),
          )
          .col(
            ColumnDef::new(Brands::IsHidden)
              .boolean()
              .not_null()
              .default(false),
          )
          .col(
            ColumnDef::new(Brands::IsDeleted)
              .boolean()
              .not_null()
              .default(false),
          )
          .col(ColumnDef::new(Brands::CreatedAt).date_time().not_null())
          .foreign_key(
            ForeignKey::create()
              .name("fk_brands_genre")
              .from(Brands::Table, Brands::GenreId)
              .to(Genres::Table, Genres::Id)
              .on_delete(ForeignKeyAction::SetNull),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_table(
        Table::create()
          .table(BrandAccess::Table)
          .if_not_exists()
          .col(ColumnDef::new(BrandAccess::BrandId).integer().not_null())
          .col(ColumnDef::new(BrandAccess::UserEmail).string().not_null())
          .col(ColumnDef::new(BrandAccess::Role).string().not_null())
          .col(ColumnDef::new(BrandAccess::CreatedAt).date_time().not_null())
          .primary_key(
            Index::create()
              .col(BrandAccess::BrandId)
              .col(BrandAccess::UserEmail),
          )
          .foreign_key(
            ForeignKey::create()
              .name("fk_brand_access_brand")
              .from(BrandAccess::Table, BrandAccess::BrandId)
              .to(Brands::Table, Brands::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_brand_access_user")
          .table(BrandAccess::Table)
          .col(BrandAccess::UserEmail)
          .to_owned(),
      )
      .await?;

    manager
      .create_table(
        Table::create()
          .table(BrandCommissions::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(BrandCommissions::BrandId)
              .integer()
              .not_null()
              .primary_key(),
          )
          .col(
            ColumnDef::new(BrandCommissions::BaseRate)
              .integer()
              .not_null()
              .default(5000),
          )
          .col(ColumnDef::new(BrandCommissions::MinRate).integer().null())
          .col(ColumnDef::new(BrandCommissions::MaxRate).integer().null())
          .col(
            ColumnDef::new(BrandCommissions::IsAutomatic)
              .boolean()
              .not_null()
              .default(false),
          )
          .col(
            ColumnDef::new(BrandCommissions::UpdatedAt).date_time().not_null(),
          )
          .foreign_key(
            ForeignKey::create()
              .name("fk_brand_commissions_brand")
              .from(BrandCommissions::Table, BrandCommissions::BrandId)
              .to(Brands::Table, Brands::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_table(
        Table::create()
          .table(CommissionTiers::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(CommissionTiers::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(CommissionTiers::BrandId).integer().not_null())
          .col(ColumnDef::new(CommissionTiers::Name).string().not_null())
          .col(
            ColumnDef::new(CommissionTiers::MinSales).big_integer().not_null(),
          )
          .col(ColumnDef::new(CommissionTiers::Rate).integer().not_null())
          .foreign_key(
            ForeignKey::create()
              .name("fk_commission_tiers_commission")
              .from(CommissionTiers::Table, CommissionTiers::BrandId)
              .to(BrandCommissions::Table, BrandCommissions::BrandId)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_commission_tiers_brand_sales")
          .table(CommissionTiers::Table)
          .col(CommissionTiers::BrandId)
          .col(CommissionTiers::MinSales)
          .unique()
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(CommissionTiers::Table).to_owned())
      .await?;
    manager
      .drop_table(Table::drop().table(BrandCommissions::Table).to_owned())
      .await?;
    manager
      .drop_table(Table::drop().table(BrandAccess::Table).to_owned())
      .await?;
    manager.drop_table(Table::drop().table(Brands::Table).to_owned()).await?;
    manager.drop_table(Table::drop().table(Genres::Table).to_owned()).await
  }
}

#[derive(DeriveIden)]
pub enum Genres {
  Table,
  Id,
  Name,
  BaseRate,
}

#[derive(DeriveIden)]
pub enum Brands {
  Table,
  Id,
  Name,
  GenreId,
  TotalSales,
  TotalEarnings,
  TotalCarved,
  TotalPaid,
  IsApproved,
  IsHidden,
  IsDeleted,
  CreatedAt,
}

#[derive(DeriveIden)]
pub enum BrandAccess {
  Table,
  BrandId,
  UserEmail,
  Role,
  CreatedAt,
}

#[derive(DeriveIden)]
pub enum BrandCommissions {
  Table,
  BrandId,
  BaseRate,
  MinRate,
  MaxRate,
  IsAutomatic,
  UpdatedAt,
}

#[derive(DeriveIden)]
pub enum CommissionTiers {
  Table,
  Id,
  BrandId,
  Name,
  MinSales,
  Rate,
}
