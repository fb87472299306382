use sea_orm_migration::prelude::*;

use super::m20260201_000002_create_brands::Brands;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(Orders::Table)
          .if_not_exists()
          .col(ColumnDef::new(Orders::Id).string().not_null().primary_key())
          .col(ColumnDef::new(Orders::BrandId).integer().not_null())
          .col(ColumnDef::new(Orders::TotalAmount).big_integer().not_null())
          .col(ColumnDef::new(Orders::BrandRate).integer().not_null())
          .col(ColumnDef::new(Orders::BrandEarnings).big_integer().not_null())
          .col(ColumnDef::new(Orders::PlatformShare).big_integer().not_null())
          .col(ColumnDef::new(Orders::AffiliateId).integer().null())
          .col(
            ColumnDef::new(Orders::AffiliateDue)
              .big_integer()
              .not_null()
              .default(0),
          )
          .col(ColumnDef::new(Orders::ReferrerEmail).string().null())
          .col(
            ColumnDef::new(Orders::ReferralEarnings)
              .big_integer()
              .not_null()
              .default(0),
          )
          .col(ColumnDef::new(Orders::CustomerEmail).string().null())
          .col(ColumnDef::new(Orders::CreatedAt).date_time().not_null())
          .foreign_key(
            ForeignKey::create()
              .name("fk_orders_brand")
              .from(Orders::Table, Orders::BrandId)
              .to(Brands::Table, Brands::Id)
              .on_delete(ForeignKeyAction::Restrict),
          )
          .to_owned(),
      )
      .await?;

    for (name, col) in [
      ("idx_orders_brand", Orders::BrandId),
      ("idx_orders_affiliate", Orders::AffiliateId),
      ("idx_orders_referrer", Orders::ReferrerEmail),
    ] {
      manager
        .create_index(
          Index::create()
            .name(name)
            .table(Orders::Table)
            .col(col)
            .to_owned(),
        )
        .await?;
    }

    manager
      .create_table(
        Table::create()
          .table(PlatformReferrals::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(PlatformReferrals::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(
            ColumnDef::new(PlatformReferrals::ReferrerEmail)
              .string()
              .not_null(),
          )
          .col(
            ColumnDef::new(PlatformReferrals::ReferredEmail)
              .string()
              .not_null()
              .unique_key(),
          )
          .col(
            ColumnDef::new(PlatformReferrals::ReferralLinkId)
              .string()
              .not_null(),
          )
          .col(
            ColumnDef::new(PlatformReferrals::Earnings)
              .big_integer()
              .not_null()
              .default(0),
          )
          .col(
            ColumnDef::new(PlatformReferrals::Status)
              .string()
              .not_null()
              .default("pending"),
          )
          .col(
            ColumnDef::new(PlatformReferrals::CreatedAt)
              .date_time()
              .not_null(),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_platform_referrals_referrer")
          .table(PlatformReferrals::Table)
          .col(PlatformReferrals::ReferrerEmail)
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(PlatformReferrals::Table).to_owned())
      .await?;
    manager.drop_table(Table::drop().table(Orders::Table).to_owned()).await
  }
}

#[derive(DeriveIden)]
pub enum Orders {
  Table,
  Id,
  BrandId,
  TotalAmount,
  BrandRate,
  BrandEarnings,
  PlatformShare,
  AffiliateId,
  AffiliateDue,
  ReferrerEmail,
  ReferralEarnings,
  CustomerEmail,
  CreatedAt,
}

#[derive(DeriveIden)]
pub enum PlatformReferrals {
  Table,
  Id,
  ReferrerEmail,
  ReferredEmail,
  ReferralLinkId,
  Earnings,
  Status,
  CreatedAt,
}
