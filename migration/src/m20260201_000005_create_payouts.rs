use sea_orm_migration::prelude::*;

use super::m20260201_000001_create_users::Users;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(PaymentMethods::Table)
          .if_not_exists()
          .col(ColumnDef::new(PaymentMethods::UserId).integer().not_null())
          .col(ColumnDef::new(PaymentMethods::Provider).string().not_null())
          .col(ColumnDef::new(PaymentMethods::Destination).string().not_null())
          .col(ColumnDef::new(PaymentMethods::CreatedAt).date_time().not_null())
          .primary_key(
            Index::create()
              .col(PaymentMethods::UserId)
              .col(PaymentMethods::Provider),
          )
          .foreign_key(
            ForeignKey::create()
              .name("fk_payment_methods_user")
              .from(PaymentMethods::Table, PaymentMethods::UserId)
              .to(Users::Table, Users::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_table(
        Table::create()
          .table(Payouts::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(Payouts::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(Payouts::UserId).integer().not_null())
          .col(ColumnDef::new(Payouts::Amount).big_integer().not_null())
          .col(ColumnDef::new(Payouts::Status).string().not_null())
          .col(
            ColumnDef::new(Payouts::IdempotencyKey)
              .string()
              .not_null()
              .unique_key(),
          )
          .col(ColumnDef::new(Payouts::Provider).string().not_null())
          .col(ColumnDef::new(Payouts::Destination).string().not_null())
          .col(ColumnDef::new(Payouts::TransferId).string().null())
          .col(ColumnDef::new(Payouts::Failure).string().null())
          .col(ColumnDef::new(Payouts::CreatedAt).date_time().not_null())
          .col(ColumnDef::new(Payouts::SettledAt).date_time().null())
          .foreign_key(
            ForeignKey::create()
              .name("fk_payouts_user")
              .from(Payouts::Table, Payouts::UserId)
              .to(Users::Table, Users::Id)
              .on_delete(ForeignKeyAction::Restrict),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_payouts_user_status")
          .table(Payouts::Table)
          .col(Payouts::UserId)
          .col(Payouts::Status)
          .to_owned(),
      )
      .await?;

    manager
      .create_table(
        Table::create()
          .table(PayoutAllocations::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(PayoutAllocations::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(PayoutAllocations::PayoutId).integer().not_null())
          .col(ColumnDef::new(PayoutAllocations::Source).string().not_null())
          .col(ColumnDef::new(PayoutAllocations::SourceId).integer().null())
          .col(
            ColumnDef::new(PayoutAllocations::Amount).big_integer().not_null(),
          )
          .foreign_key(
            ForeignKey::create()
              .name("fk_payout_allocations_payout")
              .from(PayoutAllocations::Table, PayoutAllocations::PayoutId)
              .to(Payouts::Table, Payouts::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(PayoutAllocations::Table).to_owned())
      .await?;
    manager.drop_table(Table::drop().table(Payouts::Table).to_owned()).await?;
    manager
      .drop_table(Table::drop().table(PaymentMethods::Table).to_owned())
      .await
  }
}

#[derive(DeriveIden)]
pub enum PaymentMethods {
  Table,
  UserId,
  Provider,
  Destination,
  CreatedAt,
}

#[derive(DeriveIden)]
pub enum Payouts {
  Table,
  Id,
  UserId,
  Amount,
  Status,
  IdempotencyKey,
  Provider,
  Destination,
  TransferId,
  Failure,
  CreatedAt,
  SettledAt,
}

#[derive(DeriveIden)]
pub enum PayoutAllocations {
  Table,
  Id,
  PayoutId,
  Source,
  SourceId,
  Amount,
}
