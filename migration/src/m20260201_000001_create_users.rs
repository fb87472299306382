use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(Users::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(Users::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(Users::Email).string().not_null().unique_key())
          .col(
            ColumnDef::new(Users::Role).string().not_null().default("user"),
          )
          .col(ColumnDef::new(Users::ReferredByEmail).string().null())
          .col(
            ColumnDef::new(Users::ReferralPaid)
              .big_integer()
              .not_null()
              .default(0),
          )
          .col(ColumnDef::new(Users::CreatedAt).date_time().not_null())
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_users_referred_by")
          .table(Users::Table)
          .col(Users::ReferredByEmail)
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager.drop_table(Table::drop().table(Users::Table).to_owned()).await
  }
}

#[derive(DeriveIden)]
pub enum Users {
  Table,
  Id,
  Email,
  Role,
  ReferredByEmail,
  ReferralPaid,
  CreatedAt,
}
