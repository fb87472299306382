use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(Activities::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(Activities::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(Activities::Kind).string().not_null())
          .col(ColumnDef::new(Activities::BrandId).integer().null())
          .col(ColumnDef::new(Activities::UserEmail).string().null())
          .col(ColumnDef::new(Activities::OrderId).string().null())
          .col(ColumnDef::new(Activities::Payload).text().not_null())
          .col(ColumnDef::new(Activities::CreatedAt).date_time().not_null())
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_activities_brand")
          .table(Activities::Table)
          .col(Activities::BrandId)
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(Activities::Table).to_owned())
      .await
  }
}

#[derive(DeriveIden)]
pub enum Activities {
  Table,
  Id,
  Kind,
  BrandId,
  UserEmail,
  OrderId,
  Payload,
  CreatedAt,
}
