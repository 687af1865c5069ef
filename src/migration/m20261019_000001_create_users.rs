//! Migration: Create users table.
//!
//! Stores OAuth-linked identities. One row per (provider, external_id).

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(User::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(User::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(User::Provider).string_len(20).not_null())
                    .col(ColumnDef::new(User::ExternalId).string_len(255).not_null())
                    .col(ColumnDef::new(User::DisplayName).string_len(255).not_null())
                    .col(ColumnDef::new(User::Email).string_len(255).not_null())
                    .col(ColumnDef::new(User::AvatarUrl).string_len(500).null())
                    .col(
                        ColumnDef::new(User::LastLoginAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(User::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(User::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Races between concurrent first logins are settled here.
        manager
            .create_index(
                Index::create()
                    .name("idx_users_provider_external_id")
                    .table(User::Table)
                    .col(User::Provider)
                    .col(User::ExternalId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Email is unique except for the "no public email" placeholder.
        // Partial indexes are supported by both PostgreSQL and SQLite.
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE UNIQUE INDEX idx_users_email_public
                    ON users(email)
                    WHERE email <> 'No public email';
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(User::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum User {
    #[sea_orm(iden = "users")]
    Table,
    Id,
    Provider,
    ExternalId,
    DisplayName,
    Email,
    AvatarUrl,
    LastLoginAt,
    CreatedAt,
    UpdatedAt,
}
