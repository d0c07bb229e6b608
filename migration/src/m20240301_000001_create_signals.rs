use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Signals::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Signals::Id).integer().not_null().auto_increment().primary_key())
                    .col(ColumnDef::new(Signals::Symbol).string().not_null()) // "BTC/USDT"
                    .col(ColumnDef::new(Signals::Direction).string().not_null()) // "LONG" or "SHORT"
                    .col(ColumnDef::new(Signals::Entry).double().not_null())
                    .col(ColumnDef::new(Signals::Confidence).double().not_null())
                    .col(ColumnDef::new(Signals::Timeframe).string().not_null())
                    .col(ColumnDef::new(Signals::Conditions).text().not_null())
                    .col(ColumnDef::new(Signals::Tp1).double().not_null())
                    .col(ColumnDef::new(Signals::Tp2).double().not_null())
                    .col(ColumnDef::new(Signals::Tp3).double().not_null())
                    .col(ColumnDef::new(Signals::Sl).double().not_null())
                    .col(ColumnDef::new(Signals::Tp1Possibility).double().not_null())
                    .col(ColumnDef::new(Signals::Tp2Possibility).double().not_null())
                    .col(ColumnDef::new(Signals::Tp3Possibility).double().not_null())
                    .col(ColumnDef::new(Signals::Volume).double().not_null())
                    .col(ColumnDef::new(Signals::TradeType).string().not_null())
                    .col(ColumnDef::new(Signals::TradeDuration).string().not_null())
                    .col(ColumnDef::new(Signals::Leverage).string().not_null())
                    .col(ColumnDef::new(Signals::QuoteVolume24h).double().not_null())
                    .col(ColumnDef::new(Signals::Agreement).double().not_null())
                    .col(ColumnDef::new(Signals::Atr).double().not_null())
                    .col(ColumnDef::new(Signals::Status).string().not_null().default("pending")) // "pending", "tp1".."tp3", "sl"
                    .col(ColumnDef::new(Signals::CreatedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Signals::HitTimestamp).timestamp_with_time_zone().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_signals_symbol_created")
                    .table(Signals::Table)
                    .col(Signals::Symbol)
                    .col(Signals::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_signals_status")
                    .table(Signals::Table)
                    .col(Signals::Status)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Signals::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Signals {
    Table,
    Id,
    Symbol,
    Direction,
    Entry,
    Confidence,
    Timeframe,
    Conditions,
    Tp1,
    Tp2,
    Tp3,
    Sl,
    Tp1Possibility,
    Tp2Possibility,
    Tp3Possibility,
    Volume,
    TradeType,
    TradeDuration,
    Leverage,
    #[sea_orm(iden = "quote_volume_24h")]
    QuoteVolume24h,
    Agreement,
    Atr,
    Status,
    CreatedAt,
    HitTimestamp,
}
