//! `SeaORM` Entity, @generated manually

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "signals")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub symbol: String,
    pub direction: String, // "LONG" or "SHORT"
    #[sea_orm(column_type = "Double")]
    pub entry: f64,
    #[sea_orm(column_type = "Double")]
    pub confidence: f64,
    pub timeframe: String, // "1h" or "15m/1h/4h" when aggregated
    #[sea_orm(column_type = "Text")]
    pub conditions: String, // comma-joined condition names
    #[sea_orm(column_type = "Double")]
    pub tp1: f64,
    #[sea_orm(column_type = "Double")]
    pub tp2: f64,
    #[sea_orm(column_type = "Double")]
    pub tp3: f64,
    #[sea_orm(column_type = "Double")]
    pub sl: f64,
    #[sea_orm(column_type = "Double")]
    pub tp1_possibility: f64,
    #[sea_orm(column_type = "Double")]
    pub tp2_possibility: f64,
    #[sea_orm(column_type = "Double")]
    pub tp3_possibility: f64,
    #[sea_orm(column_type = "Double")]
    pub volume: f64,
    pub trade_type: String,
    pub trade_duration: String,
    pub leverage: String,
    #[sea_orm(column_type = "Double")]
    pub quote_volume_24h: f64,
    #[sea_orm(column_type = "Double")]
    pub agreement: f64,
    #[sea_orm(column_type = "Double")]
    pub atr: f64,
    pub status: String, // "pending", "tp1", "tp2", "tp3", "sl"
    pub created_at: DateTimeUtc,
    pub hit_timestamp: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
