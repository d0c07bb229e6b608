use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::prelude::*;
use sea_orm::{sea_query::Expr, QueryOrder, QuerySelect};
use shared::entity::signals;
use shared::report::hit_rates;
use shared::{HitRates, Signal, SignalStatus};

pub struct SignalRepository {
    db: Arc<DatabaseConnection>,
}

fn into_signals(models: Vec<signals::Model>) -> Vec<Signal> {
    models
        .into_iter()
        .filter_map(|model| {
            let id = model.id;
            match Signal::try_from(model) {
                Ok(signal) => Some(signal),
                Err(e) => {
                    tracing::warn!("Skipping unreadable signal row {}: {}", id, e);
                    None
                }
            }
        })
        .collect()
}

impl SignalRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Stores a new signal and returns it with its assigned id.
    pub async fn insert(&self, signal: &Signal) -> Result<Signal> {
        let mut model = signal.to_active_model();
        model.id = sea_orm::ActiveValue::NotSet;
        let saved = signals::Entity::insert(model)
            .exec_with_returning(self.db.as_ref())
            .await?;
        Ok(Signal::try_from(saved)?)
    }

    pub async fn find_by_id(&self, id: i32) -> Result<Option<Signal>> {
        let model = signals::Entity::find_by_id(id).one(self.db.as_ref()).await?;
        Ok(model.map(Signal::try_from).transpose()?)
    }

    pub async fn update_status(&self, id: i32, status: SignalStatus, hit_at: DateTime<Utc>) -> Result<()> {
        signals::Entity::update_many()
            .col_expr(signals::Column::Status, Expr::value(status.to_string()))
            .col_expr(signals::Column::HitTimestamp, Expr::value(Some(hit_at)))
            .filter(signals::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    pub async fn list_recent(&self, limit: u64) -> Result<Vec<Signal>> {
        let models = signals::Entity::find()
            .order_by_desc(signals::Column::CreatedAt)
            .limit(limit)
            .all(self.db.as_ref())
            .await?;
        Ok(into_signals(models))
    }

    /// Signals created in `[from, to)`.
    pub async fn list_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Signal>> {
        let models = signals::Entity::find()
            .filter(signals::Column::CreatedAt.gte(from))
            .filter(signals::Column::CreatedAt.lt(to))
            .order_by_asc(signals::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        Ok(into_signals(models))
    }

    pub async fn list_all(&self) -> Result<Vec<Signal>> {
        let models = signals::Entity::find()
            .order_by_asc(signals::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        Ok(into_signals(models))
    }

    pub async fn list_by_symbol(&self, symbol: &str, limit: u64) -> Result<Vec<Signal>> {
        let models = signals::Entity::find()
            .filter(signals::Column::Symbol.eq(symbol))
            .order_by_desc(signals::Column::CreatedAt)
            .limit(limit)
            .all(self.db.as_ref())
            .await?;
        Ok(into_signals(models))
    }

    /// Pending signals created after `since`, oldest first.
    pub async fn list_pending_since(&self, since: DateTime<Utc>) -> Result<Vec<Signal>> {
        let models = signals::Entity::find()
            .filter(signals::Column::Status.eq(SignalStatus::Pending.to_string()))
            .filter(signals::Column::CreatedAt.gte(since))
            .order_by_asc(signals::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        Ok(into_signals(models))
    }

    pub async fn hit_rates_for(&self, symbol: &str) -> Result<HitRates> {
        let statuses: Vec<String> = signals::Entity::find()
            .select_only()
            .column(signals::Column::Status)
            .filter(signals::Column::Symbol.eq(symbol))
            .into_tuple()
            .all(self.db.as_ref())
            .await?;
        Ok(hit_rates(statuses.iter().filter_map(|s| s.parse().ok())))
    }

    pub async fn count(&self) -> Result<usize> {
        let count = signals::Entity::find().count(self.db.as_ref()).await?;
        Ok(count as usize)
    }
}
