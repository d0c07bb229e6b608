use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect};
use serde::Deserialize;
use serde_json::{json, Value};
use shared::entity::signals;
use shared::{Signal, SignalStatus, SignalSummary};

use crate::error::ApiError;

#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<DatabaseConnection>,
    pub max_page_size: u64,
}

#[derive(Debug, Deserialize)]
pub struct SignalsQuery {
    #[serde(default = "default_limit")]
    limit: u64,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

fn default_limit() -> u64 {
    50
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    #[serde(default)]
    symbol: Option<String>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/signals", get(list_signals))
        .route("/api/signals/:id", get(get_signal))
        .route("/api/summary", get(summary))
        .with_state(state)
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn to_signals(models: Vec<signals::Model>) -> Result<Vec<Signal>, ApiError> {
    models
        .into_iter()
        .map(|m| Signal::try_from(m).map_err(ApiError::from))
        .collect()
}

async fn list_signals(
    State(state): State<ApiState>,
    Query(q): Query<SignalsQuery>,
) -> Result<Json<Vec<Signal>>, ApiError> {
    let limit = q.limit.clamp(1, state.max_page_size.max(1));
    let mut query = signals::Entity::find()
        .order_by_desc(signals::Column::CreatedAt)
        .limit(limit);
    if let Some(symbol) = q.symbol {
        query = query.filter(signals::Column::Symbol.eq(symbol.to_uppercase()));
    }
    if let Some(status) = q.status {
        let status: SignalStatus = status
            .parse()
            .map_err(|_| ApiError::BadRequest(format!("unknown status '{status}'")))?;
        query = query.filter(signals::Column::Status.eq(status.to_string()));
    }
    let models = query.all(state.db.as_ref()).await?;
    Ok(Json(to_signals(models)?))
}

async fn get_signal(State(state): State<ApiState>, Path(id): Path<i32>) -> Result<Json<Signal>, ApiError> {
    let model = signals::Entity::find_by_id(id)
        .one(state.db.as_ref())
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("signal {id}")))?;
    Ok(Json(Signal::try_from(model)?))
}

async fn summary(
    State(state): State<ApiState>,
    Query(q): Query<SummaryQuery>,
) -> Result<Json<SignalSummary>, ApiError> {
    let mut query = signals::Entity::find();
    if let Some(symbol) = q.symbol {
        query = query.filter(signals::Column::Symbol.eq(symbol.to_uppercase()));
    }
    let signals = to_signals(query.all(state.db.as_ref()).await?)?;
    Ok(Json(SignalSummary::from_signals(&signals)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::ActiveModelTrait;
    use shared::{Direction, TradeType};
    use tower::ServiceExt;

    fn signal(symbol: &str, status: SignalStatus) -> Signal {
        Signal {
            id: None,
            symbol: symbol.to_string(),
            direction: Direction::Short,
            entry: 2.0,
            confidence: 78.0,
            timeframe: "15m/1h".to_string(),
            conditions: vec!["Bearish MACD".to_string()],
            tp1: 1.98,
            tp2: 1.97,
            tp3: 1.96,
            sl: 2.02,
            tp1_possibility: 60.0,
            tp2_possibility: 42.0,
            tp3_possibility: 30.0,
            volume: 1000.0,
            trade_type: TradeType::Swing,
            trade_duration: "Up to 1 hour".to_string(),
            leverage: "20x".to_string(),
            quote_volume_24h: 3_000_000.0,
            agreement: 50.0,
            atr: 0.01,
            timestamp: Utc::now(),
            status,
            hit_timestamp: None,
        }
    }

    async fn app() -> Router {
        let db = shared::get_db_connection("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        for (symbol, status) in [
            ("XRP/USDT", SignalStatus::Tp1),
            ("XRP/USDT", SignalStatus::Sl),
            ("ADA/USDT", SignalStatus::Pending),
        ] {
            signal(symbol, status).to_active_model().insert(&db).await.unwrap();
        }
        router(ApiState {
            db: Arc::new(db),
            max_page_size: 100,
        })
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let res = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = res.status();
        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get_json(app().await, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_list_signals_filters() {
        let (status, body) = get_json(app().await, "/api/signals?limit=2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);

        let (_, body) = get_json(app().await, "/api/signals?symbol=xrp/usdt").await;
        assert_eq!(body.as_array().unwrap().len(), 2);

        let (_, body) = get_json(app().await, "/api/signals?status=sl").await;
        let rows = body.as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["direction"], "SHORT");

        let (status, _) = get_json(app().await, "/api/signals?status=moon").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_signal() {
        let (status, body) = get_json(app().await, "/api/signals/1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], 1);

        let (status, _) = get_json(app().await, "/api/signals/999").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_summary() {
        let (status, body) = get_json(app().await, "/api/summary").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 3);
        assert_eq!(body["pending"], 1);
        assert_eq!(body["hit_rates"]["resolved"], 2);

        let (_, body) = get_json(app().await, "/api/summary?symbol=ADA/USDT").await;
        assert_eq!(body["total"], 1);
    }
}
