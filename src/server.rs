//! HTTP control surface over a running feed driver.
//!
//! - `GET  /api/state`            current snapshot
//! - `GET  /api/history?limit=N`  display window, oldest first
//! - `GET  /api/prices?symbol=S&limit=N`  stored points, oldest first
//! - `POST /api/excursion/start`  `{ "target_price": .., "duration_secs": .. }`
//! - `POST /api/excursion/stop`
//! - `POST /api/symbol`           `{ "symbol": "ETHUSDT" }`
//! - `POST /api/resume`
//! - `GET  /api/coins`
//! - `GET  /api/schema`

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::{CommandError, StoreError};
use crate::event::{FeedHandle, FeedSnapshot};
use crate::model::coin::{find_coin, Coin, COINS};
use crate::model::price_point::PricePoint;
use crate::price_store::PriceStore;

const MAX_QUERY_LIMIT: usize = 1000;

#[derive(Clone)]
pub struct ServerState<P> {
    pub feed: FeedHandle,
    pub store: P,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

impl From<CommandError> for ApiError {
    fn from(err: CommandError) -> Self {
        let status = match &err {
            CommandError::Simulation(crate::error::SimulationError::InvalidTransition { .. }) => {
                StatusCode::CONFLICT
            }
            CommandError::Simulation(_) | CommandError::UnknownSymbol(_) => StatusCode::BAD_REQUEST,
            CommandError::Halted(_) | CommandError::DriverUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            CommandError::Store(e) if e.is_not_initialized() => StatusCode::SERVICE_UNAVAILABLE,
            CommandError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let status = if err.is_not_initialized() {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub target_price: f64,
    pub duration_secs: f64,
}

#[derive(Debug, Deserialize)]
pub struct SymbolRequest {
    pub symbol: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PricesQuery {
    pub symbol: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Serialize)]
struct SchemaBody {
    schema: String,
}

pub fn router<P>(state: ServerState<P>) -> Router
where
    P: PriceStore + Clone + 'static,
{
    Router::new()
        .route("/api/state", get(get_state::<P>))
        .route("/api/history", get(get_history::<P>))
        .route("/api/prices", get(get_prices::<P>))
        .route("/api/excursion/start", post(start_excursion::<P>))
        .route("/api/excursion/stop", post(stop_excursion::<P>))
        .route("/api/symbol", post(select_symbol::<P>))
        .route("/api/resume", post(resume::<P>))
        .route("/api/coins", get(get_coins))
        .route("/api/schema", get(get_schema::<P>))
        .with_state(state)
}

pub async fn serve<P>(listener: tokio::net::TcpListener, state: ServerState<P>) -> anyhow::Result<()>
where
    P: PriceStore + Clone + 'static,
{
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "HTTP control surface listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn get_state<P>(State(state): State<ServerState<P>>) -> Json<FeedSnapshot> {
    Json(state.feed.snapshot())
}

async fn get_history<P>(
    State(state): State<ServerState<P>>,
    Query(query): Query<HistoryQuery>,
) -> Json<Vec<PricePoint>> {
    let window = state.feed.snapshot().window;
    let limit = query.limit.unwrap_or(window.len());
    let skip = window.len().saturating_sub(limit);
    Json(window.into_iter().skip(skip).collect())
}

async fn get_prices<P>(
    State(state): State<ServerState<P>>,
    Query(query): Query<PricesQuery>,
) -> Result<Json<Vec<PricePoint>>, ApiError>
where
    P: PriceStore + Clone + 'static,
{
    let symbol = match query.symbol {
        Some(s) => find_coin(&s)
            .ok_or(CommandError::UnknownSymbol(s))?
            .symbol
            .to_string(),
        None => state.feed.snapshot().symbol,
    };
    let limit = query.limit.unwrap_or(100).min(MAX_QUERY_LIMIT);
    let points = state.store.history(&symbol, limit).await?;
    Ok(Json(points))
}

async fn start_excursion<P>(
    State(state): State<ServerState<P>>,
    Json(req): Json<StartRequest>,
) -> Result<Json<FeedSnapshot>, ApiError> {
    let snapshot = state
        .feed
        .start_excursion(req.target_price, req.duration_secs)
        .await?;
    Ok(Json(snapshot))
}

async fn stop_excursion<P>(
    State(state): State<ServerState<P>>,
) -> Result<Json<FeedSnapshot>, ApiError> {
    Ok(Json(state.feed.stop_excursion().await?))
}

async fn select_symbol<P>(
    State(state): State<ServerState<P>>,
    Json(req): Json<SymbolRequest>,
) -> Result<Json<FeedSnapshot>, ApiError> {
    Ok(Json(state.feed.select_symbol(&req.symbol).await?))
}

async fn resume<P>(State(state): State<ServerState<P>>) -> Result<Json<FeedSnapshot>, ApiError> {
    Ok(Json(state.feed.resume().await?))
}

async fn get_coins() -> Json<&'static [Coin]> {
    Json(COINS)
}

async fn get_schema<P>(State(state): State<ServerState<P>>) -> Json<SchemaBody>
where
    P: PriceStore + Clone + 'static,
{
    Json(SchemaBody {
        schema: state.store.schema(),
    })
}
