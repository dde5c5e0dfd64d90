use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket},
        FromRequest, Path, Query, Request, State, WebSocketUpgrade,
    },
    http::{HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, info, warn};

use crate::book::BookSnapshot;
use crate::broadcaster::ChannelSink;
use crate::errors::EngineError;
use crate::manager::MarketDataEvent;
use crate::order::{OrderId, OrderKind, Side};
use crate::pipeline::NewOrderRequest;
use crate::position::Position;
use crate::price::Price;
use crate::state::AppState;
use crate::symbol::Symbol;
use crate::trade::Trade;
use crate::wire::{top_event, trade_event};

type ApiErr = (StatusCode, Json<serde_json::Value>);

fn err(status: StatusCode, msg: &str) -> ApiErr {
    (status, Json(json!({ "error": msg })))
}

fn engine_err(e: EngineError) -> ApiErr {
    match e {
        EngineError::InvalidQuantity | EngineError::InvalidPrice => err(StatusCode::BAD_REQUEST, &e.to_string()),
        EngineError::EngineShutDown => err(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

/// A JSON body extractor that logs the reason for any rejection before
/// returning it, so a bad request leaves a trail in the logs as well as
/// in the response.
pub struct LoggedJson<T>(pub T);

impl<S, T> FromRequest<S> for LoggedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiErr;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let method = req.method().clone();
        let uri = req.uri().clone();
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| err(StatusCode::BAD_REQUEST, &e.to_string()))?;

        match serde_json::from_slice::<T>(&bytes) {
            Ok(val) => Ok(LoggedJson(val)),
            Err(e) => {
                let preview = String::from_utf8_lossy(&bytes);
                let preview = &preview[..preview.len().min(4096)];
                warn!(error = %e, %method, uri = %uri, body_preview = %preview, "request body rejected");
                Err(err(StatusCode::UNPROCESSABLE_ENTITY, &e.to_string()))
            }
        }
    }
}

fn default_limit() -> usize {
    100
}

const MAX_TRADES_PAGE: usize = 1000;

#[derive(Deserialize)]
pub struct TradesQuery {
    #[serde(default = "default_limit")]
    limit: usize,
    after: Option<String>,
}

#[derive(Serialize)]
pub struct TradesPage {
    items: Vec<Trade>,
    next: Option<String>,
}

/// Request payload for `POST /orders`.
#[derive(Deserialize)]
pub struct NewOrder {
    pub side: Side,
    pub order_type: OrderKind,
    #[serde(default)]
    pub price: f64,
    pub quantity: u32,
    pub symbol: Symbol,
}

#[derive(Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: OrderId,
    pub trades: Vec<Trade>,
}

/// `GET /trades/{symbol}?limit=&after=`
///
/// Cursor-paginated trade history. `limit` is clamped to
/// [`MAX_TRADES_PAGE`]; the clamped value is echoed back in the
/// `x-effective-limit` response header.
pub async fn get_trade_log(
    Path(symbol): Path<Symbol>,
    State(state): State<AppState>,
    Query(q): Query<TradesQuery>,
) -> Result<impl IntoResponse, ApiErr> {
    let limit = q.limit.min(MAX_TRADES_PAGE);
    let (items, next) = {
        let store = state.pipeline.store.lock().await;
        store
            .page_trade_asc(symbol.as_str(), q.after.as_deref(), limit)
            .map_err(|e| err(StatusCode::BAD_REQUEST, &e.to_string()))?
    };
    let mut response = Json(TradesPage { items, next }).into_response();
    response
        .headers_mut()
        .insert("x-effective-limit", HeaderValue::from_str(&limit.to_string()).unwrap());
    Ok(response)
}

/// `GET /book/{symbol}`
pub async fn get_order_book(Path(symbol): Path<Symbol>, State(state): State<AppState>) -> Result<Json<BookSnapshot>, ApiErr> {
    let snapshot = state.pipeline.book_snapshot(symbol).await.map_err(engine_err)?;
    Ok(Json(snapshot))
}

/// `GET /positions/{symbol}`
pub async fn get_position(Path(symbol): Path<Symbol>, State(state): State<AppState>) -> Json<Position> {
    Json(state.pipeline.ledger.position(&symbol))
}

/// `POST /orders`
pub async fn create_order(State(state): State<AppState>, LoggedJson(payload): LoggedJson<NewOrder>) -> Result<Json<OrderAck>, ApiErr> {
    let request = NewOrderRequest {
        order_id: None,
        symbol: payload.symbol,
        side: payload.side,
        kind: payload.order_type,
        price: Price::from_f64(payload.price),
        quantity: payload.quantity,
        timestamp: None,
    };
    let (order_id, trades) = state.pipeline.submit(request).await.map_err(engine_err)?;
    Ok(Json(OrderAck { order_id, trades }))
}

/// `DELETE /orders/{symbol}/{id}`
pub async fn cancel_order(State(state): State<AppState>, Path((symbol, order_id)): Path<(Symbol, OrderId)>) -> impl IntoResponse {
    match state.pipeline.cancel(symbol, order_id).await {
        Ok(crate::book::CancelOutcome::Cancelled) => {
            info!(order_id, "order cancelled");
            (StatusCode::OK, Json(json!({ "status": "cancelled" }))).into_response()
        }
        Ok(crate::book::CancelOutcome::NotFound) => {
            warn!(order_id, "cancel failed: order not found");
            err(StatusCode::NOT_FOUND, "order not found").into_response()
        }
        Err(e) => engine_err(e).into_response(),
    }
}

/// `GET /ws/{symbol}`
///
/// Upgrades to a WebSocket and streams an initial book snapshot followed
/// by live trade and top-of-book events for `symbol`.
pub async fn ws_handler(Path(symbol): Path<Symbol>, State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, symbol))
}

pub async fn handle_socket(mut socket: WebSocket, state: AppState, symbol: Symbol) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    state.pipeline.broadcaster.register(Box::new(ChannelSink(tx)));

    let initial = match state.pipeline.book_snapshot(symbol.clone()).await {
        Ok(snap) => snap,
        Err(_) => BookSnapshot::empty(symbol.clone()),
    };
    let frame = json!({
        "type": "snapshot",
        "symbol": initial.symbol,
        "bids": initial.bids.iter().map(|(p, q)| json!({"price": p.to_f64(), "qty": q})).collect::<Vec<_>>(),
        "asks": initial.asks.iter().map(|(p, q)| json!({"price": p.to_f64(), "qty": q})).collect::<Vec<_>>(),
    });
    if let Err(e) = socket.send(Message::Text(frame.to_string().into())).await {
        error!(error = ?e, "failed to send initial book snapshot");
        return;
    }

    while let Some(event) = rx.recv().await {
        let wire = match &event {
            MarketDataEvent::Trade(trade) => {
                if trade.symbol != symbol {
                    continue;
                }
                trade_event(trade)
            }
            MarketDataEvent::TopChanged(top) => {
                if top.symbol != symbol {
                    continue;
                }
                let snapshot = match state.pipeline.book_snapshot(symbol.clone()).await {
                    Ok(snap) => snap,
                    Err(_) => BookSnapshot::empty(symbol.clone()),
                };
                top_event(top, snapshot.bids, snapshot.asks)
            }
        };
        let text = serde_json::to_string(&wire).unwrap();
        if let Err(e) = socket.send(Message::Text(text.into())).await {
            error!(error = ?e, "websocket send failed");
            break;
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/{symbol}/{id}", delete(cancel_order))
        .route("/trades/{symbol}", get(get_trade_log))
        .route("/book/{symbol}", get(get_order_book))
        .route("/positions/{symbol}", get(get_position))
        .route("/ws/{symbol}", get(ws_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(false).level(tracing::Level::TRACE))
                .on_response(DefaultOnResponse::new().level(tracing::Level::TRACE)),
        )
        .with_state(state)
}
