use std::time::Duration;

use axum::Router;
use futures_util::StreamExt;
use lob_engine::{api::router, state::AppState};
use serde_json::{Value, json};
use tempfile::tempdir;
use tokio::net::TcpListener;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn spawn_server() -> (String, tokio::task::JoinHandle<()>, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let state = AppState::new(dir.path()).await.unwrap();
    let app: Router = router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base = format!("http://{addr}");

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = reqwest::Client::new();
    let ok = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let Ok(r) = client.get(format!("{base}/book/BTC-USD")).send().await {
                if r.status().is_success() {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .is_ok();
    assert!(ok, "server did not become ready in time");

    (base, handle, dir)
}

async fn next_frame(ws: &mut WsStream) -> Value {
    let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("ws recv timeout")
        .expect("ws closed")
        .expect("ws error");
    match msg {
        Message::Text(t) => serde_json::from_str(&t).expect("parse frame"),
        other => panic!("expected text frame, got {other:?}"),
    }
}

#[tokio::test]
async fn websocket_snapshot_and_trade_flow() {
    let (http_base, server, _tmpdir) = spawn_server().await;
    let ws_url = http_base.replace("http://", "ws://") + "/ws/BTC-USD";

    let (mut ws, _resp) = connect_async(&ws_url).await.expect("ws connect");

    let snapshot = next_frame(&mut ws).await;
    assert_eq!(snapshot["type"], "snapshot");
    assert_eq!(snapshot["symbol"], "BTC-USD");
    assert!(snapshot["bids"].as_array().unwrap().is_empty());

    let client = reqwest::Client::new();
    let rest_order = json!({
        "side": "Buy",
        "order_type": "Limit",
        "price": 48,
        "quantity": 5,
        "symbol": "BTC-USD"
    });
    let r = client.post(format!("{http_base}/orders")).json(&rest_order).send().await.unwrap();
    assert!(r.status().is_success());

    let top = next_frame(&mut ws).await;
    assert_eq!(top["type"], "top");
    assert_eq!(top["bestBid"], 48.0);
    assert_eq!(top["bids"][0]["price"], 48.0);
    assert_eq!(top["bids"][0]["qty"], 5);

    let market_sell = json!({
        "side": "Sell",
        "order_type": "Market",
        "quantity": 2,
        "symbol": "BTC-USD"
    });
    let r = client.post(format!("{http_base}/orders")).json(&market_sell).send().await.unwrap();
    assert!(r.status().is_success());

    let trade = next_frame(&mut ws).await;
    assert_eq!(trade["type"], "trade");
    assert_eq!(trade["price"], 48.0);
    assert_eq!(trade["quantity"], 2);

    server.abort();
}
