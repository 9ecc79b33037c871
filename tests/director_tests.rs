// ABOUTME: Integration tests for the director connector against a live mock server
// ABOUTME: Verifies event ordering, drop-when-disconnected, and bot_reply dispatch

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};

use twitch_bridge::director::DirectorConnector;
use twitch_bridge::events::{
    BotReply, ConnectionState, RawMessage, EVENT_SCORED, EVENT_TWITCH_MESSAGE,
};

struct MockState {
    received_tx: mpsc::UnboundedSender<serde_json::Value>,
    push_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
}

/// Start a mock director. Returns its address, a receiver yielding every JSON
/// frame the bridge sends, and a sender that pushes raw frames to the bridge.
async fn start_mock_director() -> (
    SocketAddr,
    mpsc::UnboundedReceiver<serde_json::Value>,
    mpsc::UnboundedSender<String>,
) {
    let (received_tx, received_rx) = mpsc::unbounded_channel();
    let (push_tx, push_rx) = mpsc::unbounded_channel();

    let state = Arc::new(MockState {
        received_tx,
        push_rx: Mutex::new(Some(push_rx)),
    });

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, received_rx, push_tx)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<MockState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_mock(socket, state))
}

async fn serve_mock(mut socket: WebSocket, state: Arc<MockState>) {
    let mut push_rx = state.push_rx.lock().await.take();
    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        if let Ok(value) = serde_json::from_str(&text) {
                            let _ = state.received_tx.send(value);
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(_)) | None => return,
                }
            }
            pushed = async {
                match push_rx.as_mut() {
                    Some(rx) => rx.recv().await,
                    None => std::future::pending().await,
                }
            } => {
                match pushed {
                    Some(frame) => {
                        if socket.send(WsMessage::Text(frame.into())).await.is_err() {
                            return;
                        }
                    }
                    None => return,
                }
            }
        }
    }
}

async fn wait_for_connected(connector: &DirectorConnector) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if connector.state() == ConnectionState::Connected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("connector never reached Connected");
}

async fn next_frame(rx: &mut mpsc::UnboundedReceiver<serde_json::Value>) -> serde_json::Value {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a frame")
        .expect("mock server channel closed")
}

#[tokio::test]
async fn test_events_arrive_in_send_order_with_wire_shape() {
    let (addr, mut received, _push) = start_mock_director().await;
    let connector = DirectorConnector::new(format!("ws://{addr}/ws"));
    connector.start();
    wait_for_connected(&connector).await;

    connector.send(
        EVENT_TWITCH_MESSAGE,
        &RawMessage {
            username: "viewer1".to_string(),
            message: "hey somebot".to_string(),
        },
    );
    connector.send(
        EVENT_SCORED,
        &serde_json::json!({
            "source_str": "TWITCH_MENTION",
            "text": "hey somebot",
            "metadata": {
                "username": "viewer1",
                "mentioned_bot": true,
                "message_length": 11,
                "relevance": 0.5,
            },
            "username": "viewer1",
        }),
    );

    let first = next_frame(&mut received).await;
    assert_eq!(first["event"], "twitch_message");
    assert_eq!(first["data"]["username"], "viewer1");
    assert_eq!(first["data"]["message"], "hey somebot");

    let second = next_frame(&mut received).await;
    assert_eq!(second["event"], "event");
    assert_eq!(second["data"]["source_str"], "TWITCH_MENTION");
    assert_eq!(second["data"]["metadata"]["mentioned_bot"], true);
    assert_eq!(second["data"]["metadata"]["relevance"], 0.5);

    connector.stop();
}

#[tokio::test]
async fn test_send_while_disconnected_drops_without_error() {
    let (addr, mut received, _push) = start_mock_director().await;
    let connector = DirectorConnector::new(format!("ws://{addr}/ws"));

    // Not started yet: this send is dropped on the floor.
    connector.send(
        EVENT_TWITCH_MESSAGE,
        &RawMessage {
            username: "early".to_string(),
            message: "too soon".to_string(),
        },
    );

    connector.start();
    wait_for_connected(&connector).await;

    connector.send(
        EVENT_TWITCH_MESSAGE,
        &RawMessage {
            username: "viewer1".to_string(),
            message: "after connect".to_string(),
        },
    );

    // Only the post-connect message arrives.
    let frame = next_frame(&mut received).await;
    assert_eq!(frame["data"]["username"], "viewer1");

    let extra = tokio::time::timeout(Duration::from_millis(300), received.recv()).await;
    assert!(extra.is_err(), "dropped message must not be delivered");

    connector.stop();
}

#[tokio::test]
async fn test_bot_reply_reaches_registered_callback() {
    let (addr, _received, push) = start_mock_director().await;
    let connector = DirectorConnector::new(format!("ws://{addr}/ws"));

    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<BotReply>();
    connector.on_reply(Arc::new(move |reply| {
        let _ = reply_tx.send(reply);
    }));

    connector.start();
    wait_for_connected(&connector).await;

    // An event the bridge does not handle, then a real reply.
    push.send(r#"{"event": "heartbeat", "data": {}}"#.to_string())
        .unwrap();
    push.send(
        r#"{"event": "bot_reply", "data": {"reply": "hello chat", "is_censored": false}}"#
            .to_string(),
    )
    .unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(5), reply_rx.recv())
        .await
        .expect("timed out waiting for reply")
        .expect("reply channel closed");
    assert_eq!(reply.reply, "hello chat");
    assert!(!reply.is_censored);

    // The heartbeat must not have produced a callback invocation.
    let extra = tokio::time::timeout(Duration::from_millis(300), reply_rx.recv()).await;
    assert!(extra.is_err());

    connector.stop();
}

#[tokio::test]
async fn test_stop_closes_connection_and_loop() {
    let (addr, _received, _push) = start_mock_director().await;
    let connector = DirectorConnector::new(format!("ws://{addr}/ws"));
    connector.start();
    wait_for_connected(&connector).await;

    connector.stop();

    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if connector.state() == ConnectionState::Disconnected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("connector did not shut down after stop");
}
