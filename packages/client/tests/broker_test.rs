//! End-to-end tests of `RealtimeService` against an in-process STOMP broker.

mod common;

use std::time::Duration;

use tokio::sync::mpsc;

use common::{MockBroker, REJECTED_IDENTITY, eventually};
use hiroma_client::{
    ChatMessage, ClientConfig, ConnectError, ConnectionState, OutgoingMessage, ProtocolError,
    RealtimeService, RoomId,
    codec::OutboundMessage,
    config::{DEFAULT_BROADCAST_TOPIC, DEFAULT_PUBLISH_DESTINATION},
};

fn room(id: u64) -> RoomId {
    RoomId::new(id).unwrap()
}

fn collector() -> (
    impl Fn(ChatMessage) + Send + Sync + 'static,
    mpsc::UnboundedReceiver<ChatMessage>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        move |message: ChatMessage| {
            let _ = tx.send(message);
        },
        rx,
    )
}

async fn next(rx: &mut mpsc::UnboundedReceiver<ChatMessage>) -> Option<ChatMessage> {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .ok()
        .flatten()
}

#[tokio::test]
async fn test_send_is_routed_back_to_room_handler() {
    // テスト項目: 送信したメッセージがブローカー経由で同じルームのハンドラに届く
    // given (前提条件):
    let broker = MockBroker::start().await;
    let service = RealtimeService::with_websocket(broker.config());
    service.connect("alice@example.com").await.unwrap();
    let (handler, mut rx) = collector();
    service.subscribe(room(5), handler).unwrap();

    // when (操作):
    service
        .send(
            room(5),
            OutgoingMessage::new(1i64, "Alice", "alice@example.com", "hello"),
        )
        .unwrap();

    // then (期待する結果):
    let received = next(&mut rx).await.expect("message was not delivered");
    assert_eq!(received.room_id, room(5));
    assert_eq!(received.content, "hello");
    assert_eq!(received.sender_name, "Alice");
    assert_eq!(received.sender_id, Some(1));

    let sends = broker.sends();
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].0, DEFAULT_PUBLISH_DESTINATION);
    let published: OutboundMessage = serde_json::from_str(&sends[0].1).unwrap();
    assert_eq!(published.chat_room_id, 5);
    assert_eq!(published.sender_email, "alice@example.com");

    service.disconnect();
}

#[tokio::test]
async fn test_rooms_share_one_broker_subscription() {
    // テスト項目: 複数ルームを購読してもブローカーへの SUBSCRIBE は 1 回だけ
    // given (前提条件):
    let broker = MockBroker::start().await;
    let service = RealtimeService::with_websocket(broker.config());
    service.connect("alice@example.com").await.unwrap();

    // when (操作):
    let (first, _rx1) = collector();
    let (second, _rx2) = collector();
    let (third, _rx3) = collector();
    service.subscribe(room(1), first).unwrap();
    service.subscribe(room(2), second).unwrap();
    service.subscribe(room(3), third).unwrap();

    // then (期待する結果):
    assert!(eventually(|| !broker.subscribes().is_empty()).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(broker.subscribes(), vec![DEFAULT_BROADCAST_TOPIC.to_string()]);
    assert_eq!(service.subscribed_room_ids(), vec![room(1), room(2), room(3)]);
    assert_eq!(service.subscriptions().open_subscriptions(), 1);

    service.disconnect();
}

#[tokio::test]
async fn test_messages_reach_only_the_matching_room() {
    // テスト項目: 別クライアントからの送信は宛先ルームのハンドラにだけ届く
    // given (前提条件):
    let broker = MockBroker::start().await;
    let alice = RealtimeService::with_websocket(broker.config());
    let bob = RealtimeService::with_websocket(broker.config());
    alice.connect("alice@example.com").await.unwrap();
    bob.connect("bob@example.com").await.unwrap();

    let (alice_handler, mut alice_rx) = collector();
    let (bob_handler, mut bob_rx) = collector();
    alice.subscribe(room(5), alice_handler).unwrap();
    bob.subscribe(room(7), bob_handler).unwrap();
    assert!(eventually(|| broker.subscribes().len() == 2).await);

    // when (操作):
    alice
        .send(
            room(7),
            OutgoingMessage::new(1i64, "Alice", "alice@example.com", "for seven"),
        )
        .unwrap();
    alice
        .send(
            room(5),
            OutgoingMessage::new(1i64, "Alice", "alice@example.com", "for five"),
        )
        .unwrap();

    // then (期待する結果):
    let to_bob = next(&mut bob_rx).await.expect("bob did not receive");
    assert_eq!(to_bob.content, "for seven");
    assert_eq!(to_bob.room_id, room(7));

    let to_alice = next(&mut alice_rx).await.expect("alice did not receive");
    assert_eq!(to_alice.content, "for five");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(bob_rx.try_recv().is_err());
    assert!(alice_rx.try_recv().is_err());

    alice.disconnect();
    bob.disconnect();
}

#[tokio::test]
async fn test_rejected_identity_fails_connect() {
    // テスト項目: ブローカーが ERROR で拒否すると connect がプロトコルエラーになる
    // given (前提条件):
    let broker = MockBroker::start().await;
    let service = RealtimeService::with_websocket(broker.config());

    // when (操作):
    let result = service.connect(REJECTED_IDENTITY).await;

    // then (期待する結果):
    match result {
        Err(ConnectError::Protocol(ProtocolError::Rejected { message, details })) => {
            assert_eq!(message, "access denied");
            assert_eq!(details, "unknown user");
        }
        other => panic!("expected rejection, got {:?}", other),
    }
    assert!(!service.is_connected());
    assert_eq!(service.state(), ConnectionState::Idle);
}

#[tokio::test]
async fn test_broker_hang_up_returns_to_idle() {
    // テスト項目: ブローカー側から切断されると Idle に戻り、購読が破棄される
    // given (前提条件):
    let broker = MockBroker::start().await;
    let service = RealtimeService::with_websocket(broker.config());
    service.connect("alice@example.com").await.unwrap();
    let (handler, _rx) = collector();
    service.subscribe(room(5), handler).unwrap();
    let mut states = service.state_changes();

    // when (操作):
    broker.hang_up();

    // then (期待する結果):
    let went_idle = tokio::time::timeout(
        Duration::from_secs(2),
        states.wait_for(|state| *state == ConnectionState::Idle),
    )
    .await;
    assert!(matches!(went_idle, Ok(Ok(_))));
    assert!(!service.is_connected());
    assert!(service.subscribed_room_ids().is_empty());
    assert_eq!(service.subscriptions().open_subscriptions(), 0);
}

#[tokio::test]
async fn test_reconnect_after_disconnect() {
    // テスト項目: disconnect 後に再接続して購読をやり直せる
    // given (前提条件):
    let broker = MockBroker::start().await;
    let service = RealtimeService::with_websocket(broker.config());
    service.connect("alice@example.com").await.unwrap();
    let (old_handler, mut old_rx) = collector();
    service.subscribe(room(5), old_handler).unwrap();
    service.disconnect();

    // when (操作):
    service.connect("alice@example.com").await.unwrap();
    let (handler, mut rx) = collector();
    service.subscribe(room(5), handler).unwrap();
    service
        .send(
            room(5),
            OutgoingMessage::new(1i64, "Alice", "alice@example.com", "again"),
        )
        .unwrap();

    // then (期待する結果):
    let received = next(&mut rx).await.expect("message was not delivered");
    assert_eq!(received.content, "again");
    assert!(old_rx.try_recv().is_err());

    service.disconnect();
}

#[tokio::test]
async fn test_connect_to_unreachable_endpoint_fails() {
    // テスト項目: 到達できないエンドポイントへの接続はトランスポートエラーになる
    // given (前提条件):
    let config = ClientConfig::default()
        .with_endpoint("ws://127.0.0.1:1/chat/websocket")
        .with_connect_timeout(Duration::from_secs(2));
    let service = RealtimeService::with_websocket(config);

    // when (操作):
    let result = service.connect("alice@example.com").await;

    // then (期待する結果):
    assert!(matches!(result, Err(ConnectError::Transport(_))));
    assert_eq!(service.state(), ConnectionState::Idle);
}
