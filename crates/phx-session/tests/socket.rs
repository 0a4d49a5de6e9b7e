//! Integration tests for the socket: connect/disconnect, request/reply
//! correlation, routing and failure propagation.
//!
//! Every test runs against the in-memory transport, with a `MemoryPeer`
//! playing the server.

use std::time::Duration;

use phx_protocol::{Frame, Ref, Reply, ReplyStatus};
use phx_session::{ConnectionState, Push, SessionError, Socket, SocketBuilder};
use phx_transport::memory::{self, MemoryConnector, MemoryPeer};
use phx_transport::TransportError;
use serde_json::json;

// =========================================================================
// Helpers
// =========================================================================

fn builder(connector: MemoryConnector) -> SocketBuilder {
    Socket::builder("memory://server/socket").transport("memory", connector)
}

async fn connected() -> (Socket, MemoryPeer) {
    let (connector, mut peers) = memory::pair();
    let mut socket = builder(connector).build().unwrap();
    socket.connect().await.unwrap();
    let peer = peers.accept().await.unwrap();
    (socket, peer)
}

/// Sends `event` and lets the peer take (and acknowledge) the frame.
async fn request(socket: &Socket, peer: &mut MemoryPeer, event: &str) -> (Push, Frame) {
    let (push, frame) = tokio::join!(
        socket.send("room:lobby", event, json!({}), None),
        peer.next_frame(),
    );
    (push.unwrap(), frame.unwrap())
}

/// Round-trips one request so every frame pushed before it has been routed.
async fn flush(socket: &Socket, peer: &mut MemoryPeer) {
    let (push, frame) = request(socket, peer, "flush").await;
    peer.push(Frame::reply(frame.topic(), frame.reference(), Reply::ok(json!({}))))
        .unwrap();
    push.response().await.unwrap();
}

// =========================================================================
// Connection lifecycle
// =========================================================================

#[tokio::test]
async fn test_connect_and_disconnect() {
    let (mut socket, _peer) = connected().await;
    assert_eq!(socket.state(), ConnectionState::Connected);
    assert!(socket.is_connected());

    socket.disconnect().await.unwrap();
    assert_eq!(socket.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_connect_twice_is_rejected() {
    let (mut socket, _peer) = connected().await;
    assert_eq!(socket.connect().await, Err(SessionError::AlreadyConnected));
}

#[tokio::test]
async fn test_not_connected_errors() {
    let (connector, _peers) = memory::pair();
    let mut socket = builder(connector).build().unwrap();

    assert_eq!(socket.disconnect().await, Err(SessionError::NotConnected));
    let result = socket.send("t", "e", json!({}), None).await;
    assert!(matches!(result, Err(SessionError::NotConnected)));
    assert_eq!(socket.pending_replies(), 0);
}

#[tokio::test]
async fn test_unknown_scheme_is_rejected() {
    let mut socket = Socket::builder("gopher://example.com/socket").build().unwrap();
    assert_eq!(
        socket.connect().await,
        Err(SessionError::UnsupportedScheme("gopher".into()))
    );
    assert_eq!(socket.state(), ConnectionState::Disconnected);
}

#[test]
fn test_invalid_url_is_rejected() {
    let result = Socket::builder("not a url").build();
    assert!(matches!(result, Err(SessionError::InvalidUrl(_))));
}

#[tokio::test]
async fn test_params_reach_the_transport() {
    let (connector, mut peers) = memory::pair();
    let mut socket = builder(connector).param("user_id", "7").build().unwrap();
    socket.connect().await.unwrap();

    let peer = peers.accept().await.unwrap();
    assert_eq!(peer.endpoint().params()["user_id"], "7");
    assert_eq!(peer.endpoint().scheme(), "memory");
}

#[tokio::test]
async fn test_connect_waits_for_ready() {
    let (connector, mut peers) = memory::pair();
    let mut socket = builder(connector.holding_ready()).build().unwrap();

    let (connected, _peer) = tokio::join!(socket.connect(), async {
        let mut peer = peers.accept().await.unwrap();
        // Give connect a chance to (wrongly) finish early.
        tokio::task::yield_now().await;
        assert!(peer.resolve_ready());
        peer
    });
    assert_eq!(connected, Ok(()));
    assert!(socket.is_connected());
}

#[tokio::test]
async fn test_failed_ready_leaves_socket_disconnected() {
    let (connector, mut peers) = memory::pair();
    let mut socket = builder(connector.holding_ready()).build().unwrap();

    let (connected, ()) = tokio::join!(socket.connect(), async {
        let mut peer = peers.accept().await.unwrap();
        peer.fail_ready(TransportError::ConnectFailed("refused".into()));
    });
    assert_eq!(
        connected,
        Err(SessionError::Transport(TransportError::ConnectFailed(
            "refused".into()
        )))
    );
    assert_eq!(socket.state(), ConnectionState::Disconnected);
    assert_eq!(socket.disconnect().await, Err(SessionError::NotConnected));
}

#[tokio::test(start_paused = true)]
async fn test_connect_times_out() {
    let (connector, _peers) = memory::pair();
    let mut socket = builder(connector.holding_ready())
        .connect_timeout(Duration::from_secs(5))
        .build()
        .unwrap();

    assert_eq!(
        socket.connect().await,
        Err(SessionError::Transport(TransportError::ConnectTimeout(
            Duration::from_secs(5)
        )))
    );
    assert_eq!(socket.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_scoped_disconnects_after_body() {
    let (connector, mut peers) = memory::pair();
    let mut socket = builder(connector).build().unwrap();

    let result = socket
        .scoped(async |socket: &Socket| {
            assert!(socket.is_connected());
            Ok(socket.next_ref())
        })
        .await;
    assert_eq!(result, Ok(Ref(1)));
    assert_eq!(socket.state(), ConnectionState::Disconnected);
    assert!(peers.accept().await.is_some());
}

#[tokio::test]
async fn test_scoped_body_error_wins_and_still_disconnects() {
    let (connector, _peers) = memory::pair();
    let mut socket = builder(connector).build().unwrap();

    let result = socket
        .scoped(async |socket: &Socket| {
            assert!(socket.is_connected());
            Err::<(), _>(SessionError::ChannelClosed("body".into()))
        })
        .await;
    assert_eq!(result, Err(SessionError::ChannelClosed("body".into())));
    assert_eq!(socket.state(), ConnectionState::Disconnected);
    assert_eq!(socket.disconnect().await, Err(SessionError::NotConnected));
}

#[tokio::test]
async fn test_scoped_reports_transport_failure_after_successful_body() {
    let (connector, mut peers) = memory::pair();
    let mut socket = builder(connector).build().unwrap();
    let boom = TransportError::ConnectionClosed("boom".into());

    let result = socket
        .scoped(async |socket: &Socket| {
            let peer = peers.accept().await.unwrap();
            peer.fail(boom.clone());
            while socket.is_connected() {
                tokio::task::yield_now().await;
            }
            Ok(())
        })
        .await;
    assert_eq!(result, Err(SessionError::Transport(boom)));
    assert_eq!(socket.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_scoped_connect_failure_skips_body() {
    let mut socket = Socket::builder("gopher://example.com/socket").build().unwrap();
    let result = socket
        .scoped(async |_socket: &Socket| -> Result<(), SessionError> {
            panic!("body must not run")
        })
        .await;
    assert_eq!(result, Err(SessionError::UnsupportedScheme("gopher".into())));
}

// =========================================================================
// Refs and replies
// =========================================================================

#[tokio::test]
async fn test_refs_strictly_increase() {
    let (socket, mut peer) = connected().await;

    let mut previous = 0;
    for _ in 0..5 {
        let (push, frame) = request(&socket, &mut peer, "ping").await;
        let reference = frame.reference().unwrap();
        assert_eq!(push.reference(), reference);
        assert!(reference.into_inner() > previous);
        previous = reference.into_inner();
    }
    assert_eq!(previous, 5);
}

#[tokio::test]
async fn test_explicit_ref_is_used() {
    let (socket, mut peer) = connected().await;
    let (push, frame) = tokio::join!(
        socket.send("t", "e", json!({}), Some(Ref(500))),
        peer.next_frame(),
    );
    assert_eq!(push.unwrap().reference(), Ref(500));
    assert_eq!(frame.unwrap().reference(), Some(Ref(500)));
}

#[tokio::test]
async fn test_ok_reply_resolves_push() {
    let (socket, mut peer) = connected().await;
    let (push, frame) = request(&socket, &mut peer, "ping").await;
    assert_eq!(socket.pending_replies(), 1);

    peer.push(Frame::reply(
        frame.topic(),
        frame.reference(),
        Reply::ok(json!({"pong": true})),
    ))
    .unwrap();
    assert_eq!(push.response().await, Ok(json!({"pong": true})));
    assert_eq!(socket.pending_replies(), 0);
}

#[tokio::test]
async fn test_error_reply_is_not_success() {
    let (socket, mut peer) = connected().await;
    let (push, frame) = request(&socket, &mut peer, "ping").await;

    peer.push(Frame::reply(
        frame.topic(),
        frame.reference(),
        Reply::error(json!({"reason": "nope"})),
    ))
    .unwrap();
    assert_eq!(
        push.response().await,
        Err(SessionError::ReplyRejected {
            status: ReplyStatus::Error,
            response: json!({"reason": "nope"}),
        })
    );
}

#[tokio::test]
async fn test_replies_match_by_ref_not_order() {
    let (socket, mut peer) = connected().await;
    let (first, first_frame) = request(&socket, &mut peer, "a").await;
    let (second, second_frame) = request(&socket, &mut peer, "b").await;

    peer.push(Frame::reply("room:lobby", second_frame.reference(), Reply::ok(json!("b"))))
        .unwrap();
    peer.push(Frame::reply("room:lobby", first_frame.reference(), Reply::ok(json!("a"))))
        .unwrap();

    assert_eq!(first.response().await, Ok(json!("a")));
    assert_eq!(second.response().await, Ok(json!("b")));
}

#[tokio::test(start_paused = true)]
async fn test_reply_timeout_cleans_pending_table() {
    let (connector, mut peers) = memory::pair();
    let mut socket = builder(connector)
        .reply_timeout(Some(Duration::from_secs(1)))
        .build()
        .unwrap();
    socket.connect().await.unwrap();
    let mut peer = peers.accept().await.unwrap();

    let (push, _) = request(&socket, &mut peer, "ping").await;
    let reference = push.reference();
    assert_eq!(socket.pending_replies(), 1);
    assert_eq!(
        push.response().await,
        Err(SessionError::ReplyTimeout(reference))
    );
    assert_eq!(socket.pending_replies(), 0);
}

#[tokio::test]
async fn test_dropped_push_unregisters() {
    let (socket, mut peer) = connected().await;
    let (push, _) = request(&socket, &mut peer, "ping").await;
    assert_eq!(socket.pending_replies(), 1);

    drop(push);
    assert_eq!(socket.pending_replies(), 0);
}

// =========================================================================
// Routing misses
// =========================================================================

#[tokio::test]
async fn test_unknown_ref_is_dropped_and_counted() {
    let (socket, mut peer) = connected().await;
    peer.push(Frame::reply("room:lobby", Some(Ref(999)), Reply::ok(json!({}))))
        .unwrap();

    flush(&socket, &mut peer).await;
    assert_eq!(socket.routing_misses(), 1);
    assert!(socket.is_connected());
}

#[tokio::test]
async fn test_unknown_topic_is_dropped_and_counted() {
    let (socket, mut peer) = connected().await;
    peer.push(Frame::new("room:nobody", "new_msg", json!({}), None))
        .unwrap();
    peer.push(Frame::reply("room:lobby", None, Reply::ok(json!({}))))
        .unwrap();

    flush(&socket, &mut peer).await;
    assert_eq!(socket.routing_misses(), 2);
}

// =========================================================================
// Failure propagation
// =========================================================================

#[tokio::test]
async fn test_transport_failure_fails_in_flight_requests() {
    let (mut socket, mut peer) = connected().await;
    let (push, _) = request(&socket, &mut peer, "ping").await;
    let boom = TransportError::ConnectionClosed("boom".into());

    peer.fail(boom.clone());
    assert_eq!(
        push.response().await,
        Err(SessionError::Transport(boom.clone()))
    );
    assert_eq!(socket.state(), ConnectionState::Failed);
    assert_eq!(socket.pending_replies(), 0);

    // Later sends fail fast with the same error.
    let result = socket.send("t", "e", json!({}), None).await;
    assert!(matches!(result, Err(SessionError::Transport(e)) if e == boom));

    // Connecting again needs a disconnect first, which reports the failure.
    assert_eq!(socket.connect().await, Err(SessionError::AlreadyConnected));
    assert_eq!(
        socket.disconnect().await,
        Err(SessionError::Transport(boom))
    );
    assert_eq!(socket.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_reconnect_after_failure() {
    let (connector, mut peers) = memory::pair();
    let mut socket = builder(connector).build().unwrap();
    socket.connect().await.unwrap();
    let mut first = peers.accept().await.unwrap();
    let (push, _) = request(&socket, &mut first, "ping").await;

    drop(first);
    assert!(matches!(
        push.response().await,
        Err(SessionError::Transport(TransportError::ConnectionClosed(_)))
    ));
    assert!(socket.disconnect().await.is_err());

    socket.connect().await.unwrap();
    let mut second = peers.accept().await.unwrap();
    let (_push, frame) = request(&socket, &mut second, "ping").await;
    assert_eq!(frame.event(), "ping");
}

#[tokio::test]
async fn test_disconnect_fails_pending_replies() {
    let (mut socket, mut peer) = connected().await;
    let (push, _) = request(&socket, &mut peer, "ping").await;

    socket.disconnect().await.unwrap();
    assert_eq!(push.response().await, Err(SessionError::NotConnected));
    assert_eq!(socket.pending_replies(), 0);
}

#[tokio::test]
async fn test_dropped_socket_fails_pending_replies() {
    let (socket, mut peer) = connected().await;
    let (push, _) = request(&socket, &mut peer, "ping").await;

    drop(socket);
    assert_eq!(push.response().await, Err(SessionError::SocketDropped));
}
