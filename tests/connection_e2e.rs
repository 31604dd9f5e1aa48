//! End-to-end tests over real TCP loopback connections.

use std::net::SocketAddr;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use wsframe::prelude::*;

/// Start an echo server on an ephemeral port.
async fn spawn_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let server = WebSocketServer::new(Config::default());
        server
            .serve(listener, |mut ws, handshake| async move {
                while let Some(Ok(msg)) = ws.next().await {
                    let reply = match msg {
                        Message::Text(data) => {
                            let text = String::from_utf8_lossy(&data);
                            Message::text(format!("{} says: {}", handshake.path, text))
                        }
                        Message::Binary(data) => Message::Binary(data),
                        _ => continue,
                    };
                    if ws.send(reply).await.is_err() {
                        break;
                    }
                }
            })
            .await
            .unwrap();
    });

    addr
}

#[tokio::test]
async fn text_and_binary_echo() {
    let addr = spawn_echo_server().await;

    let client = WebSocketClient::default();
    let (mut ws, _) = client
        .connect_to_url(&format!("ws://{}/room", addr))
        .await
        .unwrap();

    ws.send_text("hello").await.unwrap();
    let reply = ws.next().await.unwrap().unwrap();
    assert_eq!(reply.as_text(), Some("/room says: hello"));

    let blob = Bytes::from(vec![7u8; 70_000]);
    ws.send_binary(blob.clone()).await.unwrap();
    let reply = ws.next().await.unwrap().unwrap();
    assert_eq!(reply, Message::Binary(blob));
}

#[tokio::test]
async fn ping_is_answered_with_matching_pong() {
    let addr = spawn_echo_server().await;

    let client = WebSocketClient::default();
    let (mut ws, _) = client
        .connect_to_url(&format!("ws://{}/", addr))
        .await
        .unwrap();

    ws.ping("abc").await.unwrap();
    let reply = ws.next().await.unwrap().unwrap();
    assert_eq!(reply, Message::Pong(Bytes::from_static(b"abc")));
    assert_eq!(ws.state(), State::Open);
}

#[tokio::test]
async fn client_initiated_close_completes() {
    let addr = spawn_echo_server().await;

    let client = WebSocketClient::default();
    let (mut ws, _) = client
        .connect_to_url(&format!("ws://{}/", addr))
        .await
        .unwrap();

    ws.close(CloseReason::NORMAL, "done").await.unwrap();
    assert_eq!(ws.state(), State::Closing);

    let echoed = ws.next().await.unwrap().unwrap();
    assert_eq!(
        echoed,
        Message::Close(Some(CloseReason::new(CloseReason::NORMAL, "done")))
    );
    assert_eq!(ws.state(), State::Closed);
    assert!(ws.next().await.is_none());
    assert!(matches!(
        ws.send_text("late").await,
        Err(Error::ConnectionClosed)
    ));
}

#[tokio::test]
async fn connections_are_independent() {
    let addr = spawn_echo_server().await;
    let url = format!("ws://{}/", addr);

    let client = WebSocketClient::default();
    let (mut first, _) = client.connect_to_url(&url).await.unwrap();
    let (mut second, _) = client.connect_to_url(&url).await.unwrap();

    // Breaking the first connection must not disturb the second
    first.close(CloseReason::GOING_AWAY, "").await.unwrap();
    drop(first);

    second.send_text("still here").await.unwrap();
    let reply = second.next().await.unwrap().unwrap();
    assert_eq!(reply.as_text(), Some("/ says: still here"));
}

#[tokio::test]
async fn plain_http_request_gets_bad_request() {
    let addr = spawn_echo_server().await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    assert!(response.starts_with(b"HTTP/1.1 400 Bad Request\r\n"));
}

#[tokio::test]
async fn wss_urls_are_refused() {
    let client = WebSocketClient::default();
    let err = client
        .connect_to_url("wss://localhost:443/")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidUrl(_)));
}
