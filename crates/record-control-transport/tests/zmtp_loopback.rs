//! REQ/REP exchanges over real sockets and in-memory streams.

use std::time::Duration;

use bytes::Bytes;
use record_control_core::{Endpoint, Transport, TransportError};
use record_control_transport::{
    RepSocket, ReqSocket, SocketType,
    protocol::{self, read_message, write_message},
};
use tokio::net::TcpListener;

const TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn test_req_rep_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let mut socket = RepSocket::accept(&listener, TIMEOUT).await.unwrap();
        let mut seen = Vec::new();
        while let Some(request) = socket.recv_request().await.unwrap() {
            let text = String::from_utf8(request.to_vec()).unwrap();
            socket
                .send_reply(Bytes::from(format!("ACK:{text}")))
                .await
                .unwrap();
            seen.push(text);
        }
        seen
    });

    let endpoint = Endpoint::new("127.0.0.1", port).with_timeout(TIMEOUT);
    let mut client = ReqSocket::connect(&endpoint).await.unwrap();
    assert_eq!(client.peer(), format!("tcp://127.0.0.1:{port}"));

    for command in ["StartRecord Dir=/tmp/out", "StopRecord"] {
        client.send(Bytes::from(command)).await.unwrap();
        let reply = client.recv().await.unwrap();
        assert_eq!(reply, Bytes::from(format!("ACK:{command}")));
    }

    client.close().await.unwrap();
    assert_eq!(
        server.await.unwrap(),
        vec!["StartRecord Dir=/tmp/out".to_string(), "StopRecord".to_string()]
    );
}

#[tokio::test]
async fn test_connect_refused_is_connect_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let endpoint = Endpoint::new("127.0.0.1", port).with_timeout(TIMEOUT);
    let result = ReqSocket::connect(&endpoint).await;
    assert!(matches!(result, Err(TransportError::Connect { .. })));
}

#[tokio::test]
async fn test_second_send_without_reply_is_refused() {
    let (client_io, server_io) = tokio::io::duplex(4096);
    let server = tokio::spawn(async move {
        let mut socket = RepSocket::handshake(server_io, "test".to_string(), TIMEOUT)
            .await
            .unwrap();
        socket.recv_request().await.unwrap()
    });

    let mut client = ReqSocket::handshake(client_io, "test".to_string(), TIMEOUT)
        .await
        .unwrap();
    client.send(Bytes::from_static(b"first")).await.unwrap();
    assert!(matches!(
        client.send(Bytes::from_static(b"second")).await,
        Err(TransportError::ReplyOutstanding)
    ));
    assert_eq!(server.await.unwrap(), Some(Bytes::from_static(b"first")));
}

#[tokio::test]
async fn test_reply_without_delimiter_is_malformed() {
    let (client_io, server_io) = tokio::io::duplex(4096);
    let server = tokio::spawn(async move {
        let (mut framed, peer) = protocol::handshake(server_io, SocketType::Rep, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(peer, SocketType::Req);
        let request = read_message(&mut framed).await.unwrap().unwrap();
        assert_eq!(request, vec![Bytes::new(), Bytes::from_static(b"StopRecord")]);
        write_message(&mut framed, [Bytes::from_static(b"OK")])
            .await
            .unwrap();
        framed
    });

    let mut client = ReqSocket::handshake(client_io, "test".to_string(), TIMEOUT)
        .await
        .unwrap();
    client.send(Bytes::from_static(b"StopRecord")).await.unwrap();
    let result = client.recv().await;
    assert!(matches!(result, Err(TransportError::MalformedReply(_))));
    drop(server.await.unwrap());
}

#[tokio::test]
async fn test_multipart_reply_body_is_joined() {
    let (client_io, server_io) = tokio::io::duplex(4096);
    let server = tokio::spawn(async move {
        let (mut framed, _) = protocol::handshake(server_io, SocketType::Rep, TIMEOUT)
            .await
            .unwrap();
        read_message(&mut framed).await.unwrap().unwrap();
        write_message(
            &mut framed,
            [
                Bytes::new(),
                Bytes::from_static(b"Recording"),
                Bytes::from_static(b"Path"),
            ],
        )
        .await
        .unwrap();
        framed
    });

    let mut client = ReqSocket::handshake(client_io, "test".to_string(), TIMEOUT)
        .await
        .unwrap();
    client.send(Bytes::from_static(b"GetRecordingPath")).await.unwrap();
    assert_eq!(
        client.recv().await.unwrap(),
        Bytes::from_static(b"RecordingPath")
    );
    drop(server.await.unwrap());
}

#[tokio::test]
async fn test_peer_closing_mid_exchange_is_closed() {
    let (client_io, server_io) = tokio::io::duplex(4096);
    let server = tokio::spawn(async move {
        let mut socket = RepSocket::handshake(server_io, "test".to_string(), TIMEOUT)
            .await
            .unwrap();
        socket.recv_request().await.unwrap();
        socket.close().await.unwrap();
    });

    let mut client = ReqSocket::handshake(client_io, "test".to_string(), TIMEOUT)
        .await
        .unwrap();
    client.send(Bytes::from_static(b"StartRecord")).await.unwrap();
    server.await.unwrap();
    assert!(matches!(client.recv().await, Err(TransportError::Closed)));
}
