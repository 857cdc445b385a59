//! End-to-end tests over real UDP sockets on localhost.

use rand::RngCore;
use spectral::{CLOSE_APPLICATION, Error, Listener};
use std::time::Duration;
use tokio::time::timeout;

const DIAL_TIMEOUT: Duration = Duration::from_secs(5);
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

async fn bound_listener() -> (Listener, String) {
    let listener = Listener::bind("127.0.0.1:0").await.expect("bind listener");
    let address = listener.local_addr().expect("local addr").to_string();
    (listener, address)
}

async fn read_exact(stream: &spectral::Stream, total: usize) -> Result<Vec<u8>, Error> {
    let mut data = Vec::with_capacity(total);
    let mut buf = vec![0u8; 64 * 1024];
    while data.len() < total {
        let n = stream.read(&mut buf).await?;
        data.extend_from_slice(&buf[..n]);
    }
    Ok(data)
}

#[tokio::test]
async fn echo_round_trip() {
    let (listener, address) = bound_listener().await;

    let server = tokio::spawn(async move {
        let connection = listener.accept().await.expect("accept connection");
        let stream = connection.accept_stream().await.expect("accept stream");
        let data = read_exact(&stream, 13).await.expect("server read");
        stream.write(&data).await.expect("server write");
        connection.closed().await;
    });

    let connection = spectral::dial(&address, DIAL_TIMEOUT).await.expect("dial");
    let stream = connection.open_stream().await.expect("open stream");
    stream.write(b"Hello, World!").await.expect("client write");

    let echoed = timeout(Duration::from_secs(1), read_exact(&stream, 13))
        .await
        .expect("echo within deadline")
        .expect("client read");
    assert_eq!(echoed, b"Hello, World!");

    connection.close_with_error(CLOSE_APPLICATION, "").await;
    timeout(TEST_TIMEOUT, server).await.expect("server finishes").expect("server task");
}

#[tokio::test]
async fn large_transfer_preserves_order() {
    let (listener, address) = bound_listener().await;

    let mut payload = vec![0u8; 64 * 1024];
    rand::rng().fill_bytes(&mut payload);
    let expected = payload.clone();

    let server = tokio::spawn(async move {
        let connection = listener.accept().await.expect("accept connection");
        let stream = connection.accept_stream().await.expect("accept stream");
        let data = read_exact(&stream, expected.len()).await.expect("server read");
        assert_eq!(data, expected, "server received bytes out of order or corrupted");
        // Send everything back to exercise the reverse path too.
        stream.write(&data).await.expect("server write");
        connection.closed().await;
    });

    let connection = spectral::dial(&address, DIAL_TIMEOUT).await.expect("dial");
    let stream = connection.open_stream().await.expect("open stream");
    stream.write(&payload).await.expect("client write");

    let echoed = timeout(TEST_TIMEOUT, read_exact(&stream, payload.len()))
        .await
        .expect("transfer within deadline")
        .expect("client read");
    assert_eq!(echoed, payload);

    connection.close_with_error(CLOSE_APPLICATION, "").await;
    timeout(TEST_TIMEOUT, server).await.expect("server finishes").expect("server task");
}

#[tokio::test]
async fn streams_are_independent() {
    let (listener, address) = bound_listener().await;

    let server = tokio::spawn(async move {
        let connection = listener.accept().await.expect("accept connection");
        let first = connection.accept_stream().await.expect("accept first");
        let second = connection.accept_stream().await.expect("accept second");
        // Echo in the opposite order of arrival.
        let b = read_exact(&second, 5).await.expect("read second");
        second.write(&b).await.expect("write second");
        let a = read_exact(&first, 5).await.expect("read first");
        first.write(&a).await.expect("write first");
        connection.closed().await;
    });

    let connection = spectral::dial(&address, DIAL_TIMEOUT).await.expect("dial");
    let first = connection.open_stream().await.expect("open first");
    let second = connection.open_stream().await.expect("open second");
    assert_ne!(first.id(), second.id());

    first.write(b"alpha").await.expect("write first");
    second.write(b"bravo").await.expect("write second");

    let from_second = timeout(TEST_TIMEOUT, read_exact(&second, 5))
        .await
        .expect("second within deadline")
        .expect("read second");
    let from_first = timeout(TEST_TIMEOUT, read_exact(&first, 5))
        .await
        .expect("first within deadline")
        .expect("read first");
    assert_eq!(from_first, b"alpha");
    assert_eq!(from_second, b"bravo");

    connection.close_with_error(CLOSE_APPLICATION, "").await;
    timeout(TEST_TIMEOUT, server).await.expect("server finishes").expect("server task");
}

#[tokio::test]
async fn stream_close_reaches_the_peer() {
    let (listener, address) = bound_listener().await;

    let server = tokio::spawn(async move {
        let connection = listener.accept().await.expect("accept connection");
        let stream = connection.accept_stream().await.expect("accept stream");
        // The peer closes without writing: read unblocks with the cause.
        let result = stream.read(&mut [0u8; 16]).await;
        assert!(result.is_err(), "read should fail after peer close");
        connection.closed().await;
    });

    let connection = spectral::dial(&address, DIAL_TIMEOUT).await.expect("dial");
    let stream = connection.open_stream().await.expect("open stream");
    stream.close().expect("close stream");
    // Close is idempotent.
    stream.close().expect("second close");

    // Give the close frame time to arrive before tearing the connection down.
    tokio::time::sleep(Duration::from_millis(200)).await;
    connection.close_with_error(CLOSE_APPLICATION, "").await;
    timeout(TEST_TIMEOUT, server).await.expect("server finishes").expect("server task");
}

#[tokio::test]
async fn connection_close_reaches_the_peer() {
    let (listener, address) = bound_listener().await;

    let server = tokio::spawn(async move {
        let connection = listener.accept().await.expect("accept connection");
        connection.closed().await;
        connection.close_cause().expect("a close cause")
    });

    let connection = spectral::dial(&address, DIAL_TIMEOUT).await.expect("dial");
    connection.close_with_error(CLOSE_APPLICATION, "done testing").await;

    let cause = timeout(TEST_TIMEOUT, server).await.expect("server sees close").expect("server task");
    assert_eq!(cause, Error::ClosedByPeer("done testing".to_string()));
    assert!(connection.is_closed());
}

#[tokio::test]
async fn write_after_close_fails() {
    let (listener, address) = bound_listener().await;

    let server = tokio::spawn(async move {
        let connection = listener.accept().await.expect("accept connection");
        let _stream = connection.accept_stream().await.expect("accept stream");
        connection.closed().await;
    });

    let connection = spectral::dial(&address, DIAL_TIMEOUT).await.expect("dial");
    let stream = connection.open_stream().await.expect("open stream");
    stream.close().expect("close");
    assert!(stream.write(b"late").await.is_err());
    assert!(stream.read(&mut [0u8; 4]).await.is_err());

    connection.close_with_error(CLOSE_APPLICATION, "").await;
    timeout(TEST_TIMEOUT, server).await.expect("server finishes").expect("server task");
}

#[tokio::test]
async fn dial_times_out_without_a_server() {
    // Bind a socket so the port is reserved, then drop it: nothing answers.
    let socket = std::net::UdpSocket::bind("127.0.0.1:0").expect("reserve port");
    let address = socket.local_addr().expect("local addr").to_string();
    drop(socket);

    let result = spectral::dial(&address, Duration::from_millis(500)).await;
    assert!(matches!(result, Err(Error::Timeout)));
}

#[tokio::test]
async fn open_stream_on_server_connection_is_rejected() {
    let (listener, address) = bound_listener().await;

    let server = tokio::spawn(async move {
        let connection = listener.accept().await.expect("accept connection");
        assert!(matches!(connection.open_stream().await, Err(Error::Unsupported)));
        connection.closed().await;
    });

    let connection = spectral::dial(&address, DIAL_TIMEOUT).await.expect("dial");
    assert!(matches!(connection.accept_stream().await, Err(Error::Unsupported)));

    connection.close_with_error(CLOSE_APPLICATION, "").await;
    timeout(TEST_TIMEOUT, server).await.expect("server finishes").expect("server task");
}
