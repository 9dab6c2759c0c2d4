//! Socket options applied by the tokio transports

use std::time::Duration;

use sink_transport::{DatagramBinder, DatagramSocket, StreamConnector, TcpConnector, UdpBinder};
use socket2::SockRef;
use tokio::net::TcpListener;

#[tokio::test]
async fn test_udp_send_buffer_size_applied() {
    let binder = UdpBinder::new().with_send_buffer_size(Some(64 * 1024));
    let socket = binder.bind_for("127.0.0.1:9".parse().unwrap()).unwrap();

    assert!(socket.local_addr().unwrap().ip().is_unspecified());
    let size = SockRef::from(&socket).send_buffer_size().unwrap();
    assert!(size >= 64 * 1024);
}

#[tokio::test]
async fn test_tcp_options_applied() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let target = listener.local_addr().unwrap();

    let connector = TcpConnector::new()
        .with_nodelay(true)
        .with_keepalive(Some(Duration::from_secs(30)))
        .with_connect_timeout(Duration::from_secs(2));
    let stream = connector.connect(target).await.unwrap();

    assert!(stream.nodelay().unwrap());
    assert!(SockRef::from(&stream).keepalive().unwrap());
}
