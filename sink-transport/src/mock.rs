//! Mock transport implementations for testing
//!
//! These mocks record everything sent through them and let a test inject
//! failures at the transport level:
//!
//! - [`MockDatagramBinder`] / [`MockDatagramSocket`]: records binds and
//!   datagrams, can fail binds or sends
//! - [`MockStreamConnector`] / [`MockStream`]: records connection attempts and
//!   writes, can refuse or defer connects, fail writes, accept short writes or
//!   report a full buffer
//!
//! Binders and connectors are cheap clones sharing one recording, so a test
//! keeps a clone for inspection after handing the original to the code under
//! test.
//!
//! # Example
//!
//! ```
//! use sink_transport::mock::MockDatagramBinder;
//! use sink_transport::{DatagramBinder, DatagramSocket};
//!
//! let binder = MockDatagramBinder::new();
//! let target = "10.0.0.1:8125".parse().unwrap();
//! let socket = binder.bind_for(target).unwrap();
//! socket.try_send_to(b"hits:1|c", target).unwrap();
//!
//! assert_eq!(binder.sent(), vec![(b"hits:1|c".to_vec(), target)]);
//! ```

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::oneshot;

use super::{DatagramBinder, DatagramSocket, StreamConnector, StreamSocket};
use crate::error::{Error, Result};

// ============================================================================
// Datagrams
// ============================================================================

#[derive(Default)]
struct DatagramShared {
    sent: Mutex<Vec<(Vec<u8>, SocketAddr)>>,
    binds: Mutex<Vec<SocketAddr>>,
    fail_binds: AtomicBool,
    fail_sends: AtomicBool,
    next_port: AtomicU16,
}

/// Binder producing [`MockDatagramSocket`]s
#[derive(Clone, Default)]
pub struct MockDatagramBinder {
    shared: Arc<DatagramShared>,
}

impl MockDatagramBinder {
    /// Create a binder whose sockets accept every datagram
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent binds fail
    pub fn set_fail_binds(&self, fail: bool) {
        self.shared.fail_binds.store(fail, Ordering::Release);
    }

    /// Make sends on every socket from this binder fail
    pub fn set_fail_sends(&self, fail: bool) {
        self.shared.fail_sends.store(fail, Ordering::Release);
    }

    /// All datagrams sent so far: (payload, destination)
    pub fn sent(&self) -> Vec<(Vec<u8>, SocketAddr)> {
        self.shared.sent.lock().unwrap().clone()
    }

    /// Destinations sockets were bound for, in order
    pub fn binds(&self) -> Vec<SocketAddr> {
        self.shared.binds.lock().unwrap().clone()
    }
}

impl DatagramBinder for MockDatagramBinder {
    type Socket = MockDatagramSocket;

    fn bind_for(&self, target: SocketAddr) -> Result<MockDatagramSocket> {
        if self.shared.fail_binds.load(Ordering::Acquire) {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                "mock bind failure",
            )));
        }
        self.shared.binds.lock().unwrap().push(target);

        let port = 40000 + self.shared.next_port.fetch_add(1, Ordering::AcqRel);
        let local_addr = if target.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], port))
        } else {
            SocketAddr::from(([0u16; 8], port))
        };
        Ok(MockDatagramSocket {
            local_addr,
            shared: self.shared.clone(),
        })
    }
}

/// Datagram socket recording into its binder
pub struct MockDatagramSocket {
    local_addr: SocketAddr,
    shared: Arc<DatagramShared>,
}

impl DatagramSocket for MockDatagramSocket {
    fn try_send_to(&self, buf: &[u8], target: SocketAddr) -> Result<usize> {
        if self.shared.fail_sends.load(Ordering::Acquire) {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "mock send failure",
            )));
        }
        self.shared.sent.lock().unwrap().push((buf.to_vec(), target));
        Ok(buf.len())
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.local_addr)
    }
}

// ============================================================================
// Streams
// ============================================================================

enum ConnectStep {
    Accept,
    Refuse,
    Deferred(oneshot::Receiver<bool>),
}

/// Behaviour of the next write on any mock stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteBehavior {
    /// Accept the whole payload
    Accept,
    /// Fail with a broken pipe
    Fail,
    /// Report a full send buffer
    WouldBlock,
    /// Accept at most this many bytes
    Short(usize),
}

struct StreamShared {
    script: Mutex<VecDeque<ConnectStep>>,
    attempts: Mutex<Vec<SocketAddr>>,
    written: Mutex<Vec<(usize, Vec<u8>)>>,
    write_plan: Mutex<VecDeque<WriteBehavior>>,
    accept_by_default: AtomicBool,
    established: AtomicUsize,
}

impl Default for StreamShared {
    fn default() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            attempts: Mutex::new(Vec::new()),
            written: Mutex::new(Vec::new()),
            write_plan: Mutex::new(VecDeque::new()),
            accept_by_default: AtomicBool::new(true),
            established: AtomicUsize::new(0),
        }
    }
}

/// Connector producing [`MockStream`]s
///
/// Connects consume scripted steps first; with an empty script they succeed
/// unless [`set_accept_by_default`](Self::set_accept_by_default) turned that off.
#[derive(Clone, Default)]
pub struct MockStreamConnector {
    shared: Arc<StreamShared>,
}

impl MockStreamConnector {
    /// Create a connector that accepts every connection
    pub fn new() -> Self {
        Self::default()
    }

    /// Choose the outcome of unscripted connects
    pub fn set_accept_by_default(&self, accept: bool) {
        self.shared.accept_by_default.store(accept, Ordering::Release);
    }

    /// Script the next connect to succeed
    pub fn push_accept(&self) {
        self.shared.script.lock().unwrap().push_back(ConnectStep::Accept);
    }

    /// Script the next connect to be refused
    pub fn push_refuse(&self) {
        self.shared.script.lock().unwrap().push_back(ConnectStep::Refuse);
    }

    /// Script the next connect to stay pending until the handle resolves it
    pub fn push_deferred(&self) -> DeferredConnect {
        let (tx, rx) = oneshot::channel();
        self.shared
            .script
            .lock()
            .unwrap()
            .push_back(ConnectStep::Deferred(rx));
        DeferredConnect { tx }
    }

    /// Queue the behaviour of upcoming writes, across all streams
    pub fn push_write(&self, behavior: WriteBehavior) {
        self.shared.write_plan.lock().unwrap().push_back(behavior);
    }

    /// Destinations of every connection attempt, in order
    pub fn attempts(&self) -> Vec<SocketAddr> {
        self.shared.attempts.lock().unwrap().clone()
    }

    /// Number of connections successfully established
    pub fn established(&self) -> usize {
        self.shared.established.load(Ordering::Acquire)
    }

    /// Bytes accepted by streams: (connection number, payload)
    ///
    /// Connection numbers start at 1 in order of establishment.
    pub fn written(&self) -> Vec<(usize, Vec<u8>)> {
        self.shared.written.lock().unwrap().clone()
    }

    /// All accepted bytes concatenated, regardless of connection
    pub fn written_bytes(&self) -> Vec<u8> {
        self.written().into_iter().flat_map(|(_, data)| data).collect()
    }
}

#[async_trait(?Send)]
impl StreamConnector for MockStreamConnector {
    type Stream = MockStream;

    async fn connect(&self, target: SocketAddr) -> Result<MockStream> {
        self.shared.attempts.lock().unwrap().push(target);

        let step = self.shared.script.lock().unwrap().pop_front();
        let accepted = match step {
            Some(ConnectStep::Accept) => true,
            Some(ConnectStep::Refuse) => false,
            Some(ConnectStep::Deferred(rx)) => rx.await.unwrap_or(false),
            None => self.shared.accept_by_default.load(Ordering::Acquire),
        };

        if !accepted {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "mock connection refused",
            )));
        }

        let id = self.shared.established.fetch_add(1, Ordering::AcqRel) + 1;
        Ok(MockStream {
            id,
            peer: target,
            shared: self.shared.clone(),
        })
    }
}

/// Completion handle for a deferred connect
pub struct DeferredConnect {
    tx: oneshot::Sender<bool>,
}

impl DeferredConnect {
    /// Let the connection succeed; `false` if the attempt was abandoned
    pub fn accept(self) -> bool {
        self.tx.send(true).is_ok()
    }

    /// Refuse the connection; `false` if the attempt was abandoned
    pub fn refuse(self) -> bool {
        self.tx.send(false).is_ok()
    }

    /// Whether the connecting task has been dropped
    pub fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Stream recording accepted bytes into its connector
pub struct MockStream {
    id: usize,
    peer: SocketAddr,
    shared: Arc<StreamShared>,
}

impl MockStream {
    /// Connection number of this stream
    pub fn id(&self) -> usize {
        self.id
    }
}

impl StreamSocket for MockStream {
    fn try_write(&self, buf: &[u8]) -> Result<usize> {
        let behavior = self
            .shared
            .write_plan
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(WriteBehavior::Accept);

        let accepted = match behavior {
            WriteBehavior::Accept => buf.len(),
            WriteBehavior::Short(limit) => limit.min(buf.len()),
            WriteBehavior::WouldBlock => return Err(Error::WouldBlock),
            WriteBehavior::Fail => {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "mock write failure",
                )))
            }
        };

        self.shared
            .written
            .lock()
            .unwrap()
            .push((self.id, buf[..accepted].to_vec()));
        Ok(accepted)
    }

    fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(self.peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_mock_datagram_records_and_fails() {
        let binder = MockDatagramBinder::new();
        let target = addr("10.0.0.1:8125");

        let socket = binder.bind_for(target).unwrap();
        assert!(socket.local_addr().unwrap().is_ipv4());
        socket.try_send_to(b"a", target).unwrap();

        binder.set_fail_sends(true);
        assert!(socket.try_send_to(b"b", target).is_err());

        binder.set_fail_binds(true);
        assert!(binder.bind_for(target).is_err());

        assert_eq!(binder.sent(), vec![(b"a".to_vec(), target)]);
        assert_eq!(binder.binds(), vec![target]);
    }

    #[test]
    fn test_mock_datagram_ipv6_local_addr() {
        let binder = MockDatagramBinder::new();
        let socket = binder.bind_for(addr("[fd00::1]:8125")).unwrap();
        assert!(socket.local_addr().unwrap().is_ipv6());
    }

    #[tokio::test]
    async fn test_mock_stream_connect_script() {
        let connector = MockStreamConnector::new();
        connector.push_refuse();
        connector.push_accept();
        let target = addr("10.0.0.1:2003");

        assert!(connector.connect(target).await.is_err());
        let stream = connector.connect(target).await.unwrap();
        assert_eq!(stream.id(), 1);
        assert_eq!(stream.peer_addr().unwrap(), target);
        assert_eq!(connector.attempts(), vec![target, target]);
        assert_eq!(connector.established(), 1);

        connector.set_accept_by_default(false);
        assert!(connector.connect(target).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_stream_write_plan() {
        let connector = MockStreamConnector::new();
        let stream = connector.connect(addr("10.0.0.1:2003")).await.unwrap();

        connector.push_write(WriteBehavior::Short(2));
        connector.push_write(WriteBehavior::WouldBlock);
        connector.push_write(WriteBehavior::Fail);

        assert_eq!(stream.try_write(b"abcd").unwrap(), 2);
        assert!(stream.try_write(b"efgh").unwrap_err().is_would_block());
        assert!(matches!(stream.try_write(b"ijkl"), Err(Error::Io(_))));
        assert_eq!(stream.try_write(b"mnop").unwrap(), 4);

        assert_eq!(connector.written_bytes(), b"abmnop".to_vec());
    }

    #[tokio::test]
    async fn test_mock_stream_deferred_connect() {
        let connector = MockStreamConnector::new();
        let deferred = connector.push_deferred();
        let target = addr("10.0.0.1:2003");

        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let pending = {
                    let connector = connector.clone();
                    tokio::task::spawn_local(async move { connector.connect(target).await })
                };
                tokio::task::yield_now().await;
                assert_eq!(connector.established(), 0);

                assert!(deferred.accept());
                let stream = pending.await.unwrap().unwrap();
                assert_eq!(stream.id(), 1);
            })
            .await;
    }
}
