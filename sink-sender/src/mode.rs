//! Per-transport send semantics
//!
//! A [`SendMode`] owns the transport handle for the current endpoint and makes
//! one non-blocking delivery attempt per payload. Resolution, selection and
//! accounting live in the sender and are shared by both modes:
//!
//! - [`Datagram`]: connectionless; a fresh socket per endpoint, one datagram
//!   per payload
//! - [`Stream`]: connection-oriented; connects lazily on the first send to a
//!   new endpoint and drops payloads until the connection is up

use std::cell::RefCell;
use std::net::SocketAddr;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use sink_transport::{
    DatagramBinder, DatagramSocket, Error, Result, StreamConnector, StreamSocket,
};
use tokio::task::JoinHandle;

use crate::event::{EventHandler, SenderEvent};

/// Collaborators a mode may use while sending
pub struct ModeContext {
    events: Arc<dyn EventHandler>,
}

impl ModeContext {
    pub(crate) fn new(events: Arc<dyn EventHandler>) -> Self {
        Self { events }
    }

    /// Event handler of the sender
    pub fn events(&self) -> Arc<dyn EventHandler> {
        Arc::clone(&self.events)
    }

    /// Deliver an event to the handler
    pub fn emit(&self, event: SenderEvent) {
        self.events.on_event(&event);
    }
}

/// Transport-specific half of a sender
///
/// All methods run on the event loop thread.
pub trait SendMode: 'static {
    /// Short transport name for logs
    fn name(&self) -> &'static str;

    /// The selected endpoint changed; release anything bound to the old one
    fn endpoint_changed(&mut self, endpoint: SocketAddr, ctx: &ModeContext);

    /// Make one non-blocking attempt to deliver `bytes` to `endpoint`
    ///
    /// An error means the payload was not (fully) delivered. The mode has
    /// already reacted to it; the caller only accounts for it.
    fn try_send(&mut self, endpoint: SocketAddr, bytes: &[u8], ctx: &ModeContext) -> Result<()>;

    /// Whether a payload for `endpoint` could go on the wire right now
    fn is_ready(&self, endpoint: SocketAddr) -> bool;

    /// Release the transport handle and cancel pending work
    fn shutdown(&mut self);
}

// ============================================================================
// Connectionless
// ============================================================================

/// Connectionless send mode
pub struct Datagram<B: DatagramBinder> {
    binder: B,
    socket: Option<(SocketAddr, B::Socket)>,
}

impl<B: DatagramBinder> Datagram<B> {
    pub fn new(binder: B) -> Self {
        Self {
            binder,
            socket: None,
        }
    }

    fn bind(&mut self, endpoint: SocketAddr) -> Result<()> {
        let socket = self.binder.bind_for(endpoint)?;
        self.socket = Some((endpoint, socket));
        Ok(())
    }
}

impl<B: DatagramBinder + 'static> SendMode for Datagram<B> {
    fn name(&self) -> &'static str {
        "udp"
    }

    fn endpoint_changed(&mut self, endpoint: SocketAddr, _ctx: &ModeContext) {
        self.socket = None;
        if let Err(e) = self.bind(endpoint) {
            log::warn!("Failed to create datagram socket for {}: {}", endpoint, e);
        }
    }

    fn try_send(&mut self, endpoint: SocketAddr, bytes: &[u8], _ctx: &ModeContext) -> Result<()> {
        if !self.is_ready(endpoint) {
            // Binding failed earlier (or never happened); try again for this endpoint.
            self.bind(endpoint)?;
        }
        let Some((_, socket)) = &self.socket else {
            return Err(Error::NotConnected);
        };

        let sent = socket.try_send_to(bytes, endpoint)?;
        if sent < bytes.len() {
            return Err(Error::PartialWrite {
                written: sent,
                expected: bytes.len(),
            });
        }
        Ok(())
    }

    fn is_ready(&self, endpoint: SocketAddr) -> bool {
        matches!(&self.socket, Some((bound_for, _)) if *bound_for == endpoint)
    }

    fn shutdown(&mut self) {
        self.socket = None;
    }
}

// ============================================================================
// Connection-oriented
// ============================================================================

enum StreamState<S> {
    Idle,
    Connecting {
        target: SocketAddr,
        task: JoinHandle<()>,
    },
    Connected {
        target: SocketAddr,
        stream: S,
    },
}

struct StreamSlot<S> {
    /// Bumped whenever the current handle is discarded; a connect completion
    /// carrying an older value is stale.
    generation: u64,
    state: StreamState<S>,
}

impl<S> StreamSlot<S> {
    fn target(&self) -> Option<SocketAddr> {
        match &self.state {
            StreamState::Idle => None,
            StreamState::Connecting { target, .. } | StreamState::Connected { target, .. } => {
                Some(*target)
            }
        }
    }

    fn invalidate(&mut self) {
        if let StreamState::Connecting { task, .. } = &self.state {
            task.abort();
        }
        self.generation += 1;
        self.state = StreamState::Idle;
    }
}

/// Connection-oriented send mode
pub struct Stream<C: StreamConnector> {
    connector: Rc<C>,
    slot: Rc<RefCell<StreamSlot<C::Stream>>>,
}

impl<C: StreamConnector + 'static> Stream<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector: Rc::new(connector),
            slot: Rc::new(RefCell::new(StreamSlot {
                generation: 0,
                state: StreamState::Idle,
            })),
        }
    }

    /// Whether a connection attempt is in flight
    pub fn is_connecting(&self) -> bool {
        matches!(self.slot.borrow().state, StreamState::Connecting { .. })
    }

    fn start_connect(&self, slot: &mut StreamSlot<C::Stream>, target: SocketAddr, ctx: &ModeContext) {
        slot.invalidate();
        let generation = slot.generation;
        let connector = Rc::clone(&self.connector);
        let weak = Rc::downgrade(&self.slot);
        let events = ctx.events();

        log::debug!("Connecting to {}", target);
        let task = tokio::task::spawn_local(async move {
            let result = connector.connect(target).await;
            complete_connect(weak, generation, target, result, events);
        });
        slot.state = StreamState::Connecting { target, task };
    }
}

fn complete_connect<S>(
    slot: Weak<RefCell<StreamSlot<S>>>,
    generation: u64,
    target: SocketAddr,
    result: Result<S>,
    events: Arc<dyn EventHandler>,
) {
    let Some(slot) = slot.upgrade() else {
        return;
    };
    let mut slot = slot.borrow_mut();
    if slot.generation != generation {
        log::debug!("Discarding stale connection attempt to {}", target);
        return;
    }

    match result {
        Ok(stream) => {
            slot.state = StreamState::Connected { target, stream };
            drop(slot);
            events.on_event(&SenderEvent::Connected { endpoint: target });
        }
        Err(e) => {
            slot.state = StreamState::Idle;
            drop(slot);
            events.on_event(&SenderEvent::ConnectFailed {
                endpoint: target,
                error: e.to_string(),
            });
        }
    }
}

impl<C: StreamConnector + 'static> SendMode for Stream<C> {
    fn name(&self) -> &'static str {
        "tcp"
    }

    fn endpoint_changed(&mut self, endpoint: SocketAddr, _ctx: &ModeContext) {
        let mut slot = self.slot.borrow_mut();
        if slot.target().is_some_and(|target| target != endpoint) {
            log::debug!("Dropping stream handle, endpoint moved to {}", endpoint);
        }
        // Reconnect lazily on the next send.
        slot.invalidate();
    }

    fn try_send(&mut self, endpoint: SocketAddr, bytes: &[u8], ctx: &ModeContext) -> Result<()> {
        let mut slot = self.slot.borrow_mut();
        if slot.target() != Some(endpoint) {
            self.start_connect(&mut slot, endpoint, ctx);
            return Err(Error::NotConnected);
        }

        let result = match &slot.state {
            StreamState::Connected { stream, .. } => stream.try_write(bytes),
            _ => return Err(Error::NotConnected),
        };

        let error = match result {
            Ok(written) if written == bytes.len() => return Ok(()),
            Ok(0) => Error::Closed,
            Ok(written) => Error::PartialWrite {
                written,
                expected: bytes.len(),
            },
            // Nothing was written, the stream is still intact.
            Err(e) if e.is_would_block() => return Err(e),
            Err(e) => e,
        };

        // A torn or failed write leaves the stream unusable for framed payloads.
        slot.invalidate();
        drop(slot);
        ctx.emit(SenderEvent::Disconnected {
            endpoint,
            reason: error.to_string(),
        });
        Err(error)
    }

    fn is_ready(&self, endpoint: SocketAddr) -> bool {
        matches!(
            &self.slot.borrow().state,
            StreamState::Connected { target, .. } if *target == endpoint
        )
    }

    fn shutdown(&mut self) {
        self.slot.borrow_mut().invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::LoggingEventHandler;
    use sink_transport::mock::{MockDatagramBinder, MockStreamConnector, WriteBehavior};
    use sink_transport::UdpBinder;
    use tokio::task::LocalSet;

    fn ctx() -> ModeContext {
        ModeContext::new(Arc::new(LoggingEventHandler))
    }

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_datagram_binds_per_endpoint() {
        let binder = MockDatagramBinder::new();
        let mut mode = Datagram::new(binder.clone());
        let ctx = ctx();
        let a = addr("10.0.0.1:8125");
        let c = addr("10.0.0.3:8125");

        mode.endpoint_changed(a, &ctx);
        assert!(mode.is_ready(a));
        mode.try_send(a, b"x", &ctx).unwrap();

        mode.endpoint_changed(c, &ctx);
        assert!(!mode.is_ready(a));
        mode.try_send(c, b"y", &ctx).unwrap();

        assert_eq!(binder.binds(), vec![a, c]);
        assert_eq!(binder.sent(), vec![(b"x".to_vec(), a), (b"y".to_vec(), c)]);
    }

    #[test]
    fn test_datagram_send_error_is_reported() {
        let binder = MockDatagramBinder::new();
        let mut mode = Datagram::new(binder.clone());
        let ctx = ctx();
        let a = addr("10.0.0.1:8125");
        mode.endpoint_changed(a, &ctx);

        binder.set_fail_sends(true);
        assert!(mode.try_send(a, b"payload", &ctx).is_err());
        // The socket survives a send error.
        assert!(mode.is_ready(a));
    }

    #[test]
    fn test_datagram_rebinds_after_failed_bind() {
        let binder = MockDatagramBinder::new();
        let mut mode = Datagram::new(binder.clone());
        let ctx = ctx();
        let a = addr("10.0.0.1:8125");

        binder.set_fail_binds(true);
        mode.endpoint_changed(a, &ctx);
        assert!(!mode.is_ready(a));
        assert!(mode.try_send(a, b"x", &ctx).is_err());

        binder.set_fail_binds(false);
        mode.try_send(a, b"y", &ctx).unwrap();
        assert!(mode.is_ready(a));
        assert_eq!(binder.sent(), vec![(b"y".to_vec(), a)]);
    }

    #[test]
    fn test_datagram_real_socket_sends_right_after_bind() {
        let receiver = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(std::time::Duration::from_secs(5)))
            .unwrap();
        let target = receiver.local_addr().unwrap();
        let ctx = ctx();

        let mut mode = Datagram::new(UdpBinder::new());
        mode.endpoint_changed(target, &ctx);
        mode.try_send(target, b"first", &ctx).unwrap();

        // No socket yet: binds and sends within the same call.
        let mut lazy = Datagram::new(UdpBinder::new());
        lazy.try_send(target, b"second", &ctx).unwrap();

        let mut buf = [0u8; 16];
        let (n, _) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"first");
        let (n, _) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"second");
    }

    #[tokio::test]
    async fn test_stream_connects_lazily() {
        let connector = MockStreamConnector::new();
        let ctx = ctx();
        let a = addr("10.0.0.1:2003");

        LocalSet::new()
            .run_until(async {
                let mut mode = Stream::new(connector.clone());
                mode.endpoint_changed(a, &ctx);
                assert!(connector.attempts().is_empty());

                assert!(matches!(mode.try_send(a, b"one", &ctx), Err(Error::NotConnected)));
                assert!(mode.is_connecting());
                assert!(matches!(mode.try_send(a, b"two", &ctx), Err(Error::NotConnected)));

                settle().await;
                assert!(mode.is_ready(a));
                mode.try_send(a, b"three", &ctx).unwrap();

                assert_eq!(connector.attempts(), vec![a]);
                assert_eq!(connector.written_bytes(), b"three".to_vec());
            })
            .await;
    }

    #[tokio::test]
    async fn test_stream_write_failure_forces_reconnect() {
        let connector = MockStreamConnector::new();
        let ctx = ctx();
        let a = addr("10.0.0.1:2003");

        LocalSet::new()
            .run_until(async {
                let mut mode = Stream::new(connector.clone());
                let _ = mode.try_send(a, b"", &ctx);
                settle().await;
                assert!(mode.is_ready(a));

                connector.push_write(WriteBehavior::Fail);
                assert!(matches!(mode.try_send(a, b"lost", &ctx), Err(Error::Io(_))));
                assert!(!mode.is_ready(a));

                assert!(matches!(mode.try_send(a, b"retry", &ctx), Err(Error::NotConnected)));
                settle().await;
                mode.try_send(a, b"ok", &ctx).unwrap();

                assert_eq!(connector.attempts(), vec![a, a]);
                assert_eq!(connector.written(), vec![(2, b"ok".to_vec())]);
            })
            .await;
    }

    #[tokio::test]
    async fn test_stream_would_block_keeps_connection() {
        let connector = MockStreamConnector::new();
        let ctx = ctx();
        let a = addr("10.0.0.1:2003");

        LocalSet::new()
            .run_until(async {
                let mut mode = Stream::new(connector.clone());
                let _ = mode.try_send(a, b"", &ctx);
                settle().await;

                connector.push_write(WriteBehavior::WouldBlock);
                assert!(mode.try_send(a, b"busy", &ctx).unwrap_err().is_would_block());
                assert!(mode.is_ready(a));
                assert_eq!(connector.attempts().len(), 1);
            })
            .await;
    }

    #[tokio::test]
    async fn test_stream_short_write_invalidates() {
        let connector = MockStreamConnector::new();
        let ctx = ctx();
        let a = addr("10.0.0.1:2003");

        LocalSet::new()
            .run_until(async {
                let mut mode = Stream::new(connector.clone());
                let _ = mode.try_send(a, b"", &ctx);
                settle().await;

                connector.push_write(WriteBehavior::Short(2));
                let err = mode.try_send(a, b"abcdef", &ctx).unwrap_err();
                assert!(matches!(err, Error::PartialWrite { written: 2, expected: 6 }));
                assert!(!mode.is_ready(a));
            })
            .await;
    }

    #[tokio::test]
    async fn test_stream_stale_connect_is_discarded() {
        let connector = MockStreamConnector::new();
        let deferred = connector.push_deferred();
        let ctx = ctx();
        let a = addr("10.0.0.1:2003");
        let c = addr("10.0.0.3:2003");

        LocalSet::new()
            .run_until(async {
                let mut mode = Stream::new(connector.clone());
                let _ = mode.try_send(a, b"x", &ctx);
                settle().await;

                // Endpoint moves while the connect to `a` is still pending.
                mode.endpoint_changed(c, &ctx);
                settle().await;
                assert!(deferred.is_abandoned());
                assert!(!deferred.accept());
                assert!(!mode.is_ready(a));
                assert!(!mode.is_connecting());

                let _ = mode.try_send(c, b"y", &ctx);
                settle().await;
                assert!(mode.is_ready(c));
                assert_eq!(connector.attempts(), vec![a, c]);
            })
            .await;
    }

    #[tokio::test]
    async fn test_stream_refused_connect_returns_to_idle() {
        let connector = MockStreamConnector::new();
        connector.push_refuse();
        let ctx = ctx();
        let a = addr("10.0.0.1:2003");

        LocalSet::new()
            .run_until(async {
                let mut mode = Stream::new(connector.clone());
                let _ = mode.try_send(a, b"x", &ctx);
                settle().await;
                assert!(!mode.is_connecting());
                assert!(!mode.is_ready(a));

                let _ = mode.try_send(a, b"y", &ctx);
                settle().await;
                assert!(mode.is_ready(a));
                assert_eq!(connector.attempts(), vec![a, a]);
            })
            .await;
    }

    #[tokio::test]
    async fn test_stream_shutdown_drops_pending_connect() {
        let connector = MockStreamConnector::new();
        let deferred = connector.push_deferred();
        let ctx = ctx();
        let a = addr("10.0.0.1:2003");

        LocalSet::new()
            .run_until(async {
                let mut mode = Stream::new(connector.clone());
                let _ = mode.try_send(a, b"x", &ctx);
                settle().await;

                mode.shutdown();
                settle().await;
                assert!(deferred.is_abandoned());
                assert!(!mode.is_ready(a));
                assert_eq!(connector.established(), 0);
            })
            .await;
    }
}
