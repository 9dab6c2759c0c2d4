//! Resolving socket sender
//!
//! [`SocketSender`] keeps a destination hostname resolved in the background
//! and sends payloads to whatever address it currently resolves to.
//!
//! # Threading
//!
//! A sender lives on one thread: the thread driving the tokio
//! [`LocalSet`](tokio::task::LocalSet) it was started from. Its periodic
//! resolution and, for streams, its connection attempts run as local tasks on
//! that set, and [`send`](SocketSender::send) is a plain synchronous call. The
//! type is `!Send`, so it cannot leak to another thread. Only its
//! [`SenderStats`] may be shared.
//!
//! # Example
//!
//! ```no_run
//! use sink_sender::{SenderConfig, UdpSender};
//!
//! # async fn example() -> sink_sender::Result<()> {
//! let local = tokio::task::LocalSet::new();
//! local
//!     .run_until(async {
//!         let sender = UdpSender::from_config(&SenderConfig::new("metrics.local", 8125))?;
//!         sender.start()?;
//!         sender.send(b"requests:1|c");
//!         sender.shutdown();
//!         Ok(())
//!     })
//!     .await
//! # }
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::rc::{Rc, Weak};
use std::sync::Arc;

use sink_dns::Resolver;
use sink_transport::{TcpConnector, UdpBinder};
use tokio::task::JoinHandle;

use crate::config::{Destination, SenderConfig, TransportKind};
use crate::error::{Error, Result};
use crate::event::{EventHandler, LoggingEventHandler, SenderEvent};
use crate::lifecycle::Lifecycle;
use crate::mode::{Datagram, ModeContext, SendMode, Stream};
use crate::selector::{EndpointSelector, Selection};
use crate::stats::{SenderStats, SenderStatsRef};

/// Sender delivering datagrams over UDP
pub type UdpSender = SocketSender<Datagram<UdpBinder>>;

/// Sender delivering a byte stream over TCP
pub type TcpSender = SocketSender<Stream<TcpConnector>>;

struct Core<M> {
    selector: EndpointSelector,
    mode: M,
    /// Dropped-byte total at the last report
    reported_dropped: u64,
}

struct Inner<M> {
    destination: Destination,
    resolver: Arc<dyn Resolver>,
    lifecycle: Cell<Lifecycle>,
    core: RefCell<Core<M>>,
    resolve_task: RefCell<Option<JoinHandle<()>>>,
    stats: SenderStatsRef,
    ctx: ModeContext,
}

/// Best-effort sender following DNS changes of its destination
///
/// Generic over the [`SendMode`]; see [`UdpSender`] and [`TcpSender`].
///
/// Construction, configuration and [`shutdown`](Self::shutdown) work anywhere.
/// Once [`start`](Self::start) is called the sender belongs to a tokio
/// `LocalSet`: `start` and every later [`send`](Self::send) must run inside
/// that set (within `LocalSet::run_until` or a task spawned on it), because
/// resolutions and stream connects are spawned as local tasks. Calling them
/// elsewhere panics.
pub struct SocketSender<M: SendMode> {
    inner: Rc<Inner<M>>,
}

impl<M: SendMode> fmt::Debug for SocketSender<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketSender")
            .field("destination", &self.inner.destination)
            .field("lifecycle", &self.inner.lifecycle.get())
            .field(
                "current_endpoint",
                &self.inner.core.try_borrow().ok().and_then(|core| core.selector.current()),
            )
            .finish()
    }
}

impl<M: SendMode> SocketSender<M> {
    /// Create a sender; no I/O happens until [`start`](Self::start)
    pub fn new(destination: Destination, resolver: Arc<dyn Resolver>, mode: M) -> Self {
        let selector = EndpointSelector::new(destination.port());
        Self {
            inner: Rc::new(Inner {
                destination,
                resolver,
                lifecycle: Cell::new(Lifecycle::Created),
                core: RefCell::new(Core {
                    selector,
                    mode,
                    reported_dropped: 0,
                }),
                resolve_task: RefCell::new(None),
                stats: Arc::new(SenderStats::new()),
                ctx: ModeContext::new(Arc::new(LoggingEventHandler)),
            }),
        }
    }

    /// Set a custom event handler
    ///
    /// Only takes effect before [`start`](Self::start); afterwards the
    /// running resolve loop shares the sender state and the handler is kept.
    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        match Rc::get_mut(&mut self.inner) {
            Some(inner) => inner.ctx = ModeContext::new(handler),
            None => log::warn!(
                "Event handler for {} must be set before start, ignoring",
                self.inner.destination
            ),
        }
        self
    }

    /// Arm periodic resolution
    ///
    /// The first resolution starts right away; each following one starts a
    /// resolve period after the previous one completed. Starting a started
    /// sender does nothing.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio `LocalSet`.
    pub fn start(&self) -> Result<()> {
        match self.inner.lifecycle.get() {
            Lifecycle::Created => {}
            Lifecycle::Started => {
                log::debug!("Sender for {} already started", self.inner.destination);
                return Ok(());
            }
            state @ (Lifecycle::ShuttingDown | Lifecycle::Stopped) => {
                return Err(Error::InvalidState {
                    action: "start",
                    state,
                })
            }
        }

        self.inner.lifecycle.set(Lifecycle::Started);
        let task = tokio::task::spawn_local(resolve_loop(Rc::downgrade(&self.inner)));
        *self.inner.resolve_task.borrow_mut() = Some(task);

        let mode = self.inner.core.borrow().mode.name();
        log::debug!(
            "Resolving {} every {:?} ({})",
            self.inner.destination.host(),
            self.inner.destination.resolve_period(),
            mode
        );
        self.inner.ctx.emit(SenderEvent::Started {
            destination: self.inner.destination.to_string(),
        });
        Ok(())
    }

    /// Send `bytes` to the current endpoint
    ///
    /// Makes exactly one non-blocking attempt and never reports failure: bytes
    /// that cannot go out (no endpoint resolved yet, sender not running,
    /// transport error) are added to the dropped-byte counter.
    ///
    /// # Panics
    ///
    /// Stream senders spawn their connection attempt from here, so once
    /// started this panics when called outside the sender's `LocalSet`.
    pub fn send(&self, bytes: &[u8]) {
        let inner = &*self.inner;
        if !inner.lifecycle.get().is_running() {
            inner.stats.record_dropped(bytes.len());
            log::trace!("Dropped {} bytes: sender is {}", bytes.len(), inner.lifecycle.get());
            return;
        }

        let mut core = inner.core.borrow_mut();
        let Some(endpoint) = core.selector.current() else {
            inner.stats.record_dropped(bytes.len());
            log::trace!("Dropped {} bytes: {} not resolved yet", bytes.len(), inner.destination);
            return;
        };

        match core.mode.try_send(endpoint, bytes, &inner.ctx) {
            Ok(()) => inner.stats.record_sent(bytes.len()),
            Err(sink_transport::Error::PartialWrite { written, expected }) => {
                inner.stats.record_sent(written);
                inner.stats.record_dropped(expected - written);
                log::trace!("Dropped {} of {} bytes to {}", expected - written, expected, endpoint);
            }
            Err(e) => {
                inner.stats.record_dropped(bytes.len());
                log::trace!("Dropped {} bytes to {}: {}", bytes.len(), endpoint, e);
            }
        }
    }

    /// Stop periodic resolution and release the transport handle
    ///
    /// A resolution in flight is abandoned and its answer ignored. Safe to call
    /// any number of times; dropping the sender calls it too.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.lifecycle.get()
    }

    pub fn destination(&self) -> &Destination {
        &self.inner.destination
    }

    /// Endpoint payloads currently go to
    pub fn current_endpoint(&self) -> Option<SocketAddr> {
        self.inner.core.borrow().selector.current()
    }

    /// Address multiset from the last resolution that changed it
    pub fn resolved_addresses(&self) -> Vec<IpAddr> {
        self.inner.core.borrow().selector.resolved().to_vec()
    }

    /// Whether a payload sent now would reach the transport
    pub fn is_ready(&self) -> bool {
        let core = self.inner.core.borrow();
        self.inner.lifecycle.get().is_running()
            && core
                .selector
                .current()
                .is_some_and(|endpoint| core.mode.is_ready(endpoint))
    }

    /// Shared statistics, readable from any thread
    pub fn stats(&self) -> SenderStatsRef {
        self.inner.stats.clone()
    }

    /// Total bytes dropped since construction
    pub fn dropped_bytes(&self) -> u64 {
        self.inner.stats.dropped_bytes()
    }

    /// Run a resolution completion as the resolve loop would
    #[cfg(test)]
    fn complete_resolution(&self, result: sink_dns::Result<Vec<IpAddr>>) {
        self.inner.handle_resolution(result);
    }
}

impl<M: SendMode> Drop for SocketSender<M> {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

impl<M: SendMode> Inner<M> {
    fn shutdown(&self) {
        let state = self.lifecycle.get();
        if state.is_finished() {
            return;
        }
        if state == Lifecycle::Created {
            self.lifecycle.set(Lifecycle::Stopped);
            return;
        }

        self.lifecycle.set(Lifecycle::ShuttingDown);
        if let Some(task) = self.resolve_task.borrow_mut().take() {
            task.abort();
        }
        self.core.borrow_mut().mode.shutdown();
        self.lifecycle.set(Lifecycle::Stopped);

        self.ctx.emit(SenderEvent::Stopped {
            destination: self.destination.to_string(),
        });
    }

    fn handle_resolution(&self, result: sink_dns::Result<Vec<IpAddr>>) {
        if !self.lifecycle.get().is_running() {
            log::debug!(
                "Ignoring resolution of {} completed while {}",
                self.destination.host(),
                self.lifecycle.get()
            );
            return;
        }

        let mut core = self.core.borrow_mut();
        self.report_dropped(&mut core);

        let addrs = match result {
            Ok(addrs) if !addrs.is_empty() => addrs,
            Ok(_) => {
                drop(core);
                let error = sink_dns::Error::NoAddresses(self.destination.host().to_string());
                self.resolution_failed(error);
                return;
            }
            Err(e) => {
                drop(core);
                self.resolution_failed(e);
                return;
            }
        };

        self.stats.record_resolve(false);
        let selection = core.selector.update(&addrs);
        match selection {
            Selection::Unchanged => {}
            Selection::Refreshed => {
                log::debug!(
                    "Addresses of {} changed, keeping endpoint {:?}",
                    self.destination.host(),
                    core.selector.current()
                );
            }
            Selection::Switched { current, .. } => {
                self.stats.record_endpoint_change();
                core.mode.endpoint_changed(current, &self.ctx);
            }
        }
        drop(core);

        self.ctx.emit(SenderEvent::Resolved {
            host: self.destination.host().to_string(),
            addrs,
        });
        if let Selection::Switched { previous, current } = selection {
            self.ctx.emit(SenderEvent::EndpointChanged { previous, current });
        }
    }

    fn resolution_failed(&self, error: sink_dns::Error) {
        self.stats.record_resolve(true);
        let kept = self.core.borrow().selector.current();
        match kept {
            Some(endpoint) => log::warn!(
                "Failed to resolve {}: {} (keeping {})",
                self.destination.host(),
                error,
                endpoint
            ),
            None => log::warn!(
                "Failed to resolve {}: {} (no endpoint yet)",
                self.destination.host(),
                error
            ),
        }
        self.ctx.emit(SenderEvent::ResolveFailed {
            host: self.destination.host().to_string(),
            kept,
            error: error.to_string(),
        });
    }

    fn report_dropped(&self, core: &mut Core<M>) {
        let total = self.stats.dropped_bytes();
        if total > core.reported_dropped {
            log::warn!(
                "Dropped {} bytes for {} since last check ({} total)",
                total - core.reported_dropped,
                self.destination,
                total
            );
            core.reported_dropped = total;
        }
    }
}

/// Resolve, apply, sleep, repeat; ends once the sender is gone or stopped
async fn resolve_loop<M: SendMode>(inner: Weak<Inner<M>>) {
    loop {
        let (resolver, host, period) = match inner.upgrade() {
            Some(inner) if inner.lifecycle.get().is_running() => (
                inner.resolver.clone(),
                inner.destination.host().to_string(),
                inner.destination.resolve_period(),
            ),
            _ => return,
        };

        let result = resolver.resolve(&host).await;

        match inner.upgrade() {
            Some(inner) => inner.handle_resolution(result),
            None => return,
        }

        tokio::time::sleep(period).await;
    }
}

impl UdpSender {
    /// Build a UDP sender using the system resolver
    pub fn from_config(config: &SenderConfig) -> Result<Self> {
        config.validate()?;
        if config.transport != TransportKind::Udp {
            return Err(Error::Config(format!(
                "UDP sender configured with transport {}",
                config.transport
            )));
        }
        Ok(Self::new(
            config.destination()?,
            Arc::new(config.resolver()),
            Datagram::new(config.udp_binder()),
        ))
    }
}

impl TcpSender {
    /// Build a TCP sender using the system resolver
    pub fn from_config(config: &SenderConfig) -> Result<Self> {
        config.validate()?;
        if config.transport != TransportKind::Tcp {
            return Err(Error::Config(format!(
                "TCP sender configured with transport {}",
                config.transport
            )));
        }
        Ok(Self::new(
            config.destination()?,
            Arc::new(config.resolver()),
            Stream::new(config.tcp_connector()),
        ))
    }
}

/// Sender whose transport is picked by configuration
#[derive(Debug)]
pub enum Sender {
    Udp(UdpSender),
    Tcp(TcpSender),
}

impl Sender {
    /// Build the sender matching `config.transport`
    pub fn from_config(config: &SenderConfig) -> Result<Self> {
        match config.transport {
            TransportKind::Udp => UdpSender::from_config(config).map(Sender::Udp),
            TransportKind::Tcp => TcpSender::from_config(config).map(Sender::Tcp),
        }
    }

    /// Set a custom event handler
    pub fn with_event_handler(self, handler: Arc<dyn EventHandler>) -> Self {
        match self {
            Sender::Udp(sender) => Sender::Udp(sender.with_event_handler(handler)),
            Sender::Tcp(sender) => Sender::Tcp(sender.with_event_handler(handler)),
        }
    }

    pub fn start(&self) -> Result<()> {
        match self {
            Sender::Udp(sender) => sender.start(),
            Sender::Tcp(sender) => sender.start(),
        }
    }

    pub fn send(&self, bytes: &[u8]) {
        match self {
            Sender::Udp(sender) => sender.send(bytes),
            Sender::Tcp(sender) => sender.send(bytes),
        }
    }

    pub fn shutdown(&self) {
        match self {
            Sender::Udp(sender) => sender.shutdown(),
            Sender::Tcp(sender) => sender.shutdown(),
        }
    }

    pub fn transport(&self) -> TransportKind {
        match self {
            Sender::Udp(_) => TransportKind::Udp,
            Sender::Tcp(_) => TransportKind::Tcp,
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        match self {
            Sender::Udp(sender) => sender.lifecycle(),
            Sender::Tcp(sender) => sender.lifecycle(),
        }
    }

    pub fn current_endpoint(&self) -> Option<SocketAddr> {
        match self {
            Sender::Udp(sender) => sender.current_endpoint(),
            Sender::Tcp(sender) => sender.current_endpoint(),
        }
    }

    pub fn stats(&self) -> SenderStatsRef {
        match self {
            Sender::Udp(sender) => sender.stats(),
            Sender::Tcp(sender) => sender.stats(),
        }
    }
}
