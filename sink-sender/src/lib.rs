//! sink-sender - best-effort socket sender following DNS changes
//!
//! A sender delivers opaque payloads to a destination given by hostname and
//! port. The hostname is re-resolved on a fixed period in the background, so a
//! long-lived sender follows DNS changes of its collector without ever blocking
//! the caller on a lookup or a full socket buffer. Payloads that cannot go out
//! are dropped and counted.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      SocketSender<M>                       │
//! │                                                            │
//! │  resolve loop ──► EndpointSelector ──► SendMode (M)        │
//! │  (sink-dns)       multiset compare     Datagram / Stream   │
//! │                                        (sink-transport)    │
//! │                                                            │
//! │  Lifecycle guard, SenderStats, EventHandler                │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything runs on the thread driving a tokio `LocalSet`; see
//! [`sender`] for the threading rules.

pub mod config;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod mode;
pub mod selector;
pub mod sender;
pub mod stats;

pub use config::{Destination, SenderConfig, TransportKind};
pub use error::{Error, Result};
pub use event::{EventHandler, LoggingEventHandler, SenderEvent};
pub use lifecycle::Lifecycle;
pub use mode::{Datagram, ModeContext, SendMode, Stream};
pub use selector::{AddressSet, EndpointSelector, Selection};
pub use sender::{Sender, SocketSender, TcpSender, UdpSender};
pub use stats::{SenderStats, SenderStatsRef, StatsSnapshot};
