//! sink-dns - hostname resolution for the resolving socket sender
//!
//! The sender never resolves on its send path. It asks a [`Resolver`] for the
//! current addresses of its destination on a fixed period and compares the
//! answer with the previous one. This crate provides:
//! - the [`Resolver`] trait the sender consumes
//! - [`SystemResolver`], backed by the operating system resolver through tokio
//! - [`mock::ScriptedResolver`] for deterministic tests
//!
//! # Example
//!
//! ```no_run
//! use sink_dns::{Resolver, SystemResolver};
//!
//! # async fn example() -> sink_dns::Result<()> {
//! let resolver = SystemResolver::new().ipv4_only(true);
//! let addrs = resolver.resolve("metrics.example.com").await?;
//! println!("first address: {}", addrs[0]);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod mock;
mod resolver;

pub use error::{Error, Result};
pub use resolver::{Resolver, SystemResolver};
