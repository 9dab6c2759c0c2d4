//! Scripted resolver for tests
//!
//! [`ScriptedResolver`] answers successive lookups from a queue of scripted
//! steps. A step is either an immediate answer or a [`Deferred`] one that the
//! test completes later, which lets a test hold a resolution in flight while it
//! does something else (typically shutting the sender down).
//!
//! # Example
//!
//! ```
//! use std::net::IpAddr;
//! use sink_dns::mock::ScriptedResolver;
//! use sink_dns::Resolver;
//!
//! # async fn example() {
//! let a: IpAddr = "10.0.0.1".parse().unwrap();
//! let resolver = ScriptedResolver::new();
//! resolver.push_addrs(vec![a]);
//! resolver.push_failure("SERVFAIL");
//!
//! assert_eq!(resolver.resolve("metrics").await.unwrap(), vec![a]);
//! assert!(resolver.resolve("metrics").await.is_err());
//! assert_eq!(resolver.calls(), 2);
//! # }
//! ```

use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::resolver::Resolver;

enum Step {
    Ready(Result<Vec<IpAddr>>),
    Deferred(oneshot::Receiver<Result<Vec<IpAddr>>>),
}

/// Resolver returning scripted answers in order
///
/// Once the script runs dry every lookup fails, which the sender treats like
/// any other resolution failure.
#[derive(Default)]
pub struct ScriptedResolver {
    steps: Mutex<VecDeque<Step>>,
    hosts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedResolver {
    /// Create a resolver with an empty script
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a resolver answering each lookup with the next address list
    pub fn with_script(script: Vec<Vec<IpAddr>>) -> Self {
        let resolver = Self::new();
        for addrs in script {
            resolver.push_addrs(addrs);
        }
        resolver
    }

    /// Queue a successful answer
    ///
    /// An empty list is reported as [`Error::NoAddresses`], matching
    /// [`SystemResolver`](crate::SystemResolver).
    pub fn push_addrs(&self, addrs: Vec<IpAddr>) {
        self.push(Step::Ready(Ok(addrs)));
    }

    /// Queue a failed lookup
    pub fn push_failure(&self, message: impl Into<String>) {
        self.push(Step::Ready(Err(Error::Dns(message.into()))));
    }

    /// Queue a lookup that stays pending until the returned handle completes it
    pub fn push_deferred(&self) -> Deferred {
        let (tx, rx) = oneshot::channel();
        self.push(Step::Deferred(rx));
        Deferred { tx }
    }

    /// Number of lookups performed so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Acquire)
    }

    /// Hosts looked up so far, in order
    pub fn hosts(&self) -> Vec<String> {
        self.hosts.lock().unwrap().clone()
    }

    /// Number of scripted steps not consumed yet
    pub fn remaining(&self) -> usize {
        self.steps.lock().unwrap().len()
    }

    fn push(&self, step: Step) {
        self.steps.lock().unwrap().push_back(step);
    }
}

#[async_trait]
impl Resolver for ScriptedResolver {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>> {
        self.calls.fetch_add(1, Ordering::AcqRel);
        self.hosts.lock().unwrap().push(host.to_string());

        let step = self.steps.lock().unwrap().pop_front();
        let answer = match step {
            Some(Step::Ready(answer)) => answer,
            Some(Step::Deferred(rx)) => rx
                .await
                .unwrap_or_else(|_| Err(Error::Cancelled(host.to_string()))),
            None => Err(Error::Dns(format!("no scripted answer for {}", host))),
        };

        match answer {
            Ok(addrs) if addrs.is_empty() => Err(Error::NoAddresses(host.to_string())),
            other => other,
        }
    }
}

/// Completion handle for a deferred lookup
pub struct Deferred {
    tx: oneshot::Sender<Result<Vec<IpAddr>>>,
}

impl Deferred {
    /// Complete the lookup with addresses
    ///
    /// Returns `false` when nobody is waiting any more, i.e. the resolution was
    /// dropped before it finished.
    pub fn complete(self, addrs: Vec<IpAddr>) -> bool {
        self.tx.send(Ok(addrs)).is_ok()
    }

    /// Fail the lookup
    pub fn fail(self, message: impl Into<String>) -> bool {
        self.tx.send(Err(Error::Dns(message.into()))).is_ok()
    }

    /// Whether the waiting resolution has been dropped
    pub fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_script_is_consumed_in_order() {
        let resolver =
            ScriptedResolver::with_script(vec![vec![ip("10.0.0.1")], vec![ip("10.0.0.2")]]);

        assert_eq!(resolver.resolve("a").await.unwrap(), vec![ip("10.0.0.1")]);
        assert_eq!(resolver.resolve("b").await.unwrap(), vec![ip("10.0.0.2")]);
        assert_eq!(resolver.calls(), 2);
        assert_eq!(resolver.hosts(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(resolver.remaining(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_script_fails() {
        let resolver = ScriptedResolver::new();
        assert!(matches!(resolver.resolve("a").await, Err(Error::Dns(_))));
    }

    #[tokio::test]
    async fn test_empty_answer_is_no_addresses() {
        let resolver = ScriptedResolver::with_script(vec![vec![]]);
        let err = resolver.resolve("a").await.unwrap_err();
        assert!(err.is_empty_answer());
    }

    #[tokio::test]
    async fn test_deferred_answer() {
        let resolver = std::sync::Arc::new(ScriptedResolver::new());
        let deferred = resolver.push_deferred();

        let lookup = {
            let resolver = resolver.clone();
            tokio::spawn(async move { resolver.resolve("a").await })
        };
        tokio::task::yield_now().await;

        assert!(deferred.complete(vec![ip("10.0.0.9")]));
        assert_eq!(lookup.await.unwrap().unwrap(), vec![ip("10.0.0.9")]);
    }

    #[tokio::test]
    async fn test_deferred_dropped_before_completion() {
        let resolver = ScriptedResolver::new();
        let deferred = resolver.push_deferred();
        drop(deferred);
        assert!(matches!(resolver.resolve("a").await, Err(Error::Cancelled(_))));
    }

    #[tokio::test]
    async fn test_deferred_detects_abandoned_lookup() {
        let resolver = std::sync::Arc::new(ScriptedResolver::new());
        let deferred = resolver.push_deferred();

        let lookup = {
            let resolver = resolver.clone();
            tokio::spawn(async move { resolver.resolve("a").await })
        };
        tokio::task::yield_now().await;
        lookup.abort();
        let _ = lookup.await;

        assert!(deferred.is_abandoned());
        assert!(!deferred.complete(vec![ip("10.0.0.9")]));
    }
}
