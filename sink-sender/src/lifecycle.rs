//! Sender lifecycle

use std::fmt;

/// Lifecycle of a sender
///
/// ```text
/// Created ──start()──▶ Started ──shutdown()──▶ ShuttingDown ──▶ Stopped
///    └────────────────────shutdown()────────────────────────────▲
/// ```
///
/// Asynchronous completions (resolutions, connects) only touch sender state
/// while the sender is [`Started`](Lifecycle::Started).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Lifecycle {
    /// Constructed, no I/O performed yet
    #[default]
    Created = 0,
    /// Periodic resolution armed
    Started = 1,
    /// Tearing down timer and transport handle
    ShuttingDown = 2,
    /// Terminal state
    Stopped = 3,
}

impl Lifecycle {
    /// Check if completions may still mutate sender state
    pub const fn is_running(&self) -> bool {
        matches!(self, Lifecycle::Started)
    }

    /// Check if the sender is stopped or stopping
    pub const fn is_finished(&self) -> bool {
        matches!(self, Lifecycle::ShuttingDown | Lifecycle::Stopped)
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifecycle::Created => write!(f, "CREATED"),
            Lifecycle::Started => write!(f, "STARTED"),
            Lifecycle::ShuttingDown => write!(f, "SHUTTING_DOWN"),
            Lifecycle::Stopped => write!(f, "STOPPED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_predicates() {
        assert!(!Lifecycle::Created.is_running());
        assert!(Lifecycle::Started.is_running());
        assert!(!Lifecycle::ShuttingDown.is_running());
        assert!(Lifecycle::ShuttingDown.is_finished());
        assert!(Lifecycle::Stopped.is_finished());
        assert!(!Lifecycle::Created.is_finished());
        assert_eq!(Lifecycle::default(), Lifecycle::Created);
    }

    #[test]
    fn test_lifecycle_display() {
        assert_eq!(Lifecycle::ShuttingDown.to_string(), "SHUTTING_DOWN");
    }
}
