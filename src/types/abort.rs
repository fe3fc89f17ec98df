//! Abort reason and kind types.
//!
//! Abort in Strand is a first-class protocol: a fiber never silently
//! disappears. These types describe why a fiber was aborted; the reason
//! travels with the cancellation error raised at the fiber's suspension
//! point and is recorded in its terminal state.

use core::fmt;

/// The kind of abort request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AbortKind {
    /// Explicit abort requested by user code on a fiber handle.
    User,
    /// Abort cascaded from an aborted ancestor fiber.
    Parent,
    /// Abort due to runtime shutdown.
    Shutdown,
}

impl AbortKind {
    /// Returns the severity of this abort kind.
    ///
    /// Severity is informational: the first abort of a fiber wins and later
    /// requests are no-ops, but diagnostics order reasons by severity.
    #[must_use]
    pub const fn severity(self) -> u8 {
        match self {
            Self::User => 0,
            Self::Parent => 1,
            Self::Shutdown => 2,
        }
    }
}

impl fmt::Display for AbortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Parent => write!(f, "parent aborted"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// The reason a fiber was aborted, including kind and optional context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbortReason {
    /// The kind of abort.
    pub kind: AbortKind,
    /// Optional human-readable message (static for determinism).
    pub message: Option<&'static str>,
}

impl AbortReason {
    /// Creates a new abort reason with the given kind.
    #[must_use]
    pub const fn new(kind: AbortKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }

    /// Creates a user abort reason with a message.
    #[must_use]
    pub const fn user(message: &'static str) -> Self {
        Self {
            kind: AbortKind::User,
            message: Some(message),
        }
    }

    /// Creates a parent-aborted reason, used when the abort propagator
    /// cascades into child fibers.
    #[must_use]
    pub const fn parent() -> Self {
        Self::new(AbortKind::Parent)
    }

    /// Creates a shutdown abort reason.
    #[must_use]
    pub const fn shutdown() -> Self {
        Self::new(AbortKind::Shutdown)
    }

    /// Returns the kind of this abort reason.
    #[must_use]
    pub const fn kind(&self) -> AbortKind {
        self.kind
    }

    /// Returns true if this reason indicates runtime shutdown.
    #[must_use]
    pub const fn is_shutdown(&self) -> bool {
        matches!(self.kind, AbortKind::Shutdown)
    }
}

impl Default for AbortReason {
    fn default() -> Self {
        Self::new(AbortKind::User)
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(msg) = self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering() {
        assert!(AbortKind::User.severity() < AbortKind::Parent.severity());
        assert!(AbortKind::Parent.severity() < AbortKind::Shutdown.severity());
        assert!(AbortKind::User < AbortKind::Parent);
    }

    #[test]
    fn display_includes_message() {
        assert_eq!(AbortReason::user("stop").to_string(), "user: stop");
        assert_eq!(AbortReason::parent().to_string(), "parent aborted");
        assert_eq!(AbortReason::shutdown().to_string(), "shutdown");
    }

    #[test]
    fn shutdown_predicate() {
        assert!(AbortReason::shutdown().is_shutdown());
        assert!(!AbortReason::user("x").is_shutdown());
    }
}
