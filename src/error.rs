//! Error types for the rewrite layer.
//!
//! All errors that can occur while adapting a query tree are represented by
//! [`RewriteError`]. Errors are propagated via `Result<T, RewriteError>`
//! through every pass and handed back to the host at the
//! [`crate::pipeline::process`] boundary.
//!
//! # Error Classification
//!
//! Errors are classified into two categories that determine how the host
//! reports them:
//! - **User**: the query asks for a construct the target dialect cannot
//!   express deterministically (OFFSET without ORDER BY in a split-query
//!   load), or the host passed invalid settings. The query is rejected with
//!   a descriptive message.
//! - **Internal**: the input tree violates a structural invariant, or a
//!   pass produced an inconsistent tree. Indicates a defect upstream or in
//!   this crate; never recoverable locally.
//!
//! An abstract method the mapper does not recognise is *not* an error: the
//! translators return `None` so the host's chain can try the next one.

use std::fmt;

/// Primary error type for the rewrite passes.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RewriteError {
    // ── User errors: reject the query ────────────────────────────────────
    /// The query uses a construct the target dialect cannot emulate.
    #[error("unsupported construct: {0}")]
    UnsupportedConstruct(String),

    /// An invalid argument or setting was provided by the host.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // ── Internal errors: should not happen ──────────────────────────────
    /// The input tree is malformed (e.g. a dangling column reference).
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A pass produced an inconsistent tree. Indicates a bug.
    #[error("internal error: {0}")]
    InternalError(String),
}

/// Classification of error kind for the host's diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteErrorKind {
    User,
    Internal,
}

impl fmt::Display for RewriteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RewriteErrorKind::User => write!(f, "USER"),
            RewriteErrorKind::Internal => write!(f, "INTERNAL"),
        }
    }
}

impl RewriteError {
    /// Classify the error for reporting.
    pub fn kind(&self) -> RewriteErrorKind {
        match self {
            RewriteError::UnsupportedConstruct(_) | RewriteError::InvalidArgument(_) => {
                RewriteErrorKind::User
            }
            RewriteError::InvariantViolation(_) | RewriteError::InternalError(_) => {
                RewriteErrorKind::Internal
            }
        }
    }

    /// Whether the host must abort the whole compilation.
    ///
    /// Internal errors mean the tree can no longer be trusted. User errors
    /// reject only the offending query.
    pub fn is_fatal(&self) -> bool {
        self.kind() == RewriteErrorKind::Internal
    }
}
