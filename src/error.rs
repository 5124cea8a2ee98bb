//! The error taxonomy consumed across the core and its collaborators.
//!
//! See `spec.md` §7: configuration errors are fatal before a run starts,
//! invariant violations abort a run in progress, and backend errors are
//! surfaced as-is (the core never retries). Split-unproductive splits are
//! not errors: they are signaled by an empty `Vec<Partition>`.

/// The crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unknown QID type, missing tree, `k < 2`, etc. Fatal before the run starts.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Normalized width > 1, child counts not summing to parent, final counts
    /// not summing to the initial count, or no candidate QID found when the
    /// splittability check said one existed. Fatal: abort, do not persist.
    #[error("invariant violation: {0}")]
    Invariant(String),

    /// Surfaced verbatim from a `Backend` implementation. The core does not retry.
    #[error("backend error: {0}")]
    Backend(String),
}
