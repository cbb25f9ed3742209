//! Error types for balance derivation.
//!
//! Missing runtime capabilities and unknown accounts are not errors; they
//! resolve to empty or zero-valued results. What remains here is data the
//! pipeline cannot make sense of and failures reported by upstream feeds.

use thiserror::Error;

/// Errors surfaced on a derived-balance feed.
///
/// `Clone` because one failure is fanned out to every subscriber sharing
/// the same derivation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeriveError {
    /// A vesting schedule arrived with a zero unlock rate.
    #[error("malformed vesting schedule: per_block is zero (starting block {starting_block})")]
    MalformedSchedule {
        /// Starting block of the offending schedule.
        starting_block: u64,
    },

    /// A storage reply did not line up with the query that produced it.
    #[error("unexpected storage reply: {0}")]
    UnexpectedReply(String),

    /// An upstream collaborator feed failed.
    #[error("upstream feed failed: {0}")]
    Upstream(String),
}

/// Convenience alias used across the crate.
pub type DeriveResult<T> = Result<T, DeriveError>;
