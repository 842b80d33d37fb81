//! Definition of errors.
use std::{error, fmt, result};

/// A specialized Result type for phgen.
pub type Result<T, E = PhgenError> = result::Result<T, E>;

/// Errors surfaced by the search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhgenError {
    /// A zero-length keyword was supplied.
    EmptyKeyword,

    /// Keywords share a key signature and duplicate handling is disabled.
    UnresolvableDuplicates {
        /// Number of keywords folded behind another keyword.
        count: u32,
    },

    /// The associated-value search backtracked out of its root without
    /// finding an assignment.
    ExhaustiveSearchFailure,

    /// The final verification found a collision. This indicates a bug in
    /// the search itself.
    InternalInvariant {
        /// The hash value that was assigned twice.
        hash: u32,
    },
}

impl PhgenError {
    pub(crate) const fn duplicates(count: u32) -> Self {
        Self::UnresolvableDuplicates { count }
    }
    pub(crate) const fn invariant(hash: u32) -> Self {
        Self::InternalInvariant { hash }
    }
}

impl fmt::Display for PhgenError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::EmptyKeyword => write!(
                f,
                "empty input keyword is not allowed; \
                 check for len == 0 before calling the generated lookup"
            ),
            Self::UnresolvableDuplicates { count } => write!(
                f,
                "{} input keys have identical key signatures; \
                 try different key positions or allow duplicates",
                count
            ),
            Self::ExhaustiveSearchFailure => write!(
                f,
                "no associated-value assignment found; \
                 raise the size multiple, disable fast mode, or pick other key positions"
            ),
            Self::InternalInvariant { hash } => {
                write!(f, "internal error, duplicate hash value {}", hash)
            }
        }
    }
}

impl error::Error for PhgenError {}
