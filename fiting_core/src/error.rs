use thiserror::Error;

/// Result alias for fallible index construction.
pub type Result<T> = std::result::Result<T, IndexError>;

/// Errors surfaced when building an index. Operations on a built index
/// never fail: lookups of absent keys return `None`, inserts of present
/// keys and erases of absent keys are no-ops.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum IndexError {
    /// The error bound, buffer capacity, or position type cannot serve
    /// the requested index.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// Input keys are not in non-decreasing order.
    #[error("input is not sorted at index {index}")]
    UnsortedInput { index: usize },
}
