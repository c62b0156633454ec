//! Error types for query resolution and path parsing

/// Failure of a resolve, materialize or invalidate call
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// No query tree, or a tree without any condition
    #[error("empty query: no tag conditions to resolve")]
    EmptyQuery,

    /// The relational store rejected a statement; nothing was committed
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, ResolveError>;

/// Failure to turn a navigated path into a query tree
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryParseError {
    #[error("negation '-' is not followed by a tag")]
    DanglingNegation,

    #[error("negated tag '{0}' has no preceding tag in its branch")]
    NegationWithoutTag(String),

    #[error("incomplete triple tag starting at '{0}' (expected namespace:/key/op/value)")]
    IncompleteTriple(String),

    #[error("unknown triple operator '{0}' (expected eq, inc, gt or lt)")]
    UnknownOperator(String),

    #[error("empty alternative in '{0}'")]
    EmptyAlternative(String),

    #[error("tag '{tag}' contains the query delimiter '{delimiter}'")]
    DelimiterInTag { tag: String, delimiter: String },
}
