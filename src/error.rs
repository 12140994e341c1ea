use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemrisError {
    #[error("{what} index {index} out of bounds (limit {limit})")]
    OutOfBounds {
        what: &'static str,
        index: usize,
        limit: usize,
    },

    #[error("table capacity exceeded ({capacity} rows)")]
    CapacityExceeded { capacity: usize },

    #[error("type mismatch on column {column}: expected {expected} lane, found {actual}")]
    TypeMismatch {
        column: usize,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("null value for primitive non-null column {column}")]
    NullInPrimitive { column: usize },

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("invalid argument shape: {0}")]
    ArgumentShape(String),
}

pub type Result<T> = std::result::Result<T, MemrisError>;
