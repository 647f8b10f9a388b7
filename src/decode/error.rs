use thiserror::Error;

/// Failure to decode a single result. Sibling results are unaffected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Bytes {start}..{} out of range for a {payload} byte payload", .start + .length)]
    OutOfRange { start: usize, length: usize, payload: usize },
    #[error("Invalid Length: {0} bytes")]
    InvalidLength(usize),
    #[error("{0:?} is not numeric")]
    NotNumeric(String),
    #[error("Unknown Reference: {0}")]
    UnknownReference(String),
    #[error("Referenced result {0} failed to decode")]
    FailedReference(String),
    #[error("Missing String Table: {0}")]
    MissingStringTable(String),
    #[error("RPN Error: {0}")]
    Rpn(String),
    #[error("Division By Zero")]
    DivisionByZero,
    #[error("Overflow")]
    Overflow,
}
