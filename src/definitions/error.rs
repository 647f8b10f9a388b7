use thiserror::Error;

/// Problems with the declarative definitions themselves. Fatal to the operation being decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Parent chain of {0} contains a cycle")]
    Cycle(String),
    #[error("{id} inherits from unknown definition {parent}")]
    MissingParent { id: String, parent: String },
    #[error("{id} inherits from {parent}, which is a different kind of definition")]
    WrongParentKind { id: String, parent: String },
    #[error("{id} never resolves a value for {field}")]
    Incomplete { id: String, field: &'static str },
    #[error("Result {0} is part of a reference cycle")]
    ReferenceCycle(String),
    #[error("Definition {0} not found")]
    NotFound(String),
    #[error("{unit} has no operation named {operation}")]
    UnknownOperation { unit: String, operation: String },
    #[error("{0} has no bus address")]
    NoAddress(String),
    #[error("Invalid number {0:?}")]
    InvalidNumber(String),
    #[error("Invalid definition file: {0}")]
    InvalidFile(String),
}
