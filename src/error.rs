//! Contains the main error type for the library.
use thiserror::Error;

/// The main error type for the library. Each module has it's own error type that is contained by this error.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not Found")]
    NotFound,
    #[error("Timeout")]
    Timeout,
    #[error(transparent)]
    FramingError(crate::packet::error::Error),
    #[error(transparent)]
    TransportError(crate::transport::error::Error),
    #[error(transparent)]
    DefinitionError(crate::definitions::error::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[cfg(feature = "serialport")]
    #[error(transparent)]
    SerialPort(#[from] serialport::Error),
}

impl From<crate::packet::error::Error> for Error {
    fn from(e: crate::packet::error::Error) -> Error {
        Error::FramingError(e)
    }
}

impl From<crate::transport::error::Error> for Error {
    fn from(e: crate::transport::error::Error) -> Error {
        Error::TransportError(e)
    }
}

impl From<crate::definitions::error::Error> for Error {
    fn from(e: crate::definitions::error::Error) -> Error {
        Error::DefinitionError(e)
    }
}
