use thiserror::Error;

#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Not Connected")]
    NotConnected,
    #[error("Short Write: line accepted {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },
}
