//! Error types for the service directory

use crate::addr::StubAddress;
use thiserror::Error;

/// Service directory error type
#[derive(Error, Debug)]
pub enum Error {
    /// An address failed the validity rules of the endpoint model.
    #[error("invalid endpoint address: {0}")]
    InvalidAddress(String),

    /// A second server registered for an already occupied role name.
    #[error("role of `{existing}` is already served, rejecting `{rejected}`")]
    DuplicateServer {
        /// Stub currently occupying the slot.
        existing: StubAddress,
        /// Stub whose registration was rejected.
        rejected: StubAddress,
    },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
