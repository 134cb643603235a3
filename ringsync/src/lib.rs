pub mod adapter;
pub mod cq;
pub mod error;
pub mod hw;
pub mod ring;
pub mod rx;
pub mod slot;
pub mod tx;

pub use error::Error;

/// A Result type using the crate error.
pub type Result<T> = std::result::Result<T, Error>;
