//! Common utilities and types shared across the VIP agent crates.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
