//! Common utilities and types shared across devicewatch components.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
