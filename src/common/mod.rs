//! Common Infrastructure
//!
//! The root error type every other module's errors fold into.
//! Configuration and logging live at the crate root (`crate::config`,
//! `crate::logging`) rather than here.

pub mod error;

pub use error::{BlossomError, Result};
