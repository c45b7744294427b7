//! The `utils` module provides the error taxonomy, logging setup and the
//! shutdown signal shared by every other module.

pub mod error;
pub mod logging;
pub mod shutdown;
