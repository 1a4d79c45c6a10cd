//! # Lifecycle
//!
//! Configuration, startup and shutdown of the service, and the tracing
//! subscriber.

mod config;
mod error;
mod order_system;
pub mod tracing;

pub use config::*;
pub use error::*;
pub use order_system::*;
pub use self::tracing::setup_tracing;
