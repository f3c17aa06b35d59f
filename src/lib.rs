//! Registry Client - rate-limited document submission
//!
//! This crate submits documents to a remote registry API while capping the
//! number of submissions per time window. Callers over quota are delayed
//! until the window rolls over rather than rejected.

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod transport;

pub use error::{RegistryError, Result};
pub use ratelimit::{RateLimiter, TimeWindow, WindowSnapshot, MAX_WINDOW};
pub use transport::{HttpTransport, ResponseBody, Transport, TransportError};
