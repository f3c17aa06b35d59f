//! Rate limiting logic and window state.

mod limiter;
mod window;

pub use limiter::{RateLimiter, MAX_WINDOW};
pub use window::{TimeWindow, WindowSnapshot};
