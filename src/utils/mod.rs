pub mod error;
pub mod logging;
pub mod rate_limit;

pub use error::{AppError, Result};
pub use rate_limit::RateLimiter;
