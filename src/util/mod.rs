//! Utility functions and helpers.

mod logging;
mod request_id;
mod time;

pub use logging::{LoggingError, init_logging, log_filter};
pub use request_id::RequestId;
pub use time::current_timestamp;
