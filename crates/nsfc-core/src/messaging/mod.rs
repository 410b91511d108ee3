//! Outbound messaging abstractions and decorators.

pub mod port;
pub mod throttled;
pub mod timeout;
pub mod types;
