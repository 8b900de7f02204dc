//! Stateless domain services: RFC3339 timestamp handling and settings
//! validation. Neither holds state; both operate purely on domain values.

mod datetime;
mod validation;

pub use datetime::{now_iso8601, parse_iso8601};
pub use validation::validate_settings;
