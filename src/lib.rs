//! Rate-aware client for the CSFloat marketplace API.
//!
//! [`http::Dispatcher`] performs single authenticated exchanges and fills a
//! [`http::ResponseEnvelope`]; [`ratelimit::RateTracker`] spaces requests per
//! bucket according to the quota headers the server returns.

pub mod backoff;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod ratelimit;
pub mod types;

pub use client::{Client, Failure};
pub use config::Config;
pub use error::{ApiError, ApiErrorCode, DispatchError};
pub use ratelimit::RateTracker;
pub use types::{BucketKey, RateQuota};
