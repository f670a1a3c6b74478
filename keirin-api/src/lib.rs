//! # Keirin API
//!
//! HTTP clients for the two upstream sources the pipeline crawls:
//!
//! - **winticket** - the primary JSON API (monthly listings, cup details,
//!   race cards, odds)
//! - **yenjoy** - the secondary HTML site (race result pages)
//!
//! Plus the shared throttling primitives:
//!
//! - **rate_limit** - per-endpoint minimum spacing with jitter
//! - **backoff** - per-endpoint exponential retry scheduling

pub mod backoff;
pub mod error;
pub mod rate_limit;
pub mod winticket;
pub mod yenjoy;

pub use backoff::Backoff;
pub use error::{ApiError, ApiResult};
pub use rate_limit::RateLimiter;
pub use winticket::{WinticketClient, WinticketConfig};
pub use yenjoy::{HtmlPage, YenjoyClient, YenjoyConfig};
