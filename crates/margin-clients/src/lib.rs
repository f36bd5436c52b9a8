//! # margin-clients
//!
//! Provider clients for the margin sync pipeline:
//! - [`ReadwiseClient`]: cursor-paginated source fetcher
//! - [`MemClient`]: note sink implementing [`margin_core::NoteSink`]
//! - [`RateLimiter`]: per-client fixed-window request cap

pub mod mem;
pub mod provider_error;
pub mod rate_limit;
pub mod readwise;

pub use mem::MemClient;
pub use provider_error::{decode_failure, extract_message};
pub use rate_limit::RateLimiter;
pub use readwise::{Page, ReadwiseClient};
