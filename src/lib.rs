#![cfg_attr(docsrs, feature(doc_cfg))]

mod middleware;
pub mod store;

pub use middleware::builder::{HeaderNames, RateLimiterBuilder};
pub use middleware::key::{DefaultKeyFn, KeyExtraction, KeyFunctionBuilder};
pub use middleware::{RateLimitExceeded, RateLimiter};
