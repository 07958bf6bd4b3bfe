use crate::middleware::key::KeyExtraction;
use crate::middleware::{DenialStrategy, GuardConfig, RateLimiter};
use crate::store::LimitStore;
use actix_web::dev::ServiceRequest;
use actix_web::http::header::HeaderName;
use once_cell::sync::Lazy;
use std::rc::Rc;
use std::time::Duration;

pub static X_RATELIMIT_LIMIT: Lazy<HeaderName> =
    Lazy::new(|| HeaderName::from_static("x-ratelimit-limit"));

pub static X_RATELIMIT_REMAINING: Lazy<HeaderName> =
    Lazy::new(|| HeaderName::from_static("x-ratelimit-remaining"));

pub static X_RATELIMIT_RESET: Lazy<HeaderName> =
    Lazy::new(|| HeaderName::from_static("x-ratelimit-reset"));

/// The default window length.
pub const DEFAULT_DURATION: Duration = Duration::from_secs(60 * 60);

/// Names used for the quota metadata headers.
#[derive(Debug, Clone)]
pub struct HeaderNames {
    /// Carries the quota left after this request, default `x-ratelimit-remaining`.
    pub remaining: HeaderName,
    /// Carries the rounded minutes until the window resets, default `x-ratelimit-reset`.
    pub reset: HeaderName,
    /// Carries the total quota per window, default `x-ratelimit-limit`.
    pub total: HeaderName,
}

impl Default for HeaderNames {
    fn default() -> Self {
        Self {
            remaining: X_RATELIMIT_REMAINING.clone(),
            reset: X_RATELIMIT_RESET.clone(),
            total: X_RATELIMIT_LIMIT.clone(),
        }
    }
}

pub struct RateLimiterBuilder<ST, F> {
    store: ST,
    key_fn: F,
    max: u64,
    duration: Duration,
    header_names: HeaderNames,
    disable_headers: bool,
    raise_on_deny: bool,
    error_message: Option<String>,
}

impl<ST, F> RateLimiterBuilder<ST, F>
where
    ST: LimitStore + 'static,
    F: Fn(&ServiceRequest) -> KeyExtraction + 'static,
{
    pub(super) fn new(store: ST, max: u64, key_fn: F) -> Self {
        assert!(max > 0, "max must be a positive quota");
        Self {
            store,
            key_fn,
            max,
            duration: DEFAULT_DURATION,
            header_names: HeaderNames::default(),
            disable_headers: false,
            raise_on_deny: false,
            error_message: None,
        }
    }

    /// Override the default one hour window length.
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Replace the default key function.
    ///
    /// The key function classifies each request under an opaque key, or
    /// returns [KeyExtraction::Skip] to exempt it from rate limiting
    /// entirely. The default derives the key from the connection peer
    /// address.
    pub fn key_fn<G>(self, key_fn: G) -> RateLimiterBuilder<ST, G>
    where
        G: Fn(&ServiceRequest) -> KeyExtraction + 'static,
    {
        RateLimiterBuilder {
            store: self.store,
            key_fn,
            max: self.max,
            duration: self.duration,
            header_names: self.header_names,
            disable_headers: self.disable_headers,
            raise_on_deny: self.raise_on_deny,
            error_message: self.error_message,
        }
    }

    /// Override the default `x-ratelimit-*` header names.
    pub fn header_names(mut self, names: HeaderNames) -> Self {
        self.header_names = names;
        self
    }

    /// Suppress all quota metadata headers, regardless of naming, for
    /// callers who want pure allow/deny semantics.
    ///
    /// Default is false.
    pub fn disable_headers(mut self, disable: bool) -> Self {
        self.disable_headers = disable;
        self
    }

    /// Signal denials by returning a [RateLimitExceeded](crate::RateLimitExceeded)
    /// error instead of writing the 429 response directly, so that an outer
    /// error handling layer can centralize response formatting.
    ///
    /// Default is false.
    pub fn raise_on_deny(mut self, raise: bool) -> Self {
        self.raise_on_deny = raise;
        self
    }

    /// Override the default denial message, used verbatim.
    pub fn error_message(mut self, message: &str) -> Self {
        self.error_message = Some(message.to_owned());
        self
    }

    pub fn build(self) -> RateLimiter<ST, F> {
        RateLimiter {
            store: self.store,
            key_fn: Rc::new(self.key_fn),
            config: Rc::new(GuardConfig {
                max: self.max,
                duration: self.duration,
                headers: if self.disable_headers {
                    None
                } else {
                    Some(self.header_names)
                },
                denial: if self.raise_on_deny {
                    DenialStrategy::Raise
                } else {
                    DenialStrategy::Respond
                },
                error_message: self.error_message,
            }),
        }
    }
}
