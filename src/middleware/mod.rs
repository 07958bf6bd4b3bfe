pub mod builder;
pub mod key;

use crate::store::{Limit, LimitStore};
use actix_web::body::EitherBody;
use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use builder::{HeaderNames, RateLimiterBuilder};
use futures::future::{ok, LocalBoxFuture, Ready};
use key::{DefaultKeyFn, KeyExtraction};
use std::cell::RefCell;
use std::fmt::Display;
use std::rc::Rc;
use std::time::Duration;
use thiserror::Error;

/// The outcome of evaluating a limit record against its quota.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Decision {
    Allowed,
    Denied,
}

/// How a denial is signalled to the caller.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum DenialStrategy {
    /// Write the 429 response directly.
    Respond,
    /// Return a [RateLimitExceeded] error, for an outer layer to format.
    Raise,
}

pub(crate) struct GuardConfig {
    pub(crate) max: u64,
    pub(crate) duration: Duration,
    /// None when header emission is disabled.
    pub(crate) headers: Option<HeaderNames>,
    pub(crate) denial: DenialStrategy,
    pub(crate) error_message: Option<String>,
}

/// Error produced when a request exceeds its quota, carrying everything an
/// outer error handling layer needs to reconstruct the denial response.
///
/// Its [ResponseError] implementation builds the same response the guard
/// writes when it is not configured to raise.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RateLimitExceeded {
    message: String,
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl RateLimitExceeded {
    /// The denial message: either the configured override, or the default
    /// "Rate limit exceeded, retry in N minutes." form.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The quota metadata headers, empty when header emission is disabled.
    pub fn headers(&self) -> &[(HeaderName, HeaderValue)] {
        &self.headers
    }

    fn to_response(&self) -> HttpResponse {
        let mut response = HttpResponse::build(self.status_code());
        for (name, value) in &self.headers {
            response.insert_header((name.clone(), value.clone()));
        }
        response.body(self.message.clone())
    }
}

impl ResponseError for RateLimitExceeded {
    fn status_code(&self) -> StatusCode {
        StatusCode::TOO_MANY_REQUESTS
    }

    fn error_response(&self) -> HttpResponse {
        self.to_response()
    }
}

/// Rate limit guard middleware.
///
/// Holds no state between requests beyond its configuration; the store
/// owns all per-key records.
pub struct RateLimiter<ST, F> {
    store: ST,
    key_fn: Rc<F>,
    config: Rc<GuardConfig>,
}

impl<ST, F> Clone for RateLimiter<ST, F>
where
    ST: LimitStore + 'static,
    F: Fn(&ServiceRequest) -> KeyExtraction + 'static,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            key_fn: self.key_fn.clone(),
            config: self.config.clone(),
        }
    }
}

impl<ST> RateLimiter<ST, DefaultKeyFn>
where
    ST: LimitStore + 'static,
{
    /// # Arguments
    ///
    /// * `store`: The store holding the per-key limit records.
    /// * `max`: The quota ceiling per window, must be positive.
    pub fn builder(store: ST, max: u64) -> RateLimiterBuilder<ST, DefaultKeyFn> {
        RateLimiterBuilder::new(store, max, key::peer_address_key as DefaultKeyFn)
    }
}

impl<S, B, ST, F> Transform<S, ServiceRequest> for RateLimiter<ST, F>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    S::Future: 'static,
    B: 'static,
    ST: LimitStore + 'static,
    ST::Error: Into<actix_web::Error> + Display,
    F: Fn(&ServiceRequest) -> KeyExtraction + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = actix_web::Error;
    type Transform = RateLimiterMiddleware<S, ST, F>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(RateLimiterMiddleware {
            service: Rc::new(RefCell::new(service)),
            store: self.store.clone(),
            key_fn: Rc::clone(&self.key_fn),
            config: Rc::clone(&self.config),
        })
    }
}

pub struct RateLimiterMiddleware<S, ST, F> {
    service: Rc<RefCell<S>>,
    store: ST,
    key_fn: Rc<F>,
    config: Rc<GuardConfig>,
}

impl<S, B, ST, F> Service<ServiceRequest> for RateLimiterMiddleware<S, ST, F>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    S::Future: 'static,
    B: 'static,
    ST: LimitStore + 'static,
    ST::Error: Into<actix_web::Error> + Display,
    F: Fn(&ServiceRequest) -> KeyExtraction + 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let store = self.store.clone();
        let key_fn = self.key_fn.clone();
        let config = self.config.clone();

        Box::pin(async move {
            let key = match (key_fn)(&req) {
                KeyExtraction::Key(key) => key,
                // No key, no limiting: the request passes through untouched
                KeyExtraction::Skip => {
                    return Ok(service.call(req).await?.map_into_left_body());
                }
            };

            let loaded = match store.get(&key).await {
                Ok(loaded) => loaded,
                Err(e) => {
                    log::error!("Rate limit store lookup failed: {e}");
                    return Err(e.into());
                }
            };

            // Reuse the record while its window is live, otherwise start a
            // fresh window with the full quota.
            let mut limit = match loaded {
                Some(limit) if !limit.is_expired() => limit,
                _ => Limit::new(config.max, config.duration),
            };

            // The request in hand consumes quota immediately; at zero the
            // record is persisted unchanged and the request is denied.
            let decision = if limit.remaining > 0 {
                limit.remaining -= 1;
                Decision::Allowed
            } else {
                Decision::Denied
            };

            if let Err(e) = store.set(&key, limit.clone(), limit.until_reset()).await {
                log::error!("Rate limit store write failed: {e}");
                return Err(e.into());
            }

            match decision {
                Decision::Allowed => {
                    let mut service_response = service.call(req).await?;
                    if let Some(names) = &config.headers {
                        for (name, value) in quota_headers(names, &limit) {
                            service_response.headers_mut().insert(name, value);
                        }
                    }
                    Ok(service_response.map_into_left_body())
                }
                Decision::Denied => {
                    let denied = RateLimitExceeded {
                        message: config.error_message.clone().unwrap_or_else(|| {
                            format!(
                                "Rate limit exceeded, retry in {} minutes.",
                                limit.minutes_until_reset()
                            )
                        }),
                        headers: config
                            .headers
                            .as_ref()
                            .map(|names| quota_headers(names, &limit))
                            .unwrap_or_default(),
                    };
                    match config.denial {
                        DenialStrategy::Raise => Err(denied.into()),
                        DenialStrategy::Respond => {
                            let response = denied.to_response();
                            Ok(req.into_response(response).map_into_right_body())
                        }
                    }
                }
            }
        })
    }
}

/// The metadata header triple for a just-evaluated record.
fn quota_headers(names: &HeaderNames, limit: &Limit) -> Vec<(HeaderName, HeaderValue)> {
    vec![
        (names.remaining.clone(), HeaderValue::from(limit.remaining)),
        (
            names.reset.clone(),
            HeaderValue::from(limit.minutes_until_reset()),
        ),
        (names.total.clone(), HeaderValue::from(limit.total)),
    ]
}
