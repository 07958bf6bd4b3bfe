use actix_web::dev::ServiceRequest;
use actix_web::http::header::HeaderName;

type CustomFn = Box<dyn Fn(&ServiceRequest) -> KeyExtraction>;

/// The type of the default key function, see
/// [RateLimiter::builder](crate::RateLimiter::builder).
pub type DefaultKeyFn = fn(&ServiceRequest) -> KeyExtraction;

/// The result of resolving the rate limit key for a request.
///
/// Skipping is distinct from any key value, including the empty string.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum KeyExtraction {
    /// Classify the request under this key.
    Key(String),
    /// Do not rate limit this request at all.
    Skip,
}

/// The default key derivation: the connection peer address.
///
/// Requests without a peer address are not rate limited.
pub(crate) fn peer_address_key(req: &ServiceRequest) -> KeyExtraction {
    let info = req.connection_info();
    match info.peer_addr() {
        Some(addr) => KeyExtraction::Key(addr.to_owned()),
        None => KeyExtraction::Skip,
    }
}

/// Utility to create a key function for the
/// [RateLimiterBuilder](crate::RateLimiterBuilder).
///
/// You should take care to ensure that you are producing unique keys per
/// store.
pub struct KeyFunctionBuilder {
    static_key: Option<String>,
    header_key: Option<HeaderName>,
    path_key: bool,
    custom_fn: Option<CustomFn>,
}

impl KeyFunctionBuilder {
    pub fn new() -> Self {
        Self {
            static_key: None,
            header_key: None,
            path_key: false,
            custom_fn: None,
        }
    }

    /// Add a fixed component to the rate limiting key
    pub fn static_key(mut self, key: &str) -> Self {
        self.static_key = Some(key.to_owned());
        self
    }

    /// Add the value of a request header to the rate limiting key.
    ///
    /// Requests that do not carry the header are not rate limited.
    pub fn header_key(mut self, header: HeaderName) -> Self {
        self.header_key = Some(header);
        self
    }

    /// Add the request path to the rate limiting key
    pub fn path_key(mut self) -> Self {
        self.path_key = true;
        self
    }

    /// Dynamically add a custom component to the rate limiting key.
    ///
    /// Returning [KeyExtraction::Skip] exempts the request entirely.
    pub fn custom_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&ServiceRequest) -> KeyExtraction + 'static,
    {
        self.custom_fn = Some(Box::new(f));
        self
    }

    pub fn build(self) -> impl Fn(&ServiceRequest) -> KeyExtraction + 'static {
        move |req| {
            let mut components = Vec::new();
            if let Some(fixed) = &self.static_key {
                components.push(fixed.clone());
            }
            if let Some(header) = &self.header_key {
                match req.headers().get(header).and_then(|v| v.to_str().ok()) {
                    Some(value) => components.push(value.to_owned()),
                    None => return KeyExtraction::Skip,
                }
            }
            if self.path_key {
                components.push(req.path().to_owned());
            }
            if let Some(f) = &self.custom_fn {
                match f(req) {
                    KeyExtraction::Key(component) => components.push(component),
                    KeyExtraction::Skip => return KeyExtraction::Skip,
                }
            }
            if components.is_empty() {
                return KeyExtraction::Skip;
            }
            KeyExtraction::Key(components.join("-"))
        }
    }
}

impl Default for KeyFunctionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
