//! Request/response boundary types
//!
//! The security layer never talks to an HTTP framework directly. The host
//! builds an [`Exchange`] per request, hands it to the
//! [`SecurityContext`](crate::context::SecurityContext), and afterwards copies
//! the collected response headers onto its own response.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use axum::http::{Extensions, HeaderMap, HeaderName, HeaderValue, Method};
use serde::{Deserialize, Serialize};

/// HTTP method as used by token permissions
///
/// `All` is the wildcard that matches every concrete method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
    Trace,
    Connect,
    All,
}

impl HttpMethod {
    /// Canonical upper-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Trace => "TRACE",
            Self::Connect => "CONNECT",
            Self::All => "ALL",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            "PATCH" => Ok(Self::Patch),
            "HEAD" => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            "TRACE" => Ok(Self::Trace),
            "CONNECT" => Ok(Self::Connect),
            "ALL" | "*" => Ok(Self::All),
            _ => Err(format!("unknown http method: {s}")),
        }
    }
}

impl TryFrom<String> for HttpMethod {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HttpMethod> for String {
    fn from(method: HttpMethod) -> Self {
        method.as_str().to_string()
    }
}

impl TryFrom<&Method> for HttpMethod {
    type Error = String;

    fn try_from(method: &Method) -> Result<Self, Self::Error> {
        method.as_str().parse()
    }
}

/// Read-only view of an inbound request
#[derive(Debug, Clone)]
pub struct Request {
    method: HttpMethod,
    domain: String,
    url: String,
    headers: HeaderMap,
    ip: IpAddr,
}

impl Request {
    /// Create a request for `url` with an empty header map, an empty domain
    /// and an unspecified caller address
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            domain: String::new(),
            url: url.into(),
            headers: HeaderMap::new(),
            ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        }
    }

    /// Set the domain (host without port)
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    /// Set the caller address
    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.ip = ip;
        self
    }

    /// Replace the header map
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Append a single header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Request path, without query string
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a header, if present and valid UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Per-request typed key/value store
///
/// Used to hand the resolved token from the auth adapter to the rate limit
/// adapters. Keys are types, so each consumer defines its own newtype.
#[derive(Debug, Clone, Default)]
pub struct SessionStorage {
    inner: Extensions,
}

impl SessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning the previous value of the same type
    pub fn insert<T: Clone + Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.inner.insert(value)
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.inner.get::<T>()
    }

    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.inner.get::<T>().is_some()
    }

    pub fn remove<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.inner.remove::<T>()
    }

    /// Give up the storage as [`Extensions`] for the host framework
    pub fn into_extensions(self) -> Extensions {
        self.inner
    }
}

/// One request/response pair travelling through the security layer
#[derive(Debug, Clone)]
pub struct Exchange {
    request: Request,
    storage: SessionStorage,
    response_headers: HeaderMap,
}

impl Exchange {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            storage: SessionStorage::new(),
            response_headers: HeaderMap::new(),
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn storage(&self) -> &SessionStorage {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut SessionStorage {
        &mut self.storage
    }

    /// Split borrow used by auth adapters, which read the request while
    /// writing to the storage
    pub fn parts_mut(&mut self) -> (&Request, &mut SessionStorage) {
        (&self.request, &mut self.storage)
    }

    /// Headers to be added to the eventual response
    pub fn response_headers(&self) -> &HeaderMap {
        &self.response_headers
    }

    pub fn response_headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.response_headers
    }

    /// Consume the exchange, returning the storage and the collected headers
    pub fn into_parts(self) -> (SessionStorage, HeaderMap) {
        (self.storage, self.response_headers)
    }
}
