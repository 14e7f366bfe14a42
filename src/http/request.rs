//! Request handling.

use hyper::{Body, Method, Uri};
use hyper::header::HeaderMap;
use hyper::http::request::Parts;
use crate::vhost::host_label;


//------------ Request -------------------------------------------------------

/// An incoming request.
///
/// Since we only ever serve GET and HEAD requests, the body of the request
/// is dropped right away.
pub struct Request {
    parts: Parts,
}

impl Request {
    /// Returns whether the method is GET or HEAD.
    pub fn is_get_or_head(&self) -> bool {
        self.parts.method == Method::GET
            || self.parts.method == Method::HEAD
    }

    /// Returns the method of the request.
    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    /// Returns the URI of the request.
    pub fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    /// Returns the raw path of the request.
    pub fn path(&self) -> &str {
        self.parts.uri.path()
    }

    /// Returns the headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    /// Returns the value of a header if it is present and readable.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.parts.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Returns the first label of the host the request was sent to.
    ///
    /// The host is taken from the Host header or, failing that, from the
    /// request URI.
    pub fn host_label(&self) -> Option<String> {
        match self.header("Host") {
            Some(host) => host_label(host),
            None => self.parts.uri.host().and_then(host_label),
        }
    }
}


//--- From

impl From<hyper::Request<Body>> for Request {
    fn from(hyper: hyper::Request<Body>) -> Self {
        Self { parts: hyper.into_parts().0 }
    }
}


//============ Tests =========================================================
