//! Building responses.

use std::borrow::Cow;
use std::fmt;
use bytes::Bytes;
use futures::stream::Stream;
use hyper::{Body, StatusCode};
use hyper::header::HeaderMap;
use hyper::http::response::Builder;


//------------ Response ------------------------------------------------------

pub type Response = hyper::Response<Body>;


//------------ Canned Responses ----------------------------------------------

/// Returns a Not Found response.
pub fn not_found() -> Response {
    error(StatusCode::NOT_FOUND, "Not found")
}

/// Returns a Method Not Allowed response.
pub fn method_not_allowed() -> Response {
    ResponseBuilder::new(StatusCode::METHOD_NOT_ALLOWED)
        .header("Allow", "GET, HEAD")
        .content_type(ContentType::TEXT)
        .body("Method not allowed")
}

/// Returns a Not Acceptable response listing the types we do have.
pub fn not_acceptable(supported: &[&str]) -> Response {
    error(
        StatusCode::NOT_ACCEPTABLE,
        format_args!(
            "Not acceptable. Supported types: {}", supported.join(", ")
        )
    )
}

/// Returns an Internal Server Error response.
pub fn internal_error(message: impl fmt::Display) -> Response {
    error(StatusCode::INTERNAL_SERVER_ERROR, message)
}

/// Creates an error response with a plain text body.
pub fn error(status: StatusCode, message: impl fmt::Display) -> Response {
    ResponseBuilder::new(
        status
    ).content_type(
        ContentType::TEXT
    ).body(message.to_string())
}


//------------ ResponseBuilder ----------------------------------------------

#[derive(Debug)]
pub struct ResponseBuilder {
    builder: Builder,
}

impl ResponseBuilder {
    /// Creates a new builder with the given status.
    pub fn new(status: StatusCode) -> Self {
        ResponseBuilder {
            builder:  Builder::new().status(status).header(
                "Access-Control-Allow-Origin", "*"
            )
        }
    }

    /// Creates a new builder for a 200 OK response.
    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    /// Adds an arbitrary header.
    pub fn header(self, name: &'static str, value: impl AsRef<str>) -> Self {
        ResponseBuilder {
            builder: self.builder.header(name, value.as_ref())
        }
    }

    /// Adds the content type header.
    pub fn content_type(self, content_type: ContentType) -> Self {
        self.header("Content-Type", content_type.0)
    }

    /// Adds the ETag header.
    pub fn etag(self, etag: &str) -> Self {
        self.header("ETag", etag)
    }

    /// Adds the Content-Length header.
    pub fn content_length(self, len: u64) -> Self {
        self.header("Content-Length", len.to_string())
    }

    fn finalize(self, body: Body) -> Response {
        self.builder.body(body).expect("broken HTTP response builder")
    }

    /// Finalizes the response by adding a body.
    pub fn body(self, body: impl Into<Bytes>) -> Response {
        self.finalize(Body::from(body.into()))
    }

    /// Finalizes the response by adding an empty body.
    pub fn empty(self) -> Response {
        self.finalize(Body::empty())
    }

    /// Finalizes the response with a body produced by a stream.
    pub fn stream<S, E>(self, body: S) -> Response
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.finalize(Body::wrap_stream(body))
    }
}


//------------ ContentType ---------------------------------------------------

#[derive(Clone, Debug)]
pub struct ContentType(Cow<'static, str>);

impl ContentType {
    pub const TEXT: ContentType = ContentType(
        Cow::Borrowed("text/plain; charset=utf-8")
    );

    pub fn external(value: impl Into<Cow<'static, str>>) -> Self {
        ContentType(value.into())
    }
}


//------------ If-None-Match -------------------------------------------------

/// Returns whether the request’s If-None-Match header matches `etag`.
pub fn etag_matches(headers: &HeaderMap, etag: &str) -> bool {
    for value in headers.get_all("If-None-Match").iter() {
        // Skip ill-formatted values. By being lazy here we may falsely
        // return a full response, so this should be fine.
        let value = match value.to_str() {
            Ok(value) => value,
            Err(_) => continue
        };
        let value = value.trim();
        if value == "*" {
            return true
        }
        if EtagsIter(value).any(|tag| tag.trim() == etag) {
            return true
        }
    }
    false
}


//------------ Parsing Etags -------------------------------------------------

/// An iterator over the etags in an If-Not-Match header value.
///
/// This does not handle the "*" value.
///
/// One caveat: The iterator stops when it encounters bad formatting which
/// makes this indistinguishable from reaching the end of a correctly
/// formatted value. As a consequence, we will 304 a request that has the
/// right tag followed by garbage.
struct EtagsIter<'a>(&'a str);

impl<'a> Iterator for EtagsIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        // Skip white space and check if we are done.
        self.0 = self.0.trim_start();
        if self.0.is_empty() {
            return None
        }

        // We either have to have a lone DQUOTE or one prefixed by W/
        let prefix_len = if self.0.starts_with('"') {
            1
        }
        else if self.0.starts_with("W/\"") {
            3
        }
        else {
            // Our own tags are weak but unquoted, so take everything up
            // to the next comma.
            let end = self.0.find(',').unwrap_or(self.0.len());
            let res = self.0[..end].trim_end();
            self.0 = self.0[end..].trim_start_matches(',');
            return Some(res)
        };

        // Find the end of the tag which is after the next DQUOTE.
        let end = match self.0[prefix_len..].find('"') {
            Some(index) => index + prefix_len + 1,
            None => return None
        };

        let res = &self.0[0..end];

        // Move past the second DQUOTE and any space.
        self.0 = self.0[end..].trim_start();

        // If we have a comma, skip over that and any space.
        if self.0.starts_with(',') {
            self.0 = self.0[1..].trim_start();
        }

        Some(res)
    }
}


//============ Tests =========================================================
