//! Delivering the content of files.
//!
//! Delivery happens in two steps. First, a [`Plan`] is made from the entry
//! and the request headers. It determines the status code, the range to
//! deliver, and whether the client’s cached copy is still good. Only then
//! is the file actually opened, its content type sniffed, and its content
//! streamed out.
//!
//! Response headers can only be sent once the content type is known, so
//! an error while reading the first bytes still results in a proper error
//! response. An error after that can only be signalled by breaking off the
//! response body.

use std::io;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use bytes::Bytes;
use futures::stream::Stream;
use hyper::StatusCode;
use hyper::header::HeaderMap;
use log::{debug, warn};
use pin_project_lite::pin_project;
use tokio_util::sync::{
    CancellationToken, DropGuard, WaitForCancellationFutureOwned
};
use crate::archive::{Archive, ByteRange, ByteStream, Entry};
use crate::error::Abandoned;
use crate::sniff::{Sniffed, Sniffer};
use super::response::{
    etag_matches, internal_error, ContentType, Response, ResponseBuilder
};


//------------ Constants -----------------------------------------------------

/// The value of the Access-Control-Allow-Headers header.
const ALLOW_HEADERS: &str =
    "Origin, X-Requested-With, Content-Type, Accept, Range";


//------------ deliver -------------------------------------------------------

/// Creates the response delivering a file.
///
/// Returns an error if the request was cancelled before the response
/// headers were ready.
pub async fn deliver(
    archive: &dyn Archive,
    entry: &Entry,
    headers: &HeaderMap,
    cache_max_age: u64,
    cancel: &CancellationToken,
) -> Result<Response, Abandoned> {
    let plan = Plan::compute(entry, headers);
    if plan.status == StatusCode::NOT_MODIFIED {
        debug!("Not modified: {}", entry.path);
        return Ok(plan.builder(cache_max_age).empty())
    }

    let stream = archive.read_stream(&entry.path, plan.range).await;
    if cancel.is_cancelled() {
        return Err(Abandoned)
    }
    let stream = match stream {
        Ok(stream) => stream,
        Err(err) => {
            warn!("Failed to open file {}: {}", entry.path, err);
            return Ok(internal_error("Failed to read file"))
        }
    };

    let sniffed = Sniffer::new(entry.path.as_str(), stream).sniff().await;
    if cancel.is_cancelled() {
        return Err(Abandoned)
    }
    match sniffed {
        Ok(Sniffed::Content { content_type, stream }) => {
            Ok(plan.builder(cache_max_age).content_type(
                ContentType::external(content_type)
            ).stream(
                DeliveryBody::new(stream, entry.path.clone(), cancel)
            ))
        }
        Ok(Sniffed::Empty) => {
            debug!("Empty file: {}", entry.path);
            Ok(
                ResponseBuilder::ok()
                    .content_type(ContentType::TEXT)
                    .body("\n")
            )
        }
        Err(err) => {
            warn!("Failed to read file {}: {}", entry.path, err);
            Ok(internal_error("Failed to read file"))
        }
    }
}


//------------ parse_range ---------------------------------------------------

/// Parses the value of a Range header for a file of the given size.
///
/// Only the `bytes` unit is supported and only the first range is used.
/// The end of the range is clamped to the end of the file. Returns `None`
/// if the range cannot be satisfied or isn’t understood, in which case the
/// whole file is delivered.
pub fn parse_range(header: &str, size: u64) -> Option<ByteRange> {
    let spec = header.trim().strip_prefix("bytes=")?;
    let spec = spec.split(',').next()?.trim();
    let (start, end) = spec.split_once('-')?;
    let (start, end) = (start.trim(), end.trim());
    if size == 0 {
        return None
    }
    let last = size - 1;
    let (start, end) = if start.is_empty() {
        let len: u64 = end.parse().ok()?;
        if len == 0 {
            return None
        }
        (size.saturating_sub(len), last)
    }
    else {
        let start: u64 = start.parse().ok()?;
        let end = if end.is_empty() {
            last
        }
        else {
            end.parse::<u64>().ok()?.min(last)
        };
        (start, end)
    };
    if start > end {
        return None
    }
    Some(ByteRange { start, end })
}


//------------ Plan ----------------------------------------------------------

/// How a file is going to be delivered.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Plan {
    /// The status code of the response.
    pub status: StatusCode,

    /// The range of the file to deliver.
    pub range: Option<ByteRange>,

    /// The entity tag of the file.
    pub etag: String,

    /// The size of the file.
    size: u64,
}

impl Plan {
    /// Plans the delivery of an entry for a request with the given headers.
    pub fn compute(entry: &Entry, headers: &HeaderMap) -> Self {
        let range = headers.get("Range").and_then(|value| {
            value.to_str().ok()
        }).and_then(|value| parse_range(value, entry.size));
        let etag = format!("W/block-{}", entry.offset);
        let status = if range.is_some() {
            StatusCode::PARTIAL_CONTENT
        }
        else if etag_matches(headers, &etag) {
            StatusCode::NOT_MODIFIED
        }
        else {
            StatusCode::OK
        };
        Plan { status, range, etag, size: entry.size }
    }

    /// Returns the value of the Content-Range header if there is one.
    pub fn content_range(&self) -> Option<String> {
        self.range.map(|range| {
            format!("bytes {}-{}/{}", range.start, range.end, self.size)
        })
    }

    /// Returns the value of the Content-Length header if there is one.
    pub fn content_length(&self) -> Option<u64> {
        match self.status {
            StatusCode::PARTIAL_CONTENT => self.range.map(ByteRange::len),
            StatusCode::OK if self.size > 0 => Some(self.size),
            _ => None,
        }
    }

    /// Returns a response builder with all the headers of the plan.
    fn builder(&self, cache_max_age: u64) -> ResponseBuilder {
        let mut res = ResponseBuilder::new(self.status)
            .header("Accept-Ranges", "bytes")
            .header("Access-Control-Allow-Headers", ALLOW_HEADERS)
            .header(
                "Cache-Control",
                format!("public, max-age={}", cache_max_age)
            )
            .etag(&self.etag);
        if let Some(range) = self.content_range() {
            res = res.header("Content-Range", range);
        }
        if let Some(len) = self.content_length() {
            res = res.content_length(len);
        }
        res
    }
}


//------------ DeliveryBody --------------------------------------------------

pin_project! {
    /// The body of a file response.
    ///
    /// The body ends early if the request’s cancellation token is raised.
    /// Dropping the body raises the token.
    struct DeliveryBody {
        #[pin]
        cancelled: WaitForCancellationFutureOwned,
        stream: Option<ByteStream>,
        path: String,
        _guard: DropGuard,
    }
}

impl DeliveryBody {
    fn new(
        stream: ByteStream, path: String, cancel: &CancellationToken
    ) -> Self {
        DeliveryBody {
            cancelled: cancel.clone().cancelled_owned(),
            stream: Some(stream),
            path,
            _guard: cancel.clone().drop_guard(),
        }
    }
}

impl Stream for DeliveryBody {
    type Item = Result<Bytes, io::Error>;

    fn poll_next(
        self: Pin<&mut Self>, cx: &mut Context
    ) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if this.stream.is_some() && this.cancelled.poll(cx).is_ready() {
            debug!("Delivery of {} abandoned.", this.path);
            *this.stream = None;
        }
        let stream = match this.stream.as_mut() {
            Some(stream) => stream,
            None => return Poll::Ready(None),
        };
        match stream.as_mut().poll_next(cx) {
            Poll::Ready(Some(Err(err))) => {
                warn!("Failed to read file {}: {}", this.path, err);
                *this.stream = None;
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                *this.stream = None;
                Poll::Ready(None)
            }
            other => other
        }
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;
    use futures::StreamExt;
    use hyper::body::{to_bytes, HttpBody};
    use crate::archive::EntryKind;
    use crate::test::MemoryArchive;

    fn range(start: u64, end: u64) -> Option<ByteRange> {
        Some(ByteRange { start, end })
    }

    fn headers(items: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut res = HeaderMap::new();
        for (name, value) in items {
            res.insert(*name, value.parse().unwrap());
        }
        res
    }

    fn entry(size: u64, offset: u64) -> Entry {
        Entry {
            path: "/file".into(), size, offset, kind: EntryKind::File
        }
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_range("bytes=0-99", 1000), range(0, 99));
        assert_eq!(parse_range(" bytes=10-", 1000), range(10, 999));
        assert_eq!(parse_range("bytes=-100", 1000), range(900, 999));
        assert_eq!(parse_range("bytes=-5000", 1000), range(0, 999));
        assert_eq!(parse_range("bytes=990-2000", 1000), range(990, 999));
        assert_eq!(parse_range("bytes=0-0,5-9", 1000), range(0, 0));
        assert_eq!(parse_range("bytes=1000-", 1000), None);
        assert_eq!(parse_range("bytes=5-4", 1000), None);
        assert_eq!(parse_range("bytes=-0", 1000), None);
        assert_eq!(parse_range("bytes=0-", 0), None);
        assert_eq!(parse_range("items=0-5", 1000), None);
        assert_eq!(parse_range("bytes=a-b", 1000), None);
        assert_eq!(parse_range("bytes=5", 1000), None);
    }

    #[test]
    fn plans() {
        let plan = Plan::compute(&entry(1000, 7), &HeaderMap::new());
        assert_eq!(plan.status, StatusCode::OK);
        assert_eq!(plan.etag, "W/block-7");
        assert_eq!(plan.content_length(), Some(1000));
        assert_eq!(plan.content_range(), None);

        let plan = Plan::compute(
            &entry(1000, 7), &headers(&[("Range", "bytes=0-99")])
        );
        assert_eq!(plan.status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(plan.content_length(), Some(100));
        assert_eq!(plan.content_range().unwrap(), "bytes 0-99/1000");

        let plan = Plan::compute(
            &entry(1000, 7), &headers(&[("If-None-Match", "W/block-7")])
        );
        assert_eq!(plan.status, StatusCode::NOT_MODIFIED);
        assert_eq!(plan.content_length(), None);

        // A range request is never answered with Not Modified.
        let plan = Plan::compute(
            &entry(1000, 7),
            &headers(&[("If-None-Match", "*"), ("Range", "bytes=0-1")])
        );
        assert_eq!(plan.status, StatusCode::PARTIAL_CONTENT);

        let plan = Plan::compute(
            &entry(0, 7), &headers(&[("Range", "bytes=0-1")])
        );
        assert_eq!(plan.status, StatusCode::OK);
        assert_eq!(plan.content_length(), None);
    }

    async fn deliver_file(
        archive: &MemoryArchive,
        path: &str,
        items: &[(&'static str, &'static str)],
        cancel: &CancellationToken,
    ) -> Result<Response, Abandoned> {
        let entry = archive.stat(path).await.unwrap();
        deliver(archive, &entry, &headers(items), 60, cancel).await
    }

    #[tokio::test]
    async fn deliver_whole_file() {
        let archive = MemoryArchive::new().file_at(
            "/index.html", b"<h1>Hello, world!</h1>\n", 12
        );
        let res = deliver_file(
            &archive, "/index.html", &[], &CancellationToken::new()
        ).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let headers = res.headers();
        assert_eq!(headers["Content-Type"], "text/html; charset=utf-8");
        assert_eq!(headers["Content-Length"], "23");
        assert_eq!(headers["ETag"], "W/block-12");
        assert_eq!(headers["Accept-Ranges"], "bytes");
        assert_eq!(headers["Cache-Control"], "public, max-age=60");
        assert_eq!(headers["Access-Control-Allow-Origin"], "*");
        assert_eq!(headers["Access-Control-Allow-Headers"], ALLOW_HEADERS);
        assert_eq!(
            to_bytes(res.into_body()).await.unwrap(),
            "<h1>Hello, world!</h1>\n"
        );
    }

    #[tokio::test]
    async fn deliver_range() {
        let data: Vec<u8> = (0..1000).map(|x| (x % 251) as u8).collect();
        let archive = MemoryArchive::new().file("/data.bin", &data);
        let res = deliver_file(
            &archive, "/data.bin", &[("Range", "bytes=0-99")],
            &CancellationToken::new()
        ).await.unwrap();
        assert_eq!(res.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(res.headers()["Content-Range"], "bytes 0-99/1000");
        assert_eq!(res.headers()["Content-Length"], "100");
        assert_eq!(
            to_bytes(res.into_body()).await.unwrap().as_ref(),
            &data[..100]
        );
    }

    #[tokio::test]
    async fn deliver_not_modified() {
        let archive = MemoryArchive::new().file_at("/a.txt", b"aaa", 3);
        let res = deliver_file(
            &archive, "/a.txt", &[("If-None-Match", "W/block-2, W/block-3")],
            &CancellationToken::new()
        ).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(res.headers()["ETag"], "W/block-3");
        assert!(to_bytes(res.into_body()).await.unwrap().is_empty());
        assert_eq!(archive.streams_opened(), 0);
    }

    #[tokio::test]
    async fn deliver_empty_file() {
        let archive = MemoryArchive::new().file("/empty", b"");
        let res = deliver_file(
            &archive, "/empty", &[], &CancellationToken::new()
        ).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(to_bytes(res.into_body()).await.unwrap(), "\n");
    }

    #[tokio::test]
    async fn deliver_broken_file() {
        let archive = MemoryArchive::new().broken_file("/broken", 10);
        let res = deliver_file(
            &archive, "/broken", &[], &CancellationToken::new()
        ).await.unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            to_bytes(res.into_body()).await.unwrap(), "Failed to read file"
        );
        assert_eq!(archive.streams_dropped(), 1);
    }

    #[tokio::test]
    async fn deliver_truncated_file() {
        let archive = MemoryArchive::new().truncated_file(
            "/short.txt", &[b'x'; 600]
        );
        let res = deliver_file(
            &archive, "/short.txt", &[], &CancellationToken::new()
        ).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()["Content-Length"], "1200");
        assert!(to_bytes(res.into_body()).await.is_err());
        assert_eq!(archive.streams_dropped(), 1);
    }

    #[tokio::test]
    async fn deliver_short_truncated_file() {
        // The error happens while sniffing, so there is still time for a
        // proper error response.
        let archive = MemoryArchive::new().truncated_file(
            "/short.txt", b"only half"
        );
        let res = deliver_file(
            &archive, "/short.txt", &[], &CancellationToken::new()
        ).await.unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn abandoned_before_headers() {
        let archive = MemoryArchive::new().file("/a.txt", b"aaa");
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(
            deliver_file(&archive, "/a.txt", &[], &cancel).await.unwrap_err(),
            Abandoned
        );
        assert_eq!(archive.streams_opened(), archive.streams_dropped());
    }

    #[tokio::test]
    async fn cancel_tears_down_stream() {
        let archive = MemoryArchive::new().endless_file(
            "/forever.txt", &[b'x'; 600]
        );
        let cancel = CancellationToken::new();
        let res = deliver_file(
            &archive, "/forever.txt", &[], &cancel
        ).await.unwrap();
        let mut body = res.into_body();
        assert_eq!(body.data().await.unwrap().unwrap().len(), 600);
        assert_eq!(archive.streams_dropped(), 0);
        cancel.cancel();
        assert!(body.data().await.is_none());
        assert_eq!(archive.streams_dropped(), 1);
    }

    #[tokio::test]
    async fn dropped_body_raises_token() {
        let archive = MemoryArchive::new().endless_file(
            "/forever.txt", &[b'x'; 600]
        );
        let cancel = CancellationToken::new();
        let res = deliver_file(
            &archive, "/forever.txt", &[], &cancel
        ).await.unwrap();
        drop(res);
        assert!(cancel.is_cancelled());
        assert_eq!(archive.streams_dropped(), 1);
    }

    #[tokio::test]
    async fn body_stream_ends() {
        let archive = MemoryArchive::new().file("/a.txt", b"aaa");
        let cancel = CancellationToken::new();
        let entry = archive.stat("/a.txt").await.unwrap();
        let stream = archive.read_stream(&entry.path, None).await.unwrap();
        let mut body = Box::pin(
            DeliveryBody::new(stream, entry.path, &cancel)
        );
        assert_eq!(body.next().await.unwrap().unwrap(), "aaa");
        assert!(body.next().await.is_none());
        assert!(body.next().await.is_none());
        assert_eq!(archive.streams_dropped(), 1);
    }
}
