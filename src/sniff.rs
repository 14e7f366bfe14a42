//! Determining the content type of a file.
//!
//! The type is taken from the file name’s extension if there is one we
//! know. Otherwise we look at the first few bytes of the content. Because
//! those bytes need to be read before the response headers can be sent,
//! the [`Sniffer`] keeps them and hands them out again in front of the
//! rest of the stream.

use std::{io, str};
use bytes::{Bytes, BytesMut};
use futures::stream::{self, StreamExt};
use crate::archive::ByteStream;


//------------ Constants -----------------------------------------------------

/// The number of bytes we look at.
pub const SNIFF_LEN: usize = 512;

/// The content type if we can’t tell.
pub const OCTET_STREAM: &str = "application/octet-stream";


//------------ Sniffer -------------------------------------------------------

/// Reads the start of a stream to determine the content type.
pub struct Sniffer {
    /// The path of the file, used for the extension.
    path: String,

    /// The stream.
    stream: ByteStream,
}

impl Sniffer {
    pub fn new(path: impl Into<String>, stream: ByteStream) -> Self {
        Sniffer { path: path.into(), stream }
    }

    /// Reads enough of the stream to decide on the content type.
    ///
    /// Returns an error if the stream fails before the decision was made.
    pub async fn sniff(mut self) -> Result<Sniffed, io::Error> {
        let mut chunks = Vec::new();
        let mut head = BytesMut::new();
        let mut done = false;
        while head.len() < SNIFF_LEN {
            match self.stream.next().await {
                Some(chunk) => {
                    let chunk = chunk?;
                    if chunk.is_empty() {
                        continue
                    }
                    let missing = SNIFF_LEN - head.len();
                    head.extend_from_slice(
                        &chunk[..chunk.len().min(missing)]
                    );
                    chunks.push(chunk);
                }
                None => {
                    done = true;
                    break
                }
            }
        }
        if chunks.is_empty() {
            return Ok(Sniffed::Empty)
        }
        let content_type = content_type(&self.path, &head, !done);
        let head = stream::iter(chunks.into_iter().map(Ok::<_, io::Error>));
        let stream: ByteStream = if done {
            Box::pin(head)
        }
        else {
            Box::pin(head.chain(self.stream))
        };
        Ok(Sniffed::Content { content_type, stream })
    }
}


//------------ Sniffed -------------------------------------------------------

/// The outcome of sniffing a stream.
pub enum Sniffed {
    /// The stream didn’t contain any data.
    Empty,

    /// The stream has data.
    Content {
        /// The content type including parameters.
        content_type: String,

        /// The complete stream including the bytes used for sniffing.
        stream: ByteStream,
    }
}


//------------ Detection -----------------------------------------------------

/// Determines the content type for a file.
///
/// The `head` is the start of the file. If `truncated` is `true`, there is
/// more content following it.
pub fn content_type(path: &str, head: &[u8], truncated: bool) -> String {
    let essence = match mime_guess::from_path(path).first() {
        Some(mime) => mime.essence_str().to_string(),
        None => magic_type(head, truncated).into(),
    };
    if is_text(&essence) {
        format!("{}; charset=utf-8", essence)
    }
    else {
        essence
    }
}

/// Returns whether a media type is a text type.
fn is_text(essence: &str) -> bool {
    essence.starts_with("text/")
        || essence == "application/json"
        || essence == "application/javascript"
        || essence == "application/xml"
}

/// Guesses the media type from the content.
fn magic_type(head: &[u8], truncated: bool) -> &'static str {
    const MAGIC: &[(&[u8], &str)] = &[
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xff\xd8\xff", "image/jpeg"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"%PDF-", "application/pdf"),
        (b"PK\x03\x04", "application/zip"),
        (b"\x1f\x8b\x08", "application/gzip"),
        (b"\0asm", "application/wasm"),
    ];

    for &(magic, media_type) in MAGIC {
        if head.starts_with(magic) {
            return media_type
        }
    }
    if head.len() >= 12 && &head[..4] == b"RIFF" && &head[8..12] == b"WEBP" {
        return "image/webp"
    }

    let text = match str::from_utf8(head) {
        Ok(text) => text,
        Err(err) => {
            // A character may have been cut in half at the end.
            if !truncated || err.error_len().is_some() {
                return OCTET_STREAM
            }
            // The prefix up to valid_up_to is valid by definition.
            str::from_utf8(&head[..err.valid_up_to()]).unwrap_or_default()
        }
    };
    if text.chars().any(|ch| {
        ch.is_control() && !matches!(ch, '\t' | '\n' | '\r' | '\x0c')
    }) {
        return OCTET_STREAM
    }
    let trimmed = text.trim_start();
    let lower = trimmed.get(..14).unwrap_or(trimmed).to_ascii_lowercase();
    if lower.starts_with("<!doctype html")
        || lower.starts_with("<html")
        || lower.starts_with("<head")
        || lower.starts_with("<body")
    {
        "text/html"
    }
    else if trimmed.starts_with('{') || trimmed.starts_with('[') {
        "application/json"
    }
    else {
        "text/plain"
    }
}


//============ Tests =========================================================
