//! Access to archives.
//!
//! Archives are versioned, content-addressed collections of files
//! identified by an opaque [`ArchiveKey`]. Replicating and verifying them is
//! the business of an archive engine. This module defines the narrow
//! interface the gateway needs from such an engine: opening an archive,
//! reading its manifest, looking up paths, listing directories, and
//! streaming file content.
//!
//! The [`fs`] module contains an engine serving archives that have been
//! checked out into a local directory.

pub use self::fs::FsStore;

pub mod fs;

use std::{error, fmt, io};
use std::pin::Pin;
use std::sync::Arc;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::Stream;
use serde::Deserialize;


//------------ ArchiveKey ----------------------------------------------------

/// The identifier of an archive.
///
/// The gateway never interprets the key. It is handed to the archive engine
/// and published via the discovery endpoint.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq)]
#[serde(transparent)]
pub struct ArchiveKey(String);

impl ArchiveKey {
    pub fn new(key: impl Into<String>) -> Self {
        ArchiveKey(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArchiveKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}


//------------ EntryKind -----------------------------------------------------

/// Whether an entry is a file or a directory.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EntryKind {
    File,
    Directory,
}


//------------ Entry ---------------------------------------------------------

/// The result of looking up a path in an archive.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Entry {
    /// The in-archive path that was looked up.
    ///
    /// This is the path actually used which includes a manifest’s web root
    /// if there is one.
    pub path: String,

    /// The size of the entry in bytes.
    pub size: u64,

    /// Where the entry lives in the archive’s storage.
    ///
    /// The value changes whenever the entry is rewritten, which is why it
    /// serves as a cache validator.
    pub offset: u64,

    /// Whether this is a file or a directory.
    pub kind: EntryKind,
}

impl Entry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}


//------------ DirEntry ------------------------------------------------------

/// A single item in a directory.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
}


//------------ Manifest ------------------------------------------------------

/// The archive-level metadata.
///
/// Only the fields the gateway cares about are kept, everything else in
/// the manifest is ignored.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct Manifest {
    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// A path prefix applied to all lookups.
    #[serde(default)]
    pub web_root: Option<String>,

    /// A page to serve if nothing else matches.
    #[serde(default)]
    pub fallback_page: Option<String>,
}

impl Manifest {
    /// Parses a manifest from its JSON representation.
    pub fn from_json(data: &[u8]) -> Result<Self, AccessError> {
        serde_json::from_slice(data).map_err(|err| {
            AccessError::Invalid(format!("broken manifest: {}", err))
        })
    }

    /// Returns the web root if there is a non-empty one.
    pub fn web_root(&self) -> Option<&str> {
        self.web_root.as_deref().filter(|root| !root.is_empty())
    }

    /// Returns the fallback page if there is a non-empty one.
    pub fn fallback_page(&self) -> Option<&str> {
        self.fallback_page.as_deref().filter(|page| !page.is_empty())
    }
}


//------------ ByteRange -----------------------------------------------------

/// A range of bytes of a file.
///
/// Both `start` and `end` are inclusive, just like in HTTP.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Returns the number of bytes covered by the range.
    pub fn len(self) -> u64 {
        self.end - self.start + 1
    }
}


//------------ ByteStream ----------------------------------------------------

/// The content of a file as a stream of chunks.
///
/// Dropping the stream releases whatever the engine holds for it.
pub type ByteStream = Pin<Box<
    dyn Stream<Item = Result<Bytes, io::Error>> + Send + 'static
>>;


//------------ ArchiveStore --------------------------------------------------

/// An archive engine that can open archives by their key.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Opens the archive with the given key.
    ///
    /// Returns `None` if the engine doesn’t know the archive.
    async fn open(&self, key: &ArchiveKey) -> Option<Arc<dyn Archive>>;
}


//------------ Archive -------------------------------------------------------

/// An opened archive.
///
/// All paths are absolute in-archive paths starting with a slash. A path
/// ending in a slash refers to a directory.
#[async_trait]
pub trait Archive: Send + Sync {
    /// Reads the archive’s manifest.
    async fn read_manifest(&self) -> Result<Manifest, AccessError>;

    /// Looks up a path.
    async fn stat(&self, path: &str) -> Result<Entry, AccessError>;

    /// Returns the content of a directory.
    async fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, AccessError>;

    /// Opens a stream of the content of a file.
    ///
    /// If `range` is given, only these bytes are produced.
    async fn read_stream(
        &self, path: &str, range: Option<ByteRange>
    ) -> Result<ByteStream, AccessError>;
}


//------------ AccessError ---------------------------------------------------

/// Accessing an archive has failed.
#[derive(Debug)]
pub enum AccessError {
    /// There is nothing at the path.
    NotFound,

    /// The path or the data found there is not acceptable.
    Invalid(String),

    /// Reading the underlying storage failed.
    Io(io::Error),
}

impl From<io::Error> for AccessError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            AccessError::NotFound
        }
        else {
            AccessError::Io(err)
        }
    }
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            AccessError::NotFound => f.write_str("not found"),
            AccessError::Invalid(ref msg) => f.write_str(msg),
            AccessError::Io(ref err) => err.fmt(f),
        }
    }
}

impl error::Error for AccessError { }


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn manifest_from_json() {
        let manifest = Manifest::from_json(
            b"{\"title\": \"Site\", \"web_root\": \"/dist\", \
              \"fallback_page\": \"/200.html\", \"links\": {}}"
        ).unwrap();
        assert_eq!(manifest.title.as_deref(), Some("Site"));
        assert_eq!(manifest.web_root(), Some("/dist"));
        assert_eq!(manifest.fallback_page(), Some("/200.html"));

        let manifest = Manifest::from_json(b"{\"web_root\": \"\"}").unwrap();
        assert_eq!(manifest.web_root(), None);
        assert_eq!(manifest.fallback_page(), None);

        assert!(Manifest::from_json(b"[1, 2]").is_err());
    }

    #[test]
    fn byte_range_len() {
        assert_eq!(ByteRange { start: 0, end: 99 }.len(), 100);
        assert_eq!(ByteRange { start: 5, end: 5 }.len(), 1);
    }
}
