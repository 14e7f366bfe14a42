//! Resolving request paths into archive entries.
//!
//! A request path doesn’t always name an entry of the archive directly.
//! Instead, a chain of candidates is tried in order and the first one that
//! exists wins:
//!
//! * A path without a trailing slash that turns out to be a directory is
//!   treated as if it had one.
//! * For a directory, its `index.html` is tried first, then the directory
//!   itself which will lead to a listing.
//! * For a file, the path itself is tried first, then the path with
//!   `.html` appended.
//! * If nothing was found, the fallback page of the manifest is tried.
//!
//! If the manifest has a web root, all candidates are looked up below it.
//!
//! The candidates are tried strictly one after another. A failed lookup
//! of a candidate only means that the next one needs to be tried. Only when
//! all candidates have failed does resolving fail.

use log::debug;
use percent_encoding::percent_decode_str;
use tokio_util::sync::CancellationToken;
use crate::archive::{Archive, Entry, Manifest};


//------------ Resolved ------------------------------------------------------

/// What a request path resolved to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Resolved {
    /// A file to deliver.
    File(Entry),

    /// A directory to list.
    ///
    /// The path is the request path of the directory, not including the
    /// web root and always ending in a slash.
    Directory {
        path: String,
    },
}


//------------ LookupError ---------------------------------------------------

/// Resolving a path has failed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LookupError {
    /// None of the candidates exist.
    NotFound,

    /// The request was cancelled while resolving.
    Abandoned,
}


//------------ Lookup --------------------------------------------------------

/// Resolving a request path in a single archive.
pub struct Lookup<'a> {
    archive: &'a dyn Archive,
    manifest: Option<&'a Manifest>,
    cancel: &'a CancellationToken,
}

impl<'a> Lookup<'a> {
    pub fn new(
        archive: &'a dyn Archive,
        manifest: Option<&'a Manifest>,
        cancel: &'a CancellationToken,
    ) -> Self {
        Lookup { archive, manifest, cancel }
    }

    /// Resolves a raw request path.
    ///
    /// If `strip_archive_name` is `true`, the first segment of the path is
    /// the name of the archive and is removed before looking things up.
    pub async fn resolve(
        &self, raw_path: &str, strip_archive_name: bool,
    ) -> Result<Resolved, LookupError> {
        let raw_path = if strip_archive_name {
            strip_first_segment(raw_path)
        }
        else {
            raw_path
        };
        let mut path = decode_path(raw_path);

        // Directories and files have different candidates, so we need to
        // know what we have before we start.
        let mut is_dir = path.ends_with('/');
        if !is_dir {
            match self.probe(&path).await? {
                Some(entry) if entry.is_dir() => {
                    path.push('/');
                    is_dir = true;
                }
                Some(entry) => return Ok(Resolved::File(entry)),
                None => { }
            }
        }

        let found = if is_dir {
            self.first_of(&[format!("{}index.html", path), path.clone()])
                .await?
        }
        else {
            // The bare path was probed above already.
            self.first_of(&[format!("{}.html", path)]).await?
        };
        let found = match found {
            Some(entry) => Some(entry),
            None => match self.manifest.and_then(Manifest::fallback_page) {
                Some(page) => self.probe(page).await?,
                None => None,
            }
        };

        match found {
            Some(entry) if entry.is_dir() => {
                Ok(Resolved::Directory { path })
            }
            Some(entry) => Ok(Resolved::File(entry)),
            None => {
                debug!("Nothing found for '{}'.", path);
                Err(LookupError::NotFound)
            }
        }
    }

    /// Probes the candidates in order and returns the first hit.
    async fn first_of(
        &self, candidates: &[String]
    ) -> Result<Option<Entry>, LookupError> {
        for candidate in candidates {
            if let Some(entry) = self.probe(candidate).await? {
                return Ok(Some(entry))
            }
        }
        Ok(None)
    }

    /// Looks up a single candidate below the web root.
    ///
    /// Returns `Ok(None)` if the lookup failed for whatever reason.
    async fn probe(&self, path: &str) -> Result<Option<Entry>, LookupError> {
        let path = web_root_path(
            self.manifest.and_then(Manifest::web_root), path
        );
        let res = self.archive.stat(&path).await;
        if self.cancel.is_cancelled() {
            return Err(LookupError::Abandoned)
        }
        match res {
            Ok(entry) => Ok(Some(entry)),
            Err(err) => {
                debug!("Probing '{}' failed: {}", path, err);
                Ok(None)
            }
        }
    }
}


//------------ Helpers -------------------------------------------------------

/// Returns the in-archive path for a path with the given web root.
///
/// The root path becomes the web root itself, everything else is appended
/// to it.
pub fn web_root_path(web_root: Option<&str>, path: &str) -> String {
    match web_root {
        Some(root) if path.is_empty() || path == "/" => root.into(),
        Some(root) => {
            format!(
                "{}/{}",
                root.trim_end_matches('/'), path.trim_start_matches('/')
            )
        }
        None => path.into(),
    }
}

/// Returns the decoded first segment of a path with its leading slash.
///
/// This is the part removed by resolving with `strip_archive_name`.
pub fn first_segment(path: &str) -> String {
    let rest = path.strip_prefix('/').unwrap_or(path);
    let segment = match rest.find('/') {
        Some(idx) => &rest[..idx],
        None => rest,
    };
    format!("/{}", percent_decode_str(segment).decode_utf8_lossy())
}

/// Removes the first segment from a path.
fn strip_first_segment(path: &str) -> &str {
    let rest = path.strip_prefix('/').unwrap_or(path);
    match rest.find('/') {
        Some(idx) => &rest[idx..],
        None => "/",
    }
}

/// Percent-decodes a path and makes sure it is absolute.
fn decode_path(path: &str) -> String {
    let path = percent_decode_str(path).decode_utf8_lossy();
    if path.is_empty() {
        "/".into()
    }
    else if !path.starts_with('/') {
        format!("/{}", path)
    }
    else {
        path.into_owned()
    }
}


//============ Tests =========================================================
