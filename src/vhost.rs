//! Finding the archive for a request.
//!
//! Which archive a request is for is determined from the virtual host it
//! was sent to and, possibly, the first segment of its path. There are two
//! ways to arrange this, selected once via the configured [`VhostMode`]:
//!
//! * In per-archive mode, the first label of the host name is the name of
//!   the archive. Every archive has its own subdomain.
//! * In per-user mode, the first label of the host name is the name of a
//!   user. The user’s top-level archive, the one named like the user, is
//!   served at the root of the host. Any other archive of the user is
//!   served below a path prefix of its name.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use async_trait::async_trait;
use log::debug;
use percent_encoding::percent_decode_str;
use crate::registry::{ArchiveRecord, Registry};


//------------ VhostMode -----------------------------------------------------

/// How virtual hosts map to archives.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VhostMode {
    /// Every archive has its own host name.
    PerArchive,

    /// Every user has their own host name.
    PerUser,
}

impl VhostMode {
    /// Creates the resolver for this mode.
    pub fn resolver(
        self, registry: Arc<dyn Registry>
    ) -> Box<dyn ArchiveResolver> {
        match self {
            VhostMode::PerArchive => {
                Box::new(PerArchiveStrategy::new(registry))
            }
            VhostMode::PerUser => Box::new(PerUserStrategy::new(registry)),
        }
    }
}

impl Default for VhostMode {
    fn default() -> Self {
        VhostMode::PerArchive
    }
}

impl FromStr for VhostMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "archive" => Ok(VhostMode::PerArchive),
            "user" => Ok(VhostMode::PerUser),
            _ => Err(format!("invalid vhost mode '{}'", s))
        }
    }
}

impl fmt::Display for VhostMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            VhostMode::PerArchive => "archive",
            VhostMode::PerUser => "user",
        })
    }
}


//------------ ResolvedArchive -----------------------------------------------

/// The archive a request is for.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvedArchive {
    /// The record of the archive.
    pub record: ArchiveRecord,

    /// Was the archive named by the first segment of the request path?
    ///
    /// If so, this segment needs to be removed before looking up the path
    /// in the archive.
    pub path_prefixed: bool,
}

impl ResolvedArchive {
    fn new(record: ArchiveRecord, path_prefixed: bool) -> Self {
        ResolvedArchive { record, path_prefixed }
    }
}


//------------ ArchiveResolver -----------------------------------------------

/// Determines the archive for a request.
#[async_trait]
pub trait ArchiveResolver: Send + Sync {
    /// Resolves the archive.
    ///
    /// The `label` is the first label of the request’s host name, `path`
    /// the raw path of the request. If `top_level_only` is `true`, the path
    /// is not considered at all.
    ///
    /// Returns `None` if there is no such archive.
    async fn resolve(
        &self, label: &str, path: &str, top_level_only: bool
    ) -> Option<ResolvedArchive>;
}


//------------ PerArchiveStrategy --------------------------------------------

/// The resolver for per-archive mode.
pub struct PerArchiveStrategy {
    registry: Arc<dyn Registry>,
}

impl PerArchiveStrategy {
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        PerArchiveStrategy { registry }
    }
}

#[async_trait]
impl ArchiveResolver for PerArchiveStrategy {
    async fn resolve(
        &self, label: &str, _path: &str, _top_level_only: bool
    ) -> Option<ResolvedArchive> {
        let record = self.registry.archive_by_name(label).await;
        if record.is_none() {
            debug!("No archive named '{}'.", label);
        }
        record.map(|record| ResolvedArchive::new(record, false))
    }
}


//------------ PerUserStrategy -----------------------------------------------

/// The resolver for per-user mode.
pub struct PerUserStrategy {
    registry: Arc<dyn Registry>,
}

impl PerUserStrategy {
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        PerUserStrategy { registry }
    }
}

#[async_trait]
impl ArchiveResolver for PerUserStrategy {
    async fn resolve(
        &self, label: &str, path: &str, top_level_only: bool
    ) -> Option<ResolvedArchive> {
        let user = match self.registry.user_by_username(label).await {
            Some(user) => user,
            None => {
                debug!("No user named '{}'.", label);
                return None
            }
        };
        if !top_level_only {
            if let Some(name) = first_segment(path) {
                if let Some(record) = user.archive(&name) {
                    return Some(ResolvedArchive::new(record.clone(), true))
                }
            }
        }
        let record = user.archive(&user.username).cloned();
        if record.is_none() {
            debug!("User '{}' has no top-level archive.", user.username);
        }
        record.map(|record| ResolvedArchive::new(record, false))
    }
}


//------------ Helpers -------------------------------------------------------

/// Returns the first label of a host name.
///
/// The host is the value of a request’s `Host` header and may contain a
/// port. The label is returned in lower case. Returns `None` if there is
/// no usable label.
pub fn host_label(host: &str) -> Option<String> {
    let host = host.trim();
    if host.starts_with('[') {
        // An IPv6 literal never names anything.
        return None
    }
    let host = match host.rfind(':') {
        Some(idx) => &host[..idx],
        None => host
    };
    let label = host.split('.').next()?;
    if label.is_empty() {
        None
    }
    else {
        Some(label.to_ascii_lowercase())
    }
}

/// Returns the percent-decoded first segment of a path.
fn first_segment(path: &str) -> Option<String> {
    let segment = path.trim_start_matches('/').split('/').next()?;
    if segment.is_empty() {
        return None
    }
    Some(percent_decode_str(segment).decode_utf8_lossy().into_owned())
}


//============ Tests =========================================================
