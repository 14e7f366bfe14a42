//! The directory of users and archives.
//!
//! The gateway doesn’t own the information which archives exist under which
//! name and who owns them. It only consults a [`Registry`] for it on every
//! request. The [`StaticRegistry`] is a registry read from a TOML file at
//! startup.

use std::fs;
use std::path::Path;
use async_trait::async_trait;
use log::error;
use serde::Deserialize;
use crate::archive::ArchiveKey;
use crate::error::Failed;


//------------ ArchiveRecord -------------------------------------------------

/// The public name of an archive.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct ArchiveRecord {
    /// The name of the archive.
    ///
    /// Names are compared case-insensitively.
    pub name: String,

    /// The key of the archive.
    pub key: ArchiveKey,
}

impl ArchiveRecord {
    pub fn new(name: impl Into<String>, key: impl Into<String>) -> Self {
        ArchiveRecord {
            name: name.into(),
            key: ArchiveKey::new(key),
        }
    }

    /// Returns whether the record has the given name.
    pub fn has_name(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}


//------------ UserRecord ----------------------------------------------------

/// A user and their archives.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct UserRecord {
    /// The name of the user.
    ///
    /// Names are unique and compared case-insensitively.
    pub username: String,

    /// The archives owned by the user.
    #[serde(default)]
    pub archives: Vec<ArchiveRecord>,
}

impl UserRecord {
    /// Returns the user’s archive with the given name.
    pub fn archive(&self, name: &str) -> Option<&ArchiveRecord> {
        self.archives.iter().find(|archive| archive.has_name(name))
    }
}


//------------ Registry ------------------------------------------------------

/// Where users and archives are looked up.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Returns the archive with the given name.
    async fn archive_by_name(&self, name: &str) -> Option<ArchiveRecord>;

    /// Returns the user with the given name.
    async fn user_by_username(&self, name: &str) -> Option<UserRecord>;
}


//------------ StaticRegistry ------------------------------------------------

/// A registry that never changes.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct StaticRegistry {
    /// Archives not owned by anyone in particular.
    #[serde(default, rename = "archive")]
    archives: Vec<ArchiveRecord>,

    /// The users.
    #[serde(default, rename = "user")]
    users: Vec<UserRecord>,
}

impl StaticRegistry {
    /// Creates a registry from its parts.
    pub fn new(
        archives: Vec<ArchiveRecord>, users: Vec<UserRecord>
    ) -> Result<Self, Failed> {
        let res = StaticRegistry { archives, users };
        res.check_users()?;
        Ok(res)
    }

    /// Loads the registry from a TOML file.
    pub fn load(path: &Path) -> Result<Self, Failed> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                error!(
                    "Failed to read registry file {}: {}",
                    path.display(), err
                );
                return Err(Failed)
            }
        };
        Self::parse(&content, path)
    }

    /// Parses the content of a registry file.
    fn parse(content: &str, path: &Path) -> Result<Self, Failed> {
        let res: Self = match toml::from_str(content) {
            Ok(res) => res,
            Err(err) => {
                error!(
                    "Failed to parse registry file {}: {}",
                    path.display(), err
                );
                return Err(Failed)
            }
        };
        res.check_users()?;
        Ok(res)
    }

    /// Makes sure there are no duplicate user names.
    fn check_users(&self) -> Result<(), Failed> {
        for (idx, user) in self.users.iter().enumerate() {
            if self.users[..idx].iter().any(|other| {
                other.username.eq_ignore_ascii_case(&user.username)
            }) {
                error!("Duplicate user '{}' in registry.", user.username);
                return Err(Failed)
            }
        }
        Ok(())
    }

    /// Returns the number of archives in the registry.
    pub fn archive_count(&self) -> usize {
        self.archives.len() + self.users.iter().map(|user| {
            user.archives.len()
        }).sum::<usize>()
    }
}

#[async_trait]
impl Registry for StaticRegistry {
    async fn archive_by_name(&self, name: &str) -> Option<ArchiveRecord> {
        self.archives.iter().chain(
            self.users.iter().flat_map(|user| user.archives.iter())
        ).find(|archive| archive.has_name(name)).cloned()
    }

    async fn user_by_username(&self, name: &str) -> Option<UserRecord> {
        self.users.iter().find(|user| {
            user.username.eq_ignore_ascii_case(name)
        }).cloned()
    }
}


//============ Tests =========================================================
