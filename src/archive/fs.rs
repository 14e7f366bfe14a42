//! Archives checked out into the local file system.
//!
//! The [`FsStore`] keeps every archive in a directory named after its key
//! below a common base directory. The manifest is the file `dat.json` in
//! the archive’s root directory.
//!
//! There is no storage offset for files in a file system. Instead, the
//! modification time in seconds is used, which changes whenever the file
//! is replaced.

use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use async_trait::async_trait;
use log::debug;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use super::{
    AccessError, Archive, ArchiveKey, ArchiveStore, ByteRange, ByteStream,
    DirEntry, Entry, EntryKind, Manifest,
};


/// The name of the manifest file in an archive’s root directory.
const MANIFEST_FILE: &str = "dat.json";

/// The size of the chunks we read files in.
const CHUNK_SIZE: usize = 64 * 1024;


//------------ FsStore -------------------------------------------------------

/// An archive engine serving from a local directory.
#[derive(Clone, Debug)]
pub struct FsStore {
    /// The directory containing one directory per archive.
    base: PathBuf,
}

impl FsStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        FsStore { base: base.into() }
    }
}

#[async_trait]
impl ArchiveStore for FsStore {
    async fn open(&self, key: &ArchiveKey) -> Option<Arc<dyn Archive>> {
        let key = key.as_str();
        if key.is_empty() || key == "." || key == ".."
            || key.contains(['/', '\\', '\0'])
        {
            debug!("Refusing to open archive with key '{}'.", key);
            return None
        }
        let root = match fs::canonicalize(self.base.join(key)).await {
            Ok(root) => root,
            Err(err) => {
                debug!("Cannot open archive '{}': {}", key, err);
                return None
            }
        };
        match fs::metadata(&root).await {
            Ok(meta) if meta.is_dir() => {
                Some(Arc::new(FsArchive { root }))
            }
            Ok(_) => None,
            Err(err) => {
                debug!("Cannot open archive {}: {}", root.display(), err);
                None
            }
        }
    }
}


//------------ FsArchive -----------------------------------------------------

/// A single archive in the file system.
#[derive(Clone, Debug)]
pub struct FsArchive {
    /// The canonical path of the archive’s root directory.
    root: PathBuf,
}

impl FsArchive {
    /// Converts an in-archive path into a local path.
    ///
    /// Refuses paths that would leave the archive.
    fn local_path(&self, path: &str) -> Result<PathBuf, AccessError> {
        let mut res = self.root.clone();
        for component in path.split('/') {
            match component {
                "" | "." => { }
                ".." => return Err(AccessError::NotFound),
                component => {
                    if component.contains(['\\', '\0']) {
                        return Err(AccessError::NotFound)
                    }
                    res.push(component)
                }
            }
        }
        Ok(res)
    }

    /// Converts an in-archive path into an existing local path.
    ///
    /// Symbolic links are followed but the final path has to be inside the
    /// archive’s root directory.
    async fn checked_path(&self, path: &str) -> Result<PathBuf, AccessError> {
        let local = fs::canonicalize(self.local_path(path)?).await?;
        if !local.starts_with(&self.root) {
            debug!(
                "Path '{}' leads outside of archive {}.",
                path, self.root.display()
            );
            return Err(AccessError::NotFound)
        }
        Ok(local)
    }
}

#[async_trait]
impl Archive for FsArchive {
    async fn read_manifest(&self) -> Result<Manifest, AccessError> {
        let data = fs::read(
            self.checked_path(MANIFEST_FILE).await?
        ).await?;
        Manifest::from_json(&data)
    }

    async fn stat(&self, path: &str) -> Result<Entry, AccessError> {
        let meta = fs::metadata(self.checked_path(path).await?).await?;
        let kind = if meta.is_dir() {
            EntryKind::Directory
        }
        else if meta.is_file() {
            // A trailing slash promises a directory.
            if path.ends_with('/') {
                return Err(AccessError::NotFound)
            }
            EntryKind::File
        }
        else {
            return Err(AccessError::NotFound)
        };
        Ok(Entry {
            path: path.into(),
            size: if kind == EntryKind::File { meta.len() } else { 0 },
            offset: meta.modified().map(unix_secs).unwrap_or(0),
            kind,
        })
    }

    async fn read_dir(
        &self, path: &str
    ) -> Result<Vec<DirEntry>, AccessError> {
        let mut dir = fs::read_dir(self.checked_path(path).await?).await?;
        let mut res = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(_) => continue,
            };
            let meta = match entry.metadata().await {
                Ok(meta) => meta,
                Err(_) => continue,
            };
            res.push(DirEntry {
                name,
                kind: if meta.is_dir() {
                    EntryKind::Directory
                }
                else {
                    EntryKind::File
                },
                size: if meta.is_dir() { 0 } else { meta.len() },
            })
        }
        Ok(res)
    }

    async fn read_stream(
        &self, path: &str, range: Option<ByteRange>
    ) -> Result<ByteStream, AccessError> {
        let local = self.checked_path(path).await?;
        let mut file = fs::File::open(&local).await?;
        if !file.metadata().await?.is_file() {
            return Err(AccessError::NotFound)
        }
        let limit = match range {
            Some(range) => {
                file.seek(SeekFrom::Start(range.start)).await?;
                range.len()
            }
            None => u64::MAX
        };
        Ok(Box::pin(
            ReaderStream::with_capacity(file.take(limit), CHUNK_SIZE)
        ))
    }
}


//------------ Helpers -------------------------------------------------------

fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).map(|dur| dur.as_secs()).unwrap_or(0)
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;
    use futures::TryStreamExt;

    fn archive_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("abcd");
        std::fs::create_dir_all(root.join("docs/img")).unwrap();
        std::fs::write(root.join("index.html"), b"<h1>hi</h1>").unwrap();
        std::fs::write(root.join("docs/a.txt"), b"0123456789").unwrap();
        std::fs::write(
            root.join(MANIFEST_FILE), b"{\"web_root\": \"/docs\"}"
        ).unwrap();
        dir
    }

    async fn open(dir: &tempfile::TempDir) -> Arc<dyn Archive> {
        FsStore::new(dir.path()).open(
            &ArchiveKey::new("abcd")
        ).await.unwrap()
    }

    async fn read_all(stream: ByteStream) -> Vec<u8> {
        stream.map_ok(|chunk| chunk.to_vec()).try_concat().await.unwrap()
    }

    #[tokio::test]
    async fn open_archive() {
        let dir = archive_dir();
        let store = FsStore::new(dir.path());
        assert!(store.open(&ArchiveKey::new("abcd")).await.is_some());
        assert!(store.open(&ArchiveKey::new("nope")).await.is_none());
        assert!(store.open(&ArchiveKey::new("..")).await.is_none());
        assert!(store.open(&ArchiveKey::new("abcd/docs")).await.is_none());
    }

    #[tokio::test]
    async fn manifest() {
        let dir = archive_dir();
        let archive = open(&dir).await;
        assert_eq!(
            archive.read_manifest().await.unwrap().web_root(),
            Some("/docs")
        );
    }

    #[tokio::test]
    async fn stat() {
        let dir = archive_dir();
        let archive = open(&dir).await;

        let entry = archive.stat("/docs/a.txt").await.unwrap();
        assert_eq!(entry.path, "/docs/a.txt");
        assert_eq!(entry.size, 10);
        assert_eq!(entry.kind, EntryKind::File);
        assert!(entry.offset > 0);

        assert!(archive.stat("/docs").await.unwrap().is_dir());
        assert!(archive.stat("/docs/").await.unwrap().is_dir());
        assert!(archive.stat("/").await.unwrap().is_dir());
        assert!(matches!(
            archive.stat("/docs/a.txt/").await, Err(AccessError::NotFound)
        ));
        assert!(matches!(
            archive.stat("/missing").await, Err(AccessError::NotFound)
        ));
        assert!(matches!(
            archive.stat("/../abcd/index.html").await,
            Err(AccessError::NotFound)
        ));
    }

    #[tokio::test]
    async fn read_dir() {
        let dir = archive_dir();
        let archive = open(&dir).await;
        let mut entries = archive.read_dir("/docs/").await.unwrap();
        entries.sort_by(|left, right| left.name.cmp(&right.name));
        assert_eq!(
            entries,
            vec![
                DirEntry {
                    name: "a.txt".into(), kind: EntryKind::File, size: 10
                },
                DirEntry {
                    name: "img".into(), kind: EntryKind::Directory, size: 0
                },
            ]
        );
    }

    #[tokio::test]
    async fn read_stream() {
        let dir = archive_dir();
        let archive = open(&dir).await;
        assert_eq!(
            read_all(
                archive.read_stream("/docs/a.txt", None).await.unwrap()
            ).await,
            b"0123456789"
        );
        assert_eq!(
            read_all(
                archive.read_stream(
                    "/docs/a.txt", Some(ByteRange { start: 2, end: 4 })
                ).await.unwrap()
            ).await,
            b"234"
        );
        assert!(archive.read_stream("/docs", None).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinks_stay_inside() {
        use std::os::unix::fs::symlink;

        let dir = archive_dir();
        let root = dir.path().join("abcd");
        std::fs::write(dir.path().join("secret.txt"), b"secret").unwrap();
        symlink(
            dir.path().join("secret.txt"), root.join("leak.txt")
        ).unwrap();
        symlink(dir.path(), root.join("up")).unwrap();
        symlink(root.join("docs/a.txt"), root.join("alias.txt")).unwrap();
        let archive = open(&dir).await;

        assert!(matches!(
            archive.stat("/leak.txt").await, Err(AccessError::NotFound)
        ));
        assert!(archive.read_stream("/leak.txt", None).await.is_err());
        assert!(matches!(
            archive.stat("/up/secret.txt").await, Err(AccessError::NotFound)
        ));
        assert!(archive.read_dir("/up").await.is_err());

        // Links within the archive are fine.
        assert_eq!(archive.stat("/alias.txt").await.unwrap().size, 10);
        assert_eq!(
            read_all(
                archive.read_stream("/alias.txt", None).await.unwrap()
            ).await,
            b"0123456789"
        );
    }
}
