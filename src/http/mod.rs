//! The HTTP server.
//!
//! The module provides all functionality exposed by the HTTP server to
//! those interested. The [`Site`] holds everything needed to answer
//! requests while [`http_listener`] creates all necessary networking
//! services based on the current configuration and returns a future that
//! drives the server.
//!
//! Every request goes through the same pipeline: the archive is found via
//! the virtual host, opened, and its manifest read. The request path is
//! then resolved into a file to deliver or a directory to list. Each step
//! may take a while, so the request’s cancellation token is checked after
//! each of them and processing stops once the client has gone away.

pub use self::delivery::parse_range;
pub use self::listener::http_listener;

mod delivery;
mod listener;
mod request;
mod response;


//------------ Site ----------------------------------------------------------

use std::sync::Arc;
use log::debug;
use tokio_util::sync::CancellationToken;
use crate::archive::{Archive, ArchiveStore};
use crate::error::Abandoned;
use crate::listing::{self, ListingFormat};
use crate::lookup::{first_segment, Lookup, LookupError, Resolved};
use crate::vhost::ArchiveResolver;
use self::request::Request;
use self::response::{
    method_not_allowed, not_acceptable, not_found, ContentType, Response,
    ResponseBuilder,
};


/// The path of the discovery document.
const WELL_KNOWN_PATH: &str = "/.well-known/dat";

/// The TTL announced in the discovery document.
const WELL_KNOWN_TTL: u32 = 3600;


/// Everything needed to serve requests.
pub struct Site {
    /// Finds the archive for a request.
    resolver: Box<dyn ArchiveResolver>,

    /// The archive engine.
    store: Arc<dyn ArchiveStore>,

    /// The max-age of cached file responses in seconds.
    cache_max_age: u64,
}

impl Site {
    pub fn new(
        resolver: Box<dyn ArchiveResolver>,
        store: Arc<dyn ArchiveStore>,
        cache_max_age: u64,
    ) -> Self {
        Site { resolver, store, cache_max_age }
    }

    /// Produces the response for a request.
    ///
    /// Returns an error if the request was abandoned by the client before
    /// a response was ready.
    async fn handle_request(
        &self, req: Request, cancel: &CancellationToken,
    ) -> Result<Response, Abandoned> {
        debug!("{} {}", req.method(), req.uri());
        if !req.is_get_or_head() {
            return Ok(method_not_allowed())
        }
        let label = match req.host_label() {
            Some(label) => label,
            None => {
                debug!("Request without usable host.");
                return Ok(not_found())
            }
        };
        if req.path() == WELL_KNOWN_PATH {
            self.well_known(&label, cancel).await
        }
        else {
            self.serve(&req, &label, cancel).await
        }
    }

    /// Produces the discovery document of an archive.
    async fn well_known(
        &self, label: &str, cancel: &CancellationToken,
    ) -> Result<Response, Abandoned> {
        let resolved = self.resolver.resolve(
            label, WELL_KNOWN_PATH, true
        ).await;
        if cancel.is_cancelled() {
            return Err(Abandoned)
        }
        Ok(match resolved {
            Some(resolved) => {
                ResponseBuilder::ok().content_type(ContentType::TEXT).body(
                    format!(
                        "dat://{}/\nTTL={}",
                        resolved.record.key, WELL_KNOWN_TTL
                    )
                )
            }
            None => not_found()
        })
    }

    /// Serves a path from an archive.
    async fn serve(
        &self, req: &Request, label: &str, cancel: &CancellationToken,
    ) -> Result<Response, Abandoned> {
        let resolved = self.resolver.resolve(label, req.path(), false).await;
        if cancel.is_cancelled() {
            return Err(Abandoned)
        }
        let resolved = match resolved {
            Some(resolved) => resolved,
            None => return Ok(not_found())
        };

        let archive = self.store.open(&resolved.record.key).await;
        if cancel.is_cancelled() {
            return Err(Abandoned)
        }
        let archive = match archive {
            Some(archive) => archive,
            None => {
                debug!(
                    "Archive '{}' ({}) not available.",
                    resolved.record.name, resolved.record.key
                );
                return Ok(not_found())
            }
        };

        // The manifest is optional. If we can’t have it, we go without.
        let manifest = archive.read_manifest().await;
        if cancel.is_cancelled() {
            return Err(Abandoned)
        }
        let manifest = match manifest {
            Ok(manifest) => Some(manifest),
            Err(err) => {
                debug!(
                    "No manifest for archive '{}': {}",
                    resolved.record.name, err
                );
                None
            }
        };

        let found = Lookup::new(
            archive.as_ref(), manifest.as_ref(), cancel
        ).resolve(req.path(), resolved.path_prefixed).await;
        match found {
            Ok(Resolved::File(entry)) => {
                delivery::deliver(
                    archive.as_ref(), &entry, req.headers(),
                    self.cache_max_age, cancel
                ).await
            }
            Ok(Resolved::Directory { path }) => {
                let web_root = manifest.as_ref().and_then(|m| m.web_root());
                let base = if resolved.path_prefixed {
                    first_segment(req.path())
                }
                else {
                    String::new()
                };
                list_directory(
                    req, archive.as_ref(), &path, &base, web_root, cancel
                ).await
            }
            Err(LookupError::NotFound) => Ok(not_found()),
            Err(LookupError::Abandoned) => Err(Abandoned),
        }
    }
}


//------------ list_directory ------------------------------------------------

/// Produces the listing of a directory.
///
/// The `base` is the part of the request path before the directory’s path.
async fn list_directory(
    req: &Request,
    archive: &dyn Archive,
    path: &str,
    base: &str,
    web_root: Option<&str>,
    cancel: &CancellationToken,
) -> Result<Response, Abandoned> {
    let format = match ListingFormat::negotiate(req.header("Accept")) {
        Some(format) => format,
        None => {
            return Ok(not_acceptable(
                &ListingFormat::ALL.map(ListingFormat::media_type)
            ))
        }
    };
    let body = listing::render(
        format, archive, path, base, web_root
    ).await;
    if cancel.is_cancelled() {
        return Err(Abandoned)
    }
    match body {
        Ok(body) => {
            let content_type = match format {
                ListingFormat::Json => ContentType::external(
                    format.media_type()
                ),
                _ => ContentType::external(
                    format!("{}; charset=utf-8", format.media_type())
                )
            };
            Ok(ResponseBuilder::ok().content_type(content_type).body(body))
        }
        Err(err) => {
            debug!("Failed to list directory '{}': {}", path, err);
            Ok(not_found())
        }
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;
    use hyper::{Body, Method, StatusCode};
    use hyper::body::to_bytes;
    use crate::archive::Manifest;
    use crate::registry::{ArchiveRecord, StaticRegistry, UserRecord};
    use crate::test::{MemoryArchive, MemoryStore};
    use crate::vhost::VhostMode;

    fn site(mode: VhostMode) -> (Site, Arc<MemoryArchive>) {
        let registry = StaticRegistry::new(
            vec![
                ArchiveRecord::new("docs", "d0c5"),
                ArchiveRecord::new("ghost", "9057"),
            ],
            vec![
                UserRecord {
                    username: "alice".into(),
                    archives: vec![
                        ArchiveRecord::new("alice", "a11ce"),
                        ArchiveRecord::new("photos", "f070"),
                    ]
                },
            ]
        ).unwrap();
        let mut store = MemoryStore::new();
        let docs = store.add("d0c5", MemoryArchive::new()
            .file("/index.html", b"<p>docs</p>")
            .file("/guide.html", b"<p>guide</p>")
            .file("/notes/a.txt", b"aaa")
        );
        store.add("a11ce", MemoryArchive::new()
            .manifest(Manifest {
                web_root: Some("/public".into()),
                fallback_page: Some("/404.html".into()),
                .. Default::default()
            })
            .file("/public/index.html", b"<p>alice</p>")
            .file("/public/404.html", b"<p>lost</p>")
            .file("/private.txt", b"secret")
        );
        store.add("f070", MemoryArchive::new()
            .file("/cat.jpg", b"\xff\xd8\xff\xe0meow")
            .file("/2020/summer beach.png", b"\x89PNG\r\n\x1a\nsand")
        );
        (
            Site::new(
                mode.resolver(Arc::new(registry)), Arc::new(store), 60
            ),
            docs
        )
    }

    fn request(
        method: Method, host: &str, path: &str, accept: Option<&str>
    ) -> Request {
        let mut req = hyper::Request::builder()
            .method(method).uri(path).header("Host", host);
        if let Some(accept) = accept {
            req = req.header("Accept", accept);
        }
        req.body(Body::empty()).unwrap().into()
    }

    async fn get(
        site: &Site, host: &str, path: &str, accept: Option<&str>
    ) -> (StatusCode, String, String) {
        let res = site.handle_request(
            request(Method::GET, host, path, accept),
            &CancellationToken::new()
        ).await.unwrap();
        let status = res.status();
        let content_type = res.headers().get("Content-Type").map(|value| {
            value.to_str().unwrap().to_string()
        }).unwrap_or_default();
        let body = to_bytes(res.into_body()).await.unwrap();
        (status, content_type, String::from_utf8_lossy(&body).into_owned())
    }

    #[tokio::test]
    async fn per_archive_files() {
        let (site, _) = site(VhostMode::PerArchive);
        let (status, content_type, body) = get(
            &site, "docs.example.com", "/", None
        ).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, "text/html; charset=utf-8");
        assert_eq!(body, "<p>docs</p>");
        assert_eq!(
            get(&site, "docs.example.com", "/guide", None).await.2,
            "<p>guide</p>"
        );
        assert_eq!(
            get(&site, "docs.example.com", "/nope", None).await.0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get(&site, "nope.example.com", "/", None).await.0,
            StatusCode::NOT_FOUND
        );
        // Known to the registry but not to the engine.
        assert_eq!(
            get(&site, "ghost.example.com", "/", None).await.0,
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn per_archive_listing() {
        let (site, _) = site(VhostMode::PerArchive);
        let (status, content_type, body) = get(
            &site, "docs.example.com", "/notes", None
        ).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, "text/plain; charset=utf-8");
        assert_eq!(body, "a.txt\n");

        let (status, content_type, body) = get(
            &site, "docs.example.com", "/notes/", Some("application/json")
        ).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, "application/json");
        assert!(body.contains("\"href\":\"/notes/a.txt\""));

        let (status, _, body) = get(
            &site, "docs.example.com", "/notes/", Some("image/png")
        ).await;
        assert_eq!(status, StatusCode::NOT_ACCEPTABLE);
        assert!(body.contains("text/plain, text/html, application/json"));
    }

    #[tokio::test]
    async fn per_user() {
        let (site, _) = site(VhostMode::PerUser);
        assert_eq!(
            get(&site, "alice.example.com", "/", None).await.2,
            "<p>alice</p>"
        );
        // Outside the web root and therefore invisible.
        assert_eq!(
            get(&site, "alice.example.com", "/private.txt", None).await.2,
            "<p>lost</p>"
        );
        let (status, content_type, body) = get(
            &site, "alice.example.com", "/photos/cat.jpg", None
        ).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, "image/jpeg");
        assert!(body.ends_with("meow"));
        assert_eq!(
            get(&site, "bob.example.com", "/", None).await.0,
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn per_user_listing_links() {
        let (site, _) = site(VhostMode::PerUser);
        let (status, _, body) = get(
            &site, "alice.example.com", "/photos/", Some("application/json")
        ).await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["path"], "/photos/");
        assert_eq!(json["entries"][0]["href"], "/photos/2020/");
        assert_eq!(json["entries"][1]["href"], "/photos/cat.jpg");

        // Following the links leads back into the same archive.
        let (status, _, body) = get(
            &site, "alice.example.com", "/photos/cat.jpg", None
        ).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.ends_with("meow"));

        let (_, _, body) = get(
            &site, "alice.example.com", "/photos/2020/",
            Some("application/json")
        ).await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        let href = json["entries"][0]["href"].as_str().unwrap().to_string();
        assert_eq!(href, "/photos/2020/summer%20beach.png");
        let (status, content_type, body) = get(
            &site, "alice.example.com", &href, None
        ).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, "image/png");
        assert!(body.ends_with("sand"));
    }

    #[tokio::test]
    async fn well_known() {
        let (site, _) = site(VhostMode::PerUser);
        assert_eq!(
            get(&site, "alice.example.com", "/.well-known/dat", None).await,
            (
                StatusCode::OK,
                "text/plain; charset=utf-8".into(),
                "dat://a11ce/\nTTL=3600".into()
            )
        );
        assert_eq!(
            get(&site, "carol.example.com", "/.well-known/dat", None).await.0,
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn methods() {
        let (site, docs) = site(VhostMode::PerArchive);
        let res = site.handle_request(
            request(Method::POST, "docs.example.com", "/", None),
            &CancellationToken::new()
        ).await.unwrap();
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(docs.probes().is_empty());

        let res = site.handle_request(
            request(Method::HEAD, "docs.example.com", "/guide.html", None),
            &CancellationToken::new()
        ).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()["Content-Length"], "12");
    }

    #[tokio::test]
    async fn abandoned() {
        let (site, docs) = site(VhostMode::PerArchive);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(
            site.handle_request(
                request(Method::GET, "docs.example.com", "/", None), &cancel
            ).await.unwrap_err(),
            Abandoned
        );
        assert!(docs.probes().is_empty());
        assert_eq!(docs.streams_opened(), 0);
    }
}
