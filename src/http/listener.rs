//! The HTTP listener.

use std::convert::Infallible;
use std::future::Future;
use std::net::TcpListener as StdListener;
use std::sync::Arc;
use futures::future::{pending, select_all};
use hyper::Server;
use hyper::service::{make_service_fn, service_fn};
use log::{error, info};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use crate::config::Config;
use crate::error::{Abandoned, ExitError};
use super::Site;
use super::request::Request;
use super::response::{internal_error, Response};


//------------ http_listener -------------------------------------------------

/// Returns a future for all HTTP server listeners.
///
/// All listeners are bound right away so that configuration errors are
/// reported before the server starts running.
pub fn http_listener(
    site: Arc<Site>,
    config: &Config,
) -> Result<impl Future<Output = ()>, ExitError> {
    let mut listeners = Vec::new();
    for addr in &config.http_listen {
        let listener = match StdListener::bind(addr) {
            Ok(listener) => listener,
            Err(err) => {
                error!("Fatal: error listening on {}: {}", addr, err);
                return Err(ExitError::Generic);
            }
        };
        if let Err(err) = listener.set_nonblocking(true) {
            error!("Fatal: error switching {} to nonblocking: {}", addr, err);
            return Err(ExitError::Generic);
        }
        info!("Listening for HTTP connections on {}.", addr);
        listeners.push(listener);
    }
    Ok(_http_listener(site, listeners))
}

async fn _http_listener(
    site: Arc<Site>,
    listeners: Vec<StdListener>
) {
    if listeners.is_empty() {
        pending::<()>().await;
    }
    else {
        let _ = select_all(
            listeners.into_iter().map(|listener| {
                tokio::spawn(single_http_listener(listener, site.clone()))
            })
        ).await;
    }
}

/// Returns a future for a single HTTP listener.
///
/// The future will never resolve unless an error happens that breaks the
/// listener, in which case it will print an error and resolve the error case.
///
/// Each request is processed by [`spawn_request`]. If hyper drops the
/// request’s future because the client has gone away, its drop guard raises
/// the token so the spawned task stops at its next check.
async fn single_http_listener(
    listener: StdListener,
    site: Arc<Site>,
) {
    let make_service = make_service_fn(|_conn| {
        let site = site.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let site = site.clone();
                async move {
                    let cancel = CancellationToken::new();
                    let guard = cancel.clone().drop_guard();
                    let res = match spawn_request(
                        site, req.into(), cancel
                    ).await {
                        Ok(res) => res,
                        Err(err) => {
                            error!("Request processing failed: {}", err);
                            Ok(internal_error("Internal server error"))
                        }
                    };
                    guard.disarm();
                    res
                }
            }))
        }
    });
    let server = match Server::from_tcp(listener) {
        Ok(server) => server,
        Err(err) => {
            error!("Failed on HTTP listener: {}", err);
            return
        }
    };
    if let Err(err) = server.serve(make_service).await {
        error!("HTTP server error: {}", err);
    }
}

/// Processes a request on its own task.
///
/// The task keeps running when the returned handle is dropped. It only
/// stops early once `cancel` has been raised.
fn spawn_request(
    site: Arc<Site>,
    req: Request,
    cancel: CancellationToken,
) -> JoinHandle<Result<Response, Abandoned>> {
    tokio::spawn(async move {
        site.handle_request(req, &cancel).await
    })
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;
    use hyper::Body;
    use crate::registry::{ArchiveRecord, StaticRegistry};
    use crate::test::{Gate, MemoryArchive, MemoryStore};
    use crate::vhost::VhostMode;

    fn request(path: &str) -> Request {
        hyper::Request::builder()
            .uri(path).header("Host", "docs.example.com")
            .body(Body::empty()).unwrap().into()
    }

    fn site(gate: Arc<Gate>) -> (Arc<Site>, Arc<MemoryArchive>) {
        let registry = StaticRegistry::new(
            vec![ArchiveRecord::new("docs", "d0c5")], Vec::new()
        ).unwrap();
        let mut store = MemoryStore::new();
        let docs = store.add("d0c5", MemoryArchive::new()
            .file("/index.html", b"<p>docs</p>")
            .gated(gate)
        );
        (
            Arc::new(Site::new(
                VhostMode::PerArchive.resolver(Arc::new(registry)),
                Arc::new(store), 60
            )),
            docs
        )
    }

    #[tokio::test]
    async fn cancel_stops_running_request() {
        let gate = Arc::new(Gate::default());
        let (site, docs) = site(gate.clone());
        let cancel = CancellationToken::new();
        let handle = spawn_request(site, request("/"), cancel.clone());

        // The client goes away while the first candidate is looked up.
        gate.entered().await;
        cancel.cancel();
        gate.release();

        assert_eq!(handle.await.unwrap().unwrap_err(), Abandoned);
        assert_eq!(docs.probes(), ["/index.html"]);
        assert_eq!(docs.streams_opened(), 0);
    }

    #[tokio::test]
    async fn uncancelled_request_completes() {
        let gate = Arc::new(Gate::default());
        let (site, docs) = site(gate.clone());
        let handle = spawn_request(
            site, request("/"), CancellationToken::new()
        );
        gate.entered().await;
        gate.release();

        let res = handle.await.unwrap().unwrap();
        assert_eq!(res.status(), hyper::StatusCode::OK);
        assert_eq!(docs.probes(), ["/index.html"]);
    }
}
