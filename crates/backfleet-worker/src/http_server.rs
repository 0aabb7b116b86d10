//! HTTP Server for a Backend Worker
//!
//! A plain HTTP/1.1 server built directly on hyper. Each accepted connection
//! gets its own tokio task.
//!
//! # Routes
//!
//! - `GET /1024.html` - a fixed 1024-byte page, the target load tests fetch
//! - `GET /` - the backend's name
//! - anything else - `404 Not Found`

use backfleet_common::{Backend, FleetError, Result};
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Size of the static page served at `/1024.html`.
pub const PAGE_SIZE: usize = 1024;

/// Serves the static routes of one backend.
pub struct BackendServer {
    backend: Arc<Backend>,
    page: Bytes,
}

impl BackendServer {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend: Arc::new(backend),
            page: Bytes::from(vec![b'x'; PAGE_SIZE]),
        }
    }

    /// Accepts connections until the listener fails.
    ///
    /// Connection-level errors are logged and do not stop the server.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        tracing::info!(
            "HTTP server listening on {}",
            listener.local_addr().map_err(|e| FleetError::Transport(format!(
                "Failed to get local address: {}",
                e
            )))?
        );

        loop {
            let (stream, _) = listener
                .accept()
                .await
                .map_err(|e| FleetError::Transport(format!("Failed to accept connection: {}", e)))?;

            let io = TokioIo::new(stream);
            let backend = self.backend.clone();
            let page = self.page.clone();

            tokio::task::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let response = respond(&backend, &page, &req);
                    async move { Ok::<_, Infallible>(response) }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    tracing::debug!("Error serving connection: {}", err);
                }
            });
        }
    }
}

/// Builds the response for one request. The body is never read.
fn respond<B>(backend: &Backend, page: &Bytes, req: &Request<B>) -> Response<Full<Bytes>> {
    if req.method() != Method::GET && req.method() != Method::HEAD {
        return text(StatusCode::METHOD_NOT_ALLOWED, "method not allowed\n");
    }

    match req.uri().path() {
        "/1024.html" => Response::builder()
            .header("Content-Type", "text/html")
            .body(Full::new(page.clone()))
            .unwrap_or_default(),
        "/" => text(StatusCode::OK, &format!("{}\n", backend.name)),
        _ => text(StatusCode::NOT_FOUND, "not found\n"),
    }
}

fn text(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "text/plain")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use backfleet_common::TrafficType;
    use http_body_util::BodyExt;

    fn server() -> BackendServer {
        BackendServer::new(Backend::new("127.0.0.1", "fleet-edge-0", TrafficType::Edge))
    }

    async fn call(method: Method, path: &str) -> (StatusCode, Bytes) {
        let server = server();
        let req = Request::builder().method(method).uri(path).body(()).unwrap();
        let res = respond(&server.backend, &server.page, &req);
        let status = res.status();
        let body = res.into_body().collect().await.unwrap().to_bytes();
        (status, body)
    }

    #[tokio::test]
    async fn test_page_is_1024_bytes() {
        let (status, body) = call(Method::GET, "/1024.html").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.len(), PAGE_SIZE);
    }

    #[tokio::test]
    async fn test_root_returns_name() {
        let (status, body) = call(Method::GET, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"fleet-edge-0\n");
    }

    #[tokio::test]
    async fn test_unknown_path_is_not_found() {
        let (status, _) = call(Method::GET, "/2048.html").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_post_is_rejected() {
        let (status, _) = call(Method::POST, "/1024.html").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }
}
