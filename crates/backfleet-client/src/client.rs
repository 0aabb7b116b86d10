use backfleet_common::{BoundBackend, FleetError, Result, TrafficType};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Method, Request, StatusCode};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use std::collections::BTreeMap;
use std::time::Duration;

/// Client for the orchestrator's metadata service.
///
/// Workers use it to register; downstream tooling uses it to read the
/// registry once the fleet is ready.
#[derive(Clone)]
pub struct MetadataClient {
    base_url: String,
    client: Client<HttpConnector, Full<Bytes>>,
    timeout: Duration,
}

impl MetadataClient {
    /// Creates a client for the service at `base_url` (e.g. `http://127.0.0.1:9090`).
    ///
    /// # Errors
    ///
    /// Returns an error if the URL does not start with `http://`.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !base_url.starts_with("http://") {
            return Err(FleetError::Transport(format!(
                "Metadata URL '{}' must start with http://",
                base_url
            )));
        }

        Ok(Self {
            base_url,
            client: Client::builder(TokioExecutor::new()).build_http(),
            timeout: Duration::from_secs(30),
        })
    }

    /// Sets the per-request timeout (default 30s).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Registers a bound backend.
    ///
    /// # Errors
    ///
    /// `FleetError::Http` carrying the server's message if the registration
    /// is rejected.
    pub async fn register(&self, bound: &BoundBackend) -> Result<()> {
        let body = serde_json::to_vec(bound)?;
        self.send(Method::POST, "/register", Bytes::from(body)).await?;
        tracing::debug!("Registered {} on port {}", bound.name, bound.port);
        Ok(())
    }

    /// The plain-text listing for one traffic type, or for all of them.
    pub async fn backends_text(&self, scope: Option<TrafficType>) -> Result<String> {
        let path = match scope {
            Some(t) => format!("/backends/{}", t),
            None => "/backends".to_string(),
        };
        let body = self.send(Method::GET, &path, Bytes::new()).await?;
        String::from_utf8(body.to_vec())
            .map_err(|e| FleetError::Transport(format!("Listing is not UTF-8: {}", e)))
    }

    /// The listing parsed into bound backends, in topology order.
    pub async fn backends(&self, scope: Option<TrafficType>) -> Result<Vec<BoundBackend>> {
        self.backends_text(scope)
            .await?
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::parse)
            .collect()
    }

    /// The JSON listing, grouped by traffic type.
    pub async fn backends_by_traffic_type(&self) -> Result<BTreeMap<TrafficType, Vec<BoundBackend>>> {
        let body = self.send(Method::GET, "/backends?json", Bytes::new()).await?;
        let raw: BTreeMap<String, Vec<BoundBackend>> = serde_json::from_slice(&body)?;
        raw.into_iter()
            .map(|(t, backends)| t.parse::<TrafficType>().map(|t| (t, backends)))
            .collect()
    }

    /// The raw JSON document, as served.
    pub async fn backends_json(&self) -> Result<String> {
        let body = self.send(Method::GET, "/backends?json", Bytes::new()).await?;
        String::from_utf8(body.to_vec())
            .map_err(|e| FleetError::Transport(format!("Listing is not UTF-8: {}", e)))
    }

    /// Whether every backend has registered.
    pub async fn is_ready(&self) -> Result<bool> {
        match self.send(Method::GET, "/__ready", Bytes::new()).await {
            Ok(_) => Ok(true),
            Err(FleetError::Http { status: 503, .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Sends one request and returns the body of a 2xx response.
    async fn send(&self, method: Method, path: &str, body: Bytes) -> Result<Bytes> {
        let url = format!("{}{}", self.base_url, path);
        let request = Request::builder()
            .method(method)
            .uri(&url)
            .header("Content-Type", "application/json")
            .body(Full::new(body))
            .map_err(|e| FleetError::Transport(format!("Failed to build request: {}", e)))?;

        let response = tokio::time::timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| FleetError::Transport(format!("Request to {} timed out", url)))?
            .map_err(|e| FleetError::Transport(format!("HTTP request to {} failed: {}", url, e)))?;

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| FleetError::Transport(format!("Failed to read response: {}", e)))?
            .to_bytes();

        if status == StatusCode::OK {
            Ok(body)
        } else {
            Err(FleetError::Http {
                status: status.as_u16(),
                message: String::from_utf8_lossy(&body).trim().to_string(),
            })
        }
    }
}
