// Background cache worker — a sidecar HTTP service applying the page-side
// caching policy: cache-first for the pinned engine assets,
// stale-while-revalidate for same-origin page assets, and generation-based
// eviction on activation.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, Method, StatusCode, Uri},
    response::Response,
    Router,
};
use bytes::Bytes;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{CacheStorage, UrlCache};
use crate::config::{
    shell_cache_name, ASSET_CACHE_NAME, ENGINE_ASSET_HOST_PREFIXES, ENGINE_ASSET_LOCAL_PATHS,
    ENGINE_COMPUTE_URL, ENGINE_RUNTIME_URL, SHELL_PRECACHE_PATHS,
};

const MAX_PASSTHROUGH_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Request classes the worker distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// A pinned engine binary: large, immutable, served cache-first.
    EngineAsset,
    /// A page asset from the fronted origin: stale-while-revalidate.
    SameOrigin,
    /// Anything else: passed through untouched.
    Foreign,
}

/// Classify a target URL against the fronted origin.
pub fn classify(url: &str, origin: &str) -> RequestClass {
    if ENGINE_ASSET_HOST_PREFIXES
        .iter()
        .any(|prefix| url.starts_with(prefix))
    {
        return RequestClass::EngineAsset;
    }

    if let Some(rest) = url.strip_prefix(origin) {
        let path = rest.split(['?', '#']).next().unwrap_or(rest);
        if ENGINE_ASSET_LOCAL_PATHS.contains(&path) {
            return RequestClass::EngineAsset;
        }
        return RequestClass::SameOrigin;
    }

    RequestClass::Foreign
}

/// Result of one policy decision, independent of the HTTP layer.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub status: u16,
    pub content_type: String,
    pub body: Bytes,
}

impl FetchOutcome {
    fn cached(content_type: String, body: Bytes) -> Self {
        Self {
            status: 200,
            content_type,
            body,
        }
    }

    /// Synthetic failure returned instead of letting a request hang when the
    /// network is down and nothing is cached.
    fn gateway_timeout() -> Self {
        Self {
            status: 504,
            content_type: "text/plain".to_string(),
            body: Bytes::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub struct CacheWorker {
    origin: String,
    client: reqwest::Client,
    storage: CacheStorage,
    shell_cache: Arc<UrlCache>,
    asset_cache: Arc<UrlCache>,
    asset_urls: [String; 2],
    shutdown: CancellationToken,
}

impl CacheWorker {
    /// Worker fronting `upstream_origin`, precaching the pinned engine
    /// asset URLs.
    pub fn new(
        storage: CacheStorage,
        upstream_origin: impl Into<String>,
    ) -> Result<Self> {
        Self::with_asset_urls(
            storage,
            upstream_origin,
            ENGINE_RUNTIME_URL,
            ENGINE_COMPUTE_URL,
        )
    }

    /// Worker with explicit engine asset URLs (alternate hosts, tests).
    pub fn with_asset_urls(
        storage: CacheStorage,
        upstream_origin: impl Into<String>,
        runtime_url: impl Into<String>,
        compute_url: impl Into<String>,
    ) -> Result<Self> {
        let shell_cache = Arc::new(storage.open_cache(&shell_cache_name())?);
        let asset_cache = Arc::new(storage.open_cache(ASSET_CACHE_NAME)?);
        Ok(Self {
            origin: upstream_origin.into(),
            client: reqwest::Client::new(),
            storage,
            shell_cache,
            asset_cache,
            asset_urls: [runtime_url.into(), compute_url.into()],
            shutdown: CancellationToken::new(),
        })
    }

    /// Install step: pre-populate the shell cache with the fixed entry set
    /// and the asset cache with the engine binaries when absent. A shell
    /// precache failure fails the install; an asset precache failure is
    /// logged and deferred to first use.
    pub async fn install(&self) -> Result<()> {
        for path in SHELL_PRECACHE_PATHS {
            let url = format!("{}{}", self.origin, path);
            let outcome = self
                .network(&url)
                .await
                .with_context(|| format!("shell precache fetch failed for {url}"))?;
            if outcome.is_success() {
                self.shell_cache
                    .put(&url, &outcome.content_type, &outcome.body)?;
            }
        }

        if let Err(e) = self.precache_engine_assets().await {
            warn!("failed to precache engine assets: {}", e);
        }

        info!("cache worker installed");
        Ok(())
    }

    async fn precache_engine_assets(&self) -> Result<()> {
        for url in &self.asset_urls {
            if self.asset_cache.contains(url) {
                continue;
            }
            let outcome = self.network(url).await?;
            if outcome.is_success() {
                self.asset_cache
                    .put(url, &outcome.content_type, &outcome.body)?;
            }
        }
        Ok(())
    }

    /// Activate step: evict every cache generation that is neither the
    /// current shell generation nor the version-independent asset cache.
    pub fn activate(&self) -> Result<()> {
        let current = shell_cache_name();
        for name in self.storage.keys()? {
            if name == ASSET_CACHE_NAME || name == current {
                continue;
            }
            info!("evicting stale cache generation {}", name);
            self.storage.delete(&name)?;
        }
        Ok(())
    }

    pub fn classify(&self, url: &str) -> RequestClass {
        classify(url, &self.origin)
    }

    /// Apply the fetch policy for one GET request.
    pub async fn handle_get(&self, url: &str) -> FetchOutcome {
        match self.classify(url) {
            RequestClass::EngineAsset => self.cache_first(url).await,
            RequestClass::SameOrigin => self.stale_while_revalidate(url).await,
            RequestClass::Foreign => match self.network(url).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("pass-through fetch failed for {}: {}", url, e);
                    FetchOutcome::gateway_timeout()
                }
            },
        }
    }

    /// Cache-first, never revalidated: the assets are immutable per pinned
    /// version. Network failures with nothing cached become a synthetic 504.
    async fn cache_first(&self, url: &str) -> FetchOutcome {
        match self.asset_cache.match_url(url) {
            Ok(Some(hit)) => {
                debug!("engine asset served from cache: {}", url);
                return FetchOutcome::cached(hit.content_type, hit.body);
            }
            Ok(None) => {}
            Err(e) => warn!("asset cache read failed for {}: {}", url, e),
        }

        match self.network(url).await {
            Ok(outcome) => {
                if outcome.is_success() {
                    if let Err(e) =
                        self.asset_cache
                            .put(url, &outcome.content_type, &outcome.body)
                    {
                        warn!("asset cache write failed for {}: {}", url, e);
                    }
                }
                outcome
            }
            Err(e) => {
                warn!("engine asset fetch failed for {}: {}", url, e);
                FetchOutcome::gateway_timeout()
            }
        }
    }

    /// Serve the cached entry immediately while refreshing it in the
    /// background; with nothing cached, wait on the network.
    async fn stale_while_revalidate(&self, url: &str) -> FetchOutcome {
        let cached = match self.shell_cache.match_url(url) {
            Ok(hit) => hit,
            Err(e) => {
                warn!("shell cache read failed for {}: {}", url, e);
                None
            }
        };

        if let Some(hit) = cached {
            self.spawn_revalidate(url.to_string());
            debug!("page asset served stale: {}", url);
            return FetchOutcome::cached(hit.content_type, hit.body);
        }

        match self.network(url).await {
            Ok(outcome) => {
                if outcome.status == 200 {
                    if let Err(e) =
                        self.shell_cache
                            .put(url, &outcome.content_type, &outcome.body)
                    {
                        warn!("shell cache write failed for {}: {}", url, e);
                    }
                }
                outcome
            }
            Err(e) => {
                warn!("page asset fetch failed for {}: {}", url, e);
                FetchOutcome::gateway_timeout()
            }
        }
    }

    fn spawn_revalidate(&self, url: String) {
        let client = self.client.clone();
        let cache = self.shell_cache.clone();
        let token = self.shutdown.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                result = fetch_outcome(&client, &url) => match result {
                    Ok(outcome) if outcome.status == 200 => {
                        if let Err(e) = cache.put(&url, &outcome.content_type, &outcome.body) {
                            debug!("revalidation cache write failed for {}: {}", url, e);
                        } else {
                            debug!("revalidated {}", url);
                        }
                    }
                    Ok(outcome) => {
                        debug!("revalidation of {} returned {}", url, outcome.status);
                    }
                    Err(e) => {
                        debug!("revalidation of {} failed: {}", url, e);
                    }
                },
            }
        });
    }

    async fn network(&self, url: &str) -> Result<FetchOutcome> {
        fetch_outcome(&self.client, url).await
    }

    fn target_url(&self, uri: &Uri) -> String {
        if uri.scheme().is_some() {
            uri.to_string()
        } else {
            let path_and_query = uri
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or("/");
            format!("{}{}", self.origin, path_and_query)
        }
    }

    /// Forward a non-GET request to the origin untouched.
    async fn pass_through(&self, method: Method, uri: Uri, body: Bytes) -> FetchOutcome {
        let url = self.target_url(&uri);
        let method = match reqwest::Method::from_bytes(method.as_str().as_bytes()) {
            Ok(m) => m,
            Err(_) => return FetchOutcome::gateway_timeout(),
        };

        match self.client.request(method, &url).body(body).send().await {
            Ok(response) => response_outcome(response).await.unwrap_or_else(|e| {
                warn!("pass-through body read failed for {}: {}", url, e);
                FetchOutcome::gateway_timeout()
            }),
            Err(e) => {
                warn!("pass-through request failed for {}: {}", url, e);
                FetchOutcome::gateway_timeout()
            }
        }
    }

    /// Run install + activate, then serve on an ephemeral local port.
    pub async fn serve(self) -> Result<RunningWorker> {
        self.install().await?;
        self.activate()?;

        let worker = Arc::new(self);
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();

        let app = Router::new()
            .fallback(worker_handler)
            .with_state(worker.clone());

        let token = worker.shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
                .ok();
        });

        info!("cache worker listening on 127.0.0.1:{}", port);
        Ok(RunningWorker { port, worker })
    }
}

/// Handle to a served worker.
pub struct RunningWorker {
    port: u16,
    worker: Arc<CacheWorker>,
}

impl RunningWorker {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    pub fn worker(&self) -> &CacheWorker {
        &self.worker
    }

    /// Stop serving and cancel in-flight background revalidations.
    pub fn shutdown(&self) {
        self.worker.shutdown.cancel();
    }
}

async fn worker_handler(
    State(worker): State<Arc<CacheWorker>>,
    req: Request,
) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();

    let outcome = if method == Method::GET {
        let target = worker.target_url(&uri);
        worker.handle_get(&target).await
    } else {
        let body = match axum::body::to_bytes(req.into_body(), MAX_PASSTHROUGH_BODY_BYTES).await
        {
            Ok(bytes) => bytes,
            Err(_) => {
                return to_response(&FetchOutcome {
                    status: 413,
                    content_type: "text/plain".to_string(),
                    body: Bytes::new(),
                })
            }
        };
        worker.pass_through(method, uri, body).await
    };

    to_response(&outcome)
}

fn to_response(outcome: &FetchOutcome) -> Response {
    let status =
        StatusCode::from_u16(outcome.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, outcome.content_type.as_str())
        .body(Body::from(outcome.body.clone()))
        .unwrap_or_else(|_| {
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Body::empty())
                .expect("static response")
        })
}

async fn fetch_outcome(client: &reqwest::Client, url: &str) -> Result<FetchOutcome> {
    let response = client.get(url).send().await?;
    response_outcome(response).await
}

async fn response_outcome(response: reqwest::Response) -> Result<FetchOutcome> {
    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    let body = response.bytes().await?;
    Ok(FetchOutcome {
        status,
        content_type,
        body,
    })
}
