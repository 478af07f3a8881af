use std::{
    fmt,
    future::Future,
    num::NonZeroU32,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, StatusCode, header};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use shared_utils::env::get_env_var;
use snafu::{IntoError, ResultExt};
use tracing::{debug, warn};

use crate::{
    models::{
        contract::RawContract,
        request_params::{DateBounds, StrikeBounds},
    },
    providers::{
        AuthSnafu, ClientBuildSnafu, DecodeSnafu, EmptyApiKeySnafu, InvalidApiKeySnafu,
        MissingEnvVarSnafu, NotFoundSnafu, OptionsDataProvider, ProviderError, ProviderInitError,
        ReqwestSnafu, RetriesExhaustedSnafu, StatusSnafu,
        polygon_rest::{
            params::{REFERENCE_PAGE_LIMIT, SNAPSHOT_PAGE_LIMIT, reference_params, snapshot_params},
            response::{PolygonPage, PolygonSingle, ReferenceContract, SnapshotContract},
        },
    },
    utils::retry::RetryPolicy,
};

pub const DEFAULT_BASE_URL: &str = "https://api.polygon.io";
pub const API_KEY_ENV: &str = "POLYGON_API_KEY";

/// Error bodies are cut to this many characters before they are stored.
const MAX_ERROR_BODY: usize = 512;

/// Connection settings for [`PolygonProvider`].
pub struct PolygonSettings {
    pub base_url: String,
    pub api_key: SecretString,
    pub retry: RetryPolicy,
    pub timeout: Duration,
    /// Client-side throttle shared by every provider built from these settings.
    pub rate_limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl fmt::Debug for PolygonSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolygonSettings")
            .field("base_url", &self.base_url)
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .field("rate_limited", &self.rate_limiter.is_some())
            .finish_non_exhaustive()
    }
}

impl PolygonSettings {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            retry: RetryPolicy::default_network(),
            timeout: Duration::from_secs(30),
            rate_limiter: None,
        }
    }

    /// Reads the API key from `POLYGON_API_KEY`.
    pub fn from_env() -> Result<Self, ProviderInitError> {
        let key = get_env_var(API_KEY_ENV).context(MissingEnvVarSnafu)?;
        Ok(Self::new(SecretString::from(key)))
    }

    pub fn with_requests_per_second(mut self, rps: Option<NonZeroU32>) -> Self {
        self.rate_limiter = rps.map(|n| Arc::new(RateLimiter::direct(Quota::per_second(n))));
        self
    }
}

/// Options data provider backed by the Polygon.io v3 REST API.
pub struct PolygonProvider {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
    auth_warned: AtomicBool,
}

impl PolygonProvider {
    /// Builds a provider with its own HTTP client. The key travels in the
    /// `Authorization` header, never in a URL.
    pub fn new(settings: &PolygonSettings) -> Result<Self, ProviderInitError> {
        let key = settings.api_key.expose_secret();
        if key.trim().is_empty() {
            return EmptyApiKeySnafu.fail();
        }

        let mut auth = header::HeaderValue::from_str(&format!("Bearer {key}"))
            .context(InvalidApiKeySnafu)?;
        auth.set_sensitive(true);
        let mut headers = header::HeaderMap::new();
        headers.insert(header::AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout)
            .build()
            .context(ClientBuildSnafu)?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            retry: settings.retry.clone(),
            limiter: settings.rate_limiter.clone(),
            auth_warned: AtomicBool::new(false),
        })
    }

    /// Shortcut for `PolygonProvider::new(&PolygonSettings::from_env()?)`.
    pub fn from_env() -> Result<Self, ProviderInitError> {
        Self::new(&PolygonSettings::from_env()?)
    }

    async fn get_once<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(String, String)],
    ) -> Result<T, ProviderError> {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .context(ReqwestSnafu)?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            if !self.auth_warned.swap(true, Ordering::Relaxed) {
                warn!("Polygon rejected the API key (HTTP 401)");
            }
            return AuthSnafu.fail();
        }

        let body = response.text().await.context(ReqwestSnafu)?;
        if !status.is_success() {
            if ProviderError::is_transient_status(status.as_u16()) {
                debug!(status = status.as_u16(), url, "transient API failure");
            }
            return StatusSnafu {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY).collect::<String>(),
            }
            .fail();
        }

        serde_json::from_str(&body).context(DecodeSnafu)
    }

    /// GET with the retry policy applied. A retryable error that survives the
    /// whole budget is wrapped in `RetriesExhausted`.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(String, String)],
    ) -> Result<T, ProviderError> {
        self.retry
            .retry_async(|_| self.get_once(url, query), ProviderError::is_retryable)
            .await
            .map_err(|err| {
                if err.is_retryable() {
                    RetriesExhaustedSnafu {
                        attempts: self.retry.max_attempts,
                    }
                    .into_error(err)
                } else {
                    err
                }
            })
    }

    async fn get_all_pages<T: DeserializeOwned>(
        &self,
        first_url: &str,
        query: &[(String, String)],
    ) -> Result<Vec<T>, ProviderError> {
        follow_pages(|next| async move {
            match next {
                Some(url) => self.get_json(&url, &[]).await,
                None => self.get_json(first_url, query).await,
            }
        })
        .await
    }
}

/// Drains a cursor-paginated listing. `fetch(None)` returns the first page,
/// `fetch(Some(next_url))` each following one. Stops when a page has no
/// `next_url` or repeats the previous one.
pub async fn follow_pages<T, E, F, Fut>(mut fetch: F) -> Result<Vec<T>, E>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<PolygonPage<T>, E>>,
{
    let mut all = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = fetch(cursor.clone()).await?;
        pages += 1;
        debug!(page = pages, records = page.results.len(), "fetched page");
        all.extend(page.results);

        match page.next_url {
            Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
            Some(_) => {
                warn!(pages, "pagination cursor did not advance; stopping");
                break;
            }
            None => break,
        }
    }

    Ok(all)
}

#[async_trait]
impl OptionsDataProvider for PolygonProvider {
    async fn fetch_chain(
        &self,
        symbol: &str,
        strikes: StrikeBounds,
        dates: DateBounds,
    ) -> Result<Vec<RawContract>, ProviderError> {
        let url = format!("{}/v3/reference/options/contracts", self.base_url);
        let query = reference_params(symbol, strikes, dates, REFERENCE_PAGE_LIMIT);
        let records: Vec<ReferenceContract> = self.get_all_pages(&url, &query).await?;
        debug!(symbol, contracts = records.len(), "reference chain fetched");
        Ok(records.into_iter().map(RawContract::from).collect())
    }

    async fn fetch_contract_detail(&self, symbol: &str) -> Result<Vec<RawContract>, ProviderError> {
        let url = format!("{}/v3/snapshot/options/{symbol}", self.base_url);
        let query = snapshot_params(SNAPSHOT_PAGE_LIMIT);
        let records: Vec<SnapshotContract> = self.get_all_pages(&url, &query).await?;
        debug!(symbol, contracts = records.len(), "snapshot chain fetched");
        Ok(records.into_iter().map(RawContract::from).collect())
    }

    async fn fetch_snapshot(
        &self,
        symbol: &str,
        option_id: &str,
    ) -> Result<RawContract, ProviderError> {
        let url = format!("{}/v3/snapshot/options/{symbol}/{option_id}", self.base_url);
        let single: PolygonSingle<SnapshotContract> = self.get_json(&url, &[]).await?;
        match single.results {
            Some(record) => Ok(record.into()),
            None => NotFoundSnafu { what: option_id }.fail(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    /// Serves the canned `(status, body)` responses in order, one per
    /// connection, repeating the last one. Returns the base URL and a hit
    /// counter.
    async fn serve(responses: Vec<(u16, &'static str)>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let (status, body) = responses[n.min(responses.len() - 1)];

                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(read) => buf.extend_from_slice(&chunk[..read]),
                    }
                }

                let reply = format!(
                    "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{addr}"), hits)
    }

    /// Answers one request with an empty page and hands back its head.
    async fn capture_request() -> (String, tokio::sync::oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(read) => buf.extend_from_slice(&chunk[..read]),
                }
            }
            let _ = tx.send(String::from_utf8_lossy(&buf).to_string());
            let body = r#"{"results":[]}"#;
            let reply = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(reply.as_bytes()).await;
            let _ = socket.shutdown().await;
        });

        (format!("http://{addr}"), rx)
    }

    fn provider(base_url: String) -> PolygonProvider {
        let mut settings = PolygonSettings::new(SecretString::from("test-key".to_string()));
        settings.base_url = base_url;
        settings.retry = RetryPolicy::new(3, Duration::from_millis(1));
        PolygonProvider::new(&settings).unwrap()
    }

    #[test]
    fn empty_key_is_rejected() {
        let settings = PolygonSettings::new(SecretString::from("  ".to_string()));
        assert!(matches!(
            PolygonProvider::new(&settings),
            Err(ProviderInitError::EmptyApiKey { .. })
        ));
    }

    #[tokio::test]
    async fn follow_pages_drains_cursor() {
        let mut seen = Vec::new();
        let all: Vec<u32> = follow_pages(|next: Option<String>| {
            seen.push(next.clone());
            async move {
                let page = match next.as_deref() {
                    None => PolygonPage {
                        results: vec![1, 2],
                        next_url: Some("p2".into()),
                    },
                    Some("p2") => PolygonPage {
                        results: vec![3],
                        next_url: Some("p3".into()),
                    },
                    _ => PolygonPage {
                        results: vec![4],
                        next_url: None,
                    },
                };
                Ok::<_, ProviderError>(page)
            }
        })
        .await
        .unwrap();

        assert_eq!(all, vec![1, 2, 3, 4]);
        assert_eq!(seen, vec![None, Some("p2".into()), Some("p3".into())]);
    }

    #[tokio::test]
    async fn follow_pages_stops_on_stuck_cursor() {
        let mut calls = 0;
        let all: Vec<u32> = follow_pages(|_| {
            calls += 1;
            async {
                Ok::<_, ProviderError>(PolygonPage {
                    results: vec![7],
                    next_url: Some("same".into()),
                })
            }
        })
        .await
        .unwrap();
        assert_eq!(calls, 2);
        assert_eq!(all, vec![7, 7]);
    }

    #[tokio::test]
    async fn follow_pages_propagates_page_error() {
        let result: Result<Vec<u32>, ProviderError> = follow_pages(|next: Option<String>| async move {
            match next {
                None => Ok(PolygonPage {
                    results: vec![1],
                    next_url: Some("p2".into()),
                }),
                Some(_) => AuthSnafu.fail(),
            }
        })
        .await;
        assert!(result.unwrap_err().is_auth());
    }

    #[tokio::test]
    async fn key_travels_in_authorization_header_only() {
        let (base, head) = capture_request().await;
        let rows = provider(base).fetch_contract_detail("AAPL").await.unwrap();
        assert!(rows.is_empty());

        let head = head.await.unwrap();
        let request_line = head.lines().next().unwrap_or_default();
        assert!(request_line.starts_with("GET /v3/snapshot/options/AAPL"));
        assert!(!request_line.contains("test-key"));
        assert!(!request_line.contains("apiKey"));
        assert!(
            head.lines()
                .any(|l| l.eq_ignore_ascii_case("authorization: Bearer test-key"))
        );
    }

    #[tokio::test]
    async fn unauthorized_is_not_retried() {
        let (base, hits) = serve(vec![(401, r#"{"status":"ERROR"}"#)]).await;
        let err = provider(base).fetch_contract_detail("AAPL").await.unwrap_err();
        assert!(matches!(err, ProviderError::Auth { .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_status_is_retried_until_success() {
        let ok = r#"{"results":{"details":{"ticker":"O:AAPL251017C00150000","expiration_date":"2025-10-17","strike_price":150,"contract_type":"call"},"implied_volatility":0.3}}"#;
        let (base, hits) = serve(vec![(503, "busy"), (429, "slow"), (200, ok)]).await;
        let raw = provider(base)
            .fetch_snapshot("AAPL", "O:AAPL251017C00150000")
            .await
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(raw.metrics.unwrap().implied_volatility, Some(0.3));
    }

    #[tokio::test]
    async fn exhausted_budget_reports_attempts() {
        let (base, hits) = serve(vec![(500, "down")]).await;
        let err = provider(base).fetch_contract_detail("AAPL").await.unwrap_err();
        match err {
            ProviderError::RetriesExhausted { attempts, source } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*source, ProviderError::Status { status: 500, .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn empty_single_result_is_not_found() {
        let (base, hits) = serve(vec![(200, r#"{"status":"OK"}"#)]).await;
        let err = provider(base).fetch_snapshot("AAPL", "O:NOPE").await.unwrap_err();
        assert!(matches!(err, ProviderError::NotFound { .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    #[ignore = "hits the live Polygon API; needs POLYGON_API_KEY"]
    async fn live_snapshot_chain() {
        let provider = PolygonProvider::from_env().unwrap();
        let chain = provider.fetch_contract_detail("SPY").await.unwrap();
        assert!(!chain.is_empty());
    }
}
