//! The gateway client: one typed entry point for portal reads.
//!
//! Every call runs the same pipeline: build a deterministic cache key, pay
//! one rate-limit token, consult the cache, and only on a miss go to the
//! network with per-attempt deadlines, the response byte cap and the retry
//! policy layered on. Fresh responses land in the cache before being decoded
//! into the caller's type.

use std::sync::Arc;
use std::time::Instant;

use portico_common::cache::{Cache, CacheConfig, CacheStats};
use portico_common::resilience::{
    with_deadline, RetryConfig, RetryDecision, RetryExecutor, RetryPolicy, TokenBucket,
    TokenBucketConfig,
};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client as ReqwestClient;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::body::{collect_capped, BodyReadError};
use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::request::{Params, RequestDescriptor};
use crate::telemetry::{LogSink, TelemetrySink};

/// Media type the open-data portal serves.
const ACCEPT_LD_JSON: &str = "application/ld+json";

/// Response cache keyed by deterministic request keys.
pub type ResponseCache = Cache<String, Value>;

/// Cache and rate limiter shared by every client talking to one portal.
///
/// Clones are cheap handles onto the same state. A facade owning several
/// sub-clients builds one `GatewayResources` and hands each sub-client a
/// clone, so the portal-wide rate limit and the cache stay global no matter
/// how many clients exist.
#[derive(Clone)]
pub struct GatewayResources {
    cache: ResponseCache,
    bucket: TokenBucket,
}

impl GatewayResources {
    /// Build fresh resources sized per `config`.
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let cache_config = CacheConfig::builder()
            .max_size(config.max_cache_size)
            .ttl(config.cache_ttl)
            .build()?;

        let bucket_config = TokenBucketConfig::builder()
            .capacity(config.rate_tokens)
            .refill_interval(config.rate_interval)
            .build()?;

        Ok(Self { cache: Cache::new(cache_config), bucket: TokenBucket::new(bucket_config)? })
    }

    /// The shared response cache.
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// The shared rate-limit bucket.
    pub fn bucket(&self) -> &TokenBucket {
        &self.bucket
    }
}

/// Retry classification for gateway errors: transient failures retry,
/// everything else stops on the first occurrence.
#[derive(Debug, Clone, Copy)]
struct TransientOnly;

impl RetryPolicy<GatewayError> for TransientOnly {
    fn should_retry(&self, error: &GatewayError, _attempt: u32) -> RetryDecision {
        if error.is_retryable() {
            RetryDecision::Retry
        } else {
            RetryDecision::Stop
        }
    }
}

/// Resilient client for the open-data portal.
///
/// # Examples
///
/// ```rust,no_run
/// use portico_gateway::{GatewayClient, GatewayConfig, Params};
/// use serde_json::Value;
///
/// # async fn example() -> portico_gateway::Result<()> {
/// let config = GatewayConfig::builder("https://data.example.org/api/").build()?;
/// let client = GatewayClient::new(config)?;
///
/// let records: Value = client.get("records", Params::new().with("limit", 10)).await?;
/// # Ok(())
/// # }
/// ```
pub struct GatewayClient {
    http: ReqwestClient,
    config: GatewayConfig,
    resources: GatewayResources,
    executor: RetryExecutor<TransientOnly>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl GatewayClient {
    /// Build a client owning fresh resources.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let resources = GatewayResources::new(&config)?;
        Self::with_resources(config, resources)
    }

    /// Build a client on existing shared resources.
    ///
    /// Clients created this way throttle and cache together; use it for
    /// every sub-client targeting the same portal.
    pub fn with_resources(config: GatewayConfig, resources: GatewayResources) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_LD_JSON));

        // No client-level timeout: the deadline guard owns time budgeting,
        // so an elapsed budget is always reported as DeadlineExceeded and
        // never as a transport error.
        let http = ReqwestClient::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .no_proxy()
            .build()
            .map_err(|err| {
                GatewayError::configuration(format!("failed to build HTTP client: {err}"))
            })?;

        let retry_config = RetryConfig::builder()
            .max_retries(config.effective_max_retries())
            .base_delay(config.base_delay)
            .max_delay(config.max_delay)
            .build()?;

        Ok(Self {
            http,
            resources,
            executor: RetryExecutor::new(retry_config, TransientOnly),
            telemetry: Arc::new(LogSink),
            config,
        })
    }

    /// Replace the telemetry sink. The default logs through `tracing`.
    #[must_use]
    pub fn with_telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = sink;
        self
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// The resources backing this client.
    pub fn resources(&self) -> &GatewayResources {
        &self.resources
    }

    /// Fetch `endpoint` with `params`, decoded into `T`.
    ///
    /// One rate-limit token is paid per call, before the cache lookup, so
    /// neither hits nor misses bypass throttling. The call suspends while
    /// the bucket is empty rather than failing. Decoding happens after
    /// caching; the cache stores the raw JSON, so differently-typed reads of
    /// the same endpoint share entries.
    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str, params: Params) -> Result<T> {
        let started = Instant::now();
        let outcome = self.get_value(endpoint, params).await;
        self.telemetry.record_operation(endpoint, started.elapsed());

        let value = outcome?;
        serde_json::from_value(value)
            .map_err(|source| GatewayError::Decode { endpoint: endpoint.to_string(), source })
    }

    /// Drop every cached response. Hit/miss counters are unaffected.
    pub fn clear_cache(&self) {
        self.resources.cache.clear();
    }

    /// Current cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        self.resources.cache.stats()
    }

    async fn get_value(&self, endpoint: &str, params: Params) -> Result<Value> {
        let descriptor = RequestDescriptor::new(endpoint, params);
        let endpoint = descriptor.endpoint();
        let key = descriptor.cache_key();

        // The token is paid before the cache is consulted; a burst of hits
        // spends portal budget exactly like a burst of misses.
        let admission = self.resources.bucket.acquire(1, None).await;
        debug!(endpoint, remaining = admission.remaining, "rate limit token paid");

        if let Some(value) = self.resources.cache.get(&key) {
            debug!(endpoint, key = %key, "cache hit");
            return Ok(value);
        }
        debug!(endpoint, key = %key, "cache miss");

        let url = self.request_url(&descriptor)?;
        let value = self
            .executor
            .execute(|| {
                let url = url.clone();
                async move {
                    match with_deadline(endpoint, self.config.timeout, self.fetch(endpoint, url))
                        .await
                    {
                        Ok(outcome) => outcome,
                        Err(elapsed) => Err(GatewayError::DeadlineExceeded {
                            endpoint: endpoint.to_string(),
                            timeout: elapsed.budget,
                        }),
                    }
                }
            })
            .await?;

        self.resources.cache.insert(key, value.clone());
        Ok(value)
    }

    /// One network attempt: send, classify the status, read the body under
    /// the byte cap, parse JSON.
    async fn fetch(&self, endpoint: &str, url: Url) -> Result<Value> {
        debug!(endpoint, %url, "sending request");

        let response = self.http.get(url).send().await.map_err(|source| {
            GatewayError::Transport { endpoint: endpoint.to_string(), source }
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(endpoint, status = status.as_u16(), "upstream returned error status");
            return Err(GatewayError::Upstream {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }

        let limit = self.config.max_response_bytes;
        if let Some(declared) = response.content_length() {
            if declared > limit {
                warn!(endpoint, declared, limit, "declared size over cap, body left unread");
                return Err(GatewayError::PayloadTooLarge {
                    endpoint: endpoint.to_string(),
                    limit,
                    declared: Some(declared),
                });
            }
        }

        // Content-Length can lie or be absent; measure what actually
        // arrives.
        let bytes = collect_capped(response.bytes_stream(), limit).await.map_err(|err| {
            match err {
                BodyReadError::CapExceeded => {
                    warn!(endpoint, limit, "response crossed cap mid-stream, transfer aborted");
                    GatewayError::PayloadTooLarge {
                        endpoint: endpoint.to_string(),
                        limit,
                        declared: None,
                    }
                }
                BodyReadError::Stream(source) => {
                    GatewayError::Transport { endpoint: endpoint.to_string(), source }
                }
            }
        })?;

        serde_json::from_slice(&bytes)
            .map_err(|source| GatewayError::Decode { endpoint: endpoint.to_string(), source })
    }

    /// Resolve the absolute request URL for a descriptor.
    fn request_url(&self, descriptor: &RequestDescriptor) -> Result<Url> {
        let mut url = self.config.base_url.join(descriptor.endpoint()).map_err(|err| {
            GatewayError::configuration(format!(
                "endpoint '{}' does not form a valid URL: {err}",
                descriptor.endpoint()
            ))
        })?;

        if !descriptor.params().is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in descriptor.params().iter() {
                pairs.append_pair(key, &value.render());
            }
        }

        Ok(url)
    }
}
