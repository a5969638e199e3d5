// ABOUTME: Resilient fetch engine composing rate limiting, session rotation, caching and retries.
// ABOUTME: Engine::execute drives the bounded retry loop around one site request.

pub mod antiblock;
pub mod cache;
pub mod rate_limit;
pub mod retry;
pub mod session;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::ScrapeError;
use crate::record::ScrapedRecord;
use crate::resource::{self, FetchRequest, FetchResult};

pub use antiblock::{AntiBlockSignal, TorControl, TorControlConfig};
pub use cache::{CacheKey, CacheStats, TtlCache};
pub use rate_limit::RateLimiter;
pub use retry::RetryPolicy;
pub use session::{Session, SessionManager};

/// Per-adapter fetch state: one rate limiter, one session manager, one cache.
#[derive(Debug)]
pub struct Engine {
    policy: RetryPolicy,
    rate_limiter: RateLimiter,
    sessions: SessionManager,
    cache: TtlCache<CacheKey, ScrapedRecord>,
    anti_block: Option<Arc<dyn AntiBlockSignal>>,
}

impl Engine {
    pub fn new(
        policy: RetryPolicy,
        min_interval: Duration,
        session_max_age: Duration,
        cache_ttl: Duration,
        proxy: Option<String>,
    ) -> Self {
        Self {
            policy,
            rate_limiter: RateLimiter::new(min_interval),
            sessions: SessionManager::new(session_max_age, proxy),
            cache: TtlCache::new(cache_ttl),
            anti_block: None,
        }
    }

    pub fn with_anti_block(mut self, signal: Option<Arc<dyn AntiBlockSignal>>) -> Self {
        self.anti_block = signal;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn cache(&self) -> &TtlCache<CacheKey, ScrapedRecord> {
        &self.cache
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Run `send` under the retry policy and hand the first 2xx response to `extract`.
    ///
    /// Each attempt waits on the rate limiter, takes the current session and is
    /// bounded by the request timeout. Retryable failures (transport errors,
    /// timeouts, 403/429) are retried after exponential backoff with a fresh
    /// session; a 403/429 also fires the anti-block signal. Any other non-2xx
    /// status and any error returned by `extract` end the loop immediately.
    /// When every attempt fails, the result is an Exhausted error wrapping the
    /// last cause.
    pub async fn execute<T, S, Fut, X>(
        &self,
        op: &str,
        url: &str,
        mut send: S,
        mut extract: X,
    ) -> Result<T, ScrapeError>
    where
        S: FnMut(Session) -> Fut,
        Fut: Future<Output = Result<FetchResult, ScrapeError>>,
        X: FnMut(FetchResult) -> Result<T, ScrapeError>,
    {
        let max_retries = self.policy.max_retries.max(1);
        let mut last: Option<ScrapeError> = None;

        for attempt in 0..max_retries {
            if attempt > 0 {
                let delay = self.policy.delay(attempt);
                debug!(op, url, attempt, delay_ms = delay.as_millis() as u64, "backing off");
                tokio::time::sleep(delay).await;
                self.sessions.invalidate();
            }

            self.rate_limiter.wait().await;
            let session = self.sessions.get()?;
            debug!(op, url, attempt, session = session.id(), "attempt");

            let outcome = match tokio::time::timeout(self.policy.request_timeout, send(session)).await
            {
                Ok(result) => result,
                Err(_) => Err(ScrapeError::timeout(
                    url,
                    op,
                    Some(anyhow::anyhow!(
                        "no response within {:?}",
                        self.policy.request_timeout
                    )),
                )),
            };

            let response = match outcome {
                Ok(response) => response,
                Err(err) if err.is_retryable() => {
                    warn!(op, url, attempt, error = %err, "attempt failed");
                    last = Some(err);
                    continue;
                }
                Err(err) => return Err(err),
            };

            if response.is_block() {
                warn!(op, url, attempt, status = response.status, "blocked");
                self.signal_anti_block().await;
                last = Some(ScrapeError::blocked(url, op, response.status));
                continue;
            }
            if !response.is_success() {
                return Err(ScrapeError::status(url, op, response.status));
            }

            return extract(response);
        }

        Err(ScrapeError::exhausted(url, op, max_retries, last))
    }

    /// [`Engine::execute`] with `req` sent as-is on every attempt.
    pub async fn fetch<T, X>(&self, op: &str, req: &FetchRequest, extract: X) -> Result<T, ScrapeError>
    where
        X: FnMut(FetchResult) -> Result<T, ScrapeError>,
    {
        self.execute(
            op,
            &req.url,
            |session| async move { resource::send(session.client(), req, op).await },
            extract,
        )
        .await
    }

    /// One rate-limited exchange on the current session, outside the retry loop.
    pub async fn send_once(&self, req: &FetchRequest, op: &str) -> Result<FetchResult, ScrapeError> {
        self.rate_limiter.wait().await;
        let session = self.sessions.get()?;
        let timeout = req.timeout.unwrap_or(self.policy.request_timeout);
        match tokio::time::timeout(timeout, resource::send(session.client(), req, op)).await {
            Ok(result) => result,
            Err(_) => Err(ScrapeError::timeout(
                &req.url,
                op,
                Some(anyhow::anyhow!("no response within {:?}", timeout)),
            )),
        }
    }

    /// Fire the anti-block signal, if any. Failures are logged and dropped.
    pub async fn signal_anti_block(&self) {
        let Some(signal) = self.anti_block.as_ref() else {
            return;
        };
        if let Err(err) = signal.renew_identity().await {
            warn!("anti-block signal failed: {:#}", err);
        }
    }
}
