// ABOUTME: Configuration options for the scraper: retry policy, timeouts, proxy, anti-block and per-site settings.
// ABOUTME: ClientBuilder provides a fluent API for constructing Client instances with custom settings.

use std::sync::Arc;
use std::time::Duration;

use crate::client::Client;
use crate::engine::{AntiBlockSignal, RetryPolicy, TorControl, TorControlConfig};
use crate::sites::Site;

/// Settings that differ between sites.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteOptions {
    /// Minimum spacing between the starts of two requests to this site.
    pub min_interval: Duration,
    /// Origin of the H&M search and product pages. Only H&M builds its own
    /// request URLs; Pinterest and Zalando requests go to the origin of the
    /// scraped URL, so this field is not read for them.
    pub base_url: Option<String>,
}

impl SiteOptions {
    /// Defaults for `site`: H&M is spaced 1.0s apart, the others 0.6s.
    pub fn for_site(site: Site) -> Self {
        let min_interval = match site {
            Site::Hm => Duration::from_secs(1),
            Site::Pinterest | Site::Zalando => Duration::from_millis(600),
        };
        Self {
            min_interval,
            base_url: None,
        }
    }
}

/// Configuration options for the scraper client.
#[derive(Debug, Clone)]
pub struct Options {
    pub max_retries: u32,
    /// Base of the exponential backoff, in seconds.
    pub backoff_base: f64,
    pub backoff_jitter: Duration,
    pub request_timeout: Duration,
    pub short_link_timeout: Duration,
    pub session_max_age: Duration,
    pub cache_ttl: Duration,
    /// Forward proxy for every request, e.g. `socks5h://tor:9050`.
    pub proxy: Option<String>,
    /// Tor control port to signal NEWNYM on after a block.
    pub tor_control: Option<TorControlConfig>,
    /// Custom anti-block collaborator; takes precedence over `tor_control`.
    pub anti_block: Option<Arc<dyn AntiBlockSignal>>,
    pub hm: SiteOptions,
    pub pinterest: SiteOptions,
    pub zalando: SiteOptions,
}

impl Default for Options {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_retries,
            backoff_base: policy.backoff_base,
            backoff_jitter: policy.backoff_jitter,
            request_timeout: policy.request_timeout,
            short_link_timeout: Duration::from_secs(30),
            session_max_age: Duration::from_secs(300),
            cache_ttl: Duration::from_secs(3600),
            proxy: None,
            tor_control: None,
            anti_block: None,
            hm: SiteOptions::for_site(Site::Hm),
            pinterest: SiteOptions::for_site(Site::Pinterest),
            zalando: SiteOptions::for_site(Site::Zalando),
        }
    }
}

impl Options {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff_base: self.backoff_base,
            backoff_jitter: self.backoff_jitter,
            request_timeout: self.request_timeout,
        }
    }

    pub fn site(&self, site: Site) -> &SiteOptions {
        match site {
            Site::Hm => &self.hm,
            Site::Pinterest => &self.pinterest,
            Site::Zalando => &self.zalando,
        }
    }

    fn site_mut(&mut self, site: Site) -> &mut SiteOptions {
        match site {
            Site::Hm => &mut self.hm,
            Site::Pinterest => &mut self.pinterest,
            Site::Zalando => &mut self.zalando,
        }
    }

    /// The collaborator to fire after a block, if any.
    pub fn anti_block_signal(&self) -> Option<Arc<dyn AntiBlockSignal>> {
        if let Some(ref signal) = self.anti_block {
            return Some(Arc::clone(signal));
        }
        self.tor_control
            .clone()
            .map(|config| Arc::new(TorControl::new(config)) as Arc<dyn AntiBlockSignal>)
    }
}

/// Builder for constructing Client instances with custom configuration.
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    opts: Options,
}

impl ClientBuilder {
    /// Create a new ClientBuilder with default options.
    pub fn new() -> Self {
        Self {
            opts: Options::default(),
        }
    }

    /// Set the number of attempts per request.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.opts.max_retries = max_retries;
        self
    }

    /// Set the backoff base (seconds) and the maximum jitter.
    pub fn backoff(mut self, base: f64, jitter: Duration) -> Self {
        self.opts.backoff_base = base;
        self.opts.backoff_jitter = jitter;
        self
    }

    /// Set the per-attempt timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.opts.request_timeout = timeout;
        self
    }

    /// Set the timeout for resolving short links.
    pub fn short_link_timeout(mut self, timeout: Duration) -> Self {
        self.opts.short_link_timeout = timeout;
        self
    }

    /// Set the age after which a session is rebuilt.
    pub fn session_max_age(mut self, max_age: Duration) -> Self {
        self.opts.session_max_age = max_age;
        self
    }

    /// Set how long scraped records stay cached.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.opts.cache_ttl = ttl;
        self
    }

    /// Route every request through a proxy.
    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.opts.proxy = Some(proxy.into());
        self
    }

    /// Signal NEWNYM on a Tor control port after a block.
    pub fn tor_control(mut self, config: TorControlConfig) -> Self {
        self.opts.tor_control = Some(config);
        self
    }

    /// Use a custom anti-block collaborator.
    pub fn anti_block(mut self, signal: Arc<dyn AntiBlockSignal>) -> Self {
        self.opts.anti_block = Some(signal);
        self
    }

    /// Set the minimum request spacing for one site.
    pub fn min_interval(mut self, site: Site, interval: Duration) -> Self {
        self.opts.site_mut(site).min_interval = interval;
        self
    }

    /// Override the origin H&M requests are built against.
    ///
    /// Pinterest and Zalando always request the origin of the URL being
    /// scraped, so there is no per-site variant.
    pub fn hm_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.opts.hm.base_url = Some(base_url.into());
        self
    }

    /// Build the Client with the configured options.
    pub fn build(self) -> Client {
        Client::new(self.opts)
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let opts = Options::default();
        assert_eq!(opts.max_retries, 5);
        assert_eq!(opts.backoff_base, 2.0);
        assert_eq!(opts.backoff_jitter, Duration::from_secs(2));
        assert_eq!(opts.request_timeout, Duration::from_secs(45));
        assert_eq!(opts.session_max_age, Duration::from_secs(300));
        assert_eq!(opts.cache_ttl, Duration::from_secs(3600));
        assert_eq!(opts.site(Site::Hm).min_interval, Duration::from_secs(1));
        assert_eq!(opts.site(Site::Zalando).min_interval, Duration::from_millis(600));
        assert!(opts.proxy.is_none());
        assert!(opts.anti_block_signal().is_none());
    }

    #[test]
    fn tor_control_becomes_the_signal() {
        let opts = Options {
            tor_control: Some(TorControlConfig::default()),
            ..Default::default()
        };
        assert!(opts.anti_block_signal().is_some());
    }

    #[test]
    fn retry_policy_mirrors_options() {
        let opts = Options {
            max_retries: 2,
            backoff_base: 0.5,
            ..Default::default()
        };
        let policy = opts.retry_policy();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.backoff_base, 0.5);
        assert_eq!(policy.request_timeout, opts.request_timeout);
    }
}
