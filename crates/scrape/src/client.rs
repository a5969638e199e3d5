// ABOUTME: The main Client struct that routes a product URL to the matching site adapter.
// ABOUTME: Builds one Engine per site from Options and exposes per-site cache statistics.

use std::collections::BTreeMap;

use anyhow::anyhow;
use tracing::{debug, info};

use crate::engine::{CacheStats, Engine};
use crate::error::ScrapeError;
use crate::options::{ClientBuilder, Options};
use crate::record::ScrapedRecord;
use crate::sites::{hm, HmScraper, PinterestScraper, Site, ZalandoScraper};

/// Scrapes product and pin data from H&M, Pinterest and Zalando.
#[derive(Debug)]
pub struct Client {
    opts: Options,
    hm: HmScraper,
    pinterest: PinterestScraper,
    zalando: ZalandoScraper,
}

impl Client {
    /// Create a new ClientBuilder for configuring a Client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Create a Client from options.
    ///
    /// HTTP clients are built lazily per session, so a bad proxy surfaces as
    /// a `Config` error on the first scrape rather than here.
    pub fn new(opts: Options) -> Self {
        let hm_base = opts
            .hm
            .base_url
            .clone()
            .unwrap_or_else(|| hm::DEFAULT_BASE_URL.to_string());

        Self {
            hm: HmScraper::new(engine_for(&opts, Site::Hm), hm_base),
            pinterest: PinterestScraper::new(
                engine_for(&opts, Site::Pinterest),
                opts.short_link_timeout,
            ),
            zalando: ZalandoScraper::new(engine_for(&opts, Site::Zalando)),
            opts,
        }
    }

    pub fn options(&self) -> &Options {
        &self.opts
    }

    pub fn hm(&self) -> &HmScraper {
        &self.hm
    }

    pub fn pinterest(&self) -> &PinterestScraper {
        &self.pinterest
    }

    pub fn zalando(&self) -> &ZalandoScraper {
        &self.zalando
    }

    /// Detect the site from `url` and scrape it.
    ///
    /// `locale` only applies to H&M and defaults to `de_at`.
    pub async fn scrape(&self, url: &str, locale: Option<&str>) -> Result<ScrapedRecord, ScrapeError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ScrapeError::validation(url, "Scrape", Some(anyhow!("empty URL"))));
        }
        let site = Site::detect(url).ok_or_else(|| {
            ScrapeError::validation(url, "Scrape", Some(anyhow!("unsupported site")))
        })?;
        self.scrape_site(site, url, locale).await
    }

    /// Scrape `url` with a specific adapter, skipping host detection.
    pub async fn scrape_site(
        &self,
        site: Site,
        url: &str,
        locale: Option<&str>,
    ) -> Result<ScrapedRecord, ScrapeError> {
        debug!(%site, url, "scraping");
        let record = match site {
            Site::Hm => self.hm.fetch(url, locale).await?,
            Site::Pinterest => self.pinterest.fetch(url).await?,
            Site::Zalando => self.zalando.fetch(url).await?,
        };
        info!(%site, identifier = %record.identifier, "scraped");
        Ok(record)
    }

    pub fn site_stats(&self, site: Site) -> CacheStats {
        self.engine(site).stats()
    }

    /// Cache statistics for every site, keyed by site name.
    pub fn stats(&self) -> BTreeMap<Site, CacheStats> {
        Site::ALL
            .into_iter()
            .map(|site| (site, self.site_stats(site)))
            .collect()
    }

    fn engine(&self, site: Site) -> &Engine {
        match site {
            Site::Hm => self.hm.engine(),
            Site::Pinterest => self.pinterest.engine(),
            Site::Zalando => self.zalando.engine(),
        }
    }
}

fn engine_for(opts: &Options, site: Site) -> Engine {
    Engine::new(
        opts.retry_policy(),
        opts.site(site).min_interval,
        opts.session_max_age,
        opts.cache_ttl,
        opts.proxy.clone(),
    )
    .with_anti_block(opts.anti_block_signal())
}
