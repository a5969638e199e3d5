// ABOUTME: H&M adapter: product pages are blocked, so products are read from the search results page.
// ABOUTME: Parses the __NEXT_DATA__ blob, picks the matching hit and normalizes images, sizes and colors.

use anyhow::{anyhow, Context};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::engine::{CacheKey, CacheStats, Engine};
use crate::error::ScrapeError;
use crate::extractors::fields::{self, pick_first_nonempty};
use crate::extractors::script;
use crate::record::ScrapedRecord;
use crate::resource::FetchRequest;

pub const DEFAULT_BASE_URL: &str = "https://www2.hm.com";
pub const DEFAULT_LOCALE: &str = "de_at";

static ARTICLE_CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{7,10})").unwrap());

/// Extract the numeric article code (7 to 10 digits) from a product URL.
pub fn extract_article_code(url: &str) -> Result<String, ScrapeError> {
    ARTICLE_CODE_RE
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| {
            ScrapeError::validation(
                url,
                "ExtractArticleCode",
                Some(anyhow!("could not extract article code from URL")),
            )
        })
}

/// Trim and lower-case a locale; blank or absent means [`DEFAULT_LOCALE`].
pub fn normalize_locale(locale: Option<&str>) -> String {
    let locale = locale.map(str::trim).unwrap_or_default();
    if locale.is_empty() {
        DEFAULT_LOCALE.to_string()
    } else {
        locale.to_lowercase()
    }
}

pub fn search_url(base_url: &str, locale: &str, code: &str) -> String {
    format!(
        "{}/{}/search-results.html?q={}",
        base_url.trim_end_matches('/'),
        locale,
        code
    )
}

pub fn product_url(base_url: &str, locale: &str, code: &str) -> String {
    format!(
        "{}/{}/productpage.{}.html",
        base_url.trim_end_matches('/'),
        locale,
        code
    )
}

/// The hit whose `articleCode` equals `code`, else the first hit.
fn select_hit<'a>(hits: &'a [Value], code: &str) -> Option<&'a Map<String, Value>> {
    let objects = || hits.iter().filter_map(Value::as_object);
    objects()
        .find(|hit| {
            hit.get("articleCode")
                .and_then(fields::scalar_text)
                .is_some_and(|c| c == code)
        })
        .or_else(|| objects().next())
}

fn normalize_hit(hit: &Map<String, Value>, code: &str) -> ScrapedRecord {
    let mut images = Vec::new();
    if let Some(gallery) = hit.get("galleryImages").and_then(Value::as_array) {
        for src in gallery
            .iter()
            .filter_map(Value::as_object)
            .filter_map(|img| fields::text(img, "src"))
        {
            fields::push_unique(&mut images, src);
        }
    }
    for key in ["imageProductSrc", "imageModelSrc"] {
        if let Some(src) = fields::text(hit, key) {
            fields::push_unique(&mut images, src);
        }
    }

    let labels = |list: &str, key: &str| -> Vec<String> {
        hit.get(list)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_object)
                    .filter_map(|item| fields::text(item, key))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    };

    let name = pick_first_nonempty([hit.get("title")]);
    let identifier = hit
        .get("articleCode")
        .and_then(fields::scalar_text)
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| code.to_string());

    ScrapedRecord {
        identifier,
        name: if name.is_empty() { "Unknown".to_string() } else { name },
        images,
        price: pick_first_nonempty([hit.get("regularPrice")]),
        sizes: labels("sizes", "label"),
        colors: labels("swatches", "colorName"),
        ..Default::default()
    }
}

/// Locate the product for `code` in a search results page and normalize it.
///
/// The record's `url` is left empty; the caller knows the canonical URL.
pub fn parse_search_results(html: &str, code: &str) -> anyhow::Result<ScrapedRecord> {
    let blob = script::next_data(html).context("could not find __NEXT_DATA__ in search results page")?;
    let data: Value = serde_json::from_str(&blob).context("invalid __NEXT_DATA__ JSON")?;
    let hits = fields::path(&data, &["props", "pageProps", "srpProps", "hits"])
        .and_then(Value::as_array)
        .context("search results page has no props.pageProps.srpProps.hits")?;

    let hit = select_hit(hits, code)
        .ok_or_else(|| anyhow!("no products found for article code {}", code))?;
    Ok(normalize_hit(hit, code))
}

/// Fetches H&M products through the search results page.
#[derive(Debug)]
pub struct HmScraper {
    engine: Engine,
    base_url: String,
}

impl HmScraper {
    pub fn new(engine: Engine, base_url: impl Into<String>) -> Self {
        Self {
            engine,
            base_url: base_url.into(),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn stats(&self) -> CacheStats {
        self.engine.stats()
    }

    /// Scrape the product behind `url`, in `locale` (default `de_at`).
    pub async fn fetch(&self, url: &str, locale: Option<&str>) -> Result<ScrapedRecord, ScrapeError> {
        let code = extract_article_code(url)?;
        let locale = normalize_locale(locale);
        self.fetch_article(&code, &locale).await
    }

    /// Scrape an article code directly, bypassing URL parsing.
    pub async fn fetch_article(&self, code: &str, locale: &str) -> Result<ScrapedRecord, ScrapeError> {
        let key = CacheKey::with_locale(code, locale);
        if let Some(record) = self.engine.cache().get(&key) {
            debug!(code, locale, "cache hit");
            return Ok(record);
        }

        let search = search_url(&self.base_url, locale, code);
        let req = FetchRequest::get(&search).timeout(self.engine.policy().request_timeout);
        let mut record = self
            .engine
            .fetch("Search", &req, |resp| {
                parse_search_results(&resp.text_utf8(), code)
                    .map_err(|e| ScrapeError::extract(&search, "Search", Some(e)))
            })
            .await?;

        record.url = product_url(&self.base_url, locale, &record.identifier);
        self.engine.cache().set(key, record.clone());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn results_page(hits: Value) -> String {
        let data = json!({"props": {"pageProps": {"srpProps": {"hits": hits}}}});
        format!(
            r#"<!DOCTYPE html><html><head><title>Suche</title></head><body>
            <div id="__next"></div>
            <script id="__NEXT_DATA__" type="application/json">{}</script>
            </body></html>"#,
            data
        )
    }

    #[test]
    fn article_code_from_product_url() {
        assert_eq!(
            extract_article_code("https://www2.hm.com/de_at/productpage.1315728001.html").unwrap(),
            "1315728001"
        );
        assert_eq!(
            extract_article_code(".../productpage.1315728001.html").unwrap(),
            "1315728001"
        );
    }

    #[test]
    fn article_code_missing_is_validation_error() {
        let err = extract_article_code("https://www2.hm.com/de_at/index.html").unwrap_err();
        assert!(err.is_validation());
        assert!(!err.is_retryable());
    }

    #[test]
    fn locale_defaults_and_normalizes() {
        assert_eq!(normalize_locale(None), "de_at");
        assert_eq!(normalize_locale(Some("  ")), "de_at");
        assert_eq!(normalize_locale(Some(" EN_GB ")), "en_gb");
    }

    #[test]
    fn urls_are_built_from_base_and_locale() {
        assert_eq!(
            search_url("https://www2.hm.com/", "de_at", "1315728001"),
            "https://www2.hm.com/de_at/search-results.html?q=1315728001"
        );
        assert_eq!(
            product_url("https://www2.hm.com", "en_gb", "1315728001"),
            "https://www2.hm.com/en_gb/productpage.1315728001.html"
        );
    }

    #[test]
    fn exact_hit_wins_and_fields_normalize() {
        let html = results_page(json!([
            {"articleCode": "0999999001", "title": "Other"},
            {
                "articleCode": "1315728001",
                "title": "Oversized Hemd",
                "regularPrice": "€ 29,99",
                "galleryImages": [
                    {"src": "https://img/1.jpg"},
                    {"src": "https://img/2.jpg"},
                    {"src": "https://img/1.jpg"},
                    {"alt": "no src"}
                ],
                "imageProductSrc": "https://img/2.jpg",
                "imageModelSrc": "https://img/model.jpg",
                "sizes": [{"label": "S"}, {"label": "M"}, {"sizeCode": "x"}],
                "swatches": [{"colorName": "Schwarz"}, {"colorName": "Weiß"}]
            }
        ]));

        let record = parse_search_results(&html, "1315728001").unwrap();
        assert_eq!(
            record,
            ScrapedRecord {
                identifier: "1315728001".into(),
                name: "Oversized Hemd".into(),
                price: "€ 29,99".into(),
                images: vec![
                    "https://img/1.jpg".into(),
                    "https://img/2.jpg".into(),
                    "https://img/model.jpg".into(),
                ],
                sizes: vec!["S".into(), "M".into()],
                colors: vec!["Schwarz".into(), "Weiß".into()],
                ..Default::default()
            }
        );
    }

    #[test]
    fn first_hit_is_fallback() {
        let html = results_page(json!([
            {"articleCode": "1315728002", "imageModelSrc": "https://img/m.jpg"},
            {"articleCode": "1315728003", "title": "Second"}
        ]));
        let record = parse_search_results(&html, "1315728001").unwrap();
        assert_eq!(record.identifier, "1315728002");
        assert_eq!(record.name, "Unknown");
        assert_eq!(record.images, vec!["https://img/m.jpg".to_string()]);
        assert!(record.sizes.is_empty());
    }

    #[test]
    fn empty_hits_is_an_error() {
        let err = parse_search_results(&results_page(json!([])), "1315728001").unwrap_err();
        assert!(err.to_string().contains("no products found for article code 1315728001"));
    }

    #[test]
    fn missing_blob_or_path_is_an_error() {
        let err = parse_search_results("<html><body>Access Denied</body></html>", "1").unwrap_err();
        assert!(err.to_string().contains("__NEXT_DATA__"));

        let html = r#"<script id="__NEXT_DATA__" type="application/json">{"props": {}}</script>"#;
        let err = parse_search_results(html, "1").unwrap_err();
        assert!(err.to_string().contains("srpProps"));
    }
}
