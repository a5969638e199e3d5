// ABOUTME: Zalando adapter: persisted GraphQL product query first, JSON-LD markup as the fallback.
// ABOUTME: Reconciles the GraphQL and markup product shapes into one ScrapedRecord.

use anyhow::{anyhow, bail, Context};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::engine::{CacheKey, CacheStats, Engine};
use crate::error::ScrapeError;
use crate::extractors::fields::{self, first_nonempty, pick_first_nonempty};
use crate::extractors::script;
use crate::record::ScrapedRecord;
use crate::resource::FetchRequest;

/// Server-side id of the product detail query.
pub const PRODUCT_QUERY_ID: &str =
    "c8c938dbcd7f75e2872b23cfbc4f1d5c039c6d70dab7fe0551e9bb094ed82737";

const UNKNOWN_GRAPHQL_ERROR: &str = "Unknown GraphQL error";

static CODE_IN_PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-zA-Z0-9]{9,12}-[a-zA-Z0-9]{3})(?:\.html|/|$)").unwrap());
static CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-zA-Z0-9]{9,12}-[a-zA-Z0-9]{3})").unwrap());

/// Extract the product code (e.g. `CE321D2S1-Q11`) from a product URL, upper-cased.
///
/// The URL path is searched first for a code that ends a path segment; the
/// whole input is the fallback.
pub fn extract_product_code(url: &str) -> Result<String, ScrapeError> {
    let parsed = url::Url::parse(url).ok();
    let path = parsed.as_ref().map(|u| u.path()).unwrap_or(url);

    CODE_IN_PATH_RE
        .captures(path)
        .or_else(|| CODE_RE.captures(url))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_uppercase())
        .ok_or_else(|| {
            ScrapeError::validation(
                url,
                "ExtractProductCode",
                Some(anyhow!("could not extract product code from URL")),
            )
        })
}

/// Build the persisted-query POST for `code`, with headers derived from the page URL.
pub fn graphql_request(url: &str, code: &str) -> Result<FetchRequest, ScrapeError> {
    let parsed = url::Url::parse(url)
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .ok_or_else(|| {
            ScrapeError::validation(url, "GraphQL", Some(anyhow!("invalid product URL")))
        })?;

    let origin = parsed.origin().ascii_serialization();
    let mut request_uri = parsed.path().to_string();
    if request_uri.is_empty() {
        request_uri.push('/');
    }
    if let Some(query) = parsed.query() {
        request_uri.push('?');
        request_uri.push_str(query);
    }

    let body = json!([{"id": PRODUCT_QUERY_ID, "variables": {"id": code}}]);
    Ok(FetchRequest::post_json(format!("{}/api/graphql/", origin), body)
        .header("content-type", "application/json")
        .header("accept", "application/json, text/plain, */*")
        .header("origin", origin.as_str())
        .header("referer", url)
        .header("x-zalando-feature", "product-view")
        .header("x-zalando-request-uri", request_uri)
        .header("x-zalando-intent-context", "navigationTargetGroup=ALL")
        .header("x-device-type", "desktop"))
}

fn graphql_error(item: &Map<String, Value>) -> String {
    let message = item
        .get("errors")
        .and_then(Value::as_array)
        .and_then(|errors| errors.first())
        .and_then(Value::as_object)
        .and_then(|first| fields::text(first, "message"));
    message.unwrap_or(UNKNOWN_GRAPHQL_ERROR).to_string()
}

/// The `data.product` object of a GraphQL batch response.
///
/// A missing product surfaces the first GraphQL error message.
pub fn graphql_product(response: &Value) -> anyhow::Result<&Map<String, Value>> {
    let first = response
        .as_array()
        .and_then(|items| items.first())
        .context("unexpected GraphQL response shape")?
        .as_object()
        .context("unexpected GraphQL response item")?;

    match first.get("data").and_then(|data| data.get("product")) {
        Some(Value::Object(product)) => Ok(product),
        _ => bail!("{}", graphql_error(first)),
    }
}

/// `"<brand> <category> | Color: <c> | Price: <p>"`, leaving out empty parts.
pub fn build_description(brand: &str, category: &str, color: &str, price: &str) -> String {
    let mut parts = Vec::new();
    let head = format!("{} {}", brand, category);
    let head = head.trim();
    if !head.is_empty() {
        parts.push(head.to_string());
    }
    if !color.is_empty() {
        parts.push(format!("Color: {}", color));
    }
    if !price.is_empty() {
        parts.push(format!("Price: {}", price));
    }
    parts.join(" | ")
}

fn record(
    code: &str,
    url: &str,
    brand: String,
    category: String,
    color: String,
    price: String,
    image: String,
) -> ScrapedRecord {
    ScrapedRecord {
        identifier: code.to_string(),
        url: url.to_string(),
        brand,
        category,
        colors: if color.is_empty() { Vec::new() } else { vec![color] },
        price,
        images: if image.is_empty() { Vec::new() } else { vec![image] },
        ..Default::default()
    }
}

pub fn normalize_graphql(product: &Map<String, Value>, code: &str, url: &str) -> ScrapedRecord {
    let nested = |parent: &[&str], key: &str| {
        parent
            .iter()
            .try_fold(product, |obj, k| fields::object(obj, k))
            .and_then(|obj| obj.get(key))
    };

    let brand = pick_first_nonempty([nested(&["brand"], "name")]);
    let category = pick_first_nonempty([product.get("category")]);
    let color = pick_first_nonempty([nested(&["color"], "label"), nested(&["color"], "name")]);
    let price = pick_first_nonempty([
        nested(&["displayPrice", "promotional"], "formatted"),
        nested(&["displayPrice", "original"], "formatted"),
    ]);
    let post_name = first_nonempty([
        pick_first_nonempty([product.get("name")]).as_str(),
        category.as_str(),
        code,
    ]);
    let name = first_nonempty([brand.as_str(), post_name.as_str()]);
    let description = build_description(&brand, &category, &color, &price);
    let image = pick_first_nonempty([nested(&["primaryImage"], "uri")]);

    ScrapedRecord {
        name,
        description,
        post_name,
        ..record(code, url, brand, category, color, price, image)
    }
}

fn is_product_type(value: &Value) -> bool {
    match value {
        Value::String(s) => s.trim().eq_ignore_ascii_case("product"),
        Value::Array(items) => items.iter().any(is_product_type),
        _ => false,
    }
}

/// The first `@type: Product` object, searching arrays and `@graph` holders.
pub fn find_ld_product(value: &Value) -> Option<&Map<String, Value>> {
    match value {
        Value::Object(map) => {
            if map.get("@type").is_some_and(is_product_type) {
                return Some(map);
            }
            map.get("@graph").and_then(find_ld_product)
        }
        Value::Array(items) => items.iter().find_map(find_ld_product),
        _ => None,
    }
}

/// The JSON-LD product for `code` in a product page.
///
/// Unparsable blocks are skipped. A product whose non-empty `sku` names a
/// different code is skipped; one without a `sku` is accepted.
pub fn markup_product(html: &str, code: &str) -> Option<Map<String, Value>> {
    script::ld_json_blocks(html).iter().find_map(|block| {
        let data: Value = serde_json::from_str(block.trim()).ok()?;
        let product = find_ld_product(&data)?;
        let sku = pick_first_nonempty([product.get("sku")]);
        if !sku.is_empty() && !sku.eq_ignore_ascii_case(code) {
            debug!(sku = %sku, code, "skipping JSON-LD product with another sku");
            return None;
        }
        Some(product.clone())
    })
}

/// Offer price as text: numbers are printed and suffixed with `priceCurrency`.
fn offer_price(product: &Map<String, Value>) -> String {
    let offer = match product.get("offers") {
        Some(Value::Object(offer)) => Some(offer),
        Some(Value::Array(offers)) => offers.iter().find_map(Value::as_object),
        _ => None,
    };
    let Some(offer) = offer else {
        return String::new();
    };

    match offer.get("price") {
        Some(Value::String(price)) => price.trim().to_string(),
        Some(Value::Number(price)) => match fields::text(offer, "priceCurrency") {
            Some(currency) => format!("{} {}", price, currency),
            None => price.to_string(),
        },
        _ => String::new(),
    }
}

pub fn normalize_markup(product: &Map<String, Value>, code: &str, url: &str) -> ScrapedRecord {
    let brand_obj = fields::object(product, "brand");
    let brand = pick_first_nonempty([
        brand_obj.and_then(|b| b.get("name")),
        brand_obj.and_then(|b| b.get("brand")),
        product.get("brand"),
    ]);
    let category = pick_first_nonempty([product.get("category")]);
    let color = pick_first_nonempty([product.get("color")]);
    let price = offer_price(product);

    let name = first_nonempty([
        brand.as_str(),
        pick_first_nonempty([product.get("name")]).as_str(),
        code,
    ]);
    let post_name = first_nonempty([
        pick_first_nonempty([product.get("name")]).as_str(),
        category.as_str(),
        code,
    ]);
    let description = first_nonempty([
        pick_first_nonempty([product.get("description")]).as_str(),
        build_description(&brand, &category, &color, &price).as_str(),
    ]);
    let image = match product.get("image") {
        Some(Value::Array(images)) => pick_first_nonempty(images.iter().map(Some)),
        other => pick_first_nonempty([other]),
    };

    ScrapedRecord {
        name,
        description,
        post_name,
        ..record(code, url, brand, category, color, price, image)
    }
}

/// Fetches Zalando products.
#[derive(Debug)]
pub struct ZalandoScraper {
    engine: Engine,
}

impl ZalandoScraper {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn stats(&self) -> CacheStats {
        self.engine.stats()
    }

    /// Scrape the product behind `url`.
    ///
    /// The GraphQL path runs under the retry policy. If it fails for any
    /// reason the page's JSON-LD is tried once; if that yields nothing the
    /// GraphQL error is returned.
    pub async fn fetch(&self, url: &str) -> Result<ScrapedRecord, ScrapeError> {
        let url = url.trim();
        let code = extract_product_code(url)?;
        let key = CacheKey::new(&code);
        if let Some(record) = self.engine.cache().get(&key) {
            debug!(code = %code, "cache hit");
            return Ok(record);
        }

        let req = graphql_request(url, &code)?
            .timeout(self.engine.policy().request_timeout);
        let primary = self
            .engine
            .fetch("GraphQL", &req, |resp| {
                let body = resp.json().map_err(|e| {
                    ScrapeError::extract(&req.url, "GraphQL", Some(anyhow!("invalid JSON response: {}", e)))
                })?;
                let product = graphql_product(&body)
                    .map_err(|e| ScrapeError::extract(&req.url, "GraphQL", Some(e)))?;
                Ok(normalize_graphql(product, &code, url))
            })
            .await;

        let record = match primary {
            Ok(record) => record,
            Err(err) => {
                warn!(code = %code, error = %err, "GraphQL failed, trying JSON-LD");
                match self.fetch_markup(url, &code).await {
                    Some(record) => record,
                    None => return Err(err),
                }
            }
        };

        self.engine.cache().set(key, record.clone());
        Ok(record)
    }

    /// One GET of the product page, parsed for a JSON-LD product.
    async fn fetch_markup(&self, url: &str, code: &str) -> Option<ScrapedRecord> {
        let req = FetchRequest::get(url).timeout(self.engine.policy().request_timeout);
        let resp = match self.engine.send_once(&req, "Markup").await {
            Ok(resp) => resp,
            Err(err) => {
                debug!(error = %err, "JSON-LD fetch failed");
                return None;
            }
        };
        if !resp.is_success() {
            debug!(status = resp.status, "JSON-LD fetch returned non-2xx");
            return None;
        }
        let product = markup_product(&resp.text_utf8(), code)?;
        Some(normalize_markup(&product, code, url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const URL: &str = "https://www.zalando.at/cecil-langarmshirt-schwarz-ce321d2s1-q11.html";
    const CODE: &str = "CE321D2S1-Q11";

    #[test]
    fn product_code_from_url() {
        assert_eq!(extract_product_code(URL).unwrap(), CODE);
        assert_eq!(
            extract_product_code(".../cecil-langarmshirt-schwarz-ce321d2s1-q11.html").unwrap(),
            CODE
        );
        assert_eq!(
            extract_product_code("https://www.zalando.de/ce321d2s1-q11/?size=M").unwrap(),
            CODE
        );
    }

    #[test]
    fn product_code_falls_back_to_whole_url() {
        assert_eq!(
            extract_product_code("https://www.zalando.at/p?sku=ab12cd34e-f56x").unwrap(),
            "AB12CD34E-F56"
        );
        assert!(extract_product_code("https://www.zalando.at/damen/").unwrap_err().is_validation());
    }

    #[test]
    fn graphql_request_derives_headers() {
        let req = graphql_request("https://www.zalando.at/shirt-ce321d2s1-q11.html?size=M", CODE).unwrap();
        assert_eq!(req.url, "https://www.zalando.at/api/graphql/");
        assert_eq!(req.headers["origin"], "https://www.zalando.at");
        assert_eq!(req.headers["referer"], "https://www.zalando.at/shirt-ce321d2s1-q11.html?size=M");
        assert_eq!(req.headers["x-zalando-request-uri"], "/shirt-ce321d2s1-q11.html?size=M");
        assert_eq!(req.headers["x-zalando-feature"], "product-view");
        assert_eq!(
            req.json_body,
            Some(json!([{"id": PRODUCT_QUERY_ID, "variables": {"id": CODE}}]))
        );
    }

    #[test]
    fn graphql_request_keeps_port() {
        let req = graphql_request("http://127.0.0.1:8080/x-ce321d2s1-q11.html", CODE).unwrap();
        assert_eq!(req.url, "http://127.0.0.1:8080/api/graphql/");
        assert!(graphql_request("ce321d2s1-q11.html", CODE).unwrap_err().is_validation());
    }

    #[test]
    fn graphql_product_and_errors() {
        let ok = json!([{"data": {"product": {"id": CODE}}}]);
        assert_eq!(graphql_product(&ok).unwrap()["id"], CODE);

        let failed = json!([{"data": {"product": null}, "errors": [{"message": " Product not found "}]}]);
        assert_eq!(graphql_product(&failed).unwrap_err().to_string(), "Product not found");

        let bare = json!([{"errors": []}]);
        assert_eq!(graphql_product(&bare).unwrap_err().to_string(), UNKNOWN_GRAPHQL_ERROR);

        assert!(graphql_product(&json!([])).is_err());
        assert!(graphql_product(&json!({"data": {}})).is_err());
    }

    #[test]
    fn normalizes_graphql_product() {
        let product = json!({
            "id": CODE,
            "name": "Langarmshirt",
            "category": "Shirts",
            "brand": {"name": "Cecil"},
            "color": {"label": "", "name": "schwarz"},
            "displayPrice": {
                "original": {"formatted": "29,99 €"},
                "promotional": {"formatted": "19,99 €"}
            },
            "primaryImage": {"uri": "https://img01.ztat.net/article/a.jpg"}
        });
        let record = normalize_graphql(product.as_object().unwrap(), CODE, URL);
        assert_eq!(
            record,
            ScrapedRecord {
                identifier: CODE.into(),
                url: URL.into(),
                name: "Cecil".into(),
                post_name: "Langarmshirt".into(),
                description: "Cecil Shirts | Color: schwarz | Price: 19,99 €".into(),
                brand: "Cecil".into(),
                category: "Shirts".into(),
                colors: vec!["schwarz".into()],
                price: "19,99 €".into(),
                images: vec!["https://img01.ztat.net/article/a.jpg".into()],
                ..Default::default()
            }
        );
    }

    #[test]
    fn sparse_graphql_product_falls_back_to_code() {
        let record = normalize_graphql(&Map::new(), CODE, URL);
        assert_eq!(record.post_name, CODE);
        assert_eq!(record.name, CODE);
        assert_eq!(record.description, "");
        assert!(record.images.is_empty());
        assert!(record.colors.is_empty());
    }

    #[test]
    fn description_parts() {
        assert_eq!(build_description("", "", "", ""), "");
        assert_eq!(build_description("", "Shirts", "", "9 €"), "Shirts | Price: 9 €");
        assert_eq!(build_description("Cecil", "", "rot", ""), "Cecil | Color: rot");
    }

    #[test]
    fn finds_product_in_graph() {
        let data = json!([
            {"@type": "BreadcrumbList"},
            {"@context": "https://schema.org", "@graph": [
                {"@type": "Organization"},
                {"@type": ["Thing", "PRODUCT"], "name": "Shirt"}
            ]}
        ]);
        assert_eq!(find_ld_product(&data).unwrap()["name"], "Shirt");
        assert!(find_ld_product(&json!({"@type": "Organization"})).is_none());
    }

    #[test]
    fn markup_product_checks_sku() {
        let html = format!(
            r#"<html><head>
            <script type="application/ld+json">not json</script>
            <script type="application/ld+json">{}</script>
            <script type="application/ld+json">{}</script>
            </head></html>"#,
            json!({"@type": "Product", "sku": "OTHER12345-X01", "name": "Wrong"}),
            json!({"@type": "Product", "sku": "ce321d2s1-q11", "name": "Right"})
        );
        assert_eq!(markup_product(&html, CODE).unwrap()["name"], "Right");

        let no_sku = format!(
            r#"<script type="application/ld+json">{}</script>"#,
            json!({"@type": "Product", "name": "Unlabelled"})
        );
        assert_eq!(markup_product(&no_sku, CODE).unwrap()["name"], "Unlabelled");
    }

    #[test]
    fn normalizes_markup_product() {
        let product = json!({
            "@type": "Product",
            "name": "Langarmshirt",
            "brand": {"@type": "Brand", "name": "Cecil"},
            "color": "schwarz",
            "offers": [{"@type": "Offer", "price": 29.99, "priceCurrency": "EUR"}],
            "image": ["", "https://img01.ztat.net/article/b.jpg", "https://img01.ztat.net/article/c.jpg"]
        });
        let record = normalize_markup(product.as_object().unwrap(), CODE, URL);
        assert_eq!(record.name, "Cecil");
        assert_eq!(record.post_name, "Langarmshirt");
        assert_eq!(record.price, "29.99 EUR");
        assert_eq!(record.description, "Cecil | Color: schwarz | Price: 29.99 EUR");
        assert_eq!(record.image_url(), "https://img01.ztat.net/article/b.jpg");
        assert_eq!(record.images.len(), 1);
    }

    #[test]
    fn markup_description_and_string_fields() {
        let product = json!({
            "name": "Kleid",
            "description": "Ein Sommerkleid",
            "brand": "Vero Moda",
            "offers": {"price": "49,95"},
            "image": "https://img/x.jpg"
        });
        let record = normalize_markup(product.as_object().unwrap(), CODE, URL);
        assert_eq!(record.brand, "Vero Moda");
        assert_eq!(record.description, "Ein Sommerkleid");
        assert_eq!(record.price, "49,95");
        assert_eq!(record.images, vec!["https://img/x.jpg".to_string()]);
    }
}
