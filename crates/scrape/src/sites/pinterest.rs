// ABOUTME: Pinterest adapter: scans relay-registered (metadata, data) JSON pairs embedded in pin pages.
// ABOUTME: Resolves pin.it short links, scores candidate nodes and normalizes the best-documented pin.

use std::time::Duration;

use anyhow::anyhow;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::engine::{CacheKey, CacheStats, Engine};
use crate::error::ScrapeError;
use crate::extractors::fields::{self, pick_first_nonempty};
use crate::extractors::{json_scan, walk};
use crate::record::ScrapedRecord;
use crate::resource::FetchRequest;

/// The inline call that registers each relay payload.
pub const RELAY_MARKER: &str = "window.__PWS_RELAY_REGISTER_COMPLETED_REQUEST__(";

/// Minimum locate score for a node to count as the pin: the `entityId` must match.
const LOCATE_FLOOR: u32 = 10;

const IMAGE_KEYS: [&str; 5] = [
    "images_orig",
    "images_736x",
    "images_564x",
    "images_474x",
    "images_236x",
];

static SHORT_LINK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^https?://(www\.)?pin\.it/").unwrap());
static PIN_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"pinterest\.com/pin/(\d+)").unwrap());
static PIN_PATH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/pin/(\d+)").unwrap());

pub fn is_short_link(url: &str) -> bool {
    SHORT_LINK_RE.is_match(url)
}

/// Extract the numeric pin id from a pin URL.
pub fn extract_pin_id(url: &str) -> Result<String, ScrapeError> {
    PIN_ID_RE
        .captures(url)
        .or_else(|| PIN_PATH_RE.captures(url))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| {
            ScrapeError::validation(
                url,
                "ExtractPinId",
                Some(anyhow!("could not extract pin id from URL")),
            )
        })
}

/// Drop query string and fragment, keeping scheme, host and path.
pub fn canonicalize(url: &str) -> Result<String, ScrapeError> {
    let mut parsed = url::Url::parse(url).map_err(|e| {
        ScrapeError::validation(url, "Canonicalize", Some(anyhow!("invalid URL: {}", e)))
    })?;
    parsed.set_query(None);
    parsed.set_fragment(None);
    Ok(parsed.to_string())
}

/// One `(metadata, data)` pair registered through [`RELAY_MARKER`].
#[derive(Debug, Clone, PartialEq)]
pub struct RelayPayload {
    /// Decoded request metadata; empty when it could not be decoded.
    pub meta: Map<String, Value>,
    pub payload: Map<String, Value>,
}

impl RelayPayload {
    /// `variables.pinId` of the metadata, as trimmed text.
    pub fn meta_pin_id(&self) -> Option<String> {
        fields::object(&self.meta, "variables")
            .and_then(|vars| vars.get("pinId"))
            .and_then(fields::scalar_text)
    }
}

/// Metadata is a percent-encoded JSON string; an object is accepted as-is.
fn decode_meta(raw: Value) -> Map<String, Value> {
    match raw {
        Value::Object(map) => map,
        Value::String(encoded) => urlencoding::decode(&encoded)
            .ok()
            .and_then(|decoded| serde_json::from_str::<Value>(&decoded).ok())
            .and_then(|value| match value {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Map::new(),
    }
}

/// Every relay pair in `html`, in document order.
///
/// After each marker the scanner decodes one JSON value (the metadata),
/// expects a comma, then decodes a second value (the payload). Pairs whose
/// payload is not an object are skipped; malformed JSON skips to the next marker.
pub fn relay_payloads(html: &str) -> Vec<RelayPayload> {
    let mut out = Vec::new();
    let mut start = 0;

    while let Some(found) = html.get(start..).and_then(|rest| rest.find(RELAY_MARKER)) {
        let cursor = start + found + RELAY_MARKER.len();
        start = cursor;

        let Some((meta, after_meta)) = json_scan::decode_at(html, cursor) else {
            continue;
        };
        let Some(after_comma) = json_scan::expect_char(html, after_meta, ',') else {
            start = after_meta;
            continue;
        };
        let Some((payload, after_payload)) = json_scan::decode_at(html, after_comma) else {
            start = after_comma;
            continue;
        };
        start = after_payload;

        if let Value::Object(payload) = payload {
            out.push(RelayPayload {
                meta: decode_meta(meta),
                payload,
            });
        }
    }

    out
}

fn entity_id_matches(node: &Map<String, Value>, pin_id: &str) -> bool {
    node.get("entityId")
        .and_then(fields::scalar_text)
        .is_some_and(|id| id == pin_id)
}

/// How likely `node` is to be the pin itself.
fn locate_score(node: &Map<String, Value>, pin_id: &str) -> u32 {
    let mut score = 0;
    if entity_id_matches(node, pin_id) {
        score += 10;
    }
    if ["title", "description", "unauthOnPageTitle", "seoTitle"]
        .iter()
        .any(|k| node.contains_key(*k))
    {
        score += 2;
    }
    if ["images_orig", "imageLargeUrl", "images_736x"]
        .iter()
        .any(|k| node.contains_key(*k))
    {
        score += 1;
    }
    score
}

fn image_url(pin: &Map<String, Value>) -> String {
    let sized = IMAGE_KEYS
        .iter()
        .map(|key| fields::object(pin, key).and_then(|image| image.get("url")));
    pick_first_nonempty(sized.chain([pin.get("imageLargeUrl")]))
}

fn attribution_name(pin: &Map<String, Value>) -> String {
    let nested = |parent: &str, key: &str| fields::object(pin, parent).and_then(|obj| obj.get(key));
    pick_first_nonempty([
        nested("nativeCreator", "fullName"),
        nested("pinner", "fullName"),
        nested("closeupUnifiedAttribution", "fullName"),
        nested("nativeCreator", "username"),
        nested("pinner", "username"),
    ])
}

fn description(pin: &Map<String, Value>) -> String {
    pick_first_nonempty([
        pin.get("description"),
        pin.get("closeupUnifiedDescription"),
        pin.get("seoDescription"),
    ])
}

/// How well `pin` fills the output fields.
fn quality_score(pin: &Map<String, Value>) -> u32 {
    let has = |key: &str| !pick_first_nonempty([pin.get(key)]).is_empty();
    let mut score = 0;
    for (key, weight) in [("title", 6), ("unauthOnPageTitle", 5), ("gridTitle", 4), ("seoTitle", 2)] {
        if has(key) {
            score += weight;
        }
    }
    if !description(pin).is_empty() {
        score += 3;
    }
    if !image_url(pin).is_empty() {
        score += 2;
    }
    if !attribution_name(pin).is_empty() {
        score += 2;
    }
    score
}

/// The pin node inside one payload's `data` tree.
///
/// `data.v3GetPinQuery.data` is taken directly when its `entityId` matches.
/// Otherwise every object node is scored; among the nodes with the highest
/// locate score (at least the floor) the best-documented one wins.
fn locate_in_payload<'a>(payload: &'a Map<String, Value>, pin_id: &str) -> Option<&'a Map<String, Value>> {
    let data = payload.get("data").filter(|d| d.is_object())?;

    if let Some(pin) = fields::path(data, &["v3GetPinQuery", "data"]).and_then(Value::as_object) {
        if entity_id_matches(pin, pin_id) {
            return Some(pin);
        }
    }

    let mut best: Option<(u32, u32, &Map<String, Value>)> = None;
    for node in walk::object_nodes(data) {
        let locate = locate_score(node, pin_id);
        if locate < LOCATE_FLOOR {
            continue;
        }
        let quality = quality_score(node);
        let better = match best {
            None => true,
            Some((best_locate, best_quality, _)) => {
                locate > best_locate || (locate == best_locate && quality > best_quality)
            }
        };
        if better {
            best = Some((locate, quality, node));
        }
    }
    best.map(|(_, _, node)| node)
}

/// Pick the best pin node across `payloads`.
///
/// Payloads whose metadata names `pin_id` are searched first; only if none of
/// them yields a node are all payloads searched. Across payloads the highest
/// quality wins, the earliest on ties.
pub fn select_pin<'a>(payloads: &'a [RelayPayload], pin_id: &str) -> Option<&'a Map<String, Value>> {
    let best_of = |candidates: &mut dyn Iterator<Item = &'a RelayPayload>| {
        let mut best: Option<(u32, &'a Map<String, Value>)> = None;
        for relay in candidates {
            let Some(pin) = locate_in_payload(&relay.payload, pin_id) else {
                continue;
            };
            let quality = quality_score(pin);
            if best.map_or(true, |(q, _)| quality > q) {
                best = Some((quality, pin));
            }
        }
        best.map(|(_, pin)| pin)
    };

    let mut matched = payloads
        .iter()
        .filter(|relay| relay.meta_pin_id().as_deref() == Some(pin_id));
    best_of(&mut matched).or_else(|| best_of(&mut payloads.iter()))
}

pub fn normalize_pin(pin: &Map<String, Value>, pin_id: &str, url: &str) -> ScrapedRecord {
    let image = image_url(pin);
    ScrapedRecord {
        identifier: pin_id.to_string(),
        url: url.to_string(),
        name: attribution_name(pin),
        description: description(pin),
        post_name: pick_first_nonempty([
            pin.get("title"),
            pin.get("unauthOnPageTitle"),
            pin.get("gridTitle"),
            pin.get("seoTitle"),
        ]),
        images: if image.is_empty() { Vec::new() } else { vec![image] },
        ..Default::default()
    }
}

/// Locate and normalize the pin `pin_id` in a pin page.
pub fn parse_pin_page(html: &str, pin_id: &str, url: &str) -> anyhow::Result<ScrapedRecord> {
    let payloads = relay_payloads(html);
    if payloads.is_empty() {
        return Err(anyhow!("could not find relay payloads in Pinterest page"));
    }
    debug!(pin_id, payloads = payloads.len(), "relay payloads found");

    let pin = select_pin(&payloads, pin_id)
        .ok_or_else(|| anyhow!("could not locate pin data for pin id {}", pin_id))?;
    Ok(normalize_pin(pin, pin_id, url))
}

/// Fetches pins from Pinterest pin pages.
#[derive(Debug)]
pub struct PinterestScraper {
    engine: Engine,
    short_link_timeout: Duration,
}

impl PinterestScraper {
    pub fn new(engine: Engine, short_link_timeout: Duration) -> Self {
        Self {
            engine,
            short_link_timeout,
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn stats(&self) -> CacheStats {
        self.engine.stats()
    }

    /// Follow a short link's redirects with a HEAD request and canonicalize the target.
    ///
    /// Not retried: a transport failure is returned as-is.
    pub async fn resolve_short_url(&self, url: &str) -> Result<String, ScrapeError> {
        let req = FetchRequest::head(url).timeout(self.short_link_timeout);
        let resp = self.engine.send_once(&req, "ResolveShortLink").await?;
        let resolved = canonicalize(&resp.final_url)?;
        info!(short = url, resolved = %resolved, "resolved short link");
        Ok(resolved)
    }

    /// Scrape the pin behind `url`, resolving `pin.it` short links first.
    pub async fn fetch(&self, url: &str) -> Result<ScrapedRecord, ScrapeError> {
        let url = url.trim();
        let url = if is_short_link(url) {
            self.resolve_short_url(url).await?
        } else {
            url.to_string()
        };
        self.fetch_pin(&url).await
    }

    /// Scrape a canonical pin URL.
    pub async fn fetch_pin(&self, url: &str) -> Result<ScrapedRecord, ScrapeError> {
        let pin_id = extract_pin_id(url)?;
        let key = CacheKey::new(&pin_id);
        if let Some(record) = self.engine.cache().get(&key) {
            debug!(pin_id = %pin_id, "cache hit");
            return Ok(record);
        }

        let req = FetchRequest::get(url).timeout(self.engine.policy().request_timeout);
        let record = self
            .engine
            .fetch("Pin", &req, |resp| {
                parse_pin_page(&resp.text_utf8(), &pin_id, url)
                    .map_err(|e| ScrapeError::extract(url, "Pin", Some(e)))
            })
            .await?;

        self.engine.cache().set(key, record.clone());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const PIN: &str = "123456789";

    fn relay_call(meta: &Value, payload: &Value) -> String {
        let meta = urlencoding::encode(&meta.to_string()).into_owned();
        format!("{}\"{}\", {});", RELAY_MARKER, meta, payload)
    }

    fn page(calls: &[String]) -> String {
        format!(
            "<html><head><script>window.__a = 1;</script></head><body><script>{}</script></body></html>",
            calls.join("\n")
        )
    }

    fn pin_meta(id: &str) -> Value {
        json!({"name": "CloseupDetailQuery", "variables": {"pinId": id}})
    }

    #[test]
    fn pin_id_extraction() {
        assert_eq!(
            extract_pin_id("https://www.pinterest.com/pin/123456789/").unwrap(),
            "123456789"
        );
        assert_eq!(extract_pin_id("https://at.pinterest.de/pin/42/").unwrap(), "42");
        assert!(extract_pin_id("https://www.pinterest.com/ideas/").unwrap_err().is_validation());
    }

    #[test]
    fn short_link_detection_and_canonicalization() {
        assert!(is_short_link("https://pin.it/3xYzAbC"));
        assert!(is_short_link("http://www.pin.it/abc"));
        assert!(!is_short_link("https://www.pinterest.com/pin/1/"));
        assert_eq!(
            canonicalize("https://www.pinterest.com/pin/42/?invite_code=x&sender=y#c").unwrap(),
            "https://www.pinterest.com/pin/42/"
        );
    }

    #[test]
    fn scans_pairs_with_nested_braces() {
        let html = page(&[
            relay_call(&pin_meta(PIN), &json!({"data": {"text": "a } { b", "n": {"m": [1, {}]}}})),
            relay_call(&json!({"variables": {}}), &json!({"data": null})),
        ]);
        let payloads = relay_payloads(&html);
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0].meta_pin_id().as_deref(), Some(PIN));
        assert_eq!(payloads[0].payload["data"]["text"], "a } { b");
        assert_eq!(payloads[1].meta_pin_id(), None);
    }

    #[test]
    fn malformed_pairs_are_skipped() {
        let good = relay_call(&pin_meta(PIN), &json!({"data": {}}));
        let html = format!(
            "{m}\"x\" ); {m}\"x\", [1, 2]); {m}{{broken, {good} {m}\"x\", {{\"data\": ",
            m = RELAY_MARKER,
            good = good
        );
        let payloads = relay_payloads(&html);
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].meta_pin_id().as_deref(), Some(PIN));
    }

    #[test]
    fn undecodable_metadata_becomes_empty() {
        let html = format!("{}\"%ZZnot-json\", {{\"data\": {{}}}});", RELAY_MARKER);
        let payloads = relay_payloads(&html);
        assert_eq!(payloads.len(), 1);
        assert!(payloads[0].meta.is_empty());
    }

    #[test]
    fn fast_path_takes_v3_pin_query() {
        let payload = json!({"data": {"v3GetPinQuery": {"data": {
            "entityId": PIN,
            "title": "Linen outfit",
            "images_orig": {"url": "https://i.pinimg.com/originals/a.jpg"},
            "pinner": {"fullName": "Anna", "username": "anna"}
        }}}});
        let html = page(&[relay_call(&pin_meta(PIN), &payload)]);

        let record = parse_pin_page(&html, PIN, "https://www.pinterest.com/pin/123456789/").unwrap();
        assert_eq!(
            record,
            ScrapedRecord {
                identifier: PIN.into(),
                url: "https://www.pinterest.com/pin/123456789/".into(),
                name: "Anna".into(),
                post_name: "Linen outfit".into(),
                images: vec!["https://i.pinimg.com/originals/a.jpg".into()],
                ..Default::default()
            }
        );
    }

    #[test]
    fn scan_prefers_best_documented_matching_node() {
        let payload = json!({"data": {"feed": [
            {"entityId": "999", "title": "Unrelated", "images_orig": {"url": "x"}},
            {"entityId": PIN, "description": "stub"},
            {"entityId": 123456789, "title": "Full", "description": "d",
             "images_736x": {"url": "https://i.pinimg.com/736x/b.jpg"},
             "nativeCreator": {"username": "creator"}}
        ]}});
        let html = page(&[relay_call(&pin_meta(PIN), &payload)]);

        let record = parse_pin_page(&html, PIN, "u").unwrap();
        assert_eq!(record.post_name, "Full");
        assert_eq!(record.description, "d");
        assert_eq!(record.name, "creator");
        assert_eq!(record.image_url(), "https://i.pinimg.com/736x/b.jpg");
    }

    #[test]
    fn nodes_below_the_floor_are_rejected() {
        let payload = json!({"data": {"title": "t", "images_orig": {"url": "x"}}});
        let html = page(&[relay_call(&pin_meta(PIN), &payload)]);
        let err = parse_pin_page(&html, PIN, "u").unwrap_err();
        assert!(err.to_string().contains("could not locate pin data"));
    }

    #[test]
    fn metadata_matched_payloads_win_over_better_unmatched_ones() {
        let rich = json!({"data": {"v3GetPinQuery": {"data": {
            "entityId": PIN, "title": "Rich", "description": "d", "imageLargeUrl": "https://i/large.jpg"
        }}}});
        let sparse = json!({"data": {"v3GetPinQuery": {"data": {
            "entityId": PIN, "gridTitle": "Sparse"
        }}}});
        let html = page(&[
            relay_call(&json!({"variables": {"pinId": "1"}}), &rich),
            relay_call(&pin_meta(PIN), &sparse),
        ]);

        let record = parse_pin_page(&html, PIN, "u").unwrap();
        assert_eq!(record.post_name, "Sparse");
    }

    #[test]
    fn unmatched_payloads_are_the_last_resort() {
        let payload = json!({"data": {"v3GetPinQuery": {"data": {
            "entityId": PIN, "seoTitle": "Fallback", "imageLargeUrl": "https://i/large.jpg"
        }}}});
        let html = page(&[relay_call(&json!({}), &payload)]);

        let record = parse_pin_page(&html, PIN, "u").unwrap();
        assert_eq!(record.post_name, "Fallback");
        assert_eq!(record.images, vec!["https://i/large.jpg".to_string()]);
    }

    #[test]
    fn highest_quality_across_matched_payloads() {
        let first = json!({"data": {"v3GetPinQuery": {"data": {"entityId": PIN, "seoTitle": "Seo"}}}});
        let second = json!({"data": {"v3GetPinQuery": {"data": {
            "entityId": PIN, "title": "Title", "closeupUnifiedDescription": "cud"
        }}}});
        let html = page(&[
            relay_call(&pin_meta(PIN), &first),
            relay_call(&pin_meta(PIN), &second),
        ]);

        let record = parse_pin_page(&html, PIN, "u").unwrap();
        assert_eq!(record.post_name, "Title");
        assert_eq!(record.description, "cud");
    }

    #[test]
    fn page_without_payloads_is_an_error() {
        let err = parse_pin_page("<html>login wall</html>", PIN, "u").unwrap_err();
        assert!(err.to_string().contains("relay payloads"));
    }

    #[test]
    fn name_falls_back_through_attribution_chain() {
        let pin = json!({
            "nativeCreator": {"fullName": "  ", "username": "native_user"},
            "pinner": {"username": "pinner_user"},
            "closeupUnifiedAttribution": {"fullName": "Attribution"}
        });
        let record = normalize_pin(pin.as_object().unwrap(), PIN, "u");
        assert_eq!(record.name, "Attribution");
        assert!(record.images.is_empty());
    }
}
