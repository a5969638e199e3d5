// ABOUTME: Site adapters (H&M, Pinterest, Zalando) and host-based site detection.
// ABOUTME: Each adapter owns an Engine and turns a source URL into a ScrapedRecord.

pub mod hm;
pub mod pinterest;
pub mod zalando;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use hm::HmScraper;
pub use pinterest::PinterestScraper;
pub use zalando::ZalandoScraper;

/// The sites this crate knows how to scrape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Site {
    Hm,
    Pinterest,
    Zalando,
}

impl Site {
    pub const ALL: [Site; 3] = [Site::Hm, Site::Pinterest, Site::Zalando];

    /// Short lowercase name, as used on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Site::Hm => "hm",
            Site::Pinterest => "pinterest",
            Site::Zalando => "zalando",
        }
    }

    /// Detect the site from the URL's host.
    pub fn detect(url: &str) -> Option<Site> {
        let parsed = url::Url::parse(url.trim()).ok()?;
        let host = parsed.host_str()?.to_ascii_lowercase();
        let host = host.trim_end_matches('.');

        if host == "hm.com" || host.ends_with(".hm.com") {
            Some(Site::Hm)
        } else if host == "pin.it" || host.ends_with(".pin.it") || is_brand_domain(host, "pinterest") {
            Some(Site::Pinterest)
        } else if is_brand_domain(host, "zalando") {
            Some(Site::Zalando)
        } else {
            None
        }
    }
}

/// True when `brand` is the registrable label of `host`: `zalando.at`,
/// `www.zalando.co.uk` and `at.pinterest.com` match, `notzalando.de` and
/// `zalando.example.com` do not.
fn is_brand_domain(host: &str, brand: &str) -> bool {
    let labels: Vec<&str> = host.split('.').collect();
    labels.iter().enumerate().any(|(i, label)| {
        let suffix = &labels[i + 1..];
        *label == brand
            && matches!(suffix.len(), 1 | 2)
            && suffix.iter().all(|l| (2..=3).contains(&l.len()))
    })
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Site {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hm" | "h&m" => Ok(Site::Hm),
            "pinterest" => Ok(Site::Pinterest),
            "zalando" => Ok(Site::Zalando),
            other => Err(format!(
                "unknown site '{}' (expected hm, pinterest or zalando)",
                other
            )),
        }
    }
}
