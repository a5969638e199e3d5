// ABOUTME: Main library entry point for the wtw-scrape product scraper.
// ABOUTME: Re-exports the public API: Client, ClientBuilder, Options, ScrapedRecord, ScrapeError, ErrorCode, Site.

//! wtw-scrape - Fetch and extract product data from H&M, Pinterest and Zalando.
//!
//! Each site has its own adapter that locates the product (or pin) in the
//! data the site embeds in its pages and normalizes it into a
//! [`ScrapedRecord`]. All requests go through a per-site [`engine::Engine`]
//! that rate limits, rotates browser sessions, caches results and retries
//! blocks with exponential backoff.
//!
//! # Example
//!
//! ```no_run
//! use wtw_scrape::{Client, ScrapeError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ScrapeError> {
//!     let client = Client::builder().build();
//!     let record = client
//!         .scrape("https://www2.hm.com/de_at/productpage.1315728001.html", None)
//!         .await?;
//!     println!("{}", record.format_text());
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod engine;
pub mod error;
pub mod extractors;
pub mod options;
pub mod record;
pub mod resource;
pub mod sites;

pub use crate::client::Client;
pub use crate::engine::{AntiBlockSignal, CacheStats, TorControlConfig};
pub use crate::error::{ErrorCode, ScrapeError};
pub use crate::options::{ClientBuilder, Options, SiteOptions};
pub use crate::record::ScrapedRecord;
pub use crate::sites::Site;

/// Result type alias for scrape operations.
pub type Result<T> = std::result::Result<T, ScrapeError>;
