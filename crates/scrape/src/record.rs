// ABOUTME: ScrapedRecord struct holding the normalized fields extracted for one product or pin.
// ABOUTME: Includes a plain-text listing used by the CLI and small convenience accessors.

use serde::{Deserialize, Serialize};

/// The normalized result of one successful scrape.
///
/// Every adapter fills the subset of fields its site exposes. Fields a site
/// does not provide stay empty (`""` or `[]`), never absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ScrapedRecord {
    /// Site-specific code: H&M article code, Pinterest pin id, Zalando SKU.
    pub identifier: String,
    pub url: String,
    pub name: String,
    pub description: String,
    pub post_name: String,
    /// Image URLs, deduplicated, in first-seen order.
    pub images: Vec<String>,
    pub price: String,
    pub sizes: Vec<String>,
    pub colors: Vec<String>,
    pub brand: String,
    pub category: String,
}

impl ScrapedRecord {
    /// The first image URL, or `""` when the record has none.
    pub fn image_url(&self) -> &str {
        self.images.first().map(String::as_str).unwrap_or("")
    }

    /// Format the record as a human-readable listing.
    pub fn format_text(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Name: {}", self.name));
        lines.push(format!("Identifier: {}", self.identifier));
        if !self.post_name.is_empty() {
            lines.push(format!("Post name: {}", self.post_name));
        }
        if !self.description.is_empty() {
            lines.push(format!("Description: {}", self.description));
        }
        if !self.brand.is_empty() {
            lines.push(format!("Brand: {}", self.brand));
        }
        if !self.category.is_empty() {
            lines.push(format!("Category: {}", self.category));
        }
        if !self.price.is_empty() {
            lines.push(format!("Price: {}", self.price));
        }
        if !self.colors.is_empty() {
            lines.push(format!("Colors: {}", self.colors.join(", ")));
        }
        if !self.sizes.is_empty() {
            lines.push(format!("Sizes: {}", self.sizes.join(", ")));
        }
        if !self.url.is_empty() {
            lines.push(format!("URL: {}", self.url));
        }
        lines.push("Images:".to_string());
        for image in &self.images {
            lines.push(format!("  - {}", image));
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_url_is_first_image() {
        let record = ScrapedRecord {
            images: vec!["https://a/1.jpg".to_string(), "https://a/2.jpg".to_string()],
            ..Default::default()
        };
        assert_eq!(record.image_url(), "https://a/1.jpg");
        assert_eq!(ScrapedRecord::default().image_url(), "");
    }

    #[test]
    fn format_text_skips_empty_fields() {
        let record = ScrapedRecord {
            identifier: "1315728001".to_string(),
            name: "Oversized Shirt".to_string(),
            price: "€ 29,99".to_string(),
            colors: vec!["Black".to_string(), "White".to_string()],
            images: vec!["https://img/1.jpg".to_string()],
            ..Default::default()
        };

        let text = record.format_text();
        assert!(text.starts_with("Name: Oversized Shirt\nIdentifier: 1315728001"));
        assert!(text.contains("Price: € 29,99"));
        assert!(text.contains("Colors: Black, White"));
        assert!(!text.contains("Sizes:"));
        assert!(!text.contains("Brand:"));
        assert!(text.ends_with("Images:\n  - https://img/1.jpg"));
    }

    #[test]
    fn empty_fields_serialize_as_empty_not_null() {
        let json = serde_json::to_value(ScrapedRecord::default()).unwrap();
        assert_eq!(json["price"], "");
        assert_eq!(json["images"], serde_json::json!([]));
    }
}
