// ABOUTME: Locates inline script payloads in HTML using the scraper parser.
// ABOUTME: Finds the __NEXT_DATA__ blob and every application/ld+json block.

use scraper::{Html, Selector};

/// Raw text of `<script id="__NEXT_DATA__">`, if present and non-blank.
pub fn next_data(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let selector = Selector::parse("script#__NEXT_DATA__").ok()?;
    doc.select(&selector)
        .map(|script| script.text().collect::<String>())
        .find(|text| !text.trim().is_empty())
}

/// Raw text of every non-blank `<script type="application/ld+json">` block, in document order.
///
/// The type attribute is compared case-insensitively.
pub fn ld_json_blocks(html: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let selector = match Selector::parse("script[type]") {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };

    doc.select(&selector)
        .filter(|script| {
            script
                .value()
                .attr("type")
                .is_some_and(|t| t.trim().eq_ignore_ascii_case("application/ld+json"))
        })
        .map(|script| script.text().collect::<String>())
        .filter(|text| !text.trim().is_empty())
        .collect()
}
