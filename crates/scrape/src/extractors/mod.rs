// ABOUTME: Site-independent payload extraction helpers shared by the site adapters.
// ABOUTME: Covers field fallback chains, JSON tree walking, incremental JSON decoding and script lookup.

//! Payload extraction helpers.
//!
//! Submodules:
//! - `fields`: `pick_first_nonempty` chains, path lookups, ordered URL lists.
//! - `json_scan`: decode one JSON value at an offset.
//! - `script`: locate `__NEXT_DATA__` and JSON-LD script blocks.
//! - `walk`: iterate every object node of a JSON tree.

pub mod fields;
pub mod json_scan;
pub mod script;
pub mod walk;

pub use fields::pick_first_nonempty;
