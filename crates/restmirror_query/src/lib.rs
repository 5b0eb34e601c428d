//! # RestMirror Query
//!
//! In-memory evaluation of REST list queries over cached documents.
//!
//! This crate provides:
//! - `QueryParams`, an ordered string multi-map with allow-list filtering
//! - Query key parsing (`{verb}:{field}.{lookup}`)
//! - Typed lookups with date → number → string coercion
//! - Multi-key ordering, distinct, projection
//! - Trigram fuzzy search over lexeme fields
//! - Local pagination with synthesized `next`/`previous` cursors
//!
//! This is a pure crate with no I/O operations.
//!
//! ## Evaluation Order
//!
//! Stages always run as **filter → search_query → exclude → ordering →
//! distinct**, followed by `only` projection and pagination. Each stage
//! consumes the output of the previous one.
//!
//! ## Example
//!
//! ```rust
//! use restmirror_query::{Query, QueryParams};
//! use serde_json::json;
//!
//! let docs = vec![
//!     json!({"name": "alpha", "size": 3}),
//!     json!({"name": "beta", "size": 12}),
//!     json!({"name": "gamma", "size": 7}),
//! ];
//!
//! let params = QueryParams::new()
//!     .with("filter:size.gte", "5")
//!     .with("ordering", "-size");
//!
//! let page = Query::parse(&params).run(&docs, "/items/", &params);
//! assert_eq!(page.count, 2);
//! assert_eq!(page.results[0]["name"], "beta");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clause;
mod document;
mod engine;
mod page;
mod params;
mod search;
mod value;

pub use clause::{Clause, Lookup, Verb};
pub use document::{lookup_path, Document};
pub use engine::{distinct_by, order_by, Query};
pub use page::{paginate, Page};
pub use params::{QueryParams, LIMIT_KEY, OFFSET_KEY};
pub use search::{lexeme_text, trigram_similarity, trigrams, SIMILARITY_THRESHOLD};
pub use value::{compare_text, parse_date_millis, value_text};
