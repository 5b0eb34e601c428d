//! Trigram fuzzy search.
//!
//! Search fields hold lexeme lists of the form `'token':1,4 'other':2`.
//! Position codes are stripped, the tokens are joined, and the text is
//! scored against the query with trigram similarity (the measure used by
//! PostgreSQL's `pg_trgm`).

use crate::document::Document;
use crate::value::value_text;
use std::collections::HashSet;

/// Minimum similarity for a document to stay in search results.
pub const SIMILARITY_THRESHOLD: f64 = 0.07;

/// Strips lexeme position codes and joins the tokens with spaces.
///
/// Plain text without lexeme markup passes through word by word.
pub fn lexeme_text(raw: &str) -> String {
    raw.split_whitespace()
        .map(strip_positions)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn strip_positions(lexeme: &str) -> &str {
    if let Some(quoted) = lexeme.strip_prefix('\'') {
        return match quoted.find('\'') {
            Some(end) => &quoted[..end],
            None => quoted,
        };
    }

    match lexeme.rsplit_once(':') {
        Some((token, positions))
            if !positions.is_empty()
                && positions
                    .chars()
                    .all(|c| c.is_ascii_digit() || c == ',' || ('A'..='D').contains(&c)) =>
        {
            token
        }
        _ => lexeme,
    }
}

/// Builds the trigram set of a text.
///
/// Each alphanumeric word is lower-cased and padded with two leading
/// blanks and one trailing blank before windows of three are taken.
pub fn trigrams(text: &str) -> HashSet<String> {
    let mut set = HashSet::new();
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let padded: Vec<char> = format!("  {} ", word.to_lowercase()).chars().collect();
        for window in padded.windows(3) {
            set.insert(window.iter().collect());
        }
    }
    set
}

/// Returns the trigram similarity of two texts, in `[0, 1]`.
pub fn trigram_similarity(left: &str, right: &str) -> f64 {
    let a = trigrams(left);
    let b = trigrams(right);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(&b).count();
    let union = a.len() + b.len() - shared;
    shared as f64 / union as f64
}

/// Scores documents on `field`, keeps those at or above the threshold and
/// sorts them by descending score (ties keep their input order).
///
/// Documents without the field have no score and are dropped.
pub(crate) fn rank<D: Document>(docs: Vec<D>, field: &str, query: &str) -> Vec<D> {
    let mut scored: Vec<(f64, D)> = docs
        .into_iter()
        .filter_map(|doc| {
            let text = doc.field(field).and_then(|v| value_text(&v))?;
            let score = trigram_similarity(&lexeme_text(&text), query);
            (score >= SIMILARITY_THRESHOLD).then_some((score, doc))
        })
        .collect();

    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.into_iter().map(|(_, doc)| doc).collect()
}
