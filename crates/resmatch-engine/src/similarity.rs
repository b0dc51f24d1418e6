//! Text similarity measures, all returning percentages in `0.0..=100.0`.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

static URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://\S+|www\.\S+").expect("static regex"));

static TOKEN_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w\w+\b").expect("static regex"));

/// Drop URLs, lowercase, and collapse whitespace.
pub fn normalize(text: &str) -> String {
    let without_urls = URL_PATTERN.replace_all(text, " ");
    without_urls
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// First `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn tokens(text: &str) -> Vec<String> {
    TOKEN_PATTERN
        .find_iter(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
        .collect()
}

fn term_counts(terms: &[String]) -> HashMap<&str, f64> {
    let mut counts = HashMap::new();
    for t in terms {
        *counts.entry(t.as_str()).or_insert(0.0) += 1.0;
    }
    counts
}

fn cosine(a: &HashMap<&str, f64>, b: &HashMap<&str, f64>) -> f64 {
    let dot: f64 = a
        .iter()
        .filter_map(|(k, va)| b.get(k).map(|vb| va * vb))
        .sum();
    let norm_a = a.values().map(|v| v * v).sum::<f64>().sqrt();
    let norm_b = b.values().map(|v| v * v).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}

/// TF-IDF cosine similarity between two documents, fitted on the pair.
///
/// Uses smoothed idf, `ln((1 + n) / (1 + df)) + 1`, over tokens of two or
/// more word characters.
pub fn tfidf_similarity(a: &str, b: &str) -> f64 {
    let ta = tokens(a);
    let tb = tokens(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }

    let ca = term_counts(&ta);
    let cb = term_counts(&tb);
    let vocab: HashSet<&str> = ca.keys().chain(cb.keys()).copied().collect();

    let n_docs = 2.0_f64;
    let idf: HashMap<&str, f64> = vocab
        .into_iter()
        .map(|term| {
            let df = ca.contains_key(term) as u8 as f64 + cb.contains_key(term) as u8 as f64;
            (term, ((1.0 + n_docs) / (1.0 + df)).ln() + 1.0)
        })
        .collect();

    cosine(&weigh(&ca, &idf), &weigh(&cb, &idf)) * 100.0
}

fn weigh<'a>(
    counts: &HashMap<&'a str, f64>,
    idf: &HashMap<&'a str, f64>,
) -> HashMap<&'a str, f64> {
    counts
        .iter()
        .map(|(term, tf)| (*term, tf * idf.get(term).copied().unwrap_or(1.0)))
        .collect()
}

fn shingles(text: &str, width: usize) -> HashMap<String, f64> {
    let mut counts = HashMap::new();
    for word in text.split_whitespace() {
        let padded: Vec<char> = format!(" {} ", word).chars().collect();
        if padded.len() < width {
            continue;
        }
        for window in padded.windows(width) {
            *counts.entry(window.iter().collect::<String>()).or_insert(0.0) += 1.0;
        }
    }
    counts
}

/// Character-trigram cosine similarity.
///
/// Tolerates inflections and spelling variants ("developer" vs "development")
/// that exact-token TF-IDF misses.
pub fn semantic_similarity(a: &str, b: &str) -> f64 {
    let sa = shingles(&a.to_lowercase(), 3);
    let sb = shingles(&b.to_lowercase(), 3);
    let ra: HashMap<&str, f64> = sa.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    let rb: HashMap<&str, f64> = sb.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    cosine(&ra, &rb) * 100.0
}
