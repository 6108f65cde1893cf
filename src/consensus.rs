//! Consensus / uniqueness analysis over completed model responses.
//!
//! Lexical heuristics only: key points are period-split sentence fragments,
//! "common" words are counted by raw frequency, and uniqueness is word-set
//! overlap. No stemming, no synonyms; ties resolve in first-seen order.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::error::ChorusError;

/// At most this many key points are extracted per response.
pub const MAX_POINTS_PER_RESPONSE: usize = 5;
/// Fragments shorter than this many characters are discarded.
pub const MIN_POINT_CHARS: usize = 20;
/// At most this many consensus statements are reported.
pub const MAX_CONSENSUS_POINTS: usize = 3;
/// At most this many unique statements are reported per model.
pub const MAX_UNIQUE_POINTS: usize = 2;
/// Only words longer than 4 characters participate in the heuristics.
pub const MIN_WORD_CHARS: usize = 5;
/// A point whose overlap with any other model's point exceeds this is not unique.
pub const UNIQUE_OVERLAP_CEILING: f64 = 0.5;

/// One completed model response.
#[derive(Debug, Clone, Serialize)]
pub struct ModelResponse {
    pub model: String,
    pub text: String,
}

impl ModelResponse {
    pub fn new(model: impl Into<String>, text: impl Into<String>) -> Self {
        ModelResponse { model: model.into(), text: text.into() }
    }
}

/// Shared and distinctive statements across the responses.
///
/// Immutable once computed; per-model lists keep first-seen order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConsensusReport {
    pub consensus: Vec<String>,
    pub unique: HashMap<String, Vec<String>>,
}

/// Extract up to five key points from one response: newlines flattened,
/// split on sentence-ending periods, trimmed, short fragments dropped.
pub fn extract_key_points(text: &str) -> Vec<String> {
    let flat = text.replace(['\n', '\r'], " ");
    flat.split('.')
        .map(str::trim)
        .filter(|fragment| fragment.chars().count() >= MIN_POINT_CHARS)
        .take(MAX_POINTS_PER_RESPONSE)
        .map(str::to_string)
        .collect()
}

/// Analyze the successful responses.
///
/// Zero responses is an overall error — all-failure is distinguished from
/// partial success with an empty consensus. With a single response the
/// consensus list is empty by definition.
pub fn analyze(responses: &[ModelResponse]) -> Result<ConsensusReport, ChorusError> {
    if responses.is_empty() {
        return Err(ChorusError::AllModelsFailed);
    }

    let points: Vec<Vec<String>> = responses
        .iter()
        .map(|r| extract_key_points(&r.text))
        .collect();

    // Global frequency of significant words, counting every occurrence.
    let mut freq: HashMap<String, usize> = HashMap::new();
    for model_points in &points {
        for point in model_points {
            for word in significant_word_iter(point) {
                *freq.entry(word).or_insert(0) += 1;
            }
        }
    }
    let threshold = responses.len() as f64 / 2.0;
    let common: HashSet<&String> = freq
        .iter()
        .filter(|(_, count)| **count as f64 >= threshold)
        .map(|(word, _)| word)
        .collect();

    let mut report = ConsensusReport::default();

    if responses.len() >= 2 {
        let mut seen: HashSet<&str> = HashSet::new();
        'collect: for model_points in &points {
            for point in model_points {
                if report.consensus.len() >= MAX_CONSENSUS_POINTS {
                    break 'collect;
                }
                if seen.contains(point.as_str()) {
                    continue;
                }
                let shares_common = significant_word_iter(point)
                    .any(|word| common.contains(&word));
                if shares_common {
                    seen.insert(point);
                    report.consensus.push(point.clone());
                }
            }
        }
    }

    for (i, response) in responses.iter().enumerate() {
        let mut mine = Vec::new();
        for point in &points[i] {
            if mine.len() >= MAX_UNIQUE_POINTS {
                break;
            }
            let words = significant_words(point);
            let overlaps_other = points
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .flat_map(|(_, other)| other.iter())
                .any(|other_point| {
                    word_overlap(&words, &significant_words(other_point))
                        > UNIQUE_OVERLAP_CEILING
                });
            if !overlaps_other {
                mine.push(point.clone());
            }
        }
        report.unique.insert(response.model.clone(), mine);
    }

    Ok(report)
}

/// Overlap ratio between two word sets: `|intersection| / max(|a|, |b|)`.
fn word_overlap(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let denom = a.len().max(b.len());
    if denom == 0 {
        return 0.0;
    }
    let inter = a.intersection(b).count();
    inter as f64 / denom as f64
}

fn significant_word_iter(point: &str) -> impl Iterator<Item = String> + '_ {
    point
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= MIN_WORD_CHARS)
        .map(|w| w.to_lowercase())
}

fn significant_words(point: &str) -> HashSet<String> {
    significant_word_iter(point).collect()
}
