use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::dataset::SentenceRecord;

/// Micro-averaged precision, recall and F1 with the pooled counts behind them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Prf {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub matched: usize,
    pub predicted: usize,
    pub gold: usize,
}

impl Prf {
    pub fn from_counts(matched: usize, predicted: usize, gold: usize) -> Self {
        let precision = ratio(matched, predicted);
        let recall = ratio(matched, gold);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            precision,
            recall,
            f1,
            matched,
            predicted,
            gold,
        }
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[derive(Default)]
struct Counts {
    matched: usize,
    predicted: usize,
    gold: usize,
}

/// `(name, type)` pairs of one sentence as a set. Duplicates collapse.
fn pair_set<'a>(
    pairs: impl Iterator<Item = (&'a str, &'a str)>,
    only_type: Option<&str>,
) -> HashSet<(&'a str, &'a str)> {
    pairs
        .filter(|(_, entity_type)| only_type.is_none_or(|t| *entity_type == t))
        .collect()
}

fn count(records: &[SentenceRecord], only_type: Option<&str>) -> Counts {
    let mut counts = Counts::default();
    for record in records {
        let gold = pair_set(
            record
                .entities
                .iter()
                .map(|e| (e.name.as_str(), e.entity_type.as_str())),
            only_type,
        );
        let predicted = pair_set(
            record
                .predicts
                .iter()
                .map(|e| (e.name.as_str(), e.entity_type.as_str())),
            only_type,
        );

        counts.matched += gold.intersection(&predicted).count();
        counts.predicted += predicted.len();
        counts.gold += gold.len();
    }
    counts
}

/// Corpus-level micro P/R/F1 over `(name, type)` pairs.
pub fn score(records: &[SentenceRecord]) -> Prf {
    let counts = count(records, None);
    Prf::from_counts(counts.matched, counts.predicted, counts.gold)
}

/// The same pooled scores restricted to each type seen in gold or predictions.
pub fn score_by_type(records: &[SentenceRecord]) -> BTreeMap<String, Prf> {
    let types: std::collections::BTreeSet<&str> = records
        .iter()
        .flat_map(|r| {
            r.entities
                .iter()
                .map(|e| e.entity_type.as_str())
                .chain(r.predicts.iter().map(|e| e.entity_type.as_str()))
        })
        .collect();

    types
        .into_iter()
        .map(|t| {
            let counts = count(records, Some(t));
            (
                t.to_string(),
                Prf::from_counts(counts.matched, counts.predicted, counts.gold),
            )
        })
        .collect()
}
