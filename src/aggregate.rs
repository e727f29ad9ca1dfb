//! Single-pass aggregation of sorted context records into feature values.

use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use log::{debug, info};

use crate::errors::{ContextFeatureError, Result};
use crate::sort::read_records;
use crate::types::{ContextKey, ContextRecord};
use crate::vocab::Vocabulary;

/// All distinct phrases observed in one context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContextGroup {
    pub key: ContextKey,
    pub phrases: BTreeSet<u32>,
}

impl ContextGroup {
    fn new(key: ContextKey, phrase: u32) -> Self {
        let mut phrases = BTreeSet::new();
        phrases.insert(phrase);
        Self { key, phrases }
    }
}

/// Groups consecutive records that share a context key.
///
/// The input must be sorted by key; a key smaller than the current one is reported as
/// an error rather than silently starting a second group for the same context.
pub struct ContextGroups<I> {
    records: I,
    current: Option<ContextGroup>,
}

impl<I> ContextGroups<I>
where
    I: Iterator<Item = Result<ContextRecord>>,
{
    pub fn new(records: I) -> Self {
        Self {
            records,
            current: None,
        }
    }
}

impl<I> Iterator for ContextGroups<I>
where
    I: Iterator<Item = Result<ContextRecord>>,
{
    type Item = Result<ContextGroup>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let record = match self.records.next() {
                Some(Ok(record)) => record,
                Some(Err(e)) => return Some(Err(e)),
                None => return self.current.take().map(Ok),
            };
            let key = record.key();
            if let Some(group) = self.current.as_mut() {
                if group.key == key {
                    group.phrases.insert(record.phrase);
                    continue;
                }
                if key < group.key {
                    return Some(Err(ContextFeatureError::invalid_format(
                        "context records",
                        format!(
                            "input is not sorted: ({}, {}) follows ({}, {})",
                            key.left, key.right, group.key.left, group.key.right
                        ),
                    )));
                }
            }
            if let Some(finished) = self.current.replace(ContextGroup::new(key, record.phrase)) {
                return Some(Ok(finished));
            }
        }
    }
}

/// Feature values for one corpus side.
///
/// Absent entries stand for a value of zero.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeatureMaps {
    pub phrases: HashMap<u32, f64>,
    pub contexts: HashMap<ContextKey, f64>,
}

impl FeatureMaps {
    pub fn phrase(&self, id: u32) -> Option<f64> {
        self.phrases.get(&id).copied()
    }

    pub fn context(&self, key: ContextKey) -> Option<f64> {
        self.contexts.get(&key).copied()
    }
}

/// Computes phrase and context features from sorted, deduplicated records.
///
/// A context kept (at least `min_context_frequency` distinct phrases) is worth
/// `ln(phrases)`, and every phrase in it gains one count. Context values are then
/// divided by the largest context value, and phrase values become
/// `ln(count) / largest context value`. Both use the context maximum.
pub fn aggregate<I>(records: I, min_context_frequency: usize) -> Result<FeatureMaps>
where
    I: Iterator<Item = Result<ContextRecord>>,
{
    let mut maps = FeatureMaps::default();
    let mut counts: HashMap<u32, u64> = HashMap::new();
    let mut max_context_val = 0.0f64;
    let mut max_phrase_count = 0u64;
    let mut groups = 0usize;

    for group in ContextGroups::new(records) {
        let group = group?;
        groups += 1;
        if group.phrases.len() < min_context_frequency {
            continue;
        }
        let context_val = (group.phrases.len() as f64).ln();
        maps.contexts.insert(group.key, context_val);
        max_context_val = max_context_val.max(context_val);
        for phrase in group.phrases {
            let count = counts.entry(phrase).or_insert(0);
            *count += 1;
            max_phrase_count = max_phrase_count.max(*count);
        }
    }

    // all kept contexts hold a single phrase
    let normalizer = if max_context_val > 0.0 {
        max_context_val
    } else {
        1.0
    };
    for val in maps.contexts.values_mut() {
        *val /= normalizer;
    }
    maps.phrases = counts
        .into_iter()
        .map(|(phrase, count)| (phrase, (count as f64).ln() / normalizer))
        .collect();

    info!(
        "kept {} of {} contexts, {} phrases",
        maps.contexts.len(),
        groups,
        maps.phrases.len()
    );
    debug!(
        "max context value {}, max phrase count {}",
        max_context_val, max_phrase_count
    );
    Ok(maps)
}

pub fn aggregate_file(path: &Path, min_context_frequency: usize) -> Result<FeatureMaps> {
    let rdr = BufReader::new(File::open(path)?);
    aggregate(read_records(rdr), min_context_frequency)
}

/// Writes every record of the frequent contexts as `LEFT <0> RIGHT [[ PHRASE_ID ]]`,
/// with the contexts decoded back to text.
pub fn write_frequent_contexts<I, W>(
    records: I,
    vocab: &Vocabulary,
    min_context_frequency: usize,
    wtr: W,
) -> Result<usize>
where
    I: Iterator<Item = Result<ContextRecord>>,
    W: Write,
{
    let mut wtr = BufWriter::new(wtr);
    let mut written = 0;
    for group in ContextGroups::new(records) {
        let group = group?;
        if group.phrases.len() < min_context_frequency {
            continue;
        }
        let left = vocab.decode(group.key.left)?;
        let right = vocab.decode(group.key.right)?;
        for phrase in &group.phrases {
            writeln!(wtr, "{} <0> {} [[ {} ]]", left, right, phrase)?;
            written += 1;
        }
    }
    wtr.flush()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(triples: &[(u32, u32, u32)]) -> impl Iterator<Item = Result<ContextRecord>> + '_ {
        triples
            .iter()
            .map(|&(l, r, p)| Ok(ContextRecord::new(l, r, p)))
    }

    fn key(left: u32, right: u32) -> ContextKey {
        ContextKey { left, right }
    }

    #[test]
    fn groups_follow_key_changes() {
        let groups: Vec<ContextGroup> =
            ContextGroups::new(records(&[(1, 1, 10), (1, 1, 11), (1, 2, 10), (3, 0, 4)]))
                .collect::<Result<_>>()
                .unwrap();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].key, key(1, 1));
        assert_eq!(groups[0].phrases.iter().copied().collect::<Vec<_>>(), vec![10, 11]);
        assert_eq!(groups[2].key, key(3, 0));
    }

    #[test]
    fn unsorted_input_is_rejected() {
        let result: Result<Vec<ContextGroup>> =
            ContextGroups::new(records(&[(2, 2, 1), (1, 1, 1)])).collect();
        assert!(matches!(result, Err(ContextFeatureError::InvalidFormat { .. })));
    }

    #[test]
    fn rare_contexts_are_discarded() {
        let maps = aggregate(records(&[(1, 1, 10), (1, 1, 11), (2, 2, 20)]), 2).unwrap();
        assert_eq!(maps.contexts.len(), 1);
        assert_eq!(maps.context(key(1, 1)), Some(1.0));
        assert_eq!(maps.context(key(2, 2)), None);
        assert_eq!(maps.phrase(20), None);
        // one kept context each: ln(1) = 0
        assert_eq!(maps.phrase(10), Some(0.0));
        assert_eq!(maps.phrase(11), Some(0.0));
    }

    #[test]
    fn phrases_are_normalized_by_the_context_maximum() {
        // (1,1) has 4 phrases, (2,2) has 2, (3,3) has 2; phrase 10 is in all three
        let maps = aggregate(
            records(&[
                (1, 1, 10),
                (1, 1, 11),
                (1, 1, 12),
                (1, 1, 13),
                (2, 2, 10),
                (2, 2, 11),
                (3, 3, 10),
                (3, 3, 14),
            ]),
            2,
        )
        .unwrap();
        let max = 4f64.ln();
        assert_eq!(maps.context(key(1, 1)), Some(1.0));
        assert!((maps.context(key(2, 2)).unwrap() - 2f64.ln() / max).abs() < 1e-12);
        assert!((maps.phrase(10).unwrap() - 3f64.ln() / max).abs() < 1e-12);
        assert!((maps.phrase(11).unwrap() - 2f64.ln() / max).abs() < 1e-12);
        assert_eq!(maps.phrase(13), Some(0.0));
    }

    #[test]
    fn single_phrase_contexts_do_not_divide_by_zero() {
        let maps = aggregate(records(&[(1, 1, 10), (2, 2, 10)]), 1).unwrap();
        assert_eq!(maps.context(key(1, 1)), Some(0.0));
        assert!((maps.phrase(10).unwrap() - 2f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn empty_input_gives_empty_maps() {
        let maps = aggregate(records(&[]), 3).unwrap();
        assert!(maps.phrases.is_empty());
        assert!(maps.contexts.is_empty());
    }

    #[test]
    fn frequent_contexts_are_written_as_text() {
        let mut vocab = Vocabulary::new();
        let the = vocab.encode_tokens(&["the"]).unwrap();
        let sat = vocab.encode_tokens(&["sat"]).unwrap();
        let cat = vocab.encode_tokens(&["cat"]).unwrap();
        let dog = vocab.encode_tokens(&["dog"]).unwrap();
        let input = [(the, sat, cat), (the, sat, dog), (sat, the, cat)];
        let mut out = Vec::new();
        let n = write_frequent_contexts(records(&input), &vocab, 2, &mut out).unwrap();
        assert_eq!(n, 2);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            format!("the <0> sat [[ {cat} ]]\nthe <0> sat [[ {dog} ]]\n")
        );
    }
}
