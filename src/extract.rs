//! Sliding-window extraction of (left context, right context, phrase) records.

use std::io::{BufRead, BufWriter, Write};

use log::{debug, info};

use crate::config::ExtractionConfig;
use crate::errors::Result;
use crate::types::{ContextRecord, Ngram};
use crate::vocab::Vocabulary;

/// How extracted records are written.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// `left_id\tright_id\tphrase_id`, the input of the sort and aggregation stages.
    #[default]
    Ids,
    /// The space-joined texts of the three tuples, for inspection.
    Text,
}

/// One phrase occurrence with its surrounding contexts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Occurrence<'t> {
    pub left: Vec<&'t str>,
    pub right: Vec<&'t str>,
    pub phrase: &'t [&'t str],
}

/// Every occurrence of a `phrase_len` window in `tokens`.
///
/// A context that runs past a sentence edge receives a single boundary token, whatever
/// the shortfall: a left context of length 3 at position 0 is `[boundary]`.
pub fn occurrences<'t>(
    tokens: &'t [&'t str],
    phrase_len: usize,
    left_len: usize,
    right_len: usize,
    boundary: &'t str,
) -> Vec<Occurrence<'t>> {
    if phrase_len == 0 || tokens.len() < phrase_len {
        return Vec::new();
    }
    (0..=tokens.len() - phrase_len)
        .map(|start| {
            let mut left = tokens[start.saturating_sub(left_len)..start].to_vec();
            if left.len() < left_len {
                left.insert(0, boundary);
            }
            let right_start = start + phrase_len;
            let right_end = (right_start + right_len).min(tokens.len());
            let mut right = tokens[right_start..right_end].to_vec();
            if right.len() < right_len {
                right.push(boundary);
            }
            Occurrence {
                left,
                right,
                phrase: &tokens[start..right_start],
            }
        })
        .collect()
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    pub sentences: usize,
    pub records: usize,
}

enum Sink<W: Write> {
    Ids(csv::Writer<W>),
    Text(BufWriter<W>),
}

impl<W: Write> Sink<W> {
    fn new(writer: W, mode: OutputMode) -> Self {
        match mode {
            OutputMode::Ids => Sink::Ids(
                csv::WriterBuilder::new()
                    .delimiter(b'\t')
                    .has_headers(false)
                    .from_writer(writer),
            ),
            OutputMode::Text => Sink::Text(BufWriter::new(writer)),
        }
    }

    fn finish(self) -> Result<()> {
        match self {
            Sink::Ids(mut wtr) => wtr.flush()?,
            Sink::Text(mut wtr) => wtr.flush()?,
        }
        Ok(())
    }
}

/// Extracts context records from one side of a monolingual corpus.
pub struct ContextExtractor<'a> {
    config: &'a ExtractionConfig,
    vocab: &'a mut Vocabulary,
    mode: OutputMode,
}

impl<'a> ContextExtractor<'a> {
    pub fn new(config: &'a ExtractionConfig, vocab: &'a mut Vocabulary) -> Self {
        Self {
            config,
            vocab,
            mode: OutputMode::Ids,
        }
    }

    pub fn with_mode(mut self, mode: OutputMode) -> Self {
        self.mode = mode;
        self
    }

    /// Reads one sentence per line from `reader` and writes a record for every phrase
    /// position and every configured length combination to `writer`.
    pub fn extract<R, W>(&mut self, reader: R, writer: W) -> Result<ExtractionStats>
    where
        R: BufRead,
        W: Write,
    {
        let mut sink = Sink::new(writer, self.mode);
        let mut stats = ExtractionStats::default();
        for line in reader.lines() {
            let line = line?;
            let tokens: Vec<&str> = line.split_whitespace().collect();
            stats.sentences += 1;
            stats.records += self.extract_sentence(&tokens, &mut sink)?;
            if stats.sentences % 1_000_000 == 0 {
                debug!(
                    "{} sentences, {} records, {} vocabulary entries",
                    stats.sentences,
                    stats.records,
                    self.vocab.len()
                );
            }
        }
        sink.finish()?;
        info!(
            "extracted {} records from {} sentences ({} vocabulary entries)",
            stats.records,
            stats.sentences,
            self.vocab.len()
        );
        Ok(stats)
    }

    fn extract_sentence<W: Write>(&mut self, tokens: &[&str], sink: &mut Sink<W>) -> Result<usize> {
        let config = self.config;
        let boundary = config.boundary_token.as_str();
        let mut written = 0;
        for phrase_len in config.phrase_length.iter() {
            for left_len in config.left_context_length.iter() {
                for right_len in config.right_context_length.iter() {
                    for occ in occurrences(tokens, phrase_len, left_len, right_len, boundary) {
                        let left = Ngram::from_tokens(&occ.left);
                        let right = Ngram::from_tokens(&occ.right);
                        let phrase = Ngram::from_tokens(occ.phrase);
                        match &mut *sink {
                            Sink::Ids(wtr) => {
                                let record = ContextRecord::new(
                                    self.vocab.encode(left)?,
                                    self.vocab.encode(right)?,
                                    self.vocab.encode(phrase)?,
                                );
                                wtr.serialize(record)?;
                            }
                            Sink::Text(wtr) => {
                                writeln!(wtr, "{}\t{}\t{}", left, right, phrase)?;
                                self.vocab.encode(left)?;
                                self.vocab.encode(right)?;
                                self.vocab.encode(phrase)?;
                            }
                        }
                        written += 1;
                    }
                }
            }
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LengthRange;

    const B: &str = "<sentence-boundary>";

    fn extract_to_string(config: &ExtractionConfig, vocab: &mut Vocabulary, text: &str, mode: OutputMode) -> String {
        let mut out = Vec::new();
        ContextExtractor::new(config, vocab)
            .with_mode(mode)
            .extract(text.as_bytes(), &mut out)
            .unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn left_context_gets_a_single_boundary_token() {
        let tokens = ["a", "b"];
        let occs = occurrences(&tokens, 1, 3, 1, B);
        assert_eq!(occs[0].left, vec![B]);
        assert_eq!(occs[0].phrase, &["a"]);
        assert_eq!(occs[0].right, vec!["b"]);
        assert_eq!(occs[1].left, vec![B, "a"]);
        assert_eq!(occs[1].right, vec![B]);
    }

    #[test]
    fn right_context_gets_a_single_boundary_token() {
        let tokens = ["a", "b", "c"];
        let occs = occurrences(&tokens, 1, 1, 3, B);
        assert_eq!(occs[0].right, vec!["b", "c", B]);
        assert_eq!(occs[2].right, vec![B]);
    }

    #[test]
    fn phrase_longer_than_sentence_yields_nothing() {
        let tokens = ["a"];
        assert!(occurrences(&tokens, 2, 1, 1, B).is_empty());
        assert!(occurrences(&[], 1, 1, 1, B).is_empty());
    }

    #[test]
    fn one_record_per_position_and_length_combination() {
        let config = ExtractionConfig {
            phrase_length: LengthRange::new(1, 2),
            left_context_length: LengthRange::new(1, 2),
            ..ExtractionConfig::default()
        };
        let mut vocab = Vocabulary::new();
        let out = extract_to_string(&config, &mut vocab, "a b c\n", OutputMode::Ids);
        // p=1: 3 positions, p=2: 2 positions; each for two left lengths
        assert_eq!(out.lines().count(), (3 + 2) * 2);
    }

    #[test]
    fn ids_follow_encoding_order() {
        let config = ExtractionConfig::default();
        let mut vocab = Vocabulary::new();
        let out = extract_to_string(&config, &mut vocab, "a b\n", OutputMode::Ids);
        // (<b>)=0 (b)=1 (a)=2, then (a)=2 (<b>)=0 (b)=1
        assert_eq!(out, "0\t1\t2\n2\t0\t1\n");
        assert_eq!(vocab.len(), 3);
    }

    #[test]
    fn text_mode_writes_tuples() {
        let config = ExtractionConfig {
            left_context_length: LengthRange::new(2, 2),
            ..ExtractionConfig::default()
        };
        let mut vocab = Vocabulary::new();
        let out = extract_to_string(&config, &mut vocab, "le chat noir\n", OutputMode::Text);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], format!("{B}\tchat\tle"));
        assert_eq!(lines[1], format!("{B} le\tnoir\tchat"));
        assert_eq!(lines[2], format!("le chat\t{B}\tnoir"));
        assert!(vocab.get_tokens(&["le", "chat"]).is_some());
    }

    #[test]
    fn blank_lines_produce_no_records() {
        let config = ExtractionConfig::default();
        let mut vocab = Vocabulary::new();
        let out = extract_to_string(&config, &mut vocab, "\n   \n", OutputMode::Ids);
        assert!(out.is_empty());
    }

    #[test]
    fn extraction_is_deterministic() {
        let config = ExtractionConfig {
            phrase_length: LengthRange::new(1, 3),
            right_context_length: LengthRange::new(1, 2),
            ..ExtractionConfig::default()
        };
        let text = "the cat sat on the mat\nthe dog sat\n";
        let first = extract_to_string(&config, &mut Vocabulary::new(), text, OutputMode::Ids);
        let second = extract_to_string(&config, &mut Vocabulary::new(), text, OutputMode::Ids);
        assert_eq!(first, second);
    }
}
