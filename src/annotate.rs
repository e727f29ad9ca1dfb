//! Appends context-based features to grammar rule files.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::ops::AddAssign;
use std::path::Path;

use flate2::read::GzDecoder;
use log::debug;
use tempfile::NamedTempFile;

use crate::aggregate::FeatureMaps;
use crate::errors::{ContextFeatureError, Result};
use crate::rule_side::{parse_rule_side, RuleSide};
use crate::vocab::Vocabulary;

pub const FIELD_SEPARATOR: &str = " ||| ";

/// The five fields of a rule line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuleLine<'a> {
    pub label: &'a str,
    pub source: &'a str,
    pub target: &'a str,
    pub features: String,
    pub alignment: &'a str,
}

impl<'a> RuleLine<'a> {
    /// Splits a line into its fields. `line` is the 1-based line number for errors.
    ///
    /// Fields are trimmed, so an empty feature field written as `||| |||` is accepted.
    pub fn parse(text: &'a str, line: usize) -> Result<Self> {
        // split on the bare separator: `split(" ||| ")` would miss an empty `||| |||` field
        let fields: Vec<&str> = text.trim().split("|||").map(str::trim).collect();
        match fields[..] {
            [label, source, target, features, alignment] => Ok(Self {
                label,
                source,
                target,
                features: features.to_string(),
                alignment,
            }),
            _ => Err(ContextFeatureError::MalformedRuleLine {
                line,
                fields: fields.len(),
            }),
        }
    }

    pub fn to_line(&self) -> String {
        [
            self.label,
            self.source,
            self.target,
            self.features.as_str(),
            self.alignment,
        ]
        .join(FIELD_SEPARATOR)
    }
}

/// Formats a feature value with 12 significant digits, keeping a `.0` on whole numbers:
/// `0.792481250361`, `1.0`, `1e-05`.
pub fn format_value(val: f64) -> String {
    if !val.is_finite() {
        return if val.is_nan() {
            "nan".to_string()
        } else if val > 0.0 {
            "inf".to_string()
        } else {
            "-inf".to_string()
        };
    }
    if val == 0.0 {
        return "0.0".to_string();
    }
    let sci = format!("{:.11e}", val);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((mantissa, exp)) => (mantissa, exp.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };
    if !(-4..12).contains(&exp) {
        let mantissa = trim_fraction(mantissa);
        let sign = if exp < 0 { '-' } else { '+' };
        return format!("{}e{}{:02}", mantissa, sign, exp.abs());
    }
    let fixed = format!("{:.*}", (11 - exp) as usize, val);
    let fixed = trim_fraction(&fixed);
    if fixed.contains('.') {
        fixed.to_string()
    } else {
        format!("{}.0", fixed)
    }
}

fn trim_fraction(digits: &str) -> &str {
    if digits.contains('.') {
        digits.trim_end_matches('0').trim_end_matches('.')
    } else {
        digits
    }
}

/// Feature values looked up for one rule.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RuleFeatures {
    pub src_phrase: f64,
    pub src_context: Option<f64>,
    pub tgt_phrase: f64,
    pub tgt_context: Option<f64>,
}

impl RuleFeatures {
    /// Appends ` NAME=value` for every feature that fires.
    ///
    /// Phrase features are dropped when zero. A context feature is written whenever the
    /// context was found, even when its value is zero. The bilingual products need both
    /// factors non-zero.
    pub fn append_to(&self, features: &mut String) {
        if self.src_phrase != 0.0 {
            let _ = write!(features, " SRC_PHRASE={}", format_value(self.src_phrase));
        }
        if let Some(val) = self.src_context {
            let _ = write!(features, " SRC_CONTEXT={}", format_value(val));
        }
        if self.tgt_phrase != 0.0 {
            let _ = write!(features, " TGT_PHRASE={}", format_value(self.tgt_phrase));
        }
        if let Some(val) = self.tgt_context {
            let _ = write!(features, " TGT_CONTEXT={}", format_value(val));
        }
        if self.tgt_phrase != 0.0 && self.src_phrase != 0.0 {
            let val = self.tgt_phrase * self.src_phrase;
            let _ = write!(features, " BI_PHRASE={}", format_value(val));
        }
        let src_context = self.src_context.unwrap_or(0.0);
        let tgt_context = self.tgt_context.unwrap_or(0.0);
        if tgt_context != 0.0 && src_context != 0.0 {
            let val = tgt_context * src_context;
            let _ = write!(features, " BI_CONTEXT={}", format_value(val));
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AnnotationStats {
    pub rules: usize,
    pub src_phrases: usize,
    pub src_contexts: usize,
    pub tgt_phrases: usize,
    pub tgt_contexts: usize,
}

impl AddAssign for AnnotationStats {
    fn add_assign(&mut self, other: Self) {
        self.rules += other.rules;
        self.src_phrases += other.src_phrases;
        self.src_contexts += other.src_contexts;
        self.tgt_phrases += other.tgt_phrases;
        self.tgt_contexts += other.tgt_contexts;
    }
}

/// Looks rule sides up in the feature maps of both corpora.
///
/// Holds only shared references, so one annotator can serve several threads.
#[derive(Clone, Copy)]
pub struct Annotator<'a> {
    vocab: &'a Vocabulary,
    src: &'a FeatureMaps,
    tgt: &'a FeatureMaps,
}

impl<'a> Annotator<'a> {
    pub fn new(vocab: &'a Vocabulary, src: &'a FeatureMaps, tgt: &'a FeatureMaps) -> Self {
        Self { vocab, src, tgt }
    }

    pub fn features(&self, source: &str, target: &str) -> RuleFeatures {
        let src_side = parse_rule_side(source, self.vocab);
        let tgt_side = parse_rule_side(target, self.vocab);
        RuleFeatures {
            src_phrase: lookup_phrase(self.src, src_side),
            src_context: src_side.context().and_then(|key| self.src.context(key)),
            tgt_phrase: lookup_phrase(self.tgt, tgt_side),
            tgt_context: tgt_side.context().and_then(|key| self.tgt.context(key)),
        }
    }

    /// Annotates every rule of `rdr` into `wtr`. Blank lines are dropped.
    pub fn annotate<R: BufRead, W: Write>(&self, rdr: R, wtr: W) -> Result<AnnotationStats> {
        let mut wtr = BufWriter::new(wtr);
        let mut stats = AnnotationStats::default();
        for (i, line) in rdr.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let mut rule = RuleLine::parse(&line, i + 1)?;
            let features = self.features(rule.source, rule.target);
            features.append_to(&mut rule.features);
            writeln!(wtr, "{}", rule.to_line())?;

            stats.rules += 1;
            stats.src_phrases += usize::from(features.src_phrase != 0.0);
            stats.src_contexts += usize::from(features.src_context.is_some());
            stats.tgt_phrases += usize::from(features.tgt_phrase != 0.0);
            stats.tgt_contexts += usize::from(features.tgt_context.is_some());
        }
        wtr.flush()?;
        Ok(stats)
    }

    /// Annotates the rule file `input` (gzip when it ends in `.gz`) into `output`.
    ///
    /// The output only appears once the whole file is annotated; on error nothing is left
    /// behind at `output`.
    pub fn annotate_file(&self, input: &Path, output: &Path) -> Result<AnnotationStats> {
        let stats = self
            .annotate_into_temp(input, output)
            .map_err(|e| e.in_rule_file(input.to_path_buf()))?;
        debug!("annotated {} rules from {:?} into {:?}", stats.rules, input, output);
        Ok(stats)
    }

    fn annotate_into_temp(&self, input: &Path, output: &Path) -> Result<AnnotationStats> {
        let rdr = open_rules(input)?;
        let dir = match output.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        let stats = self.annotate(rdr, tmp.as_file_mut())?;
        tmp.persist(output)?;
        Ok(stats)
    }
}

fn lookup_phrase(maps: &FeatureMaps, side: RuleSide) -> f64 {
    side.phrase()
        .and_then(|id| maps.phrase(id))
        .unwrap_or(0.0)
}

fn open_rules(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path)?;
    let is_gzip = path.extension().map_or(false, |ext| ext == "gz");
    let rdr: Box<dyn Read> = if is_gzip {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(Box::new(BufReader::new(rdr)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ContextKey;

    struct Fixture {
        vocab: Vocabulary,
        src: FeatureMaps,
        tgt: FeatureMaps,
    }

    fn fixture() -> Fixture {
        let mut vocab = Vocabulary::new();
        let le_chat = vocab.encode_tokens(&["le", "chat"]).unwrap();
        let the_cat = vocab.encode_tokens(&["the", "cat"]).unwrap();
        let le = vocab.encode_tokens(&["le"]).unwrap();
        let noir = vocab.encode_tokens(&["noir"]).unwrap();
        let the = vocab.encode_tokens(&["the"]).unwrap();
        let black = vocab.encode_tokens(&["black"]).unwrap();
        let zero = vocab.encode_tokens(&["rien"]).unwrap();

        let mut src = FeatureMaps::default();
        src.phrases.insert(le_chat, 0.5);
        src.phrases.insert(zero, 0.0);
        src.contexts.insert(ContextKey { left: le, right: noir }, 0.25);
        let mut tgt = FeatureMaps::default();
        tgt.phrases.insert(the_cat, 0.8);
        tgt.contexts.insert(ContextKey { left: the, right: black }, 0.0);
        Fixture { vocab, src, tgt }
    }

    fn annotate(fx: &Fixture, input: &str) -> Result<String> {
        let annotator = Annotator::new(&fx.vocab, &fx.src, &fx.tgt);
        let mut out = Vec::new();
        annotator.annotate(input.as_bytes(), &mut out)?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn phrase_features_and_their_product() {
        let fx = fixture();
        let out = annotate(&fx, "X ||| le chat ||| the cat ||| ||| 0-0 1-1\n").unwrap();
        assert_eq!(
            out,
            "X ||| le chat ||| the cat |||  SRC_PHRASE=0.5 TGT_PHRASE=0.8 BI_PHRASE=0.4 ||| 0-0 1-1\n"
        );
    }

    #[test]
    fn existing_features_are_kept() {
        let fx = fixture();
        let out = annotate(&fx, "[X] ||| le chat ||| dog ||| EgivenF=0.3 ||| 0-0\n").unwrap();
        assert_eq!(out, "[X] ||| le chat ||| dog ||| EgivenF=0.3 SRC_PHRASE=0.5 ||| 0-0\n");
    }

    #[test]
    fn context_features_fire_even_at_zero() {
        let fx = fixture();
        let out = annotate(&fx, "X ||| le [X,1] noir ||| the [X,1] black ||| a=1 ||| 0-0\n").unwrap();
        assert_eq!(
            out,
            "X ||| le [X,1] noir ||| the [X,1] black ||| a=1 SRC_CONTEXT=0.25 TGT_CONTEXT=0.0 ||| 0-0\n"
        );
    }

    #[test]
    fn zero_phrase_feature_is_suppressed() {
        let fx = fixture();
        let features = Annotator::new(&fx.vocab, &fx.src, &fx.tgt).features("rien", "the cat");
        assert_eq!(features.src_phrase, 0.0);
        let mut text = String::new();
        features.append_to(&mut text);
        assert_eq!(text, " TGT_PHRASE=0.8");
    }

    #[test]
    fn bilingual_context_needs_both_sides() {
        let features = RuleFeatures {
            src_context: Some(0.5),
            tgt_context: Some(0.5),
            ..RuleFeatures::default()
        };
        let mut text = String::new();
        features.append_to(&mut text);
        assert_eq!(text, " SRC_CONTEXT=0.5 TGT_CONTEXT=0.5 BI_CONTEXT=0.25");
    }

    #[test]
    fn blank_lines_are_skipped() {
        let fx = fixture();
        let out = annotate(&fx, "\nX ||| a ||| b ||| f=1 ||| 0-0\n\n").unwrap();
        assert_eq!(out, "X ||| a ||| b ||| f=1 ||| 0-0\n");
    }

    #[test]
    fn four_fields_is_fatal() {
        let fx = fixture();
        let err = annotate(&fx, "X ||| a ||| b ||| f=1 ||| 0-0\nX ||| a ||| b ||| 0-0\n").unwrap_err();
        assert!(matches!(
            err,
            ContextFeatureError::MalformedRuleLine { line: 2, fields: 4 }
        ));
    }

    #[test]
    fn failed_file_leaves_no_output() {
        let fx = fixture();
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("rules.txt");
        let output = dir.path().join("out.txt");
        std::fs::write(&input, "X ||| a ||| b\n").unwrap();
        let err = Annotator::new(&fx.vocab, &fx.src, &fx.tgt)
            .annotate_file(&input, &output)
            .unwrap_err();
        assert!(matches!(err, ContextFeatureError::RuleFile { .. }));
        assert!(err.to_string().contains("line 1"));
        assert!(!output.exists());
    }

    #[test]
    fn values_print_with_twelve_significant_digits() {
        assert_eq!(format_value(0.5), "0.5");
        assert_eq!(format_value(1.0), "1.0");
        assert_eq!(format_value(0.0), "0.0");
        assert_eq!(format_value(0.5 * 0.8), "0.4");
        assert_eq!(format_value(3f64.ln() / 4f64.ln()), "0.792481250361");
        assert_eq!(format_value(0.99999999999999), "1.0");
        assert_eq!(format_value(1e-5), "1e-05");
        assert_eq!(format_value(0.0001), "0.0001");
        assert_eq!(format_value(123456789012345.0), "1.23456789012e+14");
        assert_eq!(format_value(f64::INFINITY), "inf");
    }
}
