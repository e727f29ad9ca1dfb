//! Recognizes the phrase or context a grammar rule side is made of.
//!
//! A side is one of three shapes, tried in this order:
//!
//! * a plain phrase: `le chat`
//! * a phrase between two gaps: `[X,1] le chat [X,2]`
//! * a context around one gap: `le [X,1] noir`
//!
//! Only tuples present in the vocabulary are recognized. For the bracketed form only the
//! inner phrase is used.

use pest::Parser;
use pest_derive::Parser;

use crate::types::{ContextKey, Ngram};
use crate::vocab::Vocabulary;

#[derive(Parser)]
#[grammar = "rule_side.pest"]
struct RuleSideParser;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleSide {
    Phrase(u32),
    Context(ContextKey),
    Unrecognized,
}

impl RuleSide {
    pub fn phrase(&self) -> Option<u32> {
        match self {
            RuleSide::Phrase(id) => Some(*id),
            _ => None,
        }
    }

    pub fn context(&self) -> Option<ContextKey> {
        match self {
            RuleSide::Context(key) => Some(*key),
            _ => None,
        }
    }
}

/// Token spans of `text` when it parses as `rule`.
fn spans(rule: Rule, text: &str) -> Option<Vec<Ngram>> {
    let parsed = RuleSideParser::parse(rule, text).ok()?.next()?;
    let spans = parsed
        .into_inner()
        .filter(|pair| pair.as_rule() == Rule::span)
        .map(|span| {
            let tokens: Vec<&str> = span.into_inner().map(|token| token.as_str()).collect();
            Ngram::from_tokens(&tokens)
        })
        .collect();
    Some(spans)
}

pub fn parse_rule_side(text: &str, vocab: &Vocabulary) -> RuleSide {
    for rule in [Rule::phrase, Rule::bracketed_phrase] {
        if let Some(id) = spans(rule, text)
            .as_deref()
            .and_then(|spans| spans.first())
            .and_then(|phrase| vocab.get(phrase))
        {
            return RuleSide::Phrase(id);
        }
    }
    if let Some([left, right]) = spans(Rule::gapped_context, text).as_deref() {
        if let (Some(left), Some(right)) = (vocab.get(left), vocab.get(right)) {
            return RuleSide::Context(ContextKey { left, right });
        }
    }
    RuleSide::Unrecognized
}
