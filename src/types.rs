use std::fmt;

use serde::{Deserialize, Serialize};

/// Token used in place of context positions that fall outside a sentence.
pub const SENTENCE_BOUNDARY: &str = "<sentence-boundary>";

/// An ordered tuple of tokens: a phrase or a context.
///
/// Tokens never contain whitespace, so the tuple is stored as its tokens joined by a
/// single space. Two tuples are equal exactly when their joined forms are.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ngram(String);

impl Ngram {
    pub fn from_tokens<S: AsRef<str>>(tokens: &[S]) -> Self {
        let mut joined = String::new();
        for (i, token) in tokens.iter().enumerate() {
            if i > 0 {
                joined.push(' ');
            }
            joined.push_str(token.as_ref());
        }
        Ngram(joined)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.0.split(' ').filter(|t| !t.is_empty())
    }

    pub fn len(&self) -> usize {
        self.tokens().count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Ngram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The (left context, right context) pair a phrase occurrence sits in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextKey {
    pub left: u32,
    pub right: u32,
}

/// One observed occurrence of a phrase in a context.
///
/// Field order defines the sort order used by the external sort and the aggregator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextRecord {
    pub left: u32,
    pub right: u32,
    pub phrase: u32,
}

impl ContextRecord {
    pub fn new(left: u32, right: u32, phrase: u32) -> Self {
        Self { left, right, phrase }
    }

    pub fn key(&self) -> ContextKey {
        ContextKey {
            left: self.left,
            right: self.right,
        }
    }
}

/// Which monolingual corpus a stage is working on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    Source,
    Target,
}

impl Side {
    pub fn name(&self) -> &'static str {
        match self {
            Side::Source => "src",
            Side::Target => "tgt",
        }
    }
}
