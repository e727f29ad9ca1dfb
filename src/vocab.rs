//! Dense ids for phrases and contexts.

use std::collections::HashMap;

use crate::errors::{ContextFeatureError, Result};
use crate::types::Ngram;

/// Bijection between token tuples and dense integer ids.
///
/// Ids are handed out in first-seen order and never reused. One vocabulary is shared by
/// the source and target corpora of a run, so both sides live in the same id space.
#[derive(Debug, Default)]
pub struct Vocabulary {
    encoder: HashMap<Ngram, u32>,
    decoder: Vec<Ngram>,
}

impl Vocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id of `ngram`, assigning the next free id if it was never seen.
    ///
    /// Fails once every `u32` id is taken.
    pub fn encode(&mut self, ngram: Ngram) -> Result<u32> {
        if let Some(&id) = self.encoder.get(&ngram) {
            return Ok(id);
        }
        let id = next_id(self.decoder.len())?;
        self.decoder.push(ngram.clone());
        self.encoder.insert(ngram, id);
        debug_assert_eq!(self.encoder.len(), self.decoder.len());
        Ok(id)
    }

    pub fn encode_tokens<S: AsRef<str>>(&mut self, tokens: &[S]) -> Result<u32> {
        self.encode(Ngram::from_tokens(tokens))
    }

    /// Looks a tuple up without inserting it.
    pub fn get(&self, ngram: &Ngram) -> Option<u32> {
        self.encoder.get(ngram).copied()
    }

    pub fn get_tokens<S: AsRef<str>>(&self, tokens: &[S]) -> Option<u32> {
        self.get(&Ngram::from_tokens(tokens))
    }

    pub fn decode(&self, id: u32) -> Result<&Ngram> {
        self.decoder
            .get(id as usize)
            .ok_or(ContextFeatureError::UnknownId(id))
    }

    pub fn len(&self) -> usize {
        self.decoder.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoder.is_empty()
    }
}

fn next_id(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| ContextFeatureError::VocabularyFull(len))
}
