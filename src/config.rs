//! Run configuration, loadable from YAML.

use std::ops::RangeInclusive;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{ContextFeatureError, Result};
use crate::types::SENTENCE_BOUNDARY;

/// A closed interval of lengths.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthRange {
    pub min: usize,
    pub max: usize,
}

impl LengthRange {
    pub fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }

    pub fn iter(&self) -> RangeInclusive<usize> {
        self.min..=self.max
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.min > self.max {
            return Err(ContextFeatureError::InvalidConfig(format!(
                "{name}: min ({}) is greater than max ({})",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

impl Default for LengthRange {
    fn default() -> Self {
        Self { min: 1, max: 1 }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub phrase_length: LengthRange,
    pub left_context_length: LengthRange,
    pub right_context_length: LengthRange,
    pub boundary_token: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            phrase_length: LengthRange::default(),
            left_context_length: LengthRange::default(),
            right_context_length: LengthRange::default(),
            boundary_token: SENTENCE_BOUNDARY.to_string(),
        }
    }
}

impl ExtractionConfig {
    pub fn validate(&self) -> Result<()> {
        self.phrase_length.validate("phrase_length")?;
        self.left_context_length.validate("left_context_length")?;
        self.right_context_length.validate("right_context_length")?;
        if self.phrase_length.min == 0 {
            return Err(ContextFeatureError::InvalidConfig(
                "phrase_length: phrases must be at least one token long".to_string(),
            ));
        }
        if self.boundary_token.is_empty() || self.boundary_token.contains(char::is_whitespace) {
            return Err(ContextFeatureError::InvalidConfig(format!(
                "boundary_token {:?} must be a single non-empty token",
                self.boundary_token
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub extraction: ExtractionConfig,
    /// Contexts seen with fewer distinct phrases than this are discarded.
    pub min_context_frequency: usize,
    /// Records held in memory per run of the external sort.
    pub sort_chunk_size: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            extraction: ExtractionConfig::default(),
            min_context_frequency: 3,
            sort_chunk_size: 4_000_000,
        }
    }
}

impl RunConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: RunConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        self.extraction.validate()?;
        if self.sort_chunk_size == 0 {
            return Err(ContextFeatureError::InvalidConfig(
                "sort_chunk_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
