//! Monolingual context-based features for synchronous grammar rules.
//!
//! Phrases of a monolingual corpus are tabulated against the contexts they occur in.
//! Contexts that host many distinct phrases and phrases that occur in many frequent
//! contexts receive feature values, which are then appended to the rules of a grammar.
//!
//! The stages, in order:
//!
//! 1. [`extract`]: write a (left context, right context, phrase) record for every
//!    phrase position, encoding tuples with a shared [`Vocabulary`].
//! 2. [`sort`]: sort and deduplicate the records.
//! 3. [`aggregate`]: compute the phrase and context [`FeatureMaps`] of one corpus.
//! 4. [`annotate`]: append the features of both corpora to every rule.
//!
//! [`pipeline`] runs all of them for a source and a target corpus.

pub mod aggregate;
pub mod annotate;
pub mod config;
pub mod errors;
pub mod extract;
pub mod pipeline;
pub mod rule_side;
pub mod sort;
pub mod types;
pub mod vocab;

pub use aggregate::{aggregate, FeatureMaps};
pub use annotate::{AnnotationStats, Annotator};
pub use config::{ExtractionConfig, LengthRange, RunConfig};
pub use errors::{ContextFeatureError, Result};
pub use extract::{ContextExtractor, OutputMode};
pub use pipeline::{annotate_directory, ContextFeatures, Pipeline};
pub use rule_side::{parse_rule_side, RuleSide};
pub use sort::ExternalSorter;
pub use types::{ContextKey, ContextRecord, Ngram, Side};
pub use vocab::Vocabulary;
