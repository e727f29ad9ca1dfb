//! Error types shared by every stage of the pipeline.

use std::path::PathBuf;

pub type Result<T, E = ContextFeatureError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum ContextFeatureError {
    /// A rule line did not split into the five `|||`-separated fields.
    #[error("malformed rule at line {line}: expected 5 fields separated by ' ||| ', found {fields}")]
    MalformedRuleLine { line: usize, fields: usize },

    /// Annotation of one rule file failed.
    #[error("failed to annotate {path:?}: {source}")]
    RuleFile {
        path: PathBuf,
        #[source]
        source: Box<ContextFeatureError>,
    },

    #[error("vocabulary id {0} is out of range")]
    UnknownId(u32),

    /// Every `u32` id is already assigned.
    #[error("vocabulary is full: cannot assign an id to entry {0}")]
    VocabularyFull(usize),

    #[error("invalid {what}: {msg}")]
    InvalidFormat { what: &'static str, msg: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    PathPersist(#[from] tempfile::PersistError),
}

impl ContextFeatureError {
    pub(crate) fn invalid_format<S: Into<String>>(what: &'static str, msg: S) -> Self {
        Self::InvalidFormat {
            what,
            msg: msg.into(),
        }
    }

    pub(crate) fn in_rule_file(self, path: PathBuf) -> Self {
        Self::RuleFile {
            path,
            source: Box::new(self),
        }
    }
}
