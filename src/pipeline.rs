//! Drives extraction, sorting, aggregation and annotation for a whole run.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use log::{info, warn};
use rayon::prelude::*;

use crate::aggregate::{aggregate_file, write_frequent_contexts, FeatureMaps};
use crate::annotate::{AnnotationStats, Annotator};
use crate::config::RunConfig;
use crate::errors::{ContextFeatureError, Result};
use crate::extract::ContextExtractor;
use crate::sort::{read_records, ExternalSorter};
use crate::types::Side;
use crate::vocab::Vocabulary;

/// Everything the annotator needs: the vocabulary built during extraction and the
/// feature maps of both corpora.
#[derive(Debug, Default)]
pub struct ContextFeatures {
    pub vocab: Vocabulary,
    pub src: FeatureMaps,
    pub tgt: FeatureMaps,
}

impl ContextFeatures {
    pub fn annotator(&self) -> Annotator<'_> {
        Annotator::new(&self.vocab, &self.src, &self.tgt)
    }
}

pub struct Pipeline {
    config: RunConfig,
    work_dir: PathBuf,
    write_frequent: bool,
}

impl Pipeline {
    /// Intermediate context files are written to `work_dir`.
    pub fn new<P: Into<PathBuf>>(config: RunConfig, work_dir: P) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            work_dir: work_dir.into(),
            write_frequent: false,
        })
    }

    /// Also write `<side>.contexts.frequent` for every corpus side.
    pub fn write_frequent_contexts(mut self, yes: bool) -> Self {
        self.write_frequent = yes;
        self
    }

    fn contexts_path(&self, side: Side, suffix: &str) -> PathBuf {
        self.work_dir.join(format!("{}.contexts{}", side.name(), suffix))
    }

    /// Extracts and sorts the contexts of one corpus, returning the sorted file.
    pub fn extract_side(&self, side: Side, corpus: &Path, vocab: &mut Vocabulary) -> Result<PathBuf> {
        let raw = self.contexts_path(side, "");
        info!("extracting {} contexts from {:?}", side.name(), corpus);
        let rdr = BufReader::new(File::open(corpus)?);
        let wtr = BufWriter::new(File::create(&raw)?);
        ContextExtractor::new(&self.config.extraction, vocab).extract(rdr, wtr)?;

        let sorted = self.contexts_path(side, ".sorted");
        ExternalSorter::new(self.config.sort_chunk_size)
            .temp_dir(&self.work_dir)
            .sort_file(&raw, &sorted)?;
        Ok(sorted)
    }

    fn aggregate_side(&self, side: Side, sorted: &Path, vocab: &Vocabulary) -> Result<FeatureMaps> {
        info!("aggregating {} contexts", side.name());
        let m = self.config.min_context_frequency;
        if self.write_frequent {
            let path = self.contexts_path(side, ".frequent");
            let rdr = BufReader::new(File::open(sorted)?);
            let written = write_frequent_contexts(read_records(rdr), vocab, m, File::create(&path)?)?;
            info!("wrote {} frequent context records to {:?}", written, path);
        }
        aggregate_file(sorted, m)
    }

    /// Builds the vocabulary and the four feature maps from both monolingual corpora.
    pub fn build_features(&self, src_corpus: &Path, tgt_corpus: &Path) -> Result<ContextFeatures> {
        fs::create_dir_all(&self.work_dir)?;
        let mut vocab = Vocabulary::new();
        let src_sorted = self.extract_side(Side::Source, src_corpus, &mut vocab)?;
        let tgt_sorted = self.extract_side(Side::Target, tgt_corpus, &mut vocab)?;
        let src = self.aggregate_side(Side::Source, &src_sorted, &vocab)?;
        let tgt = self.aggregate_side(Side::Target, &tgt_sorted, &vocab)?;
        Ok(ContextFeatures { vocab, src, tgt })
    }
}

/// Regular files of `dir`, in name order.
pub fn rule_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        } else {
            warn!("skipping {:?}: not a regular file", path);
        }
    }
    files.sort();
    Ok(files)
}

/// Output name for a rule file: the input name without a trailing `.gz`.
pub fn output_file_name(input: &Path) -> PathBuf {
    match (input.extension(), input.file_stem()) {
        (Some(ext), Some(stem)) if ext == "gz" => PathBuf::from(stem),
        _ => input.file_name().map(PathBuf::from).unwrap_or_default(),
    }
}

/// Pairs every input with its output path, refusing two inputs that map to the same
/// output such as `grammar` and `grammar.gz`.
fn output_paths(files: Vec<PathBuf>, output_dir: &Path) -> Result<Vec<(PathBuf, PathBuf)>> {
    let mut claimed: HashMap<PathBuf, PathBuf> = HashMap::new();
    let mut pairs = Vec::with_capacity(files.len());
    for input in files {
        let output = output_dir.join(output_file_name(&input));
        if let Some(other) = claimed.insert(output.clone(), input.clone()) {
            return Err(ContextFeatureError::InvalidConfig(format!(
                "{:?} and {:?} would both be written to {:?}",
                other, input, output
            )));
        }
        pairs.push((input, output));
    }
    Ok(pairs)
}

/// Annotates every rule file of `input_dir` into `output_dir`.
///
/// Files are processed in parallel on `threads` workers (0 picks the rayon default). A
/// file that fails aborts the run; outputs already produced for other files are kept.
/// Inputs that would share an output name are rejected before anything is written.
pub fn annotate_directory(
    features: &ContextFeatures,
    input_dir: &Path,
    output_dir: &Path,
    threads: usize,
) -> Result<AnnotationStats> {
    let files = output_paths(rule_files(input_dir)?, output_dir)?;
    info!("annotating {} rule files from {:?}", files.len(), input_dir);
    fs::create_dir_all(output_dir)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| ContextFeatureError::InvalidConfig(e.to_string()))?;
    let annotator = features.annotator();
    let per_file: Vec<AnnotationStats> = pool.install(|| {
        files
            .par_iter()
            .map(|(input, output)| -> Result<AnnotationStats> {
                let stats = annotator.annotate_file(input, output)?;
                info!("produced {:?} ({} rules)", output, stats.rules);
                Ok(stats)
            })
            .collect::<Result<Vec<_>>>()
    })?;

    let mut total = AnnotationStats::default();
    for stats in per_file {
        total += stats;
    }
    info!(
        "annotated {} rules: {} src phrases, {} src contexts, {} tgt phrases, {} tgt contexts",
        total.rules, total.src_phrases, total.src_contexts, total.tgt_phrases, total.tgt_contexts
    );
    Ok(total)
}
