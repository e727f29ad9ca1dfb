//! Adds monolingual context-based features to a directory of grammar rule files.
//!
//! Both monolingual corpora are scanned for (left context, right context, phrase)
//! occurrences, the occurrences are sorted and summarized into phrase and context
//! features, and every rule file of the input directory is written to the output
//! directory with those features appended.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use context_features::pipeline::{annotate_directory, Pipeline};
use context_features::{LengthRange, RunConfig};
use env_logger::Env;
use log::{info, LevelFilter};

#[derive(Parser)]
#[command(
    name = "context-features",
    about = "Annotate grammar rules with monolingual context-based features",
    long_about = "Extracts phrase/context co-occurrences from a source and a target\n\
                  monolingual corpus, scores contexts by how many distinct phrases they\n\
                  host and phrases by how many frequent contexts they occur in, and\n\
                  appends SRC_/TGT_/BI_ PHRASE and CONTEXT features to every rule file\n\
                  of the input directory."
)]
struct Args {
    /// Source-side monolingual corpus, one tokenized sentence per line
    #[arg(short = 's', long = "src-monolingual", required = true)]
    src_monolingual: PathBuf,

    /// Target-side monolingual corpus, one tokenized sentence per line
    #[arg(short = 't', long = "tgt-monolingual", required = true)]
    tgt_monolingual: PathBuf,

    /// Directory of (gzipped) rule files to annotate
    #[arg(short = 'i', long = "input-rules-dir", required = true)]
    input_rules_dir: PathBuf,

    /// Directory the annotated rule files are written to (created if missing)
    #[arg(short = 'o', long = "output-rules-dir", required = true)]
    output_rules_dir: PathBuf,

    /// YAML run configuration; length and frequency flags below override it
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Minimum phrase length (default: 1)
    #[arg(long = "min-phrase-length")]
    min_phrase_length: Option<usize>,

    /// Maximum phrase length (default: 1)
    #[arg(long = "max-phrase-length")]
    max_phrase_length: Option<usize>,

    /// Minimum left context length (default: 1)
    #[arg(long = "min-left-context-length")]
    min_left_context_length: Option<usize>,

    /// Maximum left context length (default: 1)
    #[arg(long = "max-left-context-length")]
    max_left_context_length: Option<usize>,

    /// Minimum right context length (default: 1)
    #[arg(long = "min-right-context-length")]
    min_right_context_length: Option<usize>,

    /// Maximum right context length (default: 1)
    #[arg(long = "max-right-context-length")]
    max_right_context_length: Option<usize>,

    /// Contexts seen with fewer distinct phrases are ignored (default: 3)
    #[arg(short = 'f', long = "min-context-frequency")]
    min_context_frequency: Option<usize>,

    /// Records kept in memory per sorted run
    #[arg(long = "sort-chunk-size")]
    sort_chunk_size: Option<usize>,

    /// Keep intermediate context files here instead of a temporary directory
    #[arg(short = 'w', long = "work-dir")]
    work_dir: Option<PathBuf>,

    /// Also write <side>.contexts.frequent into the work directory
    #[arg(long = "frequent-contexts")]
    frequent_contexts: bool,

    /// Number of threads used to annotate rule files (0: one per core)
    #[arg(short = 'j', long = "threads", default_value = "0")]
    threads: usize,

    /// More log output (-v debug, -vv trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Less log output (-q warnings, -qq errors)
    #[arg(short = 'q', long = "quiet", action = clap::ArgAction::Count)]
    quiet: u8,
}

fn init_logging(verbose: u8, quiet: u8) {
    let level = match (quiet, verbose) {
        (1, _) => LevelFilter::Warn,
        (q, _) if q > 1 => LevelFilter::Error,
        (_, 0) => LevelFilter::Info,
        (_, 1) => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    builder.format_timestamp_millis();
    builder.filter_level(level);
    let _ = builder.try_init();
}

fn override_range(range: &mut LengthRange, min: Option<usize>, max: Option<usize>) {
    if let Some(min) = min {
        range.min = min;
    }
    if let Some(max) = max {
        range.max = max;
    }
}

fn load_config(args: &Args) -> anyhow::Result<RunConfig> {
    let mut config = match &args.config {
        Some(path) => RunConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load configuration: {:?}", path))?,
        None => RunConfig::default(),
    };
    let extraction = &mut config.extraction;
    override_range(&mut extraction.phrase_length, args.min_phrase_length, args.max_phrase_length);
    override_range(
        &mut extraction.left_context_length,
        args.min_left_context_length,
        args.max_left_context_length,
    );
    override_range(
        &mut extraction.right_context_length,
        args.min_right_context_length,
        args.max_right_context_length,
    );
    if let Some(m) = args.min_context_frequency {
        config.min_context_frequency = m;
    }
    if let Some(chunk) = args.sort_chunk_size {
        config.sort_chunk_size = chunk;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let config = load_config(&args)?;
    info!("configuration: {:?}", config);

    // keeps the temporary directory alive until the run ends
    let temp_dir;
    let work_dir = match &args.work_dir {
        Some(dir) => dir.clone(),
        None => {
            temp_dir = tempfile::tempdir().context("Failed to create a temporary work directory")?;
            temp_dir.path().to_path_buf()
        }
    };

    let pipeline = Pipeline::new(config, &work_dir)?.write_frequent_contexts(args.frequent_contexts);
    let features = pipeline
        .build_features(&args.src_monolingual, &args.tgt_monolingual)
        .context("Failed to compute context features")?;
    info!(
        "{} vocabulary entries; src: {} phrases, {} contexts; tgt: {} phrases, {} contexts",
        features.vocab.len(),
        features.src.phrases.len(),
        features.src.contexts.len(),
        features.tgt.phrases.len(),
        features.tgt.contexts.len()
    );

    let stats = annotate_directory(
        &features,
        &args.input_rules_dir,
        &args.output_rules_dir,
        args.threads,
    )
    .with_context(|| format!("Failed to annotate rules in {:?}", args.input_rules_dir))?;

    eprintln!(
        "Annotated {} rules into {:?}",
        stats.rules, args.output_rules_dir
    );
    Ok(())
}
