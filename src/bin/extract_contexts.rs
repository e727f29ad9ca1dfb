//! Tool to extract the context records of a single monolingual corpus.
//!
//! Writes one (left context, right context, phrase) record per phrase position, either
//! as vocabulary ids or as text. Id output can additionally be sorted and deduplicated,
//! and the frequent contexts of the sorted records written in readable form.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use context_features::aggregate::write_frequent_contexts;
use context_features::sort::read_records;
use context_features::{
    ContextExtractor, ExternalSorter, LengthRange, OutputMode, RunConfig, Vocabulary,
};
use env_logger::Env;

#[derive(Parser)]
#[command(
    name = "extract-contexts",
    about = "Extract (left context, right context, phrase) records from a corpus"
)]
struct Args {
    /// Monolingual corpus, one tokenized sentence per line
    #[arg(short = 'i', long = "input", required = true)]
    input: PathBuf,

    /// Output context file
    #[arg(short = 'o', long = "output", required = true)]
    output: PathBuf,

    /// Write tuple texts instead of vocabulary ids
    #[arg(long = "text")]
    text: bool,

    /// Also write the sorted, deduplicated records here
    #[arg(long = "sorted")]
    sorted: Option<PathBuf>,

    /// Also write frequent contexts as `LEFT <0> RIGHT [[ PHRASE_ID ]]` (needs --sorted)
    #[arg(long = "frequent")]
    frequent: Option<PathBuf>,

    /// YAML run configuration
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Phrase lengths as MIN:MAX (default: 1:1)
    #[arg(short = 'p', long = "phrase-length", value_parser = parse_range)]
    phrase_length: Option<LengthRange>,

    /// Left context lengths as MIN:MAX (default: 1:1)
    #[arg(short = 'l', long = "left-context-length", value_parser = parse_range)]
    left_context_length: Option<LengthRange>,

    /// Right context lengths as MIN:MAX (default: 1:1)
    #[arg(short = 'r', long = "right-context-length", value_parser = parse_range)]
    right_context_length: Option<LengthRange>,

    /// Contexts seen with fewer distinct phrases are left out of --frequent (default: 3)
    #[arg(short = 'f', long = "min-context-frequency")]
    min_context_frequency: Option<usize>,
}

fn parse_range(s: &str) -> Result<LengthRange, String> {
    let (min, max) = match s.split_once(':') {
        Some((min, max)) => (min, max),
        None => (s, s),
    };
    let min = min.trim().parse().map_err(|e| format!("bad minimum {:?}: {}", min, e))?;
    let max = max.trim().parse().map_err(|e| format!("bad maximum {:?}: {}", max, e))?;
    Ok(LengthRange::new(min, max))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => RunConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load configuration: {:?}", path))?,
        None => RunConfig::default(),
    };
    if let Some(range) = args.phrase_length {
        config.extraction.phrase_length = range;
    }
    if let Some(range) = args.left_context_length {
        config.extraction.left_context_length = range;
    }
    if let Some(range) = args.right_context_length {
        config.extraction.right_context_length = range;
    }
    if let Some(m) = args.min_context_frequency {
        config.min_context_frequency = m;
    }
    config.validate().context("Invalid configuration")?;
    if args.text && args.sorted.is_some() {
        bail!("--sorted needs id output; drop --text");
    }
    if args.frequent.is_some() && args.sorted.is_none() {
        bail!("--frequent needs --sorted");
    }

    let mode = if args.text { OutputMode::Text } else { OutputMode::Ids };
    let mut vocab = Vocabulary::new();
    let rdr = BufReader::new(
        File::open(&args.input).with_context(|| format!("Failed to open corpus: {:?}", args.input))?,
    );
    let wtr = BufWriter::new(
        File::create(&args.output)
            .with_context(|| format!("Failed to create output: {:?}", args.output))?,
    );
    let stats = ContextExtractor::new(&config.extraction, &mut vocab)
        .with_mode(mode)
        .extract(rdr, wtr)
        .with_context(|| format!("Failed to extract contexts from {:?}", args.input))?;
    eprintln!(
        "Wrote {} records for {} sentences to {:?}",
        stats.records, stats.sentences, args.output
    );

    if let Some(sorted) = &args.sorted {
        let unique = ExternalSorter::new(config.sort_chunk_size)
            .sort_file(&args.output, sorted)
            .with_context(|| format!("Failed to sort {:?}", args.output))?;
        eprintln!("Wrote {} sorted unique records to {:?}", unique, sorted);

        if let Some(frequent) = &args.frequent {
            let rdr = BufReader::new(File::open(sorted)?);
            let wtr = File::create(frequent)
                .with_context(|| format!("Failed to create output: {:?}", frequent))?;
            let written = write_frequent_contexts(read_records(rdr), &vocab, config.min_context_frequency, wtr)?;
            eprintln!("Wrote {} frequent context records to {:?}", written, frequent);
        }
    }
    Ok(())
}
