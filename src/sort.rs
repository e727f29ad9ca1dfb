//! External merge sort of context record files.
//!
//! Records are read in chunks, each chunk is sorted and deduplicated in memory and
//! spilled to a temporary run file. The runs are then merged with a binary heap,
//! dropping duplicates that span runs. The output is ordered by
//! (left id, right id, phrase id) and holds every distinct record exactly once.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};
use tempfile::NamedTempFile;

use crate::errors::{ContextFeatureError, Result};
use crate::types::ContextRecord;

pub fn record_reader<R: Read>(rdr: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .quoting(false)
        .from_reader(rdr)
}

pub fn record_writer<W: Write>(wtr: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_writer(wtr)
}

/// Reads every record of an id-mode context file.
pub fn read_records<R: Read>(rdr: R) -> impl Iterator<Item = Result<ContextRecord>> {
    record_reader(rdr)
        .into_deserialize::<ContextRecord>()
        .map(|r| r.map_err(|e| ContextFeatureError::invalid_format("context record", e.to_string())))
}

#[derive(Clone, Debug)]
pub struct ExternalSorter {
    chunk_size: usize,
    temp_dir: Option<PathBuf>,
}

impl ExternalSorter {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            temp_dir: None,
        }
    }

    /// Directory for spilled runs; the system temporary directory otherwise.
    pub fn temp_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Sorts and deduplicates the context file at `input` into `output`.
    ///
    /// Returns the number of records written.
    pub fn sort_file(&self, input: &Path, output: &Path) -> Result<usize> {
        let rdr = BufReader::new(File::open(input)?);
        let wtr = BufWriter::new(File::create(output)?);
        let written = self.sort(rdr, wtr)?;
        info!("sorted {:?} into {:?}: {} unique records", input, output, written);
        Ok(written)
    }

    pub fn sort<R: Read, W: Write>(&self, rdr: R, wtr: W) -> Result<usize> {
        let mut runs = Vec::new();
        let mut chunk = Vec::with_capacity(self.chunk_size.min(1 << 20));
        let mut total = 0usize;
        for record in read_records(rdr) {
            chunk.push(record?);
            total += 1;
            if chunk.len() >= self.chunk_size {
                runs.push(self.spill(&mut chunk)?);
            }
        }
        debug!("read {} records", total);

        let mut out = record_writer(wtr);
        let written = if runs.is_empty() {
            sort_dedup(&mut chunk);
            for record in &chunk {
                out.serialize(record)?;
            }
            chunk.len()
        } else {
            if !chunk.is_empty() {
                runs.push(self.spill(&mut chunk)?);
            }
            debug!("merging {} sorted runs", runs.len());
            merge_runs(&runs, &mut out)?
        };
        out.flush()?;
        Ok(written)
    }

    fn spill(&self, chunk: &mut Vec<ContextRecord>) -> Result<NamedTempFile> {
        sort_dedup(chunk);
        let mut run = match &self.temp_dir {
            Some(dir) => NamedTempFile::new_in(dir)?,
            None => NamedTempFile::new()?,
        };
        {
            let mut wtr = record_writer(BufWriter::new(run.as_file_mut()));
            for record in chunk.iter() {
                wtr.serialize(record)?;
            }
            wtr.flush()?;
        }
        debug!("spilled run of {} records to {:?}", chunk.len(), run.path());
        chunk.clear();
        Ok(run)
    }
}

fn sort_dedup(records: &mut Vec<ContextRecord>) {
    records.sort_unstable();
    records.dedup();
}

fn merge_runs<W: Write>(runs: &[NamedTempFile], out: &mut csv::Writer<W>) -> Result<usize> {
    let mut readers = Vec::with_capacity(runs.len());
    for run in runs {
        let file = File::open(run.path())?;
        readers.push(read_records(BufReader::new(file)));
    }

    let mut heap = BinaryHeap::new();
    for (i, rdr) in readers.iter_mut().enumerate() {
        if let Some(record) = rdr.next() {
            heap.push(Reverse((record?, i)));
        }
    }

    let mut last: Option<ContextRecord> = None;
    let mut written = 0;
    while let Some(Reverse((record, i))) = heap.pop() {
        if last != Some(record) {
            out.serialize(record)?;
            written += 1;
            last = Some(record);
        }
        if let Some(next) = readers[i].next() {
            heap.push(Reverse((next?, i)));
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn records_to_text(records: &[ContextRecord]) -> String {
        records
            .iter()
            .map(|r| format!("{}\t{}\t{}\n", r.left, r.right, r.phrase))
            .collect()
    }

    fn sort_text(sorter: &ExternalSorter, text: &str) -> (usize, String) {
        let mut out = Vec::new();
        let n = sorter.sort(text.as_bytes(), &mut out).unwrap();
        (n, String::from_utf8(out).unwrap())
    }

    #[test]
    fn sorts_numerically_and_removes_duplicates() {
        let input = "10\t1\t1\n2\t1\t1\n2\t1\t1\n2\t0\t5\n";
        let (n, out) = sort_text(&ExternalSorter::new(100), input);
        assert_eq!(n, 3);
        assert_eq!(out, "2\t0\t5\n2\t1\t1\n10\t1\t1\n");
    }

    #[test]
    fn merged_runs_match_in_memory_sort() {
        let mut rng = StdRng::seed_from_u64(7);
        let records: Vec<ContextRecord> = (0..2000)
            .map(|_| ContextRecord::new(rng.gen_range(0..20), rng.gen_range(0..20), rng.gen_range(0..5)))
            .collect();
        let mut expected = records.clone();
        expected.sort();
        expected.dedup();

        let dir = tempfile::tempdir().unwrap();
        let sorter = ExternalSorter::new(64).temp_dir(dir.path());
        let (n, out) = sort_text(&sorter, &records_to_text(&records));
        assert_eq!(n, expected.len());
        assert_eq!(out, records_to_text(&expected));
    }

    #[test]
    fn empty_input_gives_empty_output() {
        let (n, out) = sort_text(&ExternalSorter::new(4), "");
        assert_eq!(n, 0);
        assert!(out.is_empty());
    }

    #[test]
    fn malformed_record_is_an_error() {
        let mut out = Vec::new();
        let err = ExternalSorter::new(4)
            .sort("1\t2\tx\n".as_bytes(), &mut out)
            .unwrap_err();
        assert!(matches!(err, ContextFeatureError::InvalidFormat { .. }));
    }
}
