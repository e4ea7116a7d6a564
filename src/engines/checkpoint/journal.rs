//! Append-only CSV log of per-generation best individuals.
//!
//! One process writes, any number of processes read, and nothing locks.
//! Every append serialises the whole table into a staging file next to the
//! log, syncs it, and renames it over the log. Rename within a directory is
//! atomic, so a reader opening the log sees either the previous complete
//! table or the new complete table and never a partially written row.

use crate::error::{EvoError, Result};
use crate::types::{CheckpointRecord, Genome};
use polars::prelude::*;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const GENERATION_COLUMN: &str = "generation";
pub const FITNESS_COLUMN: &str = "fitness";

pub fn genome_column(i: usize) -> String {
    format!("genome_{}", i)
}

/// Header row for a log holding genomes of `genome_len` values.
pub fn header(genome_len: usize) -> Vec<String> {
    let mut columns = vec![GENERATION_COLUMN.to_string(), FITNESS_COLUMN.to_string()];
    columns.extend((0..genome_len).map(genome_column));
    columns
}

/// Sibling path used to stage a new version of `path` before the rename.
pub fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "checkpoint".to_string());
    path.with_file_name(format!(".{}.staging", name))
}

/// Writes `path` through a synced staging file and an atomic rename.
pub fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)?;
        }
    }
    let staging = staging_path(path);

    let file = File::create(&staging)?;
    let mut buf = BufWriter::new(file);
    write(&mut buf)?;
    let file = buf
        .into_inner()
        .map_err(|e| EvoError::LogIo(format!("flush {}: {}", staging.display(), e)))?;
    file.sync_all()?;
    fs::rename(&staging, path)?;
    Ok(())
}

/// Single writer of a checkpoint log.
pub struct CheckpointWriter {
    path: PathBuf,
    genome_len: usize,
    records: Vec<CheckpointRecord>,
}

impl CheckpointWriter {
    /// Starts a new, empty log at `path`, replacing any previous one.
    pub fn create<P: AsRef<Path>>(path: P, genome_len: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            log::warn!("Replacing existing checkpoint log {}", path.display());
        }
        let writer = Self {
            path,
            genome_len,
            records: Vec::new(),
        };
        writer.persist(&[]).map_err(|e| {
            EvoError::LogIo(format!("cannot create {}: {}", writer.path.display(), e))
        })?;
        Ok(writer)
    }

    /// Reopens an existing log to keep appending to it.
    pub fn resume<P: AsRef<Path>>(path: P, genome_len: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let records = CheckpointReader::new(&path).read_with_len(genome_len)?;
        log::info!(
            "Resuming checkpoint log {} with {} records",
            path.display(),
            records.len()
        );
        Ok(Self {
            path,
            genome_len,
            records,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[CheckpointRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&CheckpointRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Durably appends one record. Any failure here is fatal to the run.
    pub fn append(&mut self, record: CheckpointRecord) -> Result<()> {
        if record.genome.len() != self.genome_len {
            return Err(EvoError::SchemaMismatch {
                expected: self.genome_len,
                actual: record.genome.len(),
            });
        }
        if let Some(last) = self.records.last() {
            if record.generation <= last.generation {
                return Err(EvoError::LogIo(format!(
                    "generation {} does not follow {}",
                    record.generation, last.generation
                )));
            }
        }
        if !record.fitness.is_finite() {
            return Err(EvoError::LogIo(format!(
                "refusing to log non-finite fitness {}",
                record.fitness
            )));
        }

        self.records.push(record);
        if let Err(e) = self.persist(&self.records) {
            self.records.pop();
            return Err(EvoError::LogIo(format!(
                "append to {} failed: {}",
                self.path.display(),
                e
            )));
        }
        Ok(())
    }

    fn persist(&self, records: &[CheckpointRecord]) -> Result<()> {
        let genome_len = self.genome_len;
        write_atomically(&self.path, |buf| {
            if records.is_empty() {
                writeln!(buf, "{}", header(genome_len).join(","))?;
                return Ok(());
            }
            let mut df = to_frame(records, genome_len)?;
            CsvWriter::new(buf).include_header(true).finish(&mut df)?;
            Ok(())
        })
    }
}

fn to_frame(records: &[CheckpointRecord], genome_len: usize) -> Result<DataFrame> {
    let mut columns: Vec<Column> = Vec::with_capacity(genome_len + 2);
    columns.push(Column::new(
        GENERATION_COLUMN.into(),
        records.iter().map(|r| r.generation as i64).collect::<Vec<i64>>(),
    ));
    columns.push(Column::new(
        FITNESS_COLUMN.into(),
        records.iter().map(|r| r.fitness).collect::<Vec<f64>>(),
    ));
    for i in 0..genome_len {
        columns.push(Column::new(
            genome_column(i).into(),
            records.iter().map(|r| r.genome.values()[i]).collect::<Vec<f64>>(),
        ));
    }
    Ok(DataFrame::new(columns)?)
}

/// Lock-free reader; safe to use while another process appends.
pub struct CheckpointReader {
    path: PathBuf,
}

impl CheckpointReader {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All records, validated for shape and generation order.
    pub fn read_all(&self) -> Result<Vec<CheckpointRecord>> {
        self.read_table().map(|(_, records)| records)
    }

    /// `read_all`, failing with `SchemaMismatch` unless genomes have `genome_len` values.
    pub fn read_with_len(&self, genome_len: usize) -> Result<Vec<CheckpointRecord>> {
        let (actual, records) = self.read_table()?;
        if actual != genome_len {
            return Err(EvoError::SchemaMismatch {
                expected: genome_len,
                actual,
            });
        }
        Ok(records)
    }

    /// Genome length declared by the header, plus every row.
    fn read_table(&self) -> Result<(usize, Vec<CheckpointRecord>)> {
        if !self.path.exists() {
            return Err(EvoError::LogIo(format!(
                "checkpoint log {} does not exist yet",
                self.path.display()
            )));
        }

        // Every cell is read as text and parsed here so malformed rows are
        // reported instead of coerced.
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .try_into_reader_with_file_path(Some(self.path.clone()))
            .and_then(|reader| reader.finish())
            .map_err(|e| self.read_error(e))?;

        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        let genome_len = names.len().saturating_sub(2);
        if names != header(genome_len) {
            return Err(EvoError::LogIo(format!(
                "unexpected header in {}: {}",
                self.path.display(),
                names.join(",")
            )));
        }

        let mut columns: Vec<StringChunked> = Vec::with_capacity(names.len());
        for name in &names {
            let column = df
                .column(name)
                .and_then(|c| c.str())
                .map_err(|e| self.read_error(e))?;
            columns.push(column.clone());
        }

        let mut records: Vec<CheckpointRecord> = Vec::with_capacity(df.height());
        for row in 0..df.height() {
            let generation: u64 = cell(&columns, &names, 0, row)?.parse().map_err(|_| {
                EvoError::LogIo(format!("row {} has a malformed generation", row + 1))
            })?;
            let fitness = parse_f64(cell(&columns, &names, 1, row)?, row, FITNESS_COLUMN)?;
            let mut genome = Vec::with_capacity(genome_len);
            for col in 2..names.len() {
                genome.push(parse_f64(cell(&columns, &names, col, row)?, row, &names[col])?);
            }

            if let Some(prev) = records.last() {
                if generation <= prev.generation {
                    return Err(EvoError::LogIo(format!(
                        "row {}: generation {} does not follow {}",
                        row + 1,
                        generation,
                        prev.generation
                    )));
                }
            }

            records.push(CheckpointRecord {
                generation,
                fitness,
                genome: Genome::new(genome),
            });
        }

        Ok((genome_len, records))
    }

    fn read_error(&self, e: PolarsError) -> EvoError {
        EvoError::LogIo(format!("Failed to read {}: {}", self.path.display(), e))
    }
}

/// Trimmed text of one cell; null or blank cells mean a torn or malformed row.
fn cell<'a>(
    columns: &'a [StringChunked],
    names: &[String],
    col: usize,
    row: usize,
) -> Result<&'a str> {
    columns[col]
        .get(row)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            EvoError::LogIo(format!("row {} is missing column '{}'", row + 1, names[col]))
        })
}

fn parse_f64(cell: &str, row: usize, column: &str) -> Result<f64> {
    cell.trim().parse::<f64>().map_err(|_| {
        EvoError::LogIo(format!(
            "row {} has a malformed value '{}' in column '{}'",
            row + 1,
            cell,
            column
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(generation: u64, fitness: f64, genome: &[f64]) -> CheckpointRecord {
        CheckpointRecord {
            generation,
            fitness,
            genome: Genome::new(genome.to_vec()),
        }
    }

    #[test]
    fn test_header_layout() {
        assert_eq!(header(2), vec!["generation", "fitness", "genome_0", "genome_1"]);
    }

    #[test]
    fn test_new_log_is_readable_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        CheckpointWriter::create(&path, 3).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim(), "generation,fitness,genome_0,genome_1,genome_2");
        assert!(CheckpointReader::new(&path).read_all().unwrap().is_empty());
    }

    #[test]
    fn test_append_then_read_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut writer = CheckpointWriter::create(&path, 3).unwrap();

        let first = record(0, -1.25, &[0.1, -0.2, 1.0 / 3.0]);
        let second = record(1, -0.5, &[1e-9, 0.0, -0.75]);
        writer.append(first.clone()).unwrap();
        writer.append(second.clone()).unwrap();

        let records = CheckpointReader::new(&path).read_all().unwrap();
        assert_eq!(records, vec![first, second]);
        assert!(!staging_path(&path).exists());
    }

    #[test]
    fn test_append_rejects_out_of_order_generation() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = CheckpointWriter::create(dir.path().join("log.csv"), 1).unwrap();
        writer.append(record(3, 1.0, &[0.0])).unwrap();

        assert!(writer.append(record(3, 2.0, &[0.0])).is_err());
        assert!(writer.append(record(2, 2.0, &[0.0])).is_err());
        assert_eq!(writer.len(), 1);
    }

    #[test]
    fn test_append_rejects_wrong_genome_length() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = CheckpointWriter::create(dir.path().join("log.csv"), 2).unwrap();
        let err = writer.append(record(0, 1.0, &[0.0])).unwrap_err();
        assert!(matches!(err, EvoError::SchemaMismatch { expected: 2, actual: 1 }));
    }

    #[test]
    fn test_reader_rejects_truncated_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        fs::write(
            &path,
            "generation,fitness,genome_0,genome_1\n0,1.0,0.5,0.5\n1,2.0,0.5,\n",
        )
        .unwrap();
        assert!(CheckpointReader::new(&path).read_all().is_err());
    }

    #[test]
    fn test_reader_rejects_bad_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        fs::write(&path, "gen,score,x\n0,1.0,0.5\n").unwrap();
        assert!(CheckpointReader::new(&path).read_all().is_err());
    }

    #[test]
    fn test_missing_log_is_log_io() {
        let dir = tempfile::tempdir().unwrap();
        let err = CheckpointReader::new(dir.path().join("nope.csv"))
            .read_all()
            .unwrap_err();
        assert!(matches!(err, EvoError::LogIo(_)));
    }

    #[test]
    fn test_create_failure_is_log_io() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();

        let err = CheckpointWriter::create(blocker.join("log.csv"), 2)
            .err()
            .unwrap();
        assert!(matches!(err, EvoError::LogIo(_)), "{}", err);
    }

    #[test]
    fn test_unreadable_log_is_log_io() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        fs::create_dir(&path).unwrap();

        let err = CheckpointReader::new(&path).read_all().unwrap_err();
        assert!(matches!(err, EvoError::LogIo(_)), "{}", err);
    }

    #[test]
    fn test_read_with_len_detects_schema_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut writer = CheckpointWriter::create(&path, 2).unwrap();
        writer.append(record(0, 1.0, &[0.1, 0.2])).unwrap();

        let err = CheckpointReader::new(&path).read_with_len(3).unwrap_err();
        assert!(matches!(err, EvoError::SchemaMismatch { expected: 3, actual: 2 }));
    }

    #[test]
    fn test_resume_continues_appending() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut writer = CheckpointWriter::create(&path, 1).unwrap();
        writer.append(record(0, 1.0, &[0.1])).unwrap();
        drop(writer);

        let mut resumed = CheckpointWriter::resume(&path, 1).unwrap();
        assert_eq!(resumed.last().map(|r| r.generation), Some(0));
        resumed.append(record(1, 2.0, &[0.2])).unwrap();

        let records = CheckpointReader::new(&path).read_all().unwrap();
        assert_eq!(records.len(), 2);
    }
}
