use anyhow::Context;
use dyno_summary_model::{ResultRecord, RESULT_HEADER};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Destination for result records.
pub trait RecordSink {
    /// Persist one record. Must leave the sink readable if the process stops right after.
    fn append(&mut self, record: &ResultRecord) -> anyhow::Result<()>;
}

/// The per-run result CSV.
pub struct CsvResultSink {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl CsvResultSink {
    /// Open `path` for appending, writing the header if the file is new or empty.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let needs_header = std::fs::metadata(path)
            .map(|m| m.len() == 0)
            .unwrap_or(true);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open result sink {}", path.display()))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if needs_header {
            writer.write_record(RESULT_HEADER)?;
            writer.flush()?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            writer,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn close(mut self) -> anyhow::Result<()> {
        self.writer
            .flush()
            .with_context(|| format!("Failed to flush result sink {}", self.path.display()))
    }
}

impl RecordSink for CsvResultSink {
    fn append(&mut self, record: &ResultRecord) -> anyhow::Result<()> {
        self.writer
            .serialize(record)
            .with_context(|| format!("Failed to write to result sink {}", self.path.display()))?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct InMemoryResultSink {
    pub records: Vec<ResultRecord>,
}

impl RecordSink for InMemoryResultSink {
    fn append(&mut self, record: &ResultRecord) -> anyhow::Result<()> {
        self.records.push(record.clone());
        Ok(())
    }
}
