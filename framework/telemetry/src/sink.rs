use crate::sample::TelemetrySample;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Failed to write telemetry sink {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("Failed to open or flush telemetry sink {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// CSV file receiving telemetry rows for one run.
///
/// Every append is flushed, so the file stays parseable if the process dies mid-run.
pub struct TelemetrySink {
    path: PathBuf,
    columns: usize,
    writer: csv::Writer<File>,
}

impl TelemetrySink {
    /// Open `path` for appending, writing `header` if the file is new or empty.
    pub fn open(path: &Path, header: &[&str]) -> Result<Self, SinkError> {
        let io_err = |source| SinkError::Io {
            path: path.to_path_buf(),
            source,
        };

        let needs_header = std::fs::metadata(path)
            .map(|m| m.len() == 0)
            .unwrap_or(true);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(io_err)?;

        let mut sink = Self {
            path: path.to_path_buf(),
            columns: header.len(),
            writer: csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(file),
        };
        if needs_header {
            sink.writer
                .write_record(header)
                .map_err(|source| SinkError::Csv {
                    path: path.to_path_buf(),
                    source,
                })?;
            sink.flush()?;
        }

        Ok(sink)
    }

    pub fn append(&mut self, samples: &[TelemetrySample]) -> Result<(), SinkError> {
        for sample in samples {
            self.writer
                .write_record(sample.to_record(self.columns))
                .map_err(|source| SinkError::Csv {
                    path: self.path.clone(),
                    source,
                })?;
        }

        self.flush()
    }

    pub fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush().map_err(|source| SinkError::Io {
            path: self.path.clone(),
            source,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
