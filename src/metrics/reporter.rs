use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::{Cost, ReportRow};
use crate::error::SweepError;

pub const REPORT_HEADER: [&str; 4] = ["nq", "topk", "query_cost", "avg_cost"];

/// Written in place of both cost columns when a run produced no successful query.
pub const UNDEFINED_COST: &str = "n/a";

/// Append-only CSV report.
///
/// Every row is flushed and synced before `write_row` returns, so a crash
/// loses at most the row being written.
pub struct ReportSink {
    writer: csv::Writer<File>,
    path: PathBuf,
    rows_written: usize,
}

impl ReportSink {
    /// `<table>_<nprobe>_<concurrency>_output.csv` under `dir`.
    pub fn report_path(dir: &Path, table: &str, nprobe: u32, concurrency: usize) -> PathBuf {
        dir.join(format!("{}_{}_{}_output.csv", table, nprobe, concurrency))
    }

    /// Create or truncate the report at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SweepError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|source| SweepError::ReportOpen {
            path: path.clone(),
            source,
        })?;
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(file);

        Ok(Self {
            writer,
            path,
            rows_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Column names. Emitted at the start of every batch-size group.
    pub fn write_header(&mut self) -> Result<(), SweepError> {
        self.writer.write_record(REPORT_HEADER)?;
        self.sync()
    }

    pub fn write_row(&mut self, row: &ReportRow) -> Result<(), SweepError> {
        let (per_batch, per_vector) = match row.cost {
            Cost::Measured {
                per_batch_secs,
                per_vector_secs,
            } => (
                format!("{:.4}", per_batch_secs),
                format!("{:.4}", per_vector_secs),
            ),
            Cost::Undefined => (UNDEFINED_COST.to_string(), UNDEFINED_COST.to_string()),
        };

        self.writer.write_record([
            row.batch_size.to_string(),
            row.top_k.to_string(),
            per_batch,
            per_vector,
        ])?;
        self.sync()?;
        self.rows_written += 1;
        Ok(())
    }

    /// Blank separator line closing a batch-size group.
    pub fn end_group(&mut self) -> Result<(), SweepError> {
        self.writer.flush()?;
        let mut file: &File = self.writer.get_ref();
        file.write_all(b"\n")?;
        self.sync()
    }

    pub fn close(mut self) -> Result<PathBuf, SweepError> {
        self.sync()?;
        Ok(self.path)
    }

    fn sync(&mut self) -> Result<(), SweepError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }
}

/// Console output for finished sweeps.
pub struct ResultsReporter;

impl ResultsReporter {
    pub fn print_summary(rows: &[ReportRow], report: &Path) {
        println!();
        println!("══════════════════════════════════════════════════════════");
        println!("  Sweep results ({} configurations)", rows.len());
        println!("══════════════════════════════════════════════════════════");
        println!(
            "  {:>6} {:>6} {:>14} {:>14} {:>8}",
            "nq", "topk", "query_cost(s)", "avg_cost(s)", "failed"
        );
        for row in rows {
            println!(
                "  {:>6} {:>6} {:>14} {:>14} {:>8}",
                row.batch_size,
                row.top_k,
                format_cost(row.cost_per_batch_secs()),
                format_cost(row.cost_per_vector_secs()),
                row.failed_queries
            );
        }
        println!();
        println!("  Report: {}", report.display());
        println!("══════════════════════════════════════════════════════════");
    }
}

fn format_cost(cost: Option<f64>) -> String {
    cost.map(|c| format!("{:.4}", c))
        .unwrap_or_else(|| UNDEFINED_COST.to_string())
}
