// ============================================================
// Layer 6 — Summary Writer
// ============================================================
// Appends named scalars to a CSV stream so learning curves can
// be plotted after (or during) a run.
//
// One writer per stream:
//   logs/train/scalars.csv   — per-batch loss, per-epoch accuracy
//   logs/test/scalars.csv    — per-epoch loss and accuracy
//
// Example:
//   step,name,value
//   1,loss,2.302585
//   2,loss,2.291044
//   2,accuracy,0.125000
//
// The file is opened in append mode so a resumed run continues
// the same curve. The header is written only when the file is new.
// Every write is recorded; rows are buffered until `flush`.
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use std::{
    fs::{self, File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

const HEADER: &str = "step,name,value";

pub struct SummaryWriter {
    csv_path: PathBuf,
    out:      BufWriter<File>,
}

impl SummaryWriter {
    /// Open (or create) `<dir>/scalars.csv`.
    pub fn create(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create summary directory '{}'", dir.display()))?;

        let csv_path = dir.join("scalars.csv");
        let is_new   = !csv_path.exists();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&csv_path)
            .with_context(|| format!("Cannot open summary file '{}'", csv_path.display()))?;
        let mut out = BufWriter::new(file);

        if is_new {
            writeln!(out, "{HEADER}")?;
            tracing::debug!("Created summary CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path, out })
    }

    /// Record one scalar at `step`.
    pub fn write(&mut self, step: u64, name: &str, value: f64) -> Result<()> {
        writeln!(self.out, "{step},{name},{value:.6}")
            .with_context(|| format!("Cannot append to '{}'", self.csv_path.display()))?;
        tracing::trace!("summary {} @ {} = {:.6}", name, step, value);
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out
            .flush()
            .with_context(|| format!("Cannot flush '{}'", self.csv_path.display()))
    }

    #[cfg(test)]
    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

/// One parsed row of a summary stream.
#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarRecord {
    pub step:  u64,
    pub name:  String,
    pub value: f64,
}

/// Read a summary stream back.
#[cfg(test)]
pub fn read_scalars(path: &Path) -> Result<Vec<ScalarRecord>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Cannot read summary file '{}'", path.display()))?;

    let mut lines = text.lines();
    match lines.next() {
        Some(HEADER) => {}
        other => anyhow::bail!("'{}' has an unexpected header: {:?}", path.display(), other),
    }

    lines
        .filter(|l| !l.trim().is_empty())
        .enumerate()
        .map(|(i, line)| {
            let mut fields = line.splitn(3, ',');
            let (Some(step), Some(name), Some(value)) = (fields.next(), fields.next(), fields.next())
            else {
                anyhow::bail!("'{}' row {} is malformed: '{}'", path.display(), i + 1, line);
            };
            Ok(ScalarRecord {
                step:  step.parse().with_context(|| format!("bad step in '{line}'"))?,
                name:  name.to_string(),
                value: value.parse().with_context(|| format!("bad value in '{line}'"))?,
            })
        })
        .collect()
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_header_written_once_across_reopens() {
        let dir = tempdir().unwrap();
        {
            let mut w = SummaryWriter::create(dir.path()).unwrap();
            w.write(1, "loss", 2.5).unwrap();
            w.flush().unwrap();
        }
        {
            let mut w = SummaryWriter::create(dir.path()).unwrap();
            w.write(2, "loss", 2.0).unwrap();
            w.flush().unwrap();
        }
        let text = fs::read_to_string(dir.path().join("scalars.csv")).unwrap();
        assert_eq!(text.matches(HEADER).count(), 1);

        let rows = read_scalars(&dir.path().join("scalars.csv")).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], ScalarRecord { step: 2, name: "loss".into(), value: 2.0 });
    }

    #[test]
    fn test_every_write_is_recorded() {
        let dir = tempdir().unwrap();
        let mut w = SummaryWriter::create(dir.path().join("train")).unwrap();
        for step in 1..=5 {
            w.write(step, "loss", 1.0 / step as f64).unwrap();
        }
        w.write(5, "accuracy", 0.75).unwrap();
        w.flush().unwrap();

        let rows = read_scalars(w.csv_path()).unwrap();
        assert_eq!(rows.len(), 6);
        assert_eq!(rows.iter().filter(|r| r.name == "loss").count(), 5);
        assert_eq!(rows[5].name, "accuracy");
        assert!((rows[5].value - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_read_rejects_foreign_file() {
        let dir  = tempdir().unwrap();
        let path = dir.path().join("scalars.csv");
        fs::write(&path, "epoch,train_loss\n1,0.5\n").unwrap();
        assert!(read_scalars(&path).is_err());
    }
}
