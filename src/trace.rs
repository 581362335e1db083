//! Output sinks for saved states of the chain.
//!
//! A saved record is the current walker followed by its energy. The text
//! sink writes one whitespace-separated row per record, which is the format
//! downstream histogram/chronology tools consume.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use itertools::Itertools;

use crate::kernel::Kernel;

/// Receives saved states and, in debug cadence, per-step kernel diagnostics.
pub trait TraceSink {
    /// Append one `(vector, energy)` record.
    fn append(&mut self, x: &[f64], energy: f64) -> io::Result<()>;

    /// Record which kernel fired this step and what fraction of coordinates
    /// moved (zero for a rejection). Only called when every iteration is
    /// being saved.
    fn diagnostic(&mut self, _kernel: Kernel, _moved_fraction: f64) -> io::Result<()> {
        Ok(())
    }
}

/// Buffered plain-text sink: `n` reals and the energy per row.
pub struct TextTrace {
    out: BufWriter<File>,
    diagnostics: Option<BufWriter<File>>,
}

impl TextTrace {
    /// Open `path` for writing. A failure here is fatal for the run.
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Ok(TextTrace {
            out: BufWriter::new(File::create(path)?),
            diagnostics: None,
        })
    }

    /// Open an additional per-step diagnostics file (kernel index and moved
    /// fraction per iteration).
    pub fn with_diagnostics<P: AsRef<Path>, Q: AsRef<Path>>(
        path: P,
        diag_path: Q,
    ) -> io::Result<Self> {
        Ok(TextTrace {
            out: BufWriter::new(File::create(path)?),
            diagnostics: Some(BufWriter::new(File::create(diag_path)?)),
        })
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()?;
        if let Some(d) = self.diagnostics.as_mut() {
            d.flush()?;
        }
        Ok(())
    }
}

fn kernel_index(kernel: Kernel) -> u8 {
    match kernel {
        Kernel::Identity => 0,
        Kernel::Traverse => 1,
        Kernel::Walk => 2,
        Kernel::Hop => 3,
        Kernel::Blow => 4,
    }
}

impl TraceSink for TextTrace {
    fn append(&mut self, x: &[f64], energy: f64) -> io::Result<()> {
        let row = x
            .iter()
            .format_with("\t", |v, f| f(&format_args!("{v:.6e}")));
        writeln!(self.out, "{row}\t{energy:.6e}")
    }

    fn diagnostic(&mut self, kernel: Kernel, moved_fraction: f64) -> io::Result<()> {
        if let Some(d) = self.diagnostics.as_mut() {
            writeln!(d, "{} {moved_fraction}", kernel_index(kernel))?;
        }
        Ok(())
    }
}

/// In-memory sink for tests and in-process analysis.
#[derive(Debug, Default)]
pub struct MemTrace {
    pub rows: Vec<(Vec<f64>, f64)>,
    pub diagnostics: Vec<(Kernel, f64)>,
}

impl MemTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Saved values of one coordinate across all rows.
    pub fn column(&self, i: usize) -> Vec<f64> {
        self.rows.iter().map(|(x, _)| x[i]).collect()
    }
}

impl TraceSink for MemTrace {
    fn append(&mut self, x: &[f64], energy: f64) -> io::Result<()> {
        self.rows.push((x.to_vec(), energy));
        Ok(())
    }

    fn diagnostic(&mut self, kernel: Kernel, moved_fraction: f64) -> io::Result<()> {
        self.diagnostics.push((kernel, moved_fraction));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_trace_records_rows_and_diagnostics() {
        let mut trace = MemTrace::new();
        trace.append(&[1.0, 2.0], 0.5).unwrap();
        trace.append(&[3.0, 4.0], 0.25).unwrap();
        trace.diagnostic(Kernel::Walk, 0.5).unwrap();
        assert_eq!(trace.len(), 2);
        assert_eq!(trace.column(1), vec![2.0, 4.0]);
        assert_eq!(trace.diagnostics, vec![(Kernel::Walk, 0.5)]);
    }

    #[test]
    fn text_trace_write_and_reopen() {
        let dir = std::env::temp_dir().join("agedepth-trace-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("out.txt");
        let mut trace = TextTrace::create(&path).unwrap();
        trace.append(&[1.0, -2.5], 3.25).unwrap();
        trace.flush().unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let fields: Vec<&str> = text.split_whitespace().collect();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[2].parse::<f64>().unwrap(), 3.25);
    }
}
