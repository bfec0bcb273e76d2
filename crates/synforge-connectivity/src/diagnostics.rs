// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Diagnostic dumps of randomly selected partners.

The row format is owned here; where the rows end up is decided by a
[`DiagnosticSink`]. Sink failures are reported through `tracing` by the caller
and never abort a build.
*/

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Partner indices chosen per source for one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectionDump {
    pub n_pre: u32,
    pub n_post: u32,
    pub n_selected: u32,
    pub rows: Vec<Vec<u32>>,
}

impl SelectionDump {
    /// Header row of the three counts, then one row of indices per source
    pub fn write_csv<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "{},{},{}", self.n_pre, self.n_post, self.n_selected)?;
        for row in &self.rows {
            let line = row
                .iter()
                .map(|index| index.to_string())
                .collect::<Vec<_>>()
                .join(",");
            writeln!(out, "{}", line)?;
        }
        Ok(())
    }

    pub fn to_csv(&self) -> String {
        let mut buffer = Vec::new();
        // Writing into a Vec cannot fail
        let _ = self.write_csv(&mut buffer);
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

/// Receiver for selection dumps
pub trait DiagnosticSink: Send {
    /// `name` is a file-stem style label, e.g. `retina_to_v1_fixednumberpost-conn`
    fn write_selection(&mut self, name: &str, dump: &SelectionDump) -> io::Result<()>;
}

/// Writes each dump to `<dir>/<name>.csv`
#[derive(Debug, Clone)]
pub struct CsvDirectorySink {
    dir: PathBuf,
}

impl CsvDirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DiagnosticSink for CsvDirectorySink {
    fn write_selection(&mut self, name: &str, dump: &SelectionDump) -> io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{}.csv", name));
        let mut out = BufWriter::new(File::create(path)?);
        dump.write_csv(&mut out)?;
        out.flush()
    }
}

/// Keeps dumps in memory, keyed by name
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub dumps: Vec<(String, SelectionDump)>,
}

impl DiagnosticSink for MemorySink {
    fn write_selection(&mut self, name: &str, dump: &SelectionDump) -> io::Result<()> {
        self.dumps.push((name.to_string(), dump.clone()));
        Ok(())
    }
}
