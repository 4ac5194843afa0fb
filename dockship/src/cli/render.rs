use std::io::{self, Write};

use clap::ValueEnum;

use crate::{
    ansi,
    pipeline::Snapshot,
    progress::{LogEntry, Severity},
};

#[derive(Debug, Default, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    /// One human readable line per log entry.
    #[default]
    Text,

    /// One JSON object per log entry.
    Json,
}

/// Writes log entries as snapshots come in. Every entry is written exactly once.
pub struct Renderer<W> {
    out: W,
    format: OutputFormat,
    color: bool,
    written: usize,
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W, format: OutputFormat, color: bool) -> Self {
        Self {
            out,
            format,
            color,
            written: 0,
        }
    }

    pub fn render(&mut self, snapshot: &Snapshot) -> io::Result<()> {
        for entry in snapshot.entries.iter().skip(self.written) {
            match self.format {
                OutputFormat::Text => self.write_text(entry)?,
                OutputFormat::Json => {
                    serde_json::to_writer(&mut self.out, entry)?;
                    writeln!(self.out)?;
                }
            }
        }
        self.written = self.written.max(snapshot.entries.len());
        self.out.flush()
    }

    fn write_text(&mut self, entry: &LogEntry) -> io::Result<()> {
        if !self.color {
            return writeln!(self.out, "{entry}");
        }
        let level = entry.severity.as_str().to_uppercase();
        let color = match entry.severity {
            Severity::Info => ansi::BOLD,
            Severity::Success => ansi::BOLD_GREEN,
            Severity::Error => ansi::BOLD_RED,
        };
        writeln!(
            self.out,
            "{dim}[{clock}]{reset} {color}{level:>7}{reset} {message}",
            dim = ansi::DIM,
            clock = entry.clock(),
            reset = ansi::RESET,
            message = entry.message
        )
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}
