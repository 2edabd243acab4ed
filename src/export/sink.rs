//! Destinations for aggregated exports.

use std::{
    collections::HashMap,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::debug;

use crate::utils::{color::paint, dir::create_dir};

use super::aggregation::{WeeklyUnit, YearExport};

const DATE_FORMAT: &str = "%d.%m.%Y";

/// Receives one [YearExport] per year in ascending order, then `finish` once.
pub trait ExportSink {
    fn write_year(&mut self, export: &YearExport) -> Result<()>;

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Date(NaiveDate),
    Number(u64),
    Empty,
}

impl Cell {
    fn render(&self) -> String {
        match self {
            Cell::Date(date) => date.format(DATE_FORMAT).to_string(),
            Cell::Number(n) => n.to_string(),
            Cell::Empty => String::new(),
        }
    }
}

impl From<Option<u64>> for Cell {
    fn from(value: Option<u64>) -> Self {
        value.map_or(Cell::Empty, Cell::Number)
    }
}

/// A titled table, the shape both the CSV files and the terminal preview use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub title: &'static str,
    pub header: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

fn header(first: &[&str], projects: &[Arc<str>]) -> Vec<String> {
    first
        .iter()
        .map(|v| v.to_string())
        .chain(projects.iter().map(|p| p.to_string()))
        .collect()
}

pub fn daily_table(export: &YearExport) -> Table {
    Table {
        title: "Minutes spent daily in projects",
        header: header(&["Date", "KW"], &export.projects),
        rows: export
            .daily
            .iter()
            .map(|row| {
                [Cell::Date(row.date), Cell::Number(row.iso_week.into())]
                    .into_iter()
                    .chain(row.minutes.iter().map(|&m| m.into()))
                    .collect()
            })
            .collect(),
    }
}

pub fn weekly_table(export: &YearExport) -> Table {
    Table {
        title: match export.weekly_unit {
            WeeklyUnit::Minutes => "Minutes spent weekly in different projects",
            WeeklyUnit::Percentage => "Percentage of time spent weekly in different projects",
        },
        header: header(&["KW"], &export.projects),
        rows: export
            .weekly
            .iter()
            .map(|row| {
                std::iter::once(Cell::Number(row.iso_week.into()))
                    .chain(row.values.iter().map(|&v| v.into()))
                    .collect()
            })
            .collect(),
    }
}

/// Writes `daily_{year}.csv` and `weekly_{year}.csv` into a directory.
pub struct CsvDirectorySink {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl CsvDirectorySink {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            written: vec![],
        }
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    fn write_table(&mut self, name: String, table: &Table) -> Result<()> {
        let path = self.dir.join(name);
        std::fs::write(&path, to_csv(table))
            .with_context(|| format!("Failed to write {path:?}"))?;
        debug!("Wrote {path:?}");
        self.written.push(path);
        Ok(())
    }
}

impl ExportSink for CsvDirectorySink {
    fn write_year(&mut self, export: &YearExport) -> Result<()> {
        create_dir(&self.dir)
            .with_context(|| format!("Failed to create export directory {:?}", self.dir))?;
        self.write_table(format!("daily_{}.csv", export.year), &daily_table(export))?;
        self.write_table(format!("weekly_{}.csv", export.year), &weekly_table(export))?;
        Ok(())
    }
}

/// Wraps the field in quotes when it contains a separator, a quote or a line break.
fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

pub fn to_csv(table: &Table) -> String {
    let mut output = String::new();
    output.push_str(&escape_field(table.title));
    output.push('\n');

    let header = table
        .header
        .iter()
        .map(|h| escape_field(h))
        .collect::<Vec<_>>();
    output.push_str(&header.join(","));
    output.push('\n');

    for row in &table.rows {
        let fields = row.iter().map(Cell::render).collect::<Vec<_>>();
        output.push_str(&fields.join(","));
        output.push('\n');
    }
    output
}

/// Collects every year and writes them as a single pretty JSON array when finished.
pub struct JsonSink<W: Write> {
    writer: W,
    years: Vec<YearExport>,
}

impl<W: Write> JsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            years: vec![],
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ExportSink for JsonSink<W> {
    fn write_year(&mut self, export: &YearExport) -> Result<()> {
        self.years.push(export.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        serde_json::to_writer_pretty(&mut self.writer, &self.years)?;
        writeln!(self.writer)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Tab separated preview. Project headers are painted in the project's color when one is known.
pub struct TerminalSink<W: Write> {
    writer: W,
    colors: HashMap<Arc<str>, String>,
}

impl<W: Write> TerminalSink<W> {
    pub fn new(writer: W, colors: HashMap<Arc<str>, String>) -> Self {
        Self { writer, colors }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_table(&mut self, table: &Table, leading: usize) -> Result<()> {
        writeln!(self.writer, "{}", table.title)?;
        let header = table
            .header
            .iter()
            .enumerate()
            .map(|(i, h)| match self.colors.get(h.as_str()) {
                Some(color) if i >= leading => paint(color, h),
                _ => h.clone(),
            })
            .collect::<Vec<_>>();
        writeln!(self.writer, "{}", header.join("\t"))?;
        for row in &table.rows {
            let fields = row.iter().map(Cell::render).collect::<Vec<_>>();
            writeln!(self.writer, "{}", fields.join("\t"))?;
        }
        writeln!(self.writer)?;
        Ok(())
    }
}

impl<W: Write> ExportSink for TerminalSink<W> {
    fn write_year(&mut self, export: &YearExport) -> Result<()> {
        writeln!(self.writer, "{}", export.year)?;
        self.write_table(&daily_table(export), 2)?;
        self.write_table(&weekly_table(export), 1)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Directory the interactive session exports into when none is given.
pub fn default_export_dir(root: &Path, today: NaiveDate) -> PathBuf {
    root.join(today.format("%Y_%m_%d").to_string())
}
