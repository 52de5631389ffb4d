use std::io::Write as _;
use std::path::PathBuf;

use csv_core::WriteResult;

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum Format {
    Table,
    Jsonl,
    Csv,
}

#[derive(clap::Parser, Clone, Debug)]
#[group(id = "output::Args")]
pub struct Args {
    /// Write to this file instead of the terminal.
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,
    #[arg(long, short='f', value_enum, default_value_t = Format::Table)]
    format: Format,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("could not open the specified output file at {1:?}")]
    OpenOutputFile(#[source] std::io::Error, PathBuf),
    #[error("could not write data to the output file at {1:?}")]
    WriteFile(#[source] std::io::Error, PathBuf),
    #[error("could not write data to the terminal")]
    WriteStdout(#[source] std::io::Error),
    #[error("could not serialize a record to JSON")]
    SerializeJson(#[source] serde_json::Error),
}

impl Args {
    /// Start a report with the given column names.
    pub fn open(self, columns: &[&'static str]) -> Result<Output, Error> {
        let io = match &self.output {
            None => Box::new(std::io::stdout().lock()) as Box<dyn std::io::Write>,
            Some(path) => Box::new(
                std::fs::OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(path)
                    .map_err(|e| Error::OpenOutputFile(e, path.clone()))?,
            ) as Box<_>,
        };
        let sink = match self.format {
            Format::Table => {
                let mut comfy = comfy_table::Table::new();
                comfy
                    .set_header(columns.to_vec())
                    .set_content_arrangement(comfy_table::ContentArrangement::Dynamic);
                Sink::Table(comfy)
            }
            Format::Jsonl => Sink::Jsonl,
            Format::Csv => Sink::Csv,
        };
        let mut output = Output { path: self.output, io, sink };
        if let Sink::Csv = output.sink {
            let header = csv_record(columns);
            output.io.write_all(&header).map_err(|e| output.write_error(e))?;
        }
        Ok(output)
    }
}

pub struct Output {
    path: Option<PathBuf>,
    io: Box<dyn std::io::Write>,
    sink: Sink,
}

enum Sink {
    Table(comfy_table::Table),
    Jsonl,
    Csv,
}

impl Output {
    /// Table and CSV reports print `cells`, JSON lines serialize `record`.
    pub fn row<R: serde::Serialize>(&mut self, cells: Vec<String>, record: &R) -> Result<(), Error> {
        match &mut self.sink {
            Sink::Table(comfy) => {
                comfy.add_row(cells);
            }
            Sink::Csv => {
                let line = csv_record(&cells);
                self.io.write_all(&line).map_err(|e| self.write_error(e))?;
            }
            Sink::Jsonl => {
                serde_json::to_writer(&mut self.io, record).map_err(Error::SerializeJson)?;
                writeln!(self.io).map_err(|e| self.write_error(e))?;
            }
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<(), Error> {
        if let Sink::Table(comfy) = &self.sink {
            let table = format!("{comfy}\n");
            self.io.write_all(table.as_bytes()).map_err(|e| self.write_error(e))?;
        }
        self.io.flush().map_err(|e| self.write_error(e))
    }

    fn write_error(&self, e: std::io::Error) -> Error {
        match &self.path {
            None => Error::WriteStdout(e),
            Some(p) => Error::WriteFile(e, p.clone()),
        }
    }
}

/// A single CSV line, quoted as necessary.
fn csv_record<V: AsRef<str>>(values: &[V]) -> Vec<u8> {
    let mut writer = csv_core::Writer::new();
    let mut line = Vec::new();
    // Worst case every byte is a quote that needs doubling, plus the surrounding quotes.
    let longest = values.iter().map(|v| v.as_ref().len()).max().unwrap_or(0);
    let mut buffer = vec![0; 2 * longest + 2];
    for (i, value) in values.iter().enumerate() {
        if i != 0 {
            let (WriteResult::InputEmpty, n) = writer.delimiter(&mut buffer) else {
                unreachable!("buffer fits a delimiter");
            };
            line.extend_from_slice(&buffer[..n]);
        }
        let (WriteResult::InputEmpty, _, n) = writer.field(value.as_ref().as_bytes(), &mut buffer)
        else {
            unreachable!("buffer fits the largest field");
        };
        line.extend_from_slice(&buffer[..n]);
    }
    let (WriteResult::InputEmpty, n) = writer.terminator(&mut buffer) else {
        unreachable!("buffer fits a terminator");
    };
    line.extend_from_slice(&buffer[..n]);
    line
}
