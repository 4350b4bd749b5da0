use crate::error::{ExchangeError, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// One data row and the source line it started on (the header is line 1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRow {
    pub line: u64,
    pub cells: Vec<String>,
}

/// A header row plus data rows, read from delimited text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceTable {
    pub headers: Vec<String>,
    pub rows: Vec<SourceRow>,
}

impl SourceTable {
    pub fn read_path(path: &Path, delimiter: u8) -> Result<Self> {
        let source_err = |source: csv::Error| ExchangeError::Source {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(|e| source_err(csv::Error::from(e)))?;
        Self::from_reader(file, delimiter).map_err(source_err)
    }

    pub fn from_reader<R: Read>(
        mut reader: R,
        delimiter: u8,
    ) -> std::result::Result<Self, csv::Error> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_reader(data.as_slice());
        let headers = rdr
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect::<Vec<_>>();

        let mut rows = Vec::new();
        for (i, record) in rdr.records().enumerate() {
            let record = record?;
            let line = record
                .position()
                .map(|p| start_line(&data, p))
                .unwrap_or(i as u64 + 2);
            rows.push(SourceRow {
                line,
                cells: record.iter().map(str::to_string).collect(),
            });
        }
        Ok(Self { headers, rows })
    }

    /// Builds a table from in-memory rows, numbering them as if read from a file.
    #[cfg(test)]
    pub fn from_rows<H, R, C>(headers: H, rows: R) -> Self
    where
        H: IntoIterator,
        H::Item: Into<String>,
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: rows
                .into_iter()
                .enumerate()
                .map(|(i, cells)| SourceRow {
                    line: i as u64 + 2,
                    cells: cells.into_iter().map(Into::into).collect(),
                })
                .collect(),
        }
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

/// csv positions a record where reading began, which may be a run of blank
/// lines it skipped; count those to land on the record's first line.
fn start_line(data: &[u8], pos: &csv::Position) -> u64 {
    let from = usize::try_from(pos.byte())
        .unwrap_or(data.len())
        .min(data.len());
    let skipped = data[from..]
        .iter()
        .take_while(|b| matches!(b, b'\n' | b'\r'))
        .filter(|b| **b == b'\n')
        .count();
    pos.line() + skipped as u64
}
