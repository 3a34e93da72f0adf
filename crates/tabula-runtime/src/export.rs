#![forbid(unsafe_code)]

//! Export snapshots and sinks.
//!
//! An [`ExportSnapshot`] is a plain grid of strings: headers for the visible
//! leaf columns in display order, then one row per exported record. Which
//! records are exported is decided here; how they are encoded is up to an
//! [`ExportSink`].

use std::fmt;

use tabula_core::{ColumnRegistry, TableState};
use tabula_model::{ColumnLayout, RowModel};

/// Headers and stringified cells ready for a sink.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSnapshot {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ExportSnapshot {
    /// Snapshot of a derived row model.
    ///
    /// Exports the selected records (source order) when any selected id is in
    /// the current id universe; otherwise every filtered record in
    /// filtered+sorted order. Pagination and grouping are ignored.
    #[must_use]
    pub fn capture<R>(
        registry: &ColumnRegistry<R>,
        state: &TableState,
        model: &RowModel,
    ) -> Self {
        let layout = ColumnLayout::compute(registry, state);
        let headers = layout
            .columns
            .iter()
            .map(|c| registry.header(&c.id).unwrap_or(&c.id).to_owned())
            .collect();

        let selected: Vec<usize> = model
            .ids()
            .iter()
            .enumerate()
            .filter(|(_, id)| state.row_selection.contains(id))
            .map(|(index, _)| index)
            .collect();
        let sources: &[usize] = if selected.is_empty() {
            model.leaf_source_indices()
        } else {
            &selected
        };

        let rows = sources
            .iter()
            .filter_map(|&source| model.record_cells(source))
            .map(|cells| {
                layout
                    .columns
                    .iter()
                    .map(|c| cells.get(c.index).map(ToString::to_string).unwrap_or_default())
                    .collect()
            })
            .collect();

        Self { headers, rows }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Consumer of a snapshot. The artifact is whatever the sink produces: an
/// encoded document, a file handle, a count of bytes written.
pub trait ExportSink {
    type Artifact;
    type Error: std::error::Error;

    fn export(&self, snapshot: &ExportSnapshot) -> Result<Self::Artifact, Self::Error>;
}

/// Failure while encoding a snapshot.
#[derive(Debug)]
pub enum ExportError {
    /// The CSV writer rejected a record or its output.
    Csv(csv::Error),
    /// Buffered output could not be flushed.
    Io(std::io::Error),
    /// Encoded output was not UTF-8.
    Encoding(std::string::FromUtf8Error),
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Csv(e) => write!(f, "delimited text encoding failed: {e}"),
            Self::Io(e) => write!(f, "export output not flushed: {e}"),
            Self::Encoding(e) => write!(f, "export produced invalid UTF-8: {e}"),
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Csv(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::Encoding(e) => Some(e),
        }
    }
}

impl From<csv::Error> for ExportError {
    fn from(e: csv::Error) -> Self {
        Self::Csv(e)
    }
}

/// Delimiter-separated text with RFC 4180 quoting, written through
/// [`csv::Writer`].
///
/// Fields holding the delimiter, a double quote, or a line break are quoted
/// and embedded quotes doubled. Records end with CRLF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelimitedTextSink {
    delimiter: u8,
    include_headers: bool,
}

impl Default for DelimitedTextSink {
    fn default() -> Self {
        Self::csv()
    }
}

impl DelimitedTextSink {
    #[must_use]
    pub fn csv() -> Self {
        Self {
            delimiter: b',',
            include_headers: true,
        }
    }

    #[must_use]
    pub fn tsv() -> Self {
        Self {
            delimiter: b'\t',
            include_headers: true,
        }
    }

    #[must_use]
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    #[must_use]
    pub fn include_headers(mut self, include: bool) -> Self {
        self.include_headers = include;
        self
    }

    /// Encode `snapshot` into any writer, such as an open file.
    pub fn write_to<W: std::io::Write>(
        &self,
        snapshot: &ExportSnapshot,
        out: W,
    ) -> Result<W, ExportError> {
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .terminator(csv::Terminator::CRLF)
            .flexible(true)
            .from_writer(out);
        if self.include_headers {
            wtr.write_record(&snapshot.headers)?;
        }
        for row in &snapshot.rows {
            wtr.write_record(row)?;
        }
        wtr.into_inner().map_err(|e| ExportError::Io(e.into_error()))
    }
}

impl ExportSink for DelimitedTextSink {
    type Artifact = String;
    type Error = ExportError;

    fn export(&self, snapshot: &ExportSnapshot) -> Result<String, ExportError> {
        let bytes = self.write_to(snapshot, Vec::new())?;
        let out = String::from_utf8(bytes).map_err(ExportError::Encoding)?;
        tracing::debug!(
            rows = snapshot.rows.len(),
            bytes = out.len(),
            "exported delimited text"
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use tabula_core::{ColumnDescriptor, PinSide, RowIdResolver, SortEntry};
    use tabula_model::derive;

    fn registry() -> ColumnRegistry<Value> {
        ColumnRegistry::new(vec![
            ColumnDescriptor::field("id").header("ID"),
            ColumnDescriptor::field("title").header("Title"),
            ColumnDescriptor::field("status"),
        ])
        .unwrap()
    }

    fn records() -> Vec<Value> {
        vec![
            json!({"id": 1, "title": "Write, docs", "status": "todo"}),
            json!({"id": 2, "title": "Say \"hi\"", "status": "done"}),
            json!({"id": 3, "title": "Ship", "status": "doing"}),
        ]
    }

    #[test]
    fn csv_quotes_per_rfc_4180() {
        let snapshot = ExportSnapshot {
            headers: vec!["a".into(), "b".into()],
            rows: vec![
                vec!["x,y".into(), "plain".into()],
                vec!["say \"hi\"".into(), "two\nlines".into()],
            ],
        };
        let csv = DelimitedTextSink::csv().export(&snapshot).unwrap();
        assert_eq!(
            csv,
            "a,b\r\n\"x,y\",plain\r\n\"say \"\"hi\"\"\",\"two\nlines\"\r\n"
        );

        let tsv = DelimitedTextSink::tsv()
            .include_headers(false)
            .export(&snapshot)
            .unwrap();
        assert_eq!(tsv.lines().next(), Some("x,y\tplain"));

        let semi = DelimitedTextSink::csv()
            .with_delimiter(b';')
            .export(&snapshot)
            .unwrap();
        assert!(semi.starts_with("a;b\r\nx,y;plain\r\n"));
    }

    #[test]
    fn writes_into_any_io_writer() {
        let snapshot = ExportSnapshot {
            headers: vec!["name".into()],
            rows: vec![vec!["ada".into()], vec!["alan".into()]],
        };
        let buf = DelimitedTextSink::csv()
            .write_to(&snapshot, std::io::Cursor::new(Vec::new()))
            .unwrap()
            .into_inner();
        assert_eq!(buf, b"name\r\nada\r\nalan\r\n");
    }

    #[test]
    fn exports_filtered_rows_in_sorted_order_with_layout_headers() {
        let reg = registry();
        let mut state = TableState::default().normalized(&reg);
        state.sorting = vec![SortEntry::asc("status")];
        state.column_pinning.pin("status", Some(PinSide::Left));
        state.column_visibility.insert("id".into(), false);
        let data = records();
        let model = derive(&data, &state, &reg, &RowIdResolver::default());

        let snapshot = ExportSnapshot::capture(&reg, &state, &model);
        assert_eq!(snapshot.headers, vec!["status", "Title"]);
        let statuses: Vec<&str> = snapshot.rows.iter().map(|r| r[0].as_str()).collect();
        assert_eq!(statuses, vec!["doing", "done", "todo"]);
    }

    #[test]
    fn selection_wins_and_uses_source_order() {
        let reg = registry();
        let mut state = TableState::default().normalized(&reg);
        state.sorting = vec![SortEntry::desc("id")];
        state.row_selection.insert("2");
        state.row_selection.insert("0");
        state.row_selection.insert("gone");
        let data = records();
        let model = derive(&data, &state, &reg, &RowIdResolver::default());

        let snapshot = ExportSnapshot::capture(&reg, &state, &model);
        let ids: Vec<&str> = snapshot.rows.iter().map(|r| r[0].as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
    }
}
