#![forbid(unsafe_code)]

//! Import and export.
//!
//! CSV ingestion infers cell kinds per column (int, then float, then bool,
//! then text) and maps a configurable token set to missing. Reads can be
//! chunked: [`ChunkedReader`] yields one table per batch of rows without
//! holding the whole file, with default row labels continuing across
//! chunks.
//!
//! Snapshots are a framed binary format: magic, version byte, SHA-256
//! digest, then a JSON payload of the container. The digest is verified
//! before deserialization.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, StringRecordsIntoIter, WriterBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use trellis_column::Column;
use trellis_frame::{FrameError, Table};
use trellis_index::Index;
use trellis_types::Value;

#[derive(Debug, Error)]
pub enum IoError {
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("row {row} has {got} fields, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        got: usize,
    },
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("written csv is not utf-8")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("not a trellis snapshot")]
    BadMagic,
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u8),
    #[error("snapshot digest mismatch, payload is corrupt")]
    DigestMismatch,
}

/// Tokens read as missing when no custom set is given.
pub const DEFAULT_MISSING_TOKENS: [&str; 4] = ["", "NA", "NaN", "null"];

/// Import options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOptions {
    pub delimiter: u8,
    /// Treat the first record as column names.
    pub has_header: bool,
    /// Explicit column names, overriding the header row. Without either,
    /// names are synthesized as "0", "1", ...
    pub column_names: Option<Vec<String>>,
    /// Data rows to discard before reading.
    pub skip_rows: usize,
    /// Stop after this many data rows.
    pub limit: Option<usize>,
    /// Promote this column to the row index after reading.
    pub index_column: Option<String>,
    pub missing_tokens: Vec<String>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            has_header: true,
            column_names: None,
            skip_rows: 0,
            limit: None,
            index_column: None,
            missing_tokens: DEFAULT_MISSING_TOKENS
                .iter()
                .map(|t| (*t).to_owned())
                .collect(),
        }
    }
}

impl ReadOptions {
    #[must_use]
    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    #[must_use]
    pub fn without_header(mut self) -> Self {
        self.has_header = false;
        self
    }

    #[must_use]
    pub fn column_names(mut self, names: Vec<String>) -> Self {
        self.column_names = Some(names);
        self
    }

    #[must_use]
    pub fn skip_rows(mut self, n: usize) -> Self {
        self.skip_rows = n;
        self
    }

    #[must_use]
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    #[must_use]
    pub fn index_column(mut self, name: &str) -> Self {
        self.index_column = Some(name.to_owned());
        self
    }

    /// Extra tokens read as missing, on top of the defaults.
    #[must_use]
    pub fn missing_tokens(mut self, tokens: &[&str]) -> Self {
        self.missing_tokens
            .extend(tokens.iter().map(|t| (*t).to_owned()));
        self
    }
}

/// Parse one CSV cell: missing token, then int, then float, then bool,
/// then text. A parsed NaN counts as missing.
#[must_use]
pub fn parse_cell(text: &str, missing_tokens: &[String]) -> Value {
    let trimmed = text.trim();
    if missing_tokens.iter().any(|token| token == trimmed) {
        return Value::Missing;
    }
    if let Ok(v) = trimmed.parse::<i64>() {
        return Value::Int(v);
    }
    if let Ok(v) = trimmed.parse::<f64>() {
        if v.is_nan() {
            return Value::Missing;
        }
        return Value::Float(v);
    }
    match trimmed {
        "true" | "True" | "TRUE" => Value::Bool(true),
        "false" | "False" | "FALSE" => Value::Bool(false),
        _ => Value::Text(trimmed.to_owned()),
    }
}

fn batch_to_table(
    headers: &[String],
    rows: Vec<Vec<Value>>,
    start_label: i64,
    index_column: Option<&str>,
) -> Result<Table, IoError> {
    let mut columns = Vec::with_capacity(headers.len());
    for (position, name) in headers.iter().enumerate() {
        let values: Vec<Value> = rows.iter().map(|row| row[position].clone()).collect();
        // heterogeneous cells fall back to a text column, as CSV demands
        columns.push((name.clone(), Column::from_values_promoted(values)));
    }
    let index = Index::from_range(start_label, start_label + rows.len() as i64, 1);
    let table = Table::new(index, columns).map_err(IoError::Frame)?;
    match index_column {
        Some(name) => Ok(table.set_index(name, false)?),
        None => Ok(table),
    }
}

/// Forward-only chunked CSV reader: an iterator of tables, one per batch
/// of up to `chunk_size` rows. Default row labels continue across chunks.
pub struct ChunkedReader<R: Read> {
    records: StringRecordsIntoIter<R>,
    headers: Vec<String>,
    pending: Option<StringRecord>,
    missing_tokens: Vec<String>,
    index_column: Option<String>,
    chunk_size: usize,
    next_label: i64,
    remaining: Option<usize>,
    row: usize,
    done: bool,
}

impl<R: Read> ChunkedReader<R> {
    pub fn new(reader: R, options: &ReadOptions, chunk_size: usize) -> Result<Self, IoError> {
        let mut csv_reader = ReaderBuilder::new()
            .delimiter(options.delimiter)
            .has_headers(options.has_header)
            .flexible(true)
            .from_reader(reader);

        let mut headers = options.column_names.clone();
        if options.has_header {
            let record = csv_reader.headers()?.clone();
            if headers.is_none() {
                headers = Some(record.iter().map(str::to_owned).collect());
            }
        }

        let mut records = csv_reader.into_records();
        for _ in 0..options.skip_rows {
            if records.next().transpose()?.is_none() {
                break;
            }
        }

        // without a header or explicit names, the first data record fixes
        // the width and is replayed as data
        let mut pending = None;
        let headers = match headers {
            Some(headers) => headers,
            None => match records.next().transpose()? {
                Some(record) => {
                    let synthesized = (0..record.len()).map(|i| i.to_string()).collect();
                    pending = Some(record);
                    synthesized
                }
                None => Vec::new(),
            },
        };

        Ok(Self {
            records,
            headers,
            pending,
            missing_tokens: options.missing_tokens.clone(),
            index_column: options.index_column.clone(),
            chunk_size: chunk_size.max(1),
            next_label: 0,
            remaining: options.limit,
            row: 0,
            done: false,
        })
    }

    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    fn read_chunk(&mut self) -> Result<Option<Table>, IoError> {
        let mut rows: Vec<Vec<Value>> = Vec::new();
        while rows.len() < self.chunk_size {
            if matches!(self.remaining, Some(0)) {
                break;
            }
            let record = match self.pending.take() {
                Some(record) => record,
                None => match self.records.next().transpose()? {
                    Some(record) => record,
                    None => break,
                },
            };
            self.row += 1;
            if record.len() != self.headers.len() {
                return Err(IoError::RaggedRow {
                    row: self.row,
                    expected: self.headers.len(),
                    got: record.len(),
                });
            }
            rows.push(
                record
                    .iter()
                    .map(|cell| parse_cell(cell, &self.missing_tokens))
                    .collect(),
            );
            if let Some(remaining) = self.remaining.as_mut() {
                *remaining -= 1;
            }
        }

        if rows.is_empty() {
            return Ok(None);
        }
        let start = self.next_label;
        self.next_label += rows.len() as i64;
        batch_to_table(&self.headers, rows, start, self.index_column.as_deref()).map(Some)
    }
}

impl ChunkedReader<File> {
    pub fn from_path(
        path: &Path,
        options: &ReadOptions,
        chunk_size: usize,
    ) -> Result<Self, IoError> {
        Self::new(File::open(path)?, options, chunk_size)
    }
}

impl<R: Read> Iterator for ChunkedReader<R> {
    type Item = Result<Table, IoError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_chunk() {
            Ok(Some(table)) => Some(Ok(table)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

pub fn read_table_str(data: &str, options: &ReadOptions) -> Result<Table, IoError> {
    let mut reader = ChunkedReader::new(data.as_bytes(), options, usize::MAX)?;
    match reader.next() {
        Some(result) => result,
        None => {
            let headers = reader.headers().to_vec();
            batch_to_table(&headers, Vec::new(), 0, options.index_column.as_deref())
        }
    }
}

pub fn read_table_path(path: &Path, options: &ReadOptions) -> Result<Table, IoError> {
    let mut reader = ChunkedReader::from_path(path, options, usize::MAX)?;
    match reader.next() {
        Some(result) => result,
        None => {
            let headers = reader.headers().to_vec();
            batch_to_table(&headers, Vec::new(), 0, options.index_column.as_deref())
        }
    }
}

/// Export options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOptions {
    pub delimiter: u8,
    /// Emit the row labels as the leading column(s).
    pub include_index: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            include_index: true,
        }
    }
}

impl WriteOptions {
    #[must_use]
    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    #[must_use]
    pub fn without_index(mut self) -> Self {
        self.include_index = false;
        self
    }
}

fn write_table_to<W: Write>(
    table: &Table,
    options: &WriteOptions,
    writer: W,
) -> Result<(), IoError> {
    let mut csv_writer = WriterBuilder::new()
        .delimiter(options.delimiter)
        .from_writer(writer);

    let arity = table.index().arity();
    let mut header: Vec<String> = Vec::new();
    if options.include_index {
        for level in 0..arity {
            header.push(
                table
                    .index()
                    .names()
                    .get(level)
                    .cloned()
                    .flatten()
                    .unwrap_or_default(),
            );
        }
    }
    header.extend(table.column_names().iter().cloned());
    csv_writer.write_record(&header)?;

    let views: Vec<_> = table.views().collect();
    for (row, key) in table.index().keys().iter().enumerate() {
        let mut record: Vec<String> = Vec::with_capacity(header.len());
        if options.include_index {
            for level in key.levels() {
                record.push(level.to_string());
            }
        }
        for view in &views {
            record.push(view.values()[row].render());
        }
        csv_writer.write_record(&record)?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_table_string(table: &Table, options: &WriteOptions) -> Result<String, IoError> {
    let mut buffer = Vec::new();
    write_table_to(table, options, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

pub fn write_table_path(
    table: &Table,
    path: &Path,
    options: &WriteOptions,
) -> Result<(), IoError> {
    write_table_to(table, options, File::create(path)?)
}

// ── Snapshots ──────────────────────────────────────────────────────────

const SNAPSHOT_MAGIC: &[u8; 4] = b"TRLS";
const SNAPSHOT_VERSION: u8 = 1;
const SNAPSHOT_HEADER_LEN: usize = 4 + 1 + 32;

/// Frame a container into the snapshot format. Works for any
/// serializable container, vectors and tables alike.
pub fn snapshot_to_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, IoError> {
    let payload = serde_json::to_vec(value)?;
    let digest = Sha256::digest(&payload);
    let mut out = Vec::with_capacity(SNAPSHOT_HEADER_LEN + payload.len());
    out.extend_from_slice(SNAPSHOT_MAGIC);
    out.push(SNAPSHOT_VERSION);
    out.extend_from_slice(&digest);
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Verify the frame and digest, then rebuild the container.
pub fn snapshot_from_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, IoError> {
    if bytes.len() < SNAPSHOT_HEADER_LEN || &bytes[..4] != SNAPSHOT_MAGIC {
        return Err(IoError::BadMagic);
    }
    let version = bytes[4];
    if version != SNAPSHOT_VERSION {
        return Err(IoError::UnsupportedVersion(version));
    }
    let (stored_digest, payload) = bytes[5..].split_at(32);
    let digest = Sha256::digest(payload);
    if digest.as_slice() != stored_digest {
        return Err(IoError::DigestMismatch);
    }
    Ok(serde_json::from_slice(payload)?)
}

pub fn write_snapshot<T: Serialize>(value: &T, path: &Path) -> Result<(), IoError> {
    let bytes = snapshot_to_bytes(value)?;
    let mut file = File::create(path)?;
    file.write_all(&bytes)?;
    Ok(())
}

pub fn read_snapshot<T: DeserializeOwned>(path: &Path) -> Result<T, IoError> {
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;
    snapshot_from_bytes(&bytes)
}

#[cfg(test)]
mod tests {
    use super::{
        parse_cell, read_table_path, read_table_str, snapshot_from_bytes, snapshot_to_bytes,
        write_snapshot, write_table_path, write_table_string, ChunkedReader, IoError, ReadOptions,
        WriteOptions,
    };
    use trellis_frame::{Table, Vector};
    use trellis_index::Key;
    use trellis_types::{Kind, Value};

    fn tokens() -> Vec<String> {
        ReadOptions::default().missing_tokens
    }

    #[test]
    fn cell_parsing_tries_int_float_bool_text() {
        let tokens = tokens();
        assert_eq!(parse_cell("42", &tokens), Value::Int(42));
        assert_eq!(parse_cell("-3", &tokens), Value::Int(-3));
        assert_eq!(parse_cell("2.5", &tokens), Value::Float(2.5));
        assert_eq!(parse_cell("true", &tokens), Value::Bool(true));
        assert_eq!(parse_cell("False", &tokens), Value::Bool(false));
        assert_eq!(parse_cell("gut", &tokens), Value::Text("gut".into()));
        assert_eq!(parse_cell(" 7 ", &tokens), Value::Int(7));
    }

    #[test]
    fn missing_tokens_become_missing_cells() {
        let tokens = tokens();
        assert!(parse_cell("", &tokens).is_missing());
        assert!(parse_cell("NA", &tokens).is_missing());
        assert!(parse_cell("null", &tokens).is_missing());
        assert!(parse_cell("nan", &tokens).is_missing());
    }

    #[test]
    fn read_infers_column_kinds() {
        let data = "phylum,counts,abundance\nFirmicutes,632,0.6\nProteobacteria,1638,1.6\n";
        let table = read_table_str(data, &ReadOptions::default()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.column("phylum").unwrap().kind(), Kind::Text);
        assert_eq!(table.column("counts").unwrap().kind(), Kind::Int);
        assert_eq!(table.column("abundance").unwrap().kind(), Kind::Float);
        assert_eq!(table.index().keys(), &[Key::Int(0), Key::Int(1)]);
    }

    #[test]
    fn index_column_becomes_the_row_labels() {
        let data = "phylum,counts\nFirmicutes,632\nBacteroidetes,115\n";
        let options = ReadOptions::default().index_column("phylum");
        let table = read_table_str(data, &options).unwrap();
        assert_eq!(
            table.index().keys(),
            &[Key::from("Firmicutes"), Key::from("Bacteroidetes")]
        );
        assert_eq!(table.column_names(), &["counts".to_owned()]);
    }

    #[test]
    fn headerless_reads_synthesize_names() {
        let data = "1,a\n2,b\n";
        let table = read_table_str(data, &ReadOptions::default().without_header()).unwrap();
        assert_eq!(table.column_names(), &["0".to_owned(), "1".to_owned()]);
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.column("0").unwrap().values(),
            &[Value::Int(1), Value::Int(2)]
        );
    }

    #[test]
    fn explicit_names_override_the_header() {
        let data = "a,b\n1,2\n";
        let options = ReadOptions::default().column_names(vec!["x".to_owned(), "y".to_owned()]);
        let table = read_table_str(data, &options).unwrap();
        assert_eq!(table.column_names(), &["x".to_owned(), "y".to_owned()]);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn skip_and_limit_trim_the_rows() {
        let data = "v\n1\n2\n3\n4\n5\n";
        let options = ReadOptions::default().skip_rows(1).limit(2);
        let table = read_table_str(data, &options).unwrap();
        assert_eq!(
            table.column("v").unwrap().values(),
            &[Value::Int(2), Value::Int(3)]
        );
    }

    #[test]
    fn custom_missing_tokens_extend_the_defaults() {
        let data = "v\n-999\n7\nNA\n";
        let options = ReadOptions::default().missing_tokens(&["-999"]);
        let table = read_table_str(data, &options).unwrap();
        let v = table.column("v").unwrap();
        assert!(v.values()[0].is_missing());
        assert_eq!(v.values()[1], Value::Int(7));
        assert!(v.values()[2].is_missing());
    }

    #[test]
    fn mixed_cells_fall_back_to_a_text_column() {
        let data = "v\n1\nx\n";
        let table = read_table_str(data, &ReadOptions::default()).unwrap();
        let v = table.column("v").unwrap();
        assert_eq!(v.kind(), Kind::Text);
        assert_eq!(v.values()[0], Value::Text("1".into()));
    }

    #[test]
    fn ragged_rows_are_rejected_with_their_row_number() {
        let data = "a,b\n1,2\n3\n";
        let err = read_table_str(data, &ReadOptions::default()).expect_err("ragged");
        match err {
            IoError::RaggedRow { row, expected, got } => {
                assert_eq!(row, 2);
                assert_eq!(expected, 2);
                assert_eq!(got, 1);
            }
            other => panic!("expected ragged-row error, got {other}"),
        }
    }

    #[test]
    fn chunked_reads_continue_row_labels() {
        let data = "v\n10\n20\n30\n40\n50\n";
        let reader = ChunkedReader::new(data.as_bytes(), &ReadOptions::default(), 2).unwrap();
        let chunks: Vec<Table> = reader.collect::<Result<_, _>>().unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 2);
        assert_eq!(chunks[2].len(), 1);
        assert_eq!(chunks[1].index().keys(), &[Key::Int(2), Key::Int(3)]);
        assert_eq!(chunks[2].index().keys(), &[Key::Int(4)]);
    }

    #[test]
    fn chunked_reads_honor_the_limit() {
        let data = "v\n1\n2\n3\n4\n";
        let reader =
            ChunkedReader::new(data.as_bytes(), &ReadOptions::default().limit(3), 2).unwrap();
        let chunks: Vec<Table> = reader.collect::<Result<_, _>>().unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len() + chunks[1].len(), 3);
    }

    #[test]
    fn empty_input_yields_an_empty_table_with_headers() {
        let table = read_table_str("a,b\n", &ReadOptions::default()).unwrap();
        assert_eq!(table.len(), 0);
        assert_eq!(table.column_names(), &["a".to_owned(), "b".to_owned()]);
    }

    #[test]
    fn csv_round_trip_through_a_string() {
        let data = "phylum,counts\nFirmicutes,632\nProteobacteria,1638\n";
        let options = ReadOptions::default().index_column("phylum");
        let table = read_table_str(data, &options).unwrap();

        let written = write_table_string(&table, &WriteOptions::default()).unwrap();
        assert_eq!(written, data);

        let back = read_table_str(&written, &options).unwrap();
        assert!(table.same_as(&back));
    }

    #[test]
    fn missing_cells_write_as_empty_fields() {
        let data = "v,w\n1,x\nNA,y\n";
        let table = read_table_str(data, &ReadOptions::default()).unwrap();
        let written =
            write_table_string(&table, &WriteOptions::default().without_index()).unwrap();
        assert_eq!(written, "v,w\n1,x\n,y\n");
    }

    #[test]
    fn file_round_trip_with_tempfile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taxa.csv");
        let data = "phylum,counts\nFirmicutes,632\nBacteroidetes,115\n";
        let options = ReadOptions::default().index_column("phylum");
        let table = read_table_str(data, &options).unwrap();

        write_table_path(&table, &path, &WriteOptions::default()).unwrap();
        let back = read_table_path(&path, &options).unwrap();
        assert!(table.same_as(&back));
    }

    #[test]
    fn snapshot_round_trip_preserves_the_table() {
        let data = "phylum,counts,abundance\nFirmicutes,632,0.6\nProteobacteria,1638,NA\n";
        let table = read_table_str(data, &ReadOptions::default()).unwrap();

        let bytes = snapshot_to_bytes(&table).unwrap();
        let back: Table = snapshot_from_bytes(&bytes).unwrap();
        assert!(table.same_as(&back));
    }

    #[test]
    fn snapshot_round_trip_preserves_a_vector() {
        let vector = Vector::from_values(
            Some("counts"),
            vec![Key::from("a"), Key::from("b")],
            vec![Value::Int(1), Value::Missing],
        )
        .unwrap();
        let bytes = snapshot_to_bytes(&vector).unwrap();
        let back: Vector = snapshot_from_bytes(&bytes).unwrap();
        assert!(vector.same_as(&back));
    }

    #[test]
    fn tampered_snapshots_are_rejected() {
        let table = read_table_str("v\n1\n", &ReadOptions::default()).unwrap();
        let mut bytes = snapshot_to_bytes(&table).unwrap();

        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert!(matches!(
            snapshot_from_bytes::<Table>(&bytes),
            Err(IoError::DigestMismatch)
        ));

        bytes[0] = b'X';
        assert!(matches!(
            snapshot_from_bytes::<Table>(&bytes),
            Err(IoError::BadMagic)
        ));

        assert!(matches!(
            snapshot_from_bytes::<Table>(&[0, 1, 2]),
            Err(IoError::BadMagic)
        ));
    }

    #[test]
    fn snapshot_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.trellis");
        let table = read_table_str("v\n1\n2\n", &ReadOptions::default()).unwrap();
        write_snapshot(&table, &path).unwrap();
        let back: Table = super::read_snapshot(&path).unwrap();
        assert!(table.same_as(&back));
    }
}
