//! CSV file helpers for list rows and dictionary rows.
//!
//! CSV carries no types: every field is read back as a string.

use anyhow::{Context, Result, bail};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::Path;

/// How [`to_csv`] and [`to_csv_dicts`] open the target file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Add rows after any existing content, creating the file if needed.
    #[default]
    Append,
    /// Replace the file.
    Truncate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvWriteOptions {
    pub mode: WriteMode,
    /// Write the first row (or, for dictionary rows, the field-name row).
    pub header: bool,
    pub delimiter: u8,
    pub quote: u8,
}

impl Default for CsvWriteOptions {
    fn default() -> Self {
        Self {
            mode: WriteMode::Append,
            header: true,
            delimiter: b',',
            quote: b'"',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvReadOptions {
    pub delimiter: u8,
    pub quote: u8,
    /// Drop the first row of the file.
    pub skip_header: bool,
}

impl Default for CsvReadOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            skip_header: false,
        }
    }
}

fn open_for_write(path: &Path, mode: WriteMode) -> Result<File> {
    let mut open = OpenOptions::new();
    match mode {
        WriteMode::Append => open.create(true).append(true),
        WriteMode::Truncate => open.create(true).write(true).truncate(true),
    };
    open.open(path)
        .with_context(|| format!("Failed to open {} for writing", path.display()))
}

fn writer(file: File, options: &CsvWriteOptions) -> csv::Writer<File> {
    csv::WriterBuilder::new()
        .delimiter(options.delimiter)
        .quote(options.quote)
        .flexible(true)
        .from_writer(file)
}

/// A dictionary row: `(field name, value)` pairs in column order.
pub type DictRow = Vec<(String, String)>;

/// Writes `rows` to a CSV file. Rows may differ in length but must not be
/// empty: CSV cannot tell a row with no fields from a single empty field.
///
/// With `header` off, the first row of `rows` is skipped. Rows are checked
/// before the file is opened, so a rejected call leaves the file untouched.
#[tracing::instrument(skip(rows, path), fields(path = %path.as_ref().display()))]
pub fn to_csv<I, R, F, P>(rows: I, path: P, options: &CsvWriteOptions) -> Result<()>
where
    I: IntoIterator<Item = R>,
    R: IntoIterator<Item = F>,
    F: AsRef<[u8]>,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let skip = usize::from(!options.header);
    let records: Vec<Vec<F>> = rows
        .into_iter()
        .skip(skip)
        .map(|row| row.into_iter().collect())
        .collect();
    if let Some(index) = records.iter().position(Vec::is_empty) {
        bail!("Row {} has no fields and cannot be written as CSV", index);
    }

    write_records(path, options, None, records)
}

fn write_records<R, F>(
    path: &Path,
    options: &CsvWriteOptions,
    header: Option<Vec<String>>,
    records: Vec<R>,
) -> Result<()>
where
    R: IntoIterator<Item = F>,
    F: AsRef<[u8]>,
{
    let file = open_for_write(path, options.mode)?;
    let has_content = file
        .metadata()
        .with_context(|| format!("Failed to stat {}", path.display()))?
        .len()
        > 0;
    let mut writer = writer(file, options);

    if let Some(header) = header.filter(|_| !has_content) {
        writer
            .write_record(&header)
            .with_context(|| format!("Failed to write CSV header to {}", path.display()))?;
    }
    for record in records {
        writer
            .write_record(record)
            .with_context(|| format!("Failed to write CSV row to {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to flush {}", path.display()))?;
    Ok(())
}

/// Reads every row of a CSV file, in file order.
#[tracing::instrument(skip(path), fields(path = %path.as_ref().display()))]
pub fn read_csv<P: AsRef<Path>>(path: P, options: &CsvReadOptions) -> Result<Vec<Vec<String>>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(options.skip_header)
        .delimiter(options.delimiter)
        .quote(options.quote)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("Failed to read CSV from {}", path.display()))?;
        rows.push(record.iter().map(String::from).collect());
    }
    Ok(rows)
}

/// Writes dictionary rows, one column per entry of `fieldnames`.
///
/// Keys missing from a row produce empty fields; keys not listed in
/// `fieldnames` are an error, reported before the file is opened. The
/// field-name row is written when `header` is on, unless rows are being
/// appended to a non-empty file.
#[tracing::instrument(skip(rows, path, fieldnames), fields(path = %path.as_ref().display()))]
pub fn to_csv_dicts<I, M, K, V, S, P>(
    rows: I,
    path: P,
    fieldnames: &[S],
    options: &CsvWriteOptions,
) -> Result<()>
where
    I: IntoIterator<Item = M>,
    M: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
    S: AsRef<str>,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    if fieldnames.is_empty() {
        bail!("Field names are required to write dictionary rows");
    }

    let mut records = Vec::new();
    for (index, row) in rows.into_iter().enumerate() {
        let mut row: HashMap<String, String> = row
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let record: Vec<String> = fieldnames
            .iter()
            .map(|name| row.remove(name.as_ref()).unwrap_or_default())
            .collect();
        if let Some(extra) = row.keys().next() {
            bail!(
                "Row {} has key {:?} which is not among the field names",
                index,
                extra
            );
        }
        records.push(record);
    }

    let header = options
        .header
        .then(|| fieldnames.iter().map(|name| name.as_ref().to_string()).collect());
    write_records(path, options, header, records)
}

/// Reads dictionary rows, keeping the file's column order.
///
/// With empty `fieldnames` the first row of the file supplies the keys and
/// `skip_header` is ignored; otherwise `fieldnames` are the keys and
/// `skip_header` drops the file's first row. Short rows leave
/// the trailing keys absent, long rows are an error.
pub fn read_csv_dicts<S, P>(
    path: P,
    fieldnames: &[S],
    options: &CsvReadOptions,
) -> Result<Vec<DictRow>>
where
    S: AsRef<str>,
    P: AsRef<Path>,
{
    let path = path.as_ref();

    let (keys, rows): (Vec<String>, Vec<Vec<String>>) = if fieldnames.is_empty() {
        let options = CsvReadOptions {
            skip_header: false,
            ..options.clone()
        };
        let mut rows = read_csv(path, &options)?.into_iter();
        match rows.next() {
            Some(header) => (header, rows.collect()),
            None => return Ok(Vec::new()),
        }
    } else {
        let keys = fieldnames.iter().map(|name| name.as_ref().to_string()).collect();
        (keys, read_csv(path, options)?)
    };

    rows.into_iter()
        .enumerate()
        .map(|(index, row)| {
            if row.len() > keys.len() {
                bail!(
                    "Row {} of {} has {} fields but only {} field names",
                    index,
                    path.display(),
                    row.len(),
                    keys.len()
                );
            }
            Ok(keys.iter().cloned().zip(row).collect())
        })
        .collect()
}
