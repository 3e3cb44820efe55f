//! Delimited-text codec driven by an explicit schema.
//!
//! Each record type declares a [`SchemaMapping`]: an ordered list of
//! `(column name, field name)` pairs. Reading resolves the declared columns
//! against the header row by name, so column order in the file does not
//! matter; writing emits the columns in declaration order.

use std::io;

use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("column '{0}' is missing from the header row")]
    MissingColumn(&'static str),

    #[error("line {line}: invalid value for {field}: {message}")]
    InvalidField {
        line: u64,
        field: &'static str,
        message: String,
    },

    #[error("record type does not declare field '{0}'")]
    UndeclaredField(&'static str),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

/// Associates one logical column with one record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMapping {
    pub column: &'static str,
    pub field: &'static str,
}

/// Declared column layout of a record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaMapping {
    columns: Vec<ColumnMapping>,
}

impl SchemaMapping {
    pub fn new(pairs: &[(&'static str, &'static str)]) -> Self {
        Self {
            columns: pairs
                .iter()
                .map(|&(column, field)| ColumnMapping { column, field })
                .collect(),
        }
    }

    pub fn columns(&self) -> &[ColumnMapping] {
        &self.columns
    }

    pub fn header(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.column).collect()
    }

    /// Position of every declared column within `headers`, in declaration order.
    fn resolve(&self, headers: &StringRecord) -> Result<Vec<usize>, CodecError> {
        self.columns
            .iter()
            .map(|mapping| {
                headers
                    .iter()
                    .position(|h| h == mapping.column)
                    .ok_or(CodecError::MissingColumn(mapping.column))
            })
            .collect()
    }
}

/// A parsed row, addressed by field name.
pub struct MappedRow<'a> {
    schema: &'a SchemaMapping,
    indices: &'a [usize],
    record: &'a StringRecord,
    line: u64,
}

impl<'a> MappedRow<'a> {
    pub fn get(&self, field: &'static str) -> Result<&'a str, CodecError> {
        let slot = self
            .schema
            .columns
            .iter()
            .position(|c| c.field == field)
            .ok_or(CodecError::UndeclaredField(field))?;
        Ok(self.record.get(self.indices[slot]).unwrap_or(""))
    }

    pub fn line(&self) -> u64 {
        self.line
    }

    pub fn invalid(&self, field: &'static str, message: impl Into<String>) -> CodecError {
        CodecError::InvalidField {
            line: self.line,
            field,
            message: message.into(),
        }
    }
}

/// A record type that can be read from and written to delimited text.
pub trait TabularRecord: Sized {
    fn schema() -> SchemaMapping;

    fn from_row(row: &MappedRow<'_>) -> Result<Self, CodecError>;

    /// Values in the order of [`TabularRecord::schema`].
    fn to_row(&self) -> Vec<String>;
}

/// Read every record of `T` from `reader`.
///
/// An input without a header row (an empty object) yields no records. Rows
/// whose field count differs from the header are rejected.
pub fn read_typed<T, R>(reader: R, delimiter: u8) -> Result<Vec<T>, CodecError>
where
    T: TabularRecord,
    R: io::Read,
{
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(false)
        .trim(Trim::Headers)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    if headers.is_empty() {
        return Ok(Vec::new());
    }

    let schema = T::schema();
    let indices = schema.resolve(&headers)?;

    let mut records = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let row = MappedRow {
            schema: &schema,
            indices: &indices,
            record: &record,
            line,
        };
        records.push(T::from_row(&row)?);
    }
    Ok(records)
}

/// Write a header row followed by `records` to `writer`.
pub fn write_typed<T, W>(records: &[T], writer: W, delimiter: u8) -> Result<(), CodecError>
where
    T: TabularRecord,
    W: io::Write,
{
    let mut wtr = WriterBuilder::new().delimiter(delimiter).from_writer(writer);
    wtr.write_record(T::schema().header())?;
    for record in records {
        wtr.write_record(record.to_row())?;
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}
