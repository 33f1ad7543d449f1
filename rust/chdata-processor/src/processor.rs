//! Row-at-a-time and value-at-a-time reading and writing over a column list.

use chdata_common::{DataConfig, DataFormat, FreezableMap, Result, error::Error, verify_arg};
use chdata_format::{Column, Value, ValueHolder};
use chdata_io::{InputStream, OutputStream};

use crate::{
    record::{ColumnIndex, Record},
    row_binary::{self, RowBinarySerDe},
    serde::{SerDe, SerDeProvider},
};

/// Name of the column used when neither the caller nor the stream names any.
pub const DEFAULT_COLUMN_NAME: &str = "results";
/// Type of the column used when neither the caller nor the stream names any.
pub const DEFAULT_COLUMN_TYPE: &str = "Nullable(String)";

/// Returns the serializer/deserializer factory for `format`.
///
/// # Errors
///
/// `Unsupported` for formats outside the RowBinary family.
pub fn serde_provider(format: DataFormat) -> Result<Box<dyn SerDeProvider>> {
    if format.is_row_binary() {
        Ok(Box::new(RowBinarySerDe::new(format)?))
    } else {
        Err(Error::unsupported(format!("format {format}")))
    }
}

pub fn default_columns() -> Result<Vec<Column>> {
    Ok(vec![Column::of(DEFAULT_COLUMN_NAME, DEFAULT_COLUMN_TYPE)?])
}

/// Collects the streams, columns and settings of a [`DataProcessor`].
pub struct DataProcessorBuilder {
    config: DataConfig,
    input: Option<InputStream>,
    output: Option<OutputStream>,
    columns: Option<Vec<Column>>,
    settings: FreezableMap<String, String>,
}

impl DataProcessorBuilder {
    pub fn input(mut self, input: InputStream) -> Self {
        self.input = Some(input);
        self
    }

    pub fn output(mut self, output: OutputStream) -> Self {
        self.output = Some(output);
        self
    }

    /// Columns to read or write. Without them, columns come from the stream header
    /// when the format has one.
    pub fn columns(mut self, columns: Vec<Column>) -> Self {
        self.columns = Some(columns);
        self
    }

    pub fn setting(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    pub fn settings<K, V>(self, entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.settings
            .extend(entries.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Resolves the columns and builds the processor.
    ///
    /// For formats with a header, the header is read from the input (and checked
    /// against the given columns, if any) and written to the output.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if neither an input nor an output stream is set.
    /// - `Unsupported` if the format or a column type has no serializer.
    /// - `Configuration` if columns must come from a header that carries no types.
    pub fn build(self) -> Result<DataProcessor> {
        let DataProcessorBuilder {
            config,
            mut input,
            mut output,
            columns,
            settings,
        } = self;
        if input.is_none() && output.is_none() {
            return Err(Error::invalid_arg(
                "input",
                "one of input and output stream must be set",
            ));
        }
        let format = config.format;
        let provider = serde_provider(format)?;
        settings.freeze();

        let header = match input.as_mut() {
            Some(input) if format.has_names() => {
                if input.has_remaining()? {
                    Some(row_binary::read_header(input, format.has_types())?)
                } else {
                    None
                }
            }
            _ => None,
        };
        let mut columns = match (columns.filter(|c| !c.is_empty()), header) {
            (Some(columns), Some(header)) => {
                if header.len() != columns.len() {
                    return Err(Error::invalid_format(
                        "header",
                        format!(
                            "stream has {} columns but {} were given",
                            header.len(),
                            columns.len()
                        ),
                    ));
                }
                columns
            }
            (Some(columns), None) => columns,
            (None, Some(header)) => columns_from_header(format, header)?,
            (None, None) => Vec::new(),
        };
        if columns.is_empty() {
            columns = default_columns()?;
        }
        let count = columns.len();
        for (index, column) in columns.iter_mut().enumerate() {
            column.set_column_index(index, count);
        }

        if let Some(output) = output.as_mut()
            && format.has_names()
        {
            row_binary::write_header(output, &columns, format.has_types())?;
        }

        let serdes = columns
            .iter()
            .map(|column| provider.serde(column))
            .collect::<Result<Vec<_>>>()?;
        let templates: Vec<Value> = columns.iter().map(Column::new_value).collect();
        let index = ColumnIndex::new(&columns);
        let record = Record::new(index.clone(), templates.copy());

        log::debug!(
            "created {format} processor: {count} columns, reuse values: {}, input: {}, output: {}",
            config.reuse_value_wrapper,
            input.is_some(),
            output.is_some()
        );

        Ok(DataProcessor {
            config,
            settings,
            input,
            output,
            columns,
            serdes,
            templates,
            index,
            record,
            read_position: 0,
            write_position: 0,
            values_read: 0,
            values_written: 0,
            rows_read: 0,
            finished: false,
        })
    }
}

fn columns_from_header(
    format: DataFormat,
    header: Vec<(String, Option<String>)>,
) -> Result<Vec<Column>> {
    header
        .into_iter()
        .map(|(name, type_name)| match type_name {
            Some(type_name) => Column::of(&name, &type_name),
            None => Err(Error::configuration(format!(
                "columns must be given to read {format}: the header has no types"
            ))),
        })
        .collect()
}

/// Reads and writes values of an ordered column list through the column's
/// serializers.
///
/// The read and write cursors each point at the column the next value belongs to
/// and wrap back to 0 after the last column, which marks a row boundary.
///
/// With `reuse_value_wrapper` set, decoded values are written into the same holders
/// row after row, so a reference returned by [`next_record`](Self::next_record) or
/// [`next_value`](Self::next_value) is only valid until the next call. Otherwise
/// every row is decoded into fresh holders.
pub struct DataProcessor {
    config: DataConfig,
    settings: FreezableMap<String, String>,
    input: Option<InputStream>,
    output: Option<OutputStream>,
    columns: Vec<Column>,
    serdes: Vec<SerDe>,
    templates: Vec<Value>,
    index: ColumnIndex,
    record: Record,
    read_position: usize,
    write_position: usize,
    values_read: usize,
    values_written: usize,
    rows_read: usize,
    finished: bool,
}

impl DataProcessor {
    pub fn builder(config: DataConfig) -> DataProcessorBuilder {
        DataProcessorBuilder {
            config,
            input: None,
            output: None,
            columns: None,
            settings: FreezableMap::new(),
        }
    }

    /// A processor reading `input`, with columns from its header or the default.
    pub fn reader(config: DataConfig, input: InputStream) -> Result<DataProcessor> {
        DataProcessor::builder(config).input(input).build()
    }

    pub fn writer(
        config: DataConfig,
        output: OutputStream,
        columns: Vec<Column>,
    ) -> Result<DataProcessor> {
        DataProcessor::builder(config)
            .output(output)
            .columns(columns)
            .build()
    }

    pub fn config(&self) -> &DataConfig {
        &self.config
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Settings given at construction; the map is frozen.
    pub fn settings(&self) -> &FreezableMap<String, String> {
        &self.settings
    }

    pub fn setting(&self, key: &str) -> Option<String> {
        self.settings.get(key)
    }

    pub fn read_position(&self) -> usize {
        self.read_position
    }

    pub fn write_position(&self) -> usize {
        self.write_position
    }

    pub fn input_mut(&mut self) -> Option<&mut InputStream> {
        self.input.as_mut()
    }

    pub fn output_mut(&mut self) -> Option<&mut OutputStream> {
        self.output.as_mut()
    }

    /// Decodes the rest of the current row into the record.
    ///
    /// # Returns
    ///
    /// The record, or `None` once the input ends at a row boundary.
    ///
    /// # Errors
    ///
    /// - `StreamCorruption` if the input ends inside a row.
    /// - `ColumnRead` if a value cannot be decoded.
    /// - `Configuration` if there is no input stream.
    pub fn next_record(&mut self) -> Result<Option<&Record>> {
        if self.finished {
            return Ok(None);
        }
        self.start_row();
        let input = self.input.as_mut().ok_or_else(no_input)?;
        let mut cursor = Cursor {
            serdes: &self.serdes,
            columns: &self.columns,
            position: &mut self.read_position,
            values_read: &mut self.values_read,
        };
        let start = *cursor.position;
        let mut ended = false;
        for value in &mut self.record.values_mut()[start..] {
            if !cursor.decode(input, value)? {
                ended = true;
                break;
            }
        }
        if ended {
            self.finish()?;
            return Ok(None);
        }
        self.rows_read += 1;
        Ok(Some(&self.record))
    }

    /// Decodes the value at the read cursor and advances the cursor by one.
    ///
    /// # Returns
    ///
    /// The value, or `None` once the input ends at a row boundary.
    pub fn next_value(&mut self) -> Result<Option<&Value>> {
        if self.finished {
            return Ok(None);
        }
        self.start_row();
        let input = self.input.as_mut().ok_or_else(no_input)?;
        let position = self.read_position;
        let mut cursor = Cursor {
            serdes: &self.serdes,
            columns: &self.columns,
            position: &mut self.read_position,
            values_read: &mut self.values_read,
        };
        if !cursor.decode(input, &mut self.record.values_mut()[position])? {
            self.finish()?;
            return Ok(None);
        }
        if self.read_position == 0 {
            self.rows_read += 1;
        }
        Ok(Some(&self.record[position]))
    }

    /// Prepares the holders of a row that starts at the read cursor: reused holders are
    /// reset, otherwise the row gets fresh copies of the templates. Both the row and the
    /// value path decode into the same record.
    fn start_row(&mut self) {
        if self.read_position != 0 {
            return;
        }
        if self.config.reuse_value_wrapper {
            self.record.reset();
        } else {
            self.record = Record::new(self.index.clone(), self.templates.copy());
        }
    }

    /// Decodes the value at the read cursor into a caller-owned holder.
    ///
    /// # Returns
    ///
    /// `false` once the input ends at a row boundary.
    pub fn read_into(&mut self, value: &mut Value) -> Result<bool> {
        if self.finished {
            return Ok(false);
        }
        let input = self.input.as_mut().ok_or_else(no_input)?;
        let mut cursor = Cursor {
            serdes: &self.serdes,
            columns: &self.columns,
            position: &mut self.read_position,
            values_read: &mut self.values_read,
        };
        if !cursor.decode(input, value)? {
            self.finish()?;
            return Ok(false);
        }
        if self.read_position == 0 {
            self.rows_read += 1;
        }
        Ok(true)
    }

    /// Iterates over the remaining rows, handing out owned records.
    pub fn records(&mut self) -> Records<'_> {
        Records { processor: self }
    }

    /// Iterates over the remaining values, handing out owned values.
    pub fn values(&mut self) -> Values<'_> {
        Values { processor: self }
    }

    fn next_owned_record(&mut self) -> Result<Option<Record>> {
        if self.next_record()?.is_none() {
            return Ok(None);
        }
        if self.config.reuse_value_wrapper {
            Ok(Some(self.record.clone()))
        } else {
            let empty = Record::new(self.index.clone(), Vec::new());
            Ok(Some(std::mem::replace(&mut self.record, empty)))
        }
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        log::debug!(
            "reached end of data after {} rows ({} values)",
            self.rows_read,
            self.values_read
        );
        match self.input.as_mut() {
            Some(input) => input.close(),
            None => Ok(()),
        }
    }

    /// Encodes `value` as the value of the column at the write cursor and advances
    /// the cursor by one.
    ///
    /// # Errors
    ///
    /// - `Configuration` if there is no output stream.
    /// - `InvalidArgument` if the value does not fit the column.
    pub fn write(&mut self, value: &Value) -> Result<()> {
        let output = self.output.as_mut().ok_or_else(no_output)?;
        let position = self.write_position;
        self.serdes[position].serialize(value, output)?;
        self.values_written += 1;
        self.write_position = if position + 1 >= self.columns.len() {
            0
        } else {
            position + 1
        };
        Ok(())
    }

    /// Encodes one complete row.
    ///
    /// # Errors
    ///
    /// `InvalidOperation` if a row was partially written with [`write`](Self::write),
    /// `InvalidArgument` if `values` does not have one value per column.
    pub fn write_record(&mut self, values: &[Value]) -> Result<()> {
        if self.write_position != 0 {
            return Err(Error::invalid_operation("write_record in the middle of a row"));
        }
        verify_arg!(values, values.len() == self.columns.len());
        values.iter().try_for_each(|value| self.write(value))
    }

    pub fn flush(&mut self) -> Result<()> {
        self.output.as_mut().ok_or_else(no_output)?.flush()
    }

    /// Closes both streams. Closing the output finishes compression and seals the
    /// sink, so the written data is only complete after this call.
    pub fn close(&mut self) -> Result<()> {
        let input = self.input.as_mut().map_or(Ok(()), InputStream::close);
        let output = self.output.as_mut().map_or(Ok(()), OutputStream::close);
        log::debug!(
            "closed processor: {} rows read, {} values written",
            self.rows_read,
            self.values_written
        );
        input.and(output)
    }

    /// Consumes the processor, returning its streams unclosed.
    pub fn into_streams(self) -> (Option<InputStream>, Option<OutputStream>) {
        (self.input, self.output)
    }
}

fn no_input() -> Error {
    Error::configuration("no input stream available to read")
}

fn no_output() -> Error {
    Error::configuration("no output stream available to write")
}

/// The read cursor with the column state it needs, borrowed apart from the value
/// holders it fills.
struct Cursor<'a> {
    serdes: &'a [SerDe],
    columns: &'a [Column],
    position: &'a mut usize,
    values_read: &'a mut usize,
}

impl Cursor<'_> {
    /// Decodes one value and advances the cursor.
    ///
    /// Returns `false` if the input has no bytes left at a row boundary. Running out
    /// of bytes anywhere else means the stream was cut off inside a row.
    fn decode(&mut self, input: &mut InputStream, value: &mut Value) -> Result<bool> {
        let position = *self.position;
        let column = &self.columns[position];
        let count = self.columns.len();
        if position == 0 && !input.has_remaining()? {
            return Ok(false);
        }
        match self.serdes[position].deserialize(value, input) {
            Ok(()) => {
                *self.values_read += 1;
                *self.position = if position + 1 >= count { 0 } else { position + 1 };
                Ok(true)
            }
            Err(e) if e.is_end_of_stream() => Err(Error::stream_corruption(
                *self.values_read,
                position,
                count,
                column.to_string(),
            )),
            Err(e) => Err(Error::column_read(position, count, column.to_string(), e)),
        }
    }
}

/// Iterator over the remaining rows of a [`DataProcessor`].
pub struct Records<'a> {
    processor: &'a mut DataProcessor,
}

impl Iterator for Records<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        chdata_common::try_or_ret_some_err!(self.processor.next_owned_record()).map(Ok)
    }
}

/// Iterator over the remaining values of a [`DataProcessor`], row after row.
pub struct Values<'a> {
    processor: &'a mut DataProcessor,
}

impl Iterator for Values<'_> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        chdata_common::try_or_ret_some_err!(self.processor.next_value())
            .cloned()
            .map(Ok)
    }
}
