//! The RowBinary wire format.
//!
//! Values are written one after another with no framing: little-endian fixed-width
//! numbers, varint-prefixed strings and collections, a leading flag byte for
//! nullable values. The `...WithNames` and `...WithNamesAndTypes` variants start
//! with a header row, and `RowBinaryWithDefaults` puts a "use default" flag byte in
//! front of every value.

use std::net::{Ipv4Addr, Ipv6Addr};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chdata_bytes::{I256, U256};
use chdata_common::{DataFormat, Result, error::Error};
use chdata_format::{Column, DataType, Decimal, Value, column::decimal_storage_type};
use chdata_io::{InputStream, OutputStream};
use uuid::Uuid;

use crate::serde::{
    DefaultFlag, Deserializer, DeserializerChain, Flow, NullFlag, SerDe, SerDeProvider,
    Serializer, SerializerChain,
};

/// Discriminator of a NULL `Variant` value.
pub const NULL_DISCRIMINATOR: u8 = 255;

/// Builds RowBinary serializers and deserializers.
#[derive(Debug, Clone, Copy)]
pub struct RowBinarySerDe {
    with_defaults: bool,
}

impl RowBinarySerDe {
    /// # Errors
    ///
    /// `Unsupported` if `format` is not a member of the RowBinary family.
    pub fn new(format: DataFormat) -> Result<RowBinarySerDe> {
        if !format.is_row_binary() {
            return Err(Error::unsupported(format!("format {format}")));
        }
        Ok(RowBinarySerDe {
            with_defaults: format == DataFormat::RowBinaryWithDefaults,
        })
    }
}

impl SerDeProvider for RowBinarySerDe {
    fn serde(&self, column: &Column) -> Result<SerDe> {
        check_supported(column)?;
        let mut deserializer = DeserializerChain::new();
        let mut serializer = SerializerChain::new();
        if self.with_defaults {
            deserializer = deserializer.then(DefaultFlag::new(column.clone()));
            serializer = serializer.then(DefaultFlag::new(column.clone()));
        }
        if column.is_nullable() {
            deserializer = deserializer.then(NullFlag);
            serializer = serializer.then(NullFlag);
        }
        let codec = ValueCodec {
            column: column.clone(),
        };
        Ok(SerDe::new(
            deserializer.then(codec.clone()),
            serializer.then(codec),
        ))
    }
}

/// Encodes the non-null part of a column value.
#[derive(Clone)]
struct ValueCodec {
    column: Column,
}

impl Deserializer for ValueCodec {
    fn deserialize(&self, value: &mut Value, input: &mut InputStream) -> Result<Flow> {
        read_data(&self.column, value, input)?;
        Ok(Flow::Done)
    }
}

impl Serializer for ValueCodec {
    fn serialize(&self, value: &Value, output: &mut OutputStream) -> Result<Flow> {
        write_data(&self.column, value, output)?;
        Ok(Flow::Done)
    }
}

fn check_supported(column: &Column) -> Result<()> {
    match column.data_type() {
        DataType::AggregateFunction
        | DataType::Dynamic
        | DataType::LowCardinality
        | DataType::Nullable => {
            return Err(Error::unsupported(format!(
                "data type {} of column '{column}'",
                column.data_type().name()
            )));
        }
        DataType::FixedString if column.precision() == 0 => {
            return Err(Error::invalid_arg(
                "column",
                format!("FixedString length of '{column}' must be positive"),
            ));
        }
        _ => {}
    }
    column.nested_columns().iter().try_for_each(check_supported)
}

/// Reads the header row of the `...WithNames` formats.
///
/// # Returns
///
/// The column names, and the type descriptors when `with_types` is set.
pub fn read_header(input: &mut InputStream, with_types: bool) -> Result<Vec<(String, Option<String>)>> {
    let count = read_count(input)?;
    let mut names = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        names.push(read_text(input)?);
    }
    let mut header = Vec::with_capacity(names.len());
    for name in names {
        let type_name = if with_types {
            Some(read_text(input)?)
        } else {
            None
        };
        header.push((name, type_name));
    }
    Ok(header)
}

/// Writes the header row: the column count, every name and, when `with_types` is
/// set, every type descriptor.
pub fn write_header(output: &mut OutputStream, columns: &[Column], with_types: bool) -> Result<()> {
    output.write_varint(columns.len() as u64)?;
    for column in columns {
        output.write_string(column.name().as_bytes())?;
    }
    if with_types {
        for column in columns {
            output.write_string(column.original_type_name().as_bytes())?;
        }
    }
    Ok(())
}

fn read_text(input: &mut InputStream) -> Result<String> {
    let bytes = input.read_string()?;
    String::from_utf8(bytes.to_vec())
        .map_err(|e| Error::invalid_format("header", format!("invalid UTF-8: {e}")))
}

fn read_count(input: &mut InputStream) -> Result<usize> {
    let count = input.read_varint()?;
    usize::try_from(count)
        .map_err(|_| Error::invalid_format("length", format!("{count} does not fit in memory")))
}

fn take_items(value: &mut Value) -> Vec<Value> {
    match std::mem::take(value) {
        Value::Array(mut items) | Value::Tuple(mut items) => {
            items.clear();
            items
        }
        _ => Vec::new(),
    }
}

fn take_entries(value: &mut Value) -> Vec<(Value, Value)> {
    match std::mem::take(value) {
        Value::Map(mut entries) => {
            entries.clear();
            entries
        }
        _ => Vec::new(),
    }
}

/// Reads a value nested in a composite column, including its NULL marker.
fn read_element(column: &Column, value: &mut Value, input: &mut InputStream) -> Result<()> {
    if column.is_nullable() && input.read_byte()? != 0 {
        *value = Value::Null;
        return Ok(());
    }
    read_data(column, value, input)
}

fn read_data(column: &Column, value: &mut Value, input: &mut InputStream) -> Result<()> {
    *value = match column.data_type() {
        DataType::Bool => Value::Bool(input.read_u8()? != 0),
        DataType::Int8 => Value::Int8(input.read_i8()?),
        DataType::UInt8 => Value::UInt8(input.read_u8()?),
        DataType::Int16 => Value::Int16(input.read_i16::<LittleEndian>()?),
        DataType::UInt16 => Value::UInt16(input.read_u16::<LittleEndian>()?),
        DataType::Int32 => Value::Int32(input.read_i32::<LittleEndian>()?),
        DataType::UInt32 => Value::UInt32(input.read_u32::<LittleEndian>()?),
        DataType::Int64 => Value::Int64(input.read_i64::<LittleEndian>()?),
        DataType::UInt64 => Value::UInt64(input.read_u64::<LittleEndian>()?),
        DataType::Int128 => Value::Int128(input.read_i128::<LittleEndian>()?),
        DataType::UInt128 => Value::UInt128(input.read_u128::<LittleEndian>()?),
        DataType::Int256 => {
            let mut buf = [0u8; 32];
            input.read_fully(&mut buf)?;
            Value::Int256(I256::from_le_bytes(buf))
        }
        DataType::UInt256 => {
            let mut buf = [0u8; 32];
            input.read_fully(&mut buf)?;
            Value::UInt256(U256::from_le_bytes(buf))
        }
        DataType::BFloat16 => {
            let bits = input.read_u16::<LittleEndian>()?;
            Value::Float32(f32::from_bits((bits as u32) << 16))
        }
        DataType::Float32 => Value::Float32(input.read_f32::<LittleEndian>()?),
        DataType::Float64 => Value::Float64(input.read_f64::<LittleEndian>()?),
        DataType::Date => Value::Date(input.read_u16::<LittleEndian>()? as i32),
        DataType::Date32 => Value::Date(input.read_i32::<LittleEndian>()?),
        DataType::DateTime | DataType::DateTime32 | DataType::DateTime64 => {
            let ticks = match column.datetime_scale() {
                Some(_) => input.read_i64::<LittleEndian>()?,
                None => input.read_u32::<LittleEndian>()? as i64,
            };
            Value::DateTime(column.datetime_value(ticks))
        }
        DataType::Enum | DataType::Enum8 | DataType::Enum16 => match enum_width(column) {
            1 => Value::Enum(input.read_i8()? as i16),
            _ => Value::Enum(input.read_i16::<LittleEndian>()?),
        },
        t if t.is_decimal() => {
            let width = decimal_width(column);
            let mut buf = [0u8; 32];
            input.read_fully(&mut buf[..width])?;
            Value::Decimal(Decimal::new(I256::from_le_slice(&buf[..width]), column.scale()))
        }
        t if t.is_interval() => Value::Interval(input.read_i64::<LittleEndian>()?),
        DataType::UUID => {
            let high = input.read_u64::<LittleEndian>()?;
            let low = input.read_u64::<LittleEndian>()?;
            Value::Uuid(Uuid::from_u64_pair(high, low))
        }
        DataType::IPv4 => Value::Ipv4(Ipv4Addr::from(input.read_u32::<LittleEndian>()?)),
        DataType::IPv6 => {
            let mut octets = [0u8; 16];
            input.read_fully(&mut octets)?;
            Value::Ipv6(Ipv6Addr::from(octets))
        }
        DataType::String | DataType::JSON | DataType::Object => Value::String(input.read_string()?),
        DataType::FixedString => Value::String(input.read_bytes(column.precision() as usize)?),
        DataType::Point
        | DataType::Ring
        | DataType::LineString
        | DataType::Polygon
        | DataType::MultiLineString
        | DataType::MultiPolygon => {
            read_geo(geo_depth(column.data_type()), value, input)?;
            return Ok(());
        }
        DataType::Array => {
            let element = nested(column, 0)?;
            let count = read_count(input)?;
            let mut items = take_items(value);
            items.reserve(count.min(1024));
            for _ in 0..count {
                let mut item = element.new_value();
                read_element(element, &mut item, input)?;
                items.push(item);
            }
            Value::Array(items)
        }
        DataType::Map => {
            let (key_column, value_column) = (nested(column, 0)?, nested(column, 1)?);
            let count = read_count(input)?;
            let mut entries = take_entries(value);
            entries.reserve(count.min(1024));
            for _ in 0..count {
                let mut key = key_column.new_value();
                read_element(key_column, &mut key, input)?;
                let mut item = value_column.new_value();
                read_element(value_column, &mut item, input)?;
                entries.push((key, item));
            }
            Value::Map(entries)
        }
        DataType::Nested => {
            let count = read_count(input)?;
            let mut rows = take_items(value);
            rows.reserve(count.min(1024));
            for _ in 0..count {
                let mut row = Value::Tuple(Vec::new());
                read_fields(column.nested_columns(), &mut row, input)?;
                rows.push(row);
            }
            Value::Array(rows)
        }
        DataType::Tuple => {
            read_fields(column.nested_columns(), value, input)?;
            return Ok(());
        }
        DataType::Variant => {
            let discriminator = input.read_u8()?;
            if discriminator == NULL_DISCRIMINATOR {
                Value::Null
            } else {
                let alternative = column
                    .nested_columns()
                    .get(discriminator as usize)
                    .ok_or_else(|| {
                        Error::invalid_format(
                            column.name(),
                            format!("variant discriminator {discriminator} is out of range"),
                        )
                    })?;
                let mut item = alternative.new_value();
                read_element(alternative, &mut item, input)?;
                item
            }
        }
        DataType::SimpleAggregateFunction => {
            read_element(nested(column, 0)?, value, input)?;
            return Ok(());
        }
        DataType::Nothing => {
            input.read_u8()?;
            Value::Null
        }
        other => return Err(Error::unsupported(format!("data type {}", other.name()))),
    };
    Ok(())
}

fn read_fields(columns: &[Column], value: &mut Value, input: &mut InputStream) -> Result<()> {
    let mut fields = take_items(value);
    for column in columns {
        let mut field = column.new_value();
        read_element(column, &mut field, input)?;
        fields.push(field);
    }
    *value = Value::Tuple(fields);
    Ok(())
}

/// Nesting depth of a geo type: a point is a pair of coordinates, a ring is an
/// array of points, a polygon an array of rings, and so on.
fn geo_depth(data_type: DataType) -> usize {
    match data_type {
        DataType::Point => 0,
        DataType::Ring | DataType::LineString => 1,
        DataType::Polygon | DataType::MultiLineString => 2,
        _ => 3,
    }
}

fn read_geo(depth: usize, value: &mut Value, input: &mut InputStream) -> Result<()> {
    if depth == 0 {
        let x = input.read_f64::<LittleEndian>()?;
        let y = input.read_f64::<LittleEndian>()?;
        *value = Value::Point(x, y);
        return Ok(());
    }
    let count = read_count(input)?;
    let mut items = take_items(value);
    items.reserve(count.min(1024));
    for _ in 0..count {
        let mut item = Value::Null;
        read_geo(depth - 1, &mut item, input)?;
        items.push(item);
    }
    *value = Value::Array(items);
    Ok(())
}

fn nested(column: &Column, index: usize) -> Result<&Column> {
    column.nested_columns().get(index).ok_or_else(|| {
        Error::invalid_arg("column", format!("'{column}' has no nested column #{index}"))
    })
}

fn decimal_width(column: &Column) -> usize {
    match column.data_type() {
        DataType::Decimal => decimal_storage_type(column.precision()).byte_length(),
        other => other.byte_length(),
    }
}

/// Storage width of an enum; a plain `Enum` takes one byte if every constant fits.
fn enum_width(column: &Column) -> usize {
    match column.data_type() {
        DataType::Enum8 => 1,
        DataType::Enum16 => 2,
        _ => {
            let constants = column.enum_constants();
            let fits = |v: Option<i16>| v.is_none_or(|v| i8::try_from(v).is_ok());
            if fits(constants.min_value()) && fits(constants.max_value()) {
                1
            } else {
                2
            }
        }
    }
}

/// Writes a value nested in a composite column, including its NULL marker.
fn write_element(column: &Column, value: &Value, output: &mut OutputStream) -> Result<()> {
    if column.is_nullable() {
        if value.is_null() {
            return output.write_byte(1);
        }
        output.write_byte(0)?;
    }
    write_data(column, value, output)
}

fn mismatch(column: &Column, value: &Value) -> Error {
    let shown: String = format!("{value:?}").chars().take(64).collect();
    Error::invalid_arg("value", format!("{shown} cannot be written to column '{column}'"))
}

fn as_i128(value: &Value) -> Option<i128> {
    match *value {
        Value::Int128(v) => Some(v),
        Value::UInt128(v) => i128::try_from(v).ok(),
        Value::Int256(v) => v.to_i128(),
        Value::UInt256(v) => v.to_u128().and_then(|v| i128::try_from(v).ok()),
        Value::UInt64(v) => Some(v as i128),
        _ => value.as_i64().map(i128::from),
    }
}

/// Converts an integer value to the column's storage type, rejecting values out of range.
fn integer<T: TryFrom<i128>>(column: &Column, value: &Value) -> Result<T> {
    as_i128(value)
        .and_then(|v| T::try_from(v).ok())
        .ok_or_else(|| mismatch(column, value))
}

fn float(column: &Column, value: &Value) -> Result<f64> {
    value.as_f64().ok_or_else(|| mismatch(column, value))
}

/// Rescales ticks from `from` to `to` decimal places.
fn rescale_ticks(ticks: i64, from: u32, to: u32) -> Option<i64> {
    if from <= to {
        10i64
            .checked_pow(to - from)
            .and_then(|factor| ticks.checked_mul(factor))
    } else {
        10i64
            .checked_pow(from - to)
            .map(|factor| ticks.div_euclid(factor))
    }
}

fn write_data(column: &Column, value: &Value, output: &mut OutputStream) -> Result<()> {
    let data_type = column.data_type();
    if value.is_null() && !matches!(data_type, DataType::Nothing | DataType::Variant) {
        return Err(Error::invalid_arg(
            "value",
            format!("NULL cannot be written to non-nullable column '{column}'"),
        ));
    }
    match data_type {
        DataType::Bool => {
            let flag = match value {
                Value::Bool(b) => *b,
                other => integer::<i64>(column, other)? != 0,
            };
            output.write_u8(flag as u8)?;
        }
        DataType::Int8 => output.write_i8(integer(column, value)?)?,
        DataType::UInt8 => output.write_u8(integer(column, value)?)?,
        DataType::Int16 => output.write_i16::<LittleEndian>(integer(column, value)?)?,
        DataType::UInt16 => output.write_u16::<LittleEndian>(integer(column, value)?)?,
        DataType::Int32 => output.write_i32::<LittleEndian>(integer(column, value)?)?,
        DataType::UInt32 => output.write_u32::<LittleEndian>(integer(column, value)?)?,
        DataType::Int64 => output.write_i64::<LittleEndian>(integer(column, value)?)?,
        DataType::UInt64 => output.write_u64::<LittleEndian>(integer(column, value)?)?,
        DataType::Int128 => output.write_i128::<LittleEndian>(integer(column, value)?)?,
        DataType::UInt128 => {
            let v = match value {
                Value::UInt128(v) => *v,
                other => integer(column, other)?,
            };
            output.write_u128::<LittleEndian>(v)?;
        }
        DataType::Int256 => {
            let v = match value {
                Value::Int256(v) => *v,
                other => I256::from(integer::<i128>(column, other)?),
            };
            output.write_bytes(&v.to_le_bytes())?;
        }
        DataType::UInt256 => {
            let v = match value {
                Value::UInt256(v) => *v,
                Value::UInt128(v) => U256::from(*v),
                other => U256::from(integer::<u128>(column, other)?),
            };
            output.write_bytes(&v.to_le_bytes())?;
        }
        DataType::BFloat16 => {
            let bits = (float(column, value)? as f32).to_bits();
            output.write_u16::<LittleEndian>((bits >> 16) as u16)?;
        }
        DataType::Float32 => output.write_f32::<LittleEndian>(float(column, value)? as f32)?,
        DataType::Float64 => output.write_f64::<LittleEndian>(float(column, value)?)?,
        DataType::Date => output.write_u16::<LittleEndian>(integer(column, value)?)?,
        DataType::Date32 => output.write_i32::<LittleEndian>(integer(column, value)?)?,
        DataType::DateTime | DataType::DateTime32 | DataType::DateTime64 => {
            let (ticks, scale) = match value {
                Value::DateTime(dt) => (dt.ticks, dt.scale),
                other => (integer::<i64>(column, other)?, column.datetime_scale().unwrap_or(0)),
            };
            match column.datetime_scale() {
                Some(target) => {
                    let ticks =
                        rescale_ticks(ticks, scale, target).ok_or_else(|| mismatch(column, value))?;
                    output.write_i64::<LittleEndian>(ticks)?;
                }
                None => {
                    let seconds = rescale_ticks(ticks, scale, 0)
                        .and_then(|s| u32::try_from(s).ok())
                        .ok_or_else(|| mismatch(column, value))?;
                    output.write_u32::<LittleEndian>(seconds)?;
                }
            }
        }
        DataType::Enum | DataType::Enum8 | DataType::Enum16 => {
            let constants = column.enum_constants();
            let v = match value {
                Value::Enum(v) => *v,
                Value::String(_) => value
                    .as_str()
                    .and_then(|name| constants.value_of(name))
                    .ok_or_else(|| mismatch(column, value))?,
                other => integer(column, other)?,
            };
            if !constants.is_empty() && !constants.contains_value(v) {
                return Err(mismatch(column, value));
            }
            if enum_width(column) == 1 {
                output.write_i8(i8::try_from(v).map_err(|_| mismatch(column, value))?)?;
            } else {
                output.write_i16::<LittleEndian>(v)?;
            }
        }
        t if t.is_decimal() => {
            let Value::Decimal(decimal) = value else {
                return Err(mismatch(column, value));
            };
            let width = decimal_width(column);
            if decimal.scale != column.scale() || !decimal.unscaled.fits_in(width) {
                return Err(mismatch(column, value));
            }
            output.write_bytes(&decimal.unscaled.to_le_bytes()[..width])?;
        }
        t if t.is_interval() => output.write_i64::<LittleEndian>(integer(column, value)?)?,
        DataType::UUID => {
            let Value::Uuid(uuid) = value else {
                return Err(mismatch(column, value));
            };
            let (high, low) = uuid.as_u64_pair();
            output.write_u64::<LittleEndian>(high)?;
            output.write_u64::<LittleEndian>(low)?;
        }
        DataType::IPv4 => match value {
            Value::Ipv4(addr) => output.write_u32::<LittleEndian>(u32::from(*addr))?,
            other => return Err(mismatch(column, other)),
        },
        DataType::IPv6 => match value {
            Value::Ipv6(addr) => output.write_bytes(&addr.octets())?,
            Value::Ipv4(addr) => output.write_bytes(&addr.to_ipv6_mapped().octets())?,
            other => return Err(mismatch(column, other)),
        },
        DataType::String | DataType::JSON | DataType::Object => {
            let bytes = value.as_bytes().ok_or_else(|| mismatch(column, value))?;
            output.write_string(bytes)?;
        }
        DataType::FixedString => {
            let bytes = value.as_bytes().ok_or_else(|| mismatch(column, value))?;
            output.write_fixed(bytes, column.precision() as usize)?;
        }
        DataType::Point
        | DataType::Ring
        | DataType::LineString
        | DataType::Polygon
        | DataType::MultiLineString
        | DataType::MultiPolygon => write_geo(column, geo_depth(data_type), value, output)?,
        DataType::Array => {
            let element = nested(column, 0)?;
            let items = value.as_slice().ok_or_else(|| mismatch(column, value))?;
            output.write_varint(items.len() as u64)?;
            for item in items {
                write_element(element, item, output)?;
            }
        }
        DataType::Map => {
            let (key_column, value_column) = (nested(column, 0)?, nested(column, 1)?);
            let entries = value.as_map().ok_or_else(|| mismatch(column, value))?;
            output.write_varint(entries.len() as u64)?;
            for (key, item) in entries {
                write_element(key_column, key, output)?;
                write_element(value_column, item, output)?;
            }
        }
        DataType::Nested => {
            let Value::Array(rows) = value else {
                return Err(mismatch(column, value));
            };
            output.write_varint(rows.len() as u64)?;
            for row in rows {
                write_fields(column, row, output)?;
            }
        }
        DataType::Tuple => write_fields(column, value, output)?,
        DataType::Variant => {
            if value.is_null() {
                output.write_u8(NULL_DISCRIMINATOR)?;
            } else {
                let ordinal = column
                    .variant_ordinal(value)
                    .ok_or_else(|| mismatch(column, value))?;
                output.write_u8(ordinal as u8)?;
                write_element(&column.nested_columns()[ordinal], value, output)?;
            }
        }
        DataType::SimpleAggregateFunction => write_element(nested(column, 0)?, value, output)?,
        DataType::Nothing => output.write_u8(0)?,
        other => return Err(Error::unsupported(format!("data type {}", other.name()))),
    }
    Ok(())
}

fn write_fields(column: &Column, value: &Value, output: &mut OutputStream) -> Result<()> {
    let fields = match value {
        Value::Tuple(fields) if fields.len() == column.nested_columns().len() => fields,
        other => return Err(mismatch(column, other)),
    };
    for (field_column, field) in column.nested_columns().iter().zip(fields) {
        write_element(field_column, field, output)?;
    }
    Ok(())
}

fn write_geo(column: &Column, depth: usize, value: &Value, output: &mut OutputStream) -> Result<()> {
    match (depth, value) {
        (0, Value::Point(x, y)) => {
            output.write_f64::<LittleEndian>(*x)?;
            output.write_f64::<LittleEndian>(*y)?;
        }
        (d, Value::Array(items)) if d > 0 => {
            output.write_varint(items.len() as u64)?;
            for item in items {
                write_geo(column, d - 1, item, output)?;
            }
        }
        _ => return Err(mismatch(column, value)),
    }
    Ok(())
}
