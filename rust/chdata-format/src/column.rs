//! Column metadata and the type descriptor parser.
//!
//! A descriptor such as `Array(Nullable(Decimal(18, 4)))` parses into a tree of
//! [`Column`]s. `LowCardinality(...)` and `Nullable(...)` set flags on the column they
//! wrap instead of producing a node. Structural types own their nested columns:
//!
//! | Type | Nested columns |
//! |---|---|
//! | `Array` | exactly 1 |
//! | `Map` | exactly 2, key and value |
//! | `Tuple`, `Nested`, `Object`, `Variant` | at least 1 |
//! | `AggregateFunction`, `SimpleAggregateFunction` | at least 1 after the function |
//!
//! Leaf types read a name (possibly several words, such as `DOUBLE PRECISION`), an
//! optional parameter list and trailing modifiers: `NULL`, `NOT NULL`, or a stop word
//! (`ALIAS`, `CODEC`, `DEFAULT`, `MATERIALIZED`, `TTL`) that ends the descriptor.

use chdata_common::{Result, error::Error};

use crate::{
    aggregate_function::AggregateFunction,
    data_type::DataType,
    enum_constants::EnumConstants,
    scanner::{self, read_name_or_quoted_string, take_string},
    value::{DateTime, Value},
};

const KEYWORD_LOW_CARDINALITY: &str = "LowCardinality";
const KEYWORD_NULLABLE: &str = "Nullable";
const KEYWORD_AGGREGATE_FUNCTION: &str = "AggregateFunction";
const KEYWORD_SIMPLE_AGGREGATE_FUNCTION: &str = "SimpleAggregateFunction";
const KEYWORD_ARRAY: &str = "Array";
const KEYWORD_MAP: &str = "Map";
const KEYWORD_NESTED: &str = "Nested";
const KEYWORD_TUPLE: &str = "Tuple";
const KEYWORD_OBJECT: &str = "Object";
const KEYWORD_VARIANT: &str = "Variant";

const STOP_WORDS: [&str; 5] = ["ALIAS", "CODEC", "DEFAULT", "MATERIALIZED", "TTL"];

const MISSING_NESTED_TYPE: &str = "Missing nested data type";

/// Deepest array nesting tracked by [`Column::array_level`].
const MAX_ARRAY_LEVEL: usize = 255;

/// The resolved type of one field.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    original_type_name: String,
    data_type: DataType,
    aggregate_function: Option<AggregateFunction>,
    nullable: bool,
    low_cardinality: bool,
    parameters: Vec<String>,
    nested: Vec<Column>,
    precision: u32,
    scale: u32,
    time_zone: Option<String>,
    enum_constants: EnumConstants,
    array_level: usize,
    fixed_byte_length: bool,
    estimated_byte_length: usize,
    column_index: usize,
    column_count: usize,
    template: Value,
}

impl Column {
    fn new(
        data_type: DataType,
        name: &str,
        original_type_name: &str,
        nullable: bool,
        low_cardinality: bool,
        parameters: Vec<String>,
        nested: Vec<Column>,
    ) -> Column {
        let original_type_name = original_type_name.trim();
        Column {
            name: name.to_string(),
            original_type_name: if original_type_name.is_empty() {
                data_type.name().to_string()
            } else {
                original_type_name.to_string()
            },
            data_type,
            aggregate_function: None,
            nullable,
            low_cardinality,
            parameters,
            nested,
            precision: 0,
            scale: 0,
            time_zone: None,
            enum_constants: EnumConstants::empty(),
            array_level: 0,
            fixed_byte_length: false,
            estimated_byte_length: 0,
            column_index: 0,
            column_count: 1,
            template: Value::Null,
        }
    }

    /// Parses a single column from its name and type descriptor.
    ///
    /// # Errors
    ///
    /// Returns a parse error for malformed descriptors, nested arity violations and
    /// unknown type or function names.
    pub fn of(name: &str, type_descriptor: &str) -> Result<Column> {
        let mut list = Vec::with_capacity(1);
        read_column(type_descriptor, 0, type_descriptor.len(), name, &mut list)?;
        list.pop()
            .ok_or_else(|| Error::parse(type_descriptor, 0, "Failed to parse given column"))
    }

    /// Creates a column of a parameterless type.
    pub fn of_type(name: &str, data_type: DataType, nullable: bool) -> Result<Column> {
        let mut column = Column::new(data_type, name, "", nullable, false, Vec::new(), Vec::new());
        column.update(0)?;
        Ok(column)
    }

    /// Parses a comma-separated list of `name type` pairs, as in
    /// `id UInt32, name Nullable(String)`. Column indexes are assigned in order.
    pub fn parse(columns: &str) -> Result<Vec<Column>> {
        let bytes = columns.as_bytes();
        let len = columns.len();
        let mut list = Vec::new();
        let mut name: Option<String> = None;
        let mut has_type = false;
        let mut builder = Vec::new();
        let mut i = 0;
        while i < len {
            if bytes[i].is_ascii_whitespace() {
                i += 1;
                continue;
            }
            match name.as_deref() {
                None => {
                    i = read_name_or_quoted_string(columns, i, len, &mut builder)?;
                    name = Some(take_string(&mut builder));
                }
                Some(n) if !has_type => {
                    i = read_column(columns, i, len, n, &mut list)?;
                    has_type = true;
                }
                Some(_) => {
                    i = scanner::skip_contents_until(columns, i, len, b",")?;
                    name = None;
                    has_type = false;
                }
            }
        }

        let count = list.len();
        for (index, column) in list.iter_mut().enumerate() {
            column.set_column_index(index, count);
        }
        Ok(list)
    }

    /// Sets the zero-based position of this column within its row.
    pub fn set_column_index(&mut self, index: usize, count: usize) {
        self.column_count = count.max(1);
        self.column_index = index.min(self.column_count - 1);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The descriptor text this column was parsed from.
    pub fn original_type_name(&self) -> &str {
        &self.original_type_name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn aggregate_function(&self) -> Option<AggregateFunction> {
        self.aggregate_function
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_low_cardinality(&self) -> bool {
        self.low_cardinality
    }

    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    pub fn nested_columns(&self) -> &[Column] {
        &self.nested
    }

    pub fn precision(&self) -> u32 {
        self.precision
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    pub fn time_zone(&self) -> Option<&str> {
        self.time_zone.as_deref()
    }

    pub fn enum_constants(&self) -> &EnumConstants {
        &self.enum_constants
    }

    pub fn column_index(&self) -> usize {
        self.column_index
    }

    pub fn column_count(&self) -> usize {
        self.column_count
    }

    pub fn is_first_column(&self) -> bool {
        self.column_index == 0
    }

    pub fn is_last_column(&self) -> bool {
        self.column_index + 1 == self.column_count
    }

    /// Whether every value of this column has the same encoded size.
    pub fn is_fixed_length(&self) -> bool {
        self.fixed_byte_length
    }

    /// Encoded size of a value, exact for fixed-length columns and a lower bound
    /// otherwise.
    pub fn estimated_byte_length(&self) -> usize {
        self.estimated_byte_length
    }

    pub fn is_array(&self) -> bool {
        self.data_type == DataType::Array
    }

    pub fn is_map(&self) -> bool {
        self.data_type == DataType::Map
    }

    pub fn is_tuple(&self) -> bool {
        self.data_type == DataType::Tuple
    }

    pub fn is_enum(&self) -> bool {
        self.data_type.is_enum()
    }

    /// How many `Array` levels wrap the innermost element; 0 for non-arrays.
    pub fn array_level(&self) -> usize {
        self.array_level
    }

    /// The innermost non-array column of an array column.
    pub fn array_base_column(&self) -> Option<&Column> {
        if !self.is_array() {
            return None;
        }
        let mut base = self.nested.first()?;
        for _ in 1..self.array_level {
            match base.nested.first() {
                Some(inner) if base.is_array() => base = inner,
                _ => break,
            }
        }
        Some(base)
    }

    pub fn key_column(&self) -> Option<&Column> {
        self.is_map().then(|| self.nested.first()).flatten()
    }

    pub fn value_column(&self) -> Option<&Column> {
        self.is_map().then(|| self.nested.get(1)).flatten()
    }

    /// Returns a fresh value holder for this column.
    pub fn new_value(&self) -> Value {
        self.template.clone()
    }

    /// Returns `true` if `value` has a shape this column can encode.
    pub fn accepts(&self, value: &Value) -> bool {
        if value.is_null() {
            return self.nullable || self.data_type == DataType::Nothing;
        }
        match (self.data_type, value) {
            (DataType::Bool, Value::Bool(_))
            | (DataType::Int8, Value::Int8(_))
            | (DataType::UInt8, Value::UInt8(_))
            | (DataType::Int16, Value::Int16(_))
            | (DataType::UInt16, Value::UInt16(_))
            | (DataType::Int32, Value::Int32(_))
            | (DataType::UInt32, Value::UInt32(_))
            | (DataType::Int64, Value::Int64(_))
            | (DataType::UInt64, Value::UInt64(_))
            | (DataType::Int128, Value::Int128(_))
            | (DataType::UInt128, Value::UInt128(_))
            | (DataType::Int256, Value::Int256(_))
            | (DataType::UInt256, Value::UInt256(_))
            | (DataType::BFloat16 | DataType::Float32, Value::Float32(_))
            | (DataType::Float64, Value::Float64(_))
            | (DataType::Date | DataType::Date32, Value::Date(_))
            | (DataType::DateTime | DataType::DateTime32 | DataType::DateTime64, Value::DateTime(_))
            | (DataType::UUID, Value::Uuid(_))
            | (DataType::IPv4, Value::Ipv4(_))
            | (DataType::IPv6, Value::Ipv6(_))
            | (DataType::Point, Value::Point(..)) => true,
            (t, Value::Decimal(_)) => t.is_decimal(),
            (t, Value::Interval(_)) => t.is_interval(),
            (t, Value::Enum(v)) => t.is_enum() && self.enum_constants.contains_value(*v),
            (
                DataType::String
                | DataType::FixedString
                | DataType::JSON
                | DataType::Object
                | DataType::SimpleAggregateFunction
                | DataType::AggregateFunction,
                Value::String(_),
            ) => true,
            (DataType::Array, Value::Array(items)) => match (self.nested.first(), items.first()) {
                (Some(element), Some(first)) => element.accepts(first),
                _ => true,
            },
            (
                DataType::Ring
                | DataType::LineString
                | DataType::Polygon
                | DataType::MultiLineString
                | DataType::MultiPolygon
                | DataType::Nested,
                Value::Array(_),
            ) => true,
            (DataType::Map, Value::Map(entries)) => match entries.first() {
                Some((k, v)) => {
                    self.key_column().is_some_and(|c| c.accepts(k))
                        && self.value_column().is_some_and(|c| c.accepts(v))
                }
                None => true,
            },
            (DataType::Tuple, Value::Tuple(items)) => {
                items.len() == self.nested.len()
                    && self.nested.iter().zip(items).all(|(c, v)| c.accepts(v))
            }
            (DataType::Variant, _) => self.variant_ordinal(value).is_some(),
            _ => false,
        }
    }

    /// Picks the alternative of a `Variant` column that can hold `value`.
    ///
    /// Alternatives are sorted by type name, so the ordinal is also the wire
    /// discriminator.
    pub fn variant_ordinal(&self, value: &Value) -> Option<usize> {
        if self.data_type != DataType::Variant || value.is_null() {
            return None;
        }
        self.nested.iter().position(|c| c.accepts(value))
    }

    /// Computes the attributes that depend on the data type and its parameters.
    ///
    /// `estimated` is the size accumulated so far by the parser.
    fn update(&mut self, estimated: usize) -> Result<()> {
        self.estimated_byte_length = estimated;
        self.precision = self.data_type.max_precision();
        let size = self.parameters.len();
        match self.data_type {
            DataType::Array => {
                if let Some(mut base) = self.nested.first() {
                    self.array_level = 1;
                    while self.array_level < MAX_ARRAY_LEVEL && base.is_array() {
                        match base.nested.first() {
                            Some(inner) => {
                                self.array_level += 1;
                                base = inner;
                            }
                            None => break,
                        }
                    }
                }
                self.template = Value::Array(Vec::new());
            }
            DataType::Enum | DataType::Enum8 | DataType::Enum16 => {
                self.enum_constants = EnumConstants::parse(&self.parameters)?;
            }
            DataType::DateTime => {
                if size >= 2 {
                    if !self.nullable {
                        self.estimated_byte_length += DataType::DateTime64.byte_length();
                    }
                    self.scale = self.int_parameter(0)?;
                    self.time_zone = Some(self.time_zone_parameter(1));
                } else if size == 1 {
                    if !self.nullable {
                        self.estimated_byte_length += DataType::DateTime32.byte_length();
                    }
                    self.time_zone = Some(self.time_zone_parameter(0));
                }
            }
            DataType::DateTime32 => {
                if size > 0 {
                    self.time_zone = Some(self.time_zone_parameter(0));
                }
            }
            DataType::DateTime64 => {
                if size > 0 {
                    self.scale = self.int_parameter(0)?;
                }
                if size > 1 {
                    self.time_zone = Some(self.time_zone_parameter(1));
                }
            }
            DataType::Decimal => {
                if size >= 2 {
                    self.precision = self.int_parameter(0)?;
                    self.scale = self.int_parameter(1)?;
                    if !self.nullable {
                        self.estimated_byte_length +=
                            decimal_storage_type(self.precision).byte_length();
                    }
                }
            }
            DataType::Decimal32 | DataType::Decimal64 | DataType::Decimal128 | DataType::Decimal256 => {
                if size > 0 {
                    self.scale = self.int_parameter(0)?;
                }
            }
            DataType::FixedString => {
                if size > 0 {
                    self.precision = self.int_parameter(0)?;
                    if !self.nullable {
                        self.estimated_byte_length += self.precision as usize;
                    }
                }
            }
            DataType::Object | DataType::JSON | DataType::String => {
                self.fixed_byte_length = false;
                if !self.nullable {
                    self.estimated_byte_length += 1;
                }
            }
            DataType::Point => self.template = Value::Point(0.0, 0.0),
            DataType::Ring
            | DataType::LineString
            | DataType::Polygon
            | DataType::MultiLineString
            | DataType::MultiPolygon
            | DataType::Nested => self.template = Value::Array(Vec::new()),
            DataType::Map => self.template = Value::Map(Vec::new()),
            DataType::Tuple => self.template = Value::Tuple(Vec::new()),
            _ => {}
        }
        if self.data_type.is_decimal() && self.scale > self.precision {
            return Err(Error::parse(
                self.original_type_name.as_str(),
                0,
                format!("Scale {} exceeds precision {}", self.scale, self.precision),
            ));
        }
        if matches!(self.data_type, DataType::DateTime | DataType::DateTime64)
            && self.scale > self.data_type.max_scale()
        {
            return Err(Error::parse(
                self.original_type_name.as_str(),
                0,
                format!("Scale {} exceeds {}", self.scale, self.data_type.max_scale()),
            ));
        }
        Ok(())
    }

    fn int_parameter(&self, index: usize) -> Result<u32> {
        let param = &self.parameters[index];
        param.trim().parse::<u32>().map_err(|_| {
            Error::parse(
                self.original_type_name.as_str(),
                0,
                format!("Invalid numeric parameter '{param}'"),
            )
        })
    }

    fn time_zone_parameter(&self, index: usize) -> String {
        self.parameters[index].replace('\'', "").trim().to_string()
    }

    /// Tick scale of a `DateTime64`, or of a `DateTime` declared with one.
    pub fn datetime_scale(&self) -> Option<u32> {
        match self.data_type {
            DataType::DateTime64 => Some(self.scale),
            DataType::DateTime if self.parameters.len() >= 2 => Some(self.scale),
            _ => None,
        }
    }

    /// The value a `DateTime` column decodes `ticks` into.
    pub fn datetime_value(&self, ticks: i64) -> DateTime {
        DateTime {
            ticks,
            scale: self.datetime_scale().unwrap_or(0),
        }
    }
}

impl std::fmt::Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.name.is_empty() {
            write!(f, "column{} {}", self.column_index, self.original_type_name)
        } else if is_bare_name(&self.name) {
            write!(f, "{} {}", self.name, self.original_type_name)
        } else {
            let escaped = self.name.replace('\\', "\\\\").replace('`', "``");
            write!(f, "`{escaped}` {}", self.original_type_name)
        }
    }
}

/// Whether `name` reads back as a single unquoted word.
fn is_bare_name(name: &str) -> bool {
    !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.')
}

/// The fixed-width decimal type that stores a `Decimal(precision, _)`.
pub fn decimal_storage_type(precision: u32) -> DataType {
    if precision > DataType::Decimal128.max_scale() {
        DataType::Decimal256
    } else if precision > DataType::Decimal64.max_scale() {
        DataType::Decimal128
    } else if precision > DataType::Decimal32.max_scale() {
        DataType::Decimal64
    } else {
        DataType::Decimal32
    }
}

/// Whether `keyword` starts at `i` as a whole word.
fn starts_with_at(args: &str, i: usize, keyword: &str) -> bool {
    let Some(rest) = args.as_bytes().get(i..) else {
        return false;
    };
    rest.starts_with(keyword.as_bytes())
        && rest
            .get(keyword.len())
            .is_none_or(|&ch| !ch.is_ascii_alphanumeric() && ch != b'_')
}

/// Index of the first `(` at or after `from` and before `len`.
fn find_open_bracket(args: &str, from: usize, len: usize, missing: &str) -> Result<usize> {
    args.as_bytes()
        .get(from..len)
        .and_then(|rest| rest.iter().position(|&b| b == b'('))
        .map(|p| from + p)
        .ok_or_else(|| Error::parse(args, from, missing))
}

fn unknown_type(args: &str, position: usize, name: &str) -> Error {
    Error::parse(args, position, format!("Unknown data type: {}", name.trim()))
}

/// Reads nested columns separated by commas between `from` and the closing bracket
/// at `end - 1`.
fn read_nested_list(args: &str, from: usize, end: usize) -> Result<Vec<Column>> {
    let bytes = args.as_bytes();
    let mut nested = Vec::new();
    let mut i = from;
    while i < end {
        let ch = bytes[i];
        if ch == b')' {
            break;
        } else if ch != b',' && !ch.is_ascii_whitespace() {
            i = read_column(args, i, end, "", &mut nested)?;
            continue;
        }
        i += 1;
    }
    Ok(nested)
}

/// Parses one column starting at `start` and appends it to `list`.
///
/// # Returns
///
/// The index where parsing stopped: a separating comma, a closing bracket that does
/// not belong to this column, or `len`.
fn read_column(args: &str, start: usize, len: usize, name: &str, list: &mut Vec<Column>) -> Result<usize> {
    let bytes = args.as_bytes();
    let mut i = start;
    let mut brackets = 0usize;
    let mut nullable = false;
    let mut low_cardinality = false;
    let mut fixed_length = true;
    let mut estimated_length = 0usize;

    if starts_with_at(args, i, KEYWORD_LOW_CARDINALITY) {
        low_cardinality = true;
        i = find_open_bracket(args, i + KEYWORD_LOW_CARDINALITY.len(), len, MISSING_NESTED_TYPE)? + 1;
        brackets += 1;
    }
    if starts_with_at(args, i, KEYWORD_NULLABLE) {
        nullable = true;
        i = find_open_bracket(args, i + KEYWORD_NULLABLE.len(), len, MISSING_NESTED_TYPE)? + 1;
        brackets += 1;
    }

    let mut column = if let Some(keyword) = [KEYWORD_AGGREGATE_FUNCTION, KEYWORD_SIMPLE_AGGREGATE_FUNCTION]
        .into_iter()
        .find(|k| starts_with_at(args, i, k))
    {
        let index = find_open_bracket(args, i + keyword.len(), len, "Missing function parameters")?;
        let mut params = Vec::new();
        i = scanner::read_parameters(args, index, len, &mut params)?;

        let mut function = None;
        if keyword == KEYWORD_AGGREGATE_FUNCTION {
            let head = params.first().map(String::as_str).unwrap_or("");
            let fname = head.split('(').next().unwrap_or(head).trim();
            function = Some(AggregateFunction::lookup(fname).ok_or_else(|| {
                Error::parse(args, index, format!("Unknown aggregate function: {fname}"))
            })?);
        }
        let nested = params
            .iter()
            .skip(1)
            .map(|p| Column::of("", p))
            .collect::<Result<Vec<_>>>()?;
        if nested.is_empty() {
            return Err(Error::parse(
                args,
                index,
                format!("{keyword} should have at least one nested column"),
            ));
        }
        let data_type = if keyword == KEYWORD_AGGREGATE_FUNCTION {
            DataType::AggregateFunction
        } else {
            DataType::SimpleAggregateFunction
        };
        let mut column = Column::new(
            data_type,
            name,
            &args[start..i],
            nullable,
            low_cardinality,
            params,
            nested,
        );
        column.aggregate_function = function;
        fixed_length = false;
        estimated_length += 1;
        Some(column)
    } else if starts_with_at(args, i, KEYWORD_ARRAY) || starts_with_at(args, i, KEYWORD_MAP) {
        let (data_type, keyword, arity) = if starts_with_at(args, i, KEYWORD_ARRAY) {
            (DataType::Array, KEYWORD_ARRAY, 1)
        } else {
            (DataType::Map, KEYWORD_MAP, 2)
        };
        let index = find_open_bracket(args, i + keyword.len(), len, MISSING_NESTED_TYPE)?;
        let end = scanner::skip_brackets(args, index, len, b'(')?;
        let nested = read_nested_list(args, index + 1, end)?;
        if nested.len() != arity {
            let message = if data_type == DataType::Array {
                format!(
                    "Array can have one and only one nested column, but we got: {}",
                    nested.len()
                )
            } else {
                format!(
                    "Map should have two nested columns(key and value), but we got: {}",
                    nested.len()
                )
            };
            return Err(Error::parse(args, index, message));
        }
        i = end;
        fixed_length = false;
        estimated_length += 1;
        Some(Column::new(
            data_type,
            name,
            &args[start..end],
            nullable,
            low_cardinality,
            Vec::new(),
            nested,
        ))
    } else if starts_with_at(args, i, KEYWORD_NESTED) {
        let index = find_open_bracket(args, i + KEYWORD_NESTED.len(), len, MISSING_NESTED_TYPE)?;
        i = scanner::skip_brackets(args, index, len, b'(')?;
        let nested = Column::parse(&args[index + 1..i - 1])?;
        if nested.is_empty() {
            return Err(Error::parse(
                args,
                index,
                "Nested should have at least one nested column",
            ));
        }
        fixed_length = false;
        estimated_length += 1;
        Some(Column::new(
            DataType::Nested,
            name,
            &args[start..i],
            nullable,
            low_cardinality,
            Vec::new(),
            nested,
        ))
    } else if let Some((data_type, keyword)) = [
        (DataType::Tuple, KEYWORD_TUPLE),
        (DataType::Object, KEYWORD_OBJECT),
        (DataType::Variant, KEYWORD_VARIANT),
    ]
    .into_iter()
    .find(|(_, k)| starts_with_at(args, i, k))
    {
        let index = find_open_bracket(args, i + keyword.len(), len, MISSING_NESTED_TYPE)?;
        let end = scanner::skip_brackets(args, index, len, b'(')?;
        let mut nested = read_nested_list(args, index + 1, end)?;
        if nested.is_empty() {
            return Err(Error::parse(
                args,
                index,
                format!("{keyword} should have at least one nested column"),
            ));
        }
        if data_type == DataType::Variant {
            nested.sort_by(|a, b| a.data_type.name().cmp(b.data_type.name()));
            for column in nested.iter_mut() {
                column.name = format!("v.{}", column.data_type.name());
            }
        }
        let count = nested.len();
        for (index, column) in nested.iter_mut().enumerate() {
            column.set_column_index(index, count);
            estimated_length += column.estimated_byte_length;
            if !column.fixed_byte_length {
                fixed_length = false;
            }
        }
        i = end;
        Some(Column::new(
            data_type,
            name,
            &args[start..end],
            nullable,
            low_cardinality,
            Vec::new(),
            nested,
        ))
    } else {
        None
    };

    if let Some(column) = column.as_mut().filter(|_| brackets > 0) {
        i = close_brackets(args, i, len, brackets)?;
        brackets = 0;
        column.original_type_name = args[start..i].trim().to_string();
    }

    if column.is_none() {
        let mut builder = Vec::new();
        let type_start = i;
        i = read_name_or_quoted_string(args, i, len, &mut builder)?;
        let mut type_name = take_string(&mut builder);
        let mut params = Vec::new();
        let mut end = None;
        while i < len {
            let ch = bytes[i];
            if ch == b'(' {
                i = scanner::read_parameters(args, i, len, &mut params)?;
                continue;
            } else if ch == b')' {
                if brackets > 0 {
                    brackets -= 1;
                    if brackets == 0 {
                        i += 1;
                        break;
                    }
                } else {
                    break;
                }
            } else if ch == b',' {
                break;
            } else if !ch.is_ascii_whitespace() {
                let modifier_start = i;
                i = read_name_or_quoted_string(args, i, len, &mut builder)?;
                let mut modifier = take_string(&mut builder);
                let mut normalized = modifier.to_uppercase();
                let starts_with_not = normalized == "NOT";
                if starts_with_not {
                    i = read_name_or_quoted_string(args, i, len, &mut builder)?;
                    modifier = take_string(&mut builder);
                    normalized = modifier.to_uppercase();
                }

                if normalized == "NULL" {
                    if nullable {
                        return Err(Error::parse(
                            args,
                            modifier_start,
                            "Nullable and NULL cannot be used together",
                        ));
                    }
                    nullable = !starts_with_not;
                    end = Some(skip_to_separator(args, i, len)?);
                    break;
                } else if starts_with_not {
                    return Err(Error::parse(args, modifier_start, "Expect keyword NULL after NOT"));
                } else if STOP_WORDS.contains(&normalized.as_str()) {
                    end = Some(skip_to_separator(args, i, len)?);
                    log::trace!(
                        "column '{name}': ignoring '{}'",
                        args[modifier_start..end.unwrap_or(i)].trim()
                    );
                    break;
                } else if name.is_empty() && !DataType::may_start_with(&[type_name.as_str(), &normalized]) {
                    // The previous word was a field name, not the start of a type.
                    return read_column(args, modifier_start, len, &type_name, list);
                } else {
                    type_name.push(' ');
                    type_name.push_str(&modifier);
                    continue;
                }
            }
            i += 1;
        }
        if let Some(separator) = end {
            i = separator;
        } else if brackets > 0 {
            return Err(Error::parse(
                args,
                start,
                format!("Missing {brackets} closing bracket(s) in data type"),
            ));
        }

        let data_type = DataType::lookup(&type_name)
            .ok_or_else(|| unknown_type(args, type_start, &type_name))?;
        column = Some(Column::new(
            data_type,
            name,
            &args[start..i.min(len)],
            nullable,
            low_cardinality,
            params,
            Vec::new(),
        ));
    }

    let Some(mut column) = column else {
        return Err(Error::parse(args, start, "Failed to parse given column"));
    };
    if nullable {
        fixed_length = false;
        estimated_length += 1;
    } else if column.data_type == DataType::FixedString {
        fixed_length = true;
        estimated_length = 0;
    } else if column.data_type.byte_length() == 0 {
        fixed_length = false;
    } else {
        estimated_length += column.data_type.byte_length();
    }
    column.fixed_byte_length = fixed_length;
    column.update(estimated_length)?;
    list.push(column);
    Ok(i)
}

/// Consumes `count` closing brackets after `i`, allowing whitespace in between.
fn close_brackets(args: &str, mut i: usize, len: usize, mut count: usize) -> Result<usize> {
    let bytes = args.as_bytes();
    while count > 0 {
        while i < len && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= len || bytes[i] != b')' {
            return Err(Error::parse(
                args,
                i.min(len),
                format!("Missing {count} closing bracket(s) in data type"),
            ));
        }
        i += 1;
        count -= 1;
    }
    Ok(i)
}

/// Skips to the comma ending the current column; returns its index, or `len`.
fn skip_to_separator(args: &str, i: usize, len: usize) -> Result<usize> {
    let after = scanner::skip_contents_until(args, i, len, b",")?;
    Ok(if after > i && args.as_bytes()[after - 1] == b',' {
        after - 1
    } else {
        after
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chdata_common::error::ErrorKind;

    fn is_parse_error(descriptor: &str) -> bool {
        matches!(
            Column::of("x", descriptor).map_err(|e| e.into_kind()),
            Err(ErrorKind::Parse { .. })
        )
    }

    #[test]
    fn test_simple_types() {
        let c = Column::of("id", "UInt32").unwrap();
        assert_eq!(c.data_type(), DataType::UInt32);
        assert!(!c.is_nullable());
        assert!(c.is_fixed_length());
        assert_eq!(c.estimated_byte_length(), 4);
        assert_eq!(c.precision(), 10);
        assert_eq!(c.to_string(), "id UInt32");

        let c = Column::of("s", "LowCardinality(Nullable(String))").unwrap();
        assert_eq!(c.data_type(), DataType::String);
        assert!(c.is_nullable());
        assert!(c.is_low_cardinality());
        assert!(!c.is_fixed_length());
        assert_eq!(c.estimated_byte_length(), 1);
        assert_eq!(c.original_type_name(), "LowCardinality(Nullable(String))");
    }

    #[test]
    fn test_multi_word_alias() {
        let c = Column::of("d", "DOUBLE PRECISION").unwrap();
        assert_eq!(c.data_type(), DataType::Float64);
        let c = Column::of("u", "int unsigned").unwrap();
        assert_eq!(c.data_type(), DataType::UInt32);
    }

    #[test]
    fn test_null_modifiers_and_stop_words() {
        let c = Column::of("a", "String NULL").unwrap();
        assert!(c.is_nullable());
        let c = Column::of("a", "String NOT NULL").unwrap();
        assert!(!c.is_nullable());
        assert_eq!(c.original_type_name(), "String NOT NULL");

        let columns = Column::parse("a Int32 DEFAULT 1 + 2, b String CODEC(ZSTD(1)), c Date").unwrap();
        assert_eq!(columns.len(), 3);
        assert_eq!(columns[0].data_type(), DataType::Int32);
        assert_eq!(columns[1].data_type(), DataType::String);
        assert_eq!(columns[2].data_type(), DataType::Date);
        assert_eq!(columns[2].column_index(), 2);

        assert!(is_parse_error("Nullable(String NULL)"));
        assert!(is_parse_error("String NOT DEFAULT"));
    }

    #[test]
    fn test_parameters() {
        let c = Column::of("d", "Decimal(18, 4)").unwrap();
        assert_eq!((c.precision(), c.scale()), (18, 4));
        assert_eq!(c.estimated_byte_length(), 8);
        assert_eq!(c.parameters(), ["18", "4"]);

        let c = Column::of("d", "Decimal64(6)").unwrap();
        assert_eq!((c.precision(), c.scale()), (18, 6));

        let c = Column::of("d", "Decimal(40, 2)").unwrap();
        assert_eq!(c.estimated_byte_length(), 32);

        let c = Column::of("f", "FixedString(16)").unwrap();
        assert_eq!(c.precision(), 16);
        assert!(c.is_fixed_length());
        assert_eq!(c.estimated_byte_length(), 16);

        let c = Column::of("t", "DateTime64(3, 'Asia/Tokyo')").unwrap();
        assert_eq!(c.scale(), 3);
        assert_eq!(c.time_zone(), Some("Asia/Tokyo"));
        assert_eq!(c.datetime_scale(), Some(3));

        let c = Column::of("t", "DateTime('UTC')").unwrap();
        assert_eq!(c.time_zone(), Some("UTC"));
        assert_eq!(c.datetime_scale(), None);
        assert_eq!(c.estimated_byte_length(), 4);

        let c = Column::of("t", "DateTime(6, 'UTC')").unwrap();
        assert_eq!(c.datetime_scale(), Some(6));

        let c = Column::of("e", "Enum8('a' = 1, 'b' = 2)").unwrap();
        assert_eq!(c.enum_constants().value_of("b"), Some(2));
        assert!(is_parse_error("Enum8(a = 1)"));
        assert!(is_parse_error("Decimal(4, 6)"));
    }

    #[test]
    fn test_nested_arity() {
        assert!(is_parse_error("Array(Int32, Int32)"));
        assert!(is_parse_error("Array()"));
        assert!(is_parse_error("Map(Int32)"));
        assert!(is_parse_error("Map(String, Int32, Int32)"));
        assert!(is_parse_error("Tuple()"));
        assert!(is_parse_error("Nested()"));
        assert!(is_parse_error("Variant()"));
        assert!(is_parse_error("Array(Int32"));
        assert!(is_parse_error("Decimal(18, 4"));
    }

    #[test]
    fn test_unterminated_brackets_and_quotes() {
        assert!(is_parse_error("Nullable(String"));
        assert!(is_parse_error("LowCardinality(String"));
        assert!(is_parse_error("LowCardinality(Nullable(String)"));
        assert!(is_parse_error("Nullable(Array(Int8)"));
        assert!(is_parse_error("`UInt8"));
        assert!(Column::parse("`id UInt32").is_err());
        assert!(Column::parse("a Int32, b 'String").is_err());

        let column = Column::of("x", "LowCardinality(Nullable(String))").unwrap();
        assert_eq!(column.original_type_name(), "LowCardinality(Nullable(String))");
        let column = Column::of("x", "Nullable(Array(Int8) )").unwrap();
        assert_eq!(column.data_type(), DataType::Array);
        assert_eq!(column.original_type_name(), "Nullable(Array(Int8) )");
    }

    #[test]
    fn test_unknown_type() {
        match Column::of("x", "Int33").unwrap_err().into_kind() {
            ErrorKind::Parse { message, .. } => assert_eq!(message, "Unknown data type: Int33"),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(is_parse_error("Array(Strin)"));
    }

    #[test]
    fn test_keywords_match_whole_words() {
        // A type word that merely begins with a structural keyword is looked up as a leaf.
        for (descriptor, word) in [
            ("Mapping", "Mapping"),
            ("Arrays(Int8)", "Arrays"),
            ("NullableX(Int8)", "NullableX"),
        ] {
            match Column::of("x", descriptor).unwrap_err().into_kind() {
                ErrorKind::Parse { message, .. } => {
                    assert_eq!(message, format!("Unknown data type: {word}"))
                }
                other => panic!("unexpected error {other:?}"),
            }
        }
        assert_eq!(Column::of("x", "Map (String, UInt8)").unwrap().data_type(), DataType::Map);
        assert!(Column::of("x", "Nullable (UInt8)").unwrap().is_nullable());
    }

    #[test]
    fn test_array_levels() {
        let c = Column::of("a", "Array(Array(Nullable(Int32)))").unwrap();
        assert_eq!(c.array_level(), 2);
        let base = c.array_base_column().unwrap();
        assert_eq!(base.data_type(), DataType::Int32);
        assert!(base.is_nullable());
        assert_eq!(c.nested_columns()[0].array_level(), 1);
        assert!(!c.is_fixed_length());
    }

    #[test]
    fn test_map_and_tuple() {
        let c = Column::of("m", "Map(String, Array(UInt8))").unwrap();
        assert_eq!(c.key_column().unwrap().data_type(), DataType::String);
        assert_eq!(c.value_column().unwrap().data_type(), DataType::Array);

        let c = Column::of("t", "Tuple(a Int32, b String)").unwrap();
        let nested = c.nested_columns();
        assert_eq!(nested.len(), 2);
        assert_eq!((nested[0].name(), nested[0].data_type()), ("a", DataType::Int32));
        assert_eq!((nested[1].name(), nested[1].data_type()), ("b", DataType::String));
        assert_eq!(nested[1].column_index(), 1);

        let c = Column::of("t", "Tuple(Int8, Nullable(String), FixedString(2))").unwrap();
        assert_eq!(c.nested_columns().len(), 3);
        assert!(c.nested_columns()[1].is_nullable());

        let c = Column::of("n", "Nested(id UInt32, tags Array(String))").unwrap();
        assert_eq!(c.nested_columns()[1].name(), "tags");

        let c = Column::of("t", "Tuple(Mapping Int32, Arrays String)").unwrap();
        assert_eq!(c.nested_columns()[0].name(), "Mapping");
        assert_eq!(c.nested_columns()[1].data_type(), DataType::String);
    }

    #[test]
    fn test_variant_ordinals() {
        let c = Column::of("v", "Variant(String, UInt64, Array(UInt8))").unwrap();
        let names: Vec<_> = c.nested_columns().iter().map(|n| n.name()).collect();
        assert_eq!(names, ["v.Array", "v.String", "v.UInt64"]);
        assert_eq!(c.variant_ordinal(&Value::from("x")), Some(1));
        assert_eq!(c.variant_ordinal(&Value::from(5u64)), Some(2));
        assert_eq!(
            c.variant_ordinal(&Value::Array(vec![Value::from(1u8)])),
            Some(0)
        );
        assert_eq!(c.variant_ordinal(&Value::from(1i8)), None);
        assert_eq!(c.variant_ordinal(&Value::Null), None);
    }

    #[test]
    fn test_aggregate_functions() {
        let c = Column::of("q", "AggregateFunction(quantiles(0.5, 0.9), UInt64)").unwrap();
        assert_eq!(c.data_type(), DataType::AggregateFunction);
        assert_eq!(c.aggregate_function(), Some(AggregateFunction::Quantiles));
        assert_eq!(c.nested_columns()[0].data_type(), DataType::UInt64);

        let c = Column::of("s", "SimpleAggregateFunction(sum, UInt64)").unwrap();
        assert_eq!(c.aggregate_function(), None);
        assert_eq!(c.nested_columns()[0].data_type(), DataType::UInt64);

        assert!(is_parse_error("AggregateFunction(noSuchFunction, UInt64)"));
    }

    #[test]
    fn test_round_trip_through_display() {
        for descriptor in [
            "Array(Array(Nullable(Int32)))",
            "Map(String, Array(Tuple(a Int32, b Nullable(String))))",
            "Tuple(Array(Map(UInt8, Array(Decimal(9, 2)))), LowCardinality(String))",
        ] {
            let column = Column::of("col", descriptor).unwrap();
            let reparsed = Column::parse(&column.to_string()).unwrap();
            assert_eq!(reparsed.len(), 1);
            assert_eq!(reparsed[0], column);
        }
    }

    #[test]
    fn test_parse_list() {
        let columns = Column::parse("id UInt32, name Nullable(String), tags Array(String)").unwrap();
        assert_eq!(columns.len(), 3);
        assert_eq!(columns[0].name(), "id");
        assert_eq!(columns[1].name(), "name");
        assert!(columns[1].is_nullable());
        assert_eq!(columns[2].data_type(), DataType::Array);
        assert!(columns[2].is_last_column());
        assert!(Column::parse("").unwrap().is_empty());

        let quoted = Column::parse("`my col` Int8, \"x\" UInt8").unwrap();
        assert_eq!(quoted[0].name(), "my col");
        assert_eq!(quoted[1].name(), "x");
    }

    #[test]
    fn test_display_quotes_names() {
        assert_eq!(Column::of("v.String", "String").unwrap().to_string(), "v.String String");
        for name in ["my col", "1st", "a,b", "x`y", "back\\slash", "a(b)", "c--d"] {
            let column = Column::of(name, "Int8").unwrap();
            let text = column.to_string();
            assert!(text.starts_with('`'), "{text}");
            let reparsed = Column::parse(&text).unwrap();
            assert_eq!(reparsed.len(), 1);
            assert_eq!(reparsed[0].name(), name);
            assert_eq!(reparsed[0].data_type(), DataType::Int8);
        }
    }

    #[test]
    fn test_templates() {
        assert_eq!(Column::of("a", "Array(String)").unwrap().new_value(), Value::Array(vec![]));
        assert_eq!(Column::of("p", "Point").unwrap().new_value(), Value::Point(0.0, 0.0));
        assert!(Column::of("s", "String").unwrap().new_value().is_null());
        assert!(Column::of_type("x", DataType::Int64, true).unwrap().is_nullable());
    }
}
