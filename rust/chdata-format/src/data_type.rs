//! The process-wide catalog of ClickHouse data types.

use std::{str::FromStr, sync::OnceLock};

use chdata_common::{Result, error::Error};

use crate::catalog::{Entry, NameCatalog};

/// Static attributes of one data type.
#[derive(Debug)]
pub struct TypeInfo {
    pub name: &'static str,
    /// Whether the type takes a parenthesized parameter list.
    pub parameterized: bool,
    pub case_sensitive: bool,
    pub signed: bool,
    /// Fixed storage size in bytes; zero for variable-length and composite types.
    pub byte_length: usize,
    pub max_precision: u32,
    pub default_scale: u32,
    pub max_scale: u32,
    /// Whether values of this type are built from nested values.
    pub nested: bool,
    pub aliases: &'static [&'static str],
}

macro_rules! data_types {
    ($(
        $variant:ident($param:expr, $case:expr, $signed:expr, $bytes:expr, $prec:expr,
            $dscale:expr, $mscale:expr, $nested:expr $(, $alias:literal)* $(,)?)
    ),* $(,)?) => {
        /// A ClickHouse data type.
        #[allow(clippy::upper_case_acronyms)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum DataType {
            $($variant),*
        }

        impl DataType {
            /// Every data type, in catalog order.
            pub const ALL: &'static [DataType] = &[$(DataType::$variant),*];

            pub fn info(self) -> &'static TypeInfo {
                match self {
                    $(DataType::$variant => &TypeInfo {
                        name: stringify!($variant),
                        parameterized: $param,
                        case_sensitive: $case,
                        signed: $signed,
                        byte_length: $bytes,
                        max_precision: $prec,
                        default_scale: $dscale,
                        max_scale: $mscale,
                        nested: $nested,
                        aliases: &[$($alias),*],
                    },)*
                }
            }
        }
    };
}

data_types! {
    Bool(false, false, true, 1, 1, 0, 0, false, "BOOLEAN"),
    Date(false, false, false, 2, 10, 0, 0, false),
    Date32(false, false, false, 4, 10, 0, 0, false),
    DateTime(true, false, false, 0, 29, 0, 9, false, "TIMESTAMP"),
    DateTime32(true, false, false, 4, 19, 0, 0, false),
    DateTime64(true, false, false, 8, 29, 3, 9, false),
    Enum(true, true, false, 0, 0, 0, 0, false),
    Enum8(true, true, false, 1, 0, 0, 0, false, "ENUM"),
    Enum16(true, true, false, 2, 0, 0, 0, false),
    FixedString(true, true, false, 0, 0, 0, 0, false, "BINARY"),
    Int8(false, true, true, 1, 3, 0, 0, false,
        "BYTE", "INT1", "INT1 SIGNED", "TINYINT", "TINYINT SIGNED"),
    UInt8(false, true, false, 1, 3, 0, 0, false, "INT1 UNSIGNED", "TINYINT UNSIGNED"),
    Int16(false, true, true, 2, 5, 0, 0, false, "SMALLINT", "SMALLINT SIGNED"),
    UInt16(false, true, false, 2, 5, 0, 0, false, "SMALLINT UNSIGNED", "YEAR"),
    Int32(false, true, true, 4, 10, 0, 0, false,
        "INT", "INT SIGNED", "INTEGER", "INTEGER SIGNED", "MEDIUMINT", "MEDIUMINT SIGNED"),
    UInt32(false, true, false, 4, 10, 0, 0, false,
        "INT UNSIGNED", "INTEGER UNSIGNED", "MEDIUMINT UNSIGNED"),
    Int64(false, true, true, 8, 19, 0, 0, false, "BIGINT", "BIGINT SIGNED", "TIME"),
    IntervalYear(false, true, true, 8, 19, 0, 0, false),
    IntervalQuarter(false, true, true, 8, 19, 0, 0, false),
    IntervalMonth(false, true, true, 8, 19, 0, 0, false),
    IntervalWeek(false, true, true, 8, 19, 0, 0, false),
    IntervalDay(false, true, true, 8, 19, 0, 0, false),
    IntervalHour(false, true, true, 8, 19, 0, 0, false),
    IntervalMinute(false, true, true, 8, 19, 0, 0, false),
    IntervalSecond(false, true, true, 8, 19, 0, 0, false),
    IntervalMicrosecond(false, true, true, 8, 19, 0, 0, false),
    IntervalMillisecond(false, true, true, 8, 19, 0, 0, false),
    IntervalNanosecond(false, true, true, 8, 19, 0, 0, false),
    UInt64(false, true, false, 8, 20, 0, 0, false, "BIGINT UNSIGNED", "BIT", "SET"),
    Int128(false, true, true, 16, 39, 0, 0, false),
    UInt128(false, true, false, 16, 39, 0, 0, false),
    Int256(false, true, true, 32, 77, 0, 0, false),
    UInt256(false, true, false, 32, 78, 0, 0, false),
    Decimal(true, false, true, 0, 76, 0, 76, false, "DEC", "FIXED", "NUMERIC"),
    Decimal32(true, false, true, 4, 9, 9, 9, false),
    Decimal64(true, false, true, 8, 18, 18, 18, false),
    Decimal128(true, false, true, 16, 38, 38, 38, false),
    Decimal256(true, false, true, 32, 76, 20, 76, false),
    BFloat16(false, true, true, 2, 3, 0, 16, false),
    Float32(false, true, true, 4, 12, 0, 38, false, "FLOAT", "REAL", "SINGLE"),
    Float64(false, true, true, 8, 22, 0, 308, false, "DOUBLE", "DOUBLE PRECISION"),
    IPv4(false, true, false, 4, 10, 0, 0, false, "INET4"),
    IPv6(false, true, false, 16, 39, 0, 0, false, "INET6"),
    UUID(false, true, false, 16, 69, 0, 0, false),
    Point(false, true, true, 33, 0, 0, 0, true),
    Polygon(false, true, true, 0, 0, 0, 0, true),
    MultiPolygon(false, true, true, 0, 0, 0, 0, true),
    Ring(false, true, true, 0, 0, 0, 0, true),
    LineString(false, true, true, 0, 0, 0, 0, true),
    MultiLineString(false, true, true, 0, 0, 0, 0, true),
    JSON(false, false, false, 0, 0, 0, 0, true),
    Object(true, true, false, 0, 0, 0, 0, true),
    String(false, true, false, 0, 0, 0, 0, false,
        "BINARY LARGE OBJECT", "BINARY VARYING", "BLOB", "BYTEA", "CHAR",
        "CHAR LARGE OBJECT", "CHAR VARYING", "CHARACTER", "CHARACTER LARGE OBJECT",
        "CHARACTER VARYING", "CLOB", "GEOMETRY", "LONGBLOB", "LONGTEXT", "MEDIUMBLOB",
        "MEDIUMTEXT", "NATIONAL CHAR", "NATIONAL CHAR VARYING", "NATIONAL CHARACTER",
        "NATIONAL CHARACTER LARGE OBJECT", "NATIONAL CHARACTER VARYING", "NCHAR",
        "NCHAR LARGE OBJECT", "NCHAR VARYING", "NVARCHAR", "TEXT", "TINYBLOB", "TINYTEXT",
        "VARBINARY", "VARCHAR", "VARCHAR2"),
    Array(true, true, false, 0, 0, 0, 0, true),
    Map(true, true, false, 0, 0, 0, 0, true),
    Nested(true, true, false, 0, 0, 0, 0, true),
    Tuple(true, true, false, 0, 0, 0, 0, true),
    Nothing(false, true, false, 0, 0, 0, 0, true),
    LowCardinality(true, true, false, 0, 0, 0, 0, true),
    Nullable(true, true, false, 0, 0, 0, 0, true),
    SimpleAggregateFunction(true, true, false, 0, 0, 0, 0, false),
    AggregateFunction(true, true, false, 0, 0, 0, 0, true),
    Variant(true, true, false, 0, 0, 0, 0, true),
    Dynamic(true, true, false, 0, 0, 0, 0, true),
}

fn catalog() -> &'static NameCatalog<DataType> {
    static CATALOG: OnceLock<NameCatalog<DataType>> = OnceLock::new();
    CATALOG.get_or_init(|| {
        NameCatalog::build(DataType::ALL.iter().map(|&t| {
            let info = t.info();
            Entry {
                name: info.name,
                case_sensitive: info.case_sensitive,
                aliases: info.aliases,
                value: t,
            }
        }))
        .unwrap_or_else(|e| panic!("data type catalog: {e}"))
    })
}

impl DataType {
    /// Resolves a type name or alias.
    ///
    /// The name is trimmed and looked up as given, then upper-cased, so `Int32`,
    /// `int` and `INTEGER` all resolve to [`DataType::Int32`].
    ///
    /// # Errors
    ///
    /// Returns a parse error for empty or unknown names.
    pub fn of(name: &str) -> Result<DataType> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(Error::parse(name, 0, "Non-empty type name is required"));
        }
        catalog()
            .lookup(trimmed)
            .ok_or_else(|| Error::parse(name, 0, format!("Unknown data type: {trimmed}")))
    }

    pub(crate) fn lookup(name: &str) -> Option<DataType> {
        let trimmed = name.trim();
        (!trimmed.is_empty()).then(|| catalog().lookup(trimmed)).flatten()
    }

    /// Returns `true` if some alias could continue with the given words.
    ///
    /// The words are upper-cased and joined with single spaces. The result is `true`
    /// when an alias equals the joined text or starts with it followed by a space;
    /// `DOUBLE` may start `DOUBLE PRECISION`, `a INT32` starts nothing.
    pub fn may_start_with(words: &[&str]) -> bool {
        if words.is_empty() {
            return false;
        }
        let type_name = words
            .iter()
            .map(|w| w.to_uppercase())
            .collect::<Vec<_>>()
            .join(" ");
        let prefix = format!("{type_name} ");
        catalog()
            .aliases()
            .iter()
            .any(|alias| alias.starts_with(&prefix) || *alias == type_name)
    }

    /// Returns `true` if `name` is a known alias (not a canonical name).
    pub fn is_alias(name: &str) -> bool {
        let name = name.trim();
        !name.is_empty() && catalog().aliases().contains(&name.to_uppercase())
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    pub fn aliases(self) -> &'static [&'static str] {
        self.info().aliases
    }

    pub fn is_parameterized(self) -> bool {
        self.info().parameterized
    }

    pub fn is_case_sensitive(self) -> bool {
        self.info().case_sensitive
    }

    pub fn is_signed(self) -> bool {
        self.info().signed
    }

    pub fn is_nested(self) -> bool {
        self.info().nested
    }

    pub fn byte_length(self) -> usize {
        self.info().byte_length
    }

    pub fn max_precision(self) -> u32 {
        self.info().max_precision
    }

    pub fn default_scale(self) -> u32 {
        self.info().default_scale
    }

    pub fn max_scale(self) -> u32 {
        self.info().max_scale
    }

    /// Returns `true` for the plain integer types `Int8` through `UInt256`.
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            DataType::Int8
                | DataType::UInt8
                | DataType::Int16
                | DataType::UInt16
                | DataType::Int32
                | DataType::UInt32
                | DataType::Int64
                | DataType::UInt64
                | DataType::Int128
                | DataType::UInt128
                | DataType::Int256
                | DataType::UInt256
        )
    }

    pub fn is_decimal(self) -> bool {
        matches!(
            self,
            DataType::Decimal
                | DataType::Decimal32
                | DataType::Decimal64
                | DataType::Decimal128
                | DataType::Decimal256
        )
    }

    pub fn is_date_or_time(self) -> bool {
        matches!(
            self,
            DataType::Date
                | DataType::Date32
                | DataType::DateTime
                | DataType::DateTime32
                | DataType::DateTime64
        )
    }

    pub fn is_interval(self) -> bool {
        matches!(
            self,
            DataType::IntervalYear
                | DataType::IntervalQuarter
                | DataType::IntervalMonth
                | DataType::IntervalWeek
                | DataType::IntervalDay
                | DataType::IntervalHour
                | DataType::IntervalMinute
                | DataType::IntervalSecond
                | DataType::IntervalMicrosecond
                | DataType::IntervalMillisecond
                | DataType::IntervalNanosecond
        )
    }

    pub fn is_enum(self) -> bool {
        matches!(self, DataType::Enum | DataType::Enum8 | DataType::Enum16)
    }

    pub fn is_geo(self) -> bool {
        matches!(
            self,
            DataType::Point
                | DataType::Ring
                | DataType::LineString
                | DataType::Polygon
                | DataType::MultiLineString
                | DataType::MultiPolygon
        )
    }
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DataType::of(s)
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chdata_common::error::ErrorKind;

    #[test]
    fn test_catalog_builds_without_collisions() {
        assert_eq!(DataType::ALL.len(), 64);
        for &t in DataType::ALL {
            assert_eq!(DataType::of(t.name()).unwrap(), t);
        }
    }

    #[test]
    fn test_lookup_names_and_aliases() {
        assert_eq!(DataType::of("Int32").unwrap(), DataType::Int32);
        assert_eq!(DataType::of(" int ").unwrap(), DataType::Int32);
        assert_eq!(DataType::of("double precision").unwrap(), DataType::Float64);
        assert_eq!(DataType::of("VARCHAR").unwrap(), DataType::String);
        assert_eq!(DataType::of("timestamp").unwrap(), DataType::DateTime);
        assert_eq!(DataType::of("datetime64").unwrap(), DataType::DateTime64);
        assert_eq!("Bool".parse::<DataType>().unwrap(), DataType::Bool);
    }

    #[test]
    fn test_case_sensitive_names() {
        // Case-sensitive types are stored verbatim, only their aliases are upper-cased.
        assert!(DataType::of("int8").is_err());
        assert_eq!(DataType::of("tinyint").unwrap(), DataType::Int8);
        assert!(DataType::of("json").is_ok());
    }

    #[test]
    fn test_unknown_type() {
        let err = DataType::of("Int33").unwrap_err();
        match err.kind() {
            ErrorKind::Parse { message, .. } => assert_eq!(message, "Unknown data type: Int33"),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(DataType::of("  ").is_err());
    }

    #[test]
    fn test_may_start_with() {
        assert!(DataType::may_start_with(&["DOUBLE"]));
        assert!(DataType::may_start_with(&["double", "precision"]));
        assert!(DataType::may_start_with(&["national", "char"]));
        assert!(!DataType::may_start_with(&["a", "Int32"]));
        assert!(!DataType::may_start_with(&["String"]));
        assert!(!DataType::may_start_with(&[]));
    }

    #[test]
    fn test_attributes() {
        assert_eq!(DataType::UInt256.max_precision(), 78);
        assert_eq!(DataType::Decimal256.default_scale(), 20);
        assert_eq!(DataType::DateTime64.byte_length(), 8);
        assert!(DataType::Array.is_nested());
        assert!(!DataType::String.is_nested());
        assert!(DataType::Int128.is_integer());
        assert!(!DataType::IntervalDay.is_integer());
        assert!(DataType::IntervalDay.is_interval());
        assert!(DataType::Decimal64.is_decimal());
        assert!(DataType::Date32.is_date_or_time());
        assert!(DataType::is_alias("Tinyint Unsigned"));
        assert!(!DataType::is_alias("UInt8"));
        assert_eq!(DataType::IPv6.to_string(), "IPv6");
    }
}
