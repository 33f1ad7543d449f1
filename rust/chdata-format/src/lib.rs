//! ClickHouse data types and column descriptors.
//!
//! [`Column::parse`] turns a column list such as
//! `id UInt32, name Nullable(String), tags Array(String)` into a tree of [`Column`]s
//! over the [`DataType`] catalog. Decoded values are represented by [`Value`].

pub mod aggregate_function;
mod catalog;
pub mod column;
pub mod data_type;
pub mod enum_constants;
pub mod scanner;
pub mod value;

pub use aggregate_function::AggregateFunction;
pub use column::Column;
pub use data_type::DataType;
pub use enum_constants::EnumConstants;
pub use value::{DateTime, Decimal, Value, ValueHolder};
