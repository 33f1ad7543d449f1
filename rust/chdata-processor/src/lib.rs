//! Binary serialization of ClickHouse rows.
//!
//! A [`DataProcessor`] holds an ordered column list together with one [`SerDe`] per
//! column, obtained from the [`SerDeProvider`] of the configured format, and reads
//! or writes values through the `chdata-io` streams.

pub mod processor;
pub mod record;
pub mod row_binary;
pub mod serde;

pub use processor::{DataProcessor, DataProcessorBuilder, Records, Values, serde_provider};
pub use record::{ColumnIndex, Record};
pub use row_binary::RowBinarySerDe;
pub use serde::{
    Deserializer, DeserializerChain, Flow, SerDe, SerDeProvider, Serializer, SerializerChain,
};
