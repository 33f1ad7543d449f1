//! # chdata: ClickHouse data types and RowBinary streams
//!
//! A single entry point over the crates that make up the ClickHouse client data
//! layer.
//!
//! ## Module Organization
//!
//! * [`common`] - Errors, configuration, data formats and the freezable settings map
//! * [`format`] - Type descriptor parsing, the data type catalog, columns and values
//! * [`io`] - Byte slices, varints, buffered and compressed streams, piped channels
//! * [`processor`] - Per-column serializers and the row cursor over a stream
//!
//! ### Support Modules
//!
//! * [`support::bytes`] - Wide integers used by decimals and 128/256-bit types
//! * [`support::workflow`] - Bounded thread pool, join handles and chunk queues
//!
//! ## Getting Started
//!
//! ```no_run
//! use chdata::{common::DataConfig, format::Column, io::InputStream, processor::DataProcessor};
//!
//! # fn main() -> chdata::common::Result<()> {
//! let columns = Column::parse("id UInt32, name Nullable(String)")?;
//! let input = InputStream::from_bytes(vec![1, 0, 0, 0, 1]);
//! let mut reader = DataProcessor::builder(DataConfig::default())
//!     .input(input)
//!     .columns(columns)
//!     .build()?;
//! while let Some(record) = reader.next_record()? {
//!     println!("{record}");
//! }
//! # Ok(())
//! # }
//! ```

pub use chdata_common as common;
pub use chdata_format as format;
pub use chdata_io as io;
pub use chdata_processor as processor;

pub mod support {
    pub use chdata_bytes as bytes;
    pub use chdata_workflow as workflow;
}
