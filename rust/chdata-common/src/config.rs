//! Data-layer configuration.
//!
//! `DataConfig` is a plain serde-enabled struct; every field has a default so partial
//! documents deserialize cleanly.

use serde::{Deserialize, Serialize};

use crate::compression::Compression;

pub const DEFAULT_BUFFER_SIZE: usize = 8192;
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 128 * DEFAULT_BUFFER_SIZE;
pub const DEFAULT_MAX_QUEUED_BUFFERS: usize = 512;
pub const DEFAULT_BUFFER_QUEUE_VARIATION: usize = 100;
pub const DEFAULT_TIMEOUT_MS: u64 = 30 * 1000;
pub const DEFAULT_COMPRESS_LEVEL: i32 = -1;

/// Wire formats known to the data layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DataFormat {
    #[default]
    RowBinary,
    RowBinaryWithNames,
    RowBinaryWithNamesAndTypes,
    RowBinaryWithDefaults,
    TabSeparated,
    TabSeparatedWithNames,
    TabSeparatedWithNamesAndTypes,
    Csv,
    CsvWithNames,
    JsonEachRow,
    Native,
}

impl DataFormat {
    pub fn is_binary(&self) -> bool {
        matches!(
            self,
            DataFormat::RowBinary
                | DataFormat::RowBinaryWithNames
                | DataFormat::RowBinaryWithNamesAndTypes
                | DataFormat::RowBinaryWithDefaults
                | DataFormat::Native
        )
    }

    pub fn is_row_binary(&self) -> bool {
        self.is_binary() && *self != DataFormat::Native
    }

    /// Returns `true` if a stream in this format starts with a column-name row.
    pub fn has_names(&self) -> bool {
        matches!(
            self,
            DataFormat::RowBinaryWithNames
                | DataFormat::RowBinaryWithNamesAndTypes
                | DataFormat::TabSeparatedWithNames
                | DataFormat::TabSeparatedWithNamesAndTypes
                | DataFormat::CsvWithNames
        )
    }

    /// Returns `true` if the name row is followed by a type row.
    pub fn has_types(&self) -> bool {
        matches!(
            self,
            DataFormat::RowBinaryWithNamesAndTypes | DataFormat::TabSeparatedWithNamesAndTypes
        )
    }
}

impl std::fmt::Display for DataFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// How aggressively the read side buffers data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BufferingMode {
    /// Bounded queues and timeouts; keeps memory usage predictable.
    #[default]
    ResourceEfficient,
    /// Unbounded adaptive queues without timeouts.
    Performance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub format: DataFormat,
    pub read_buffer_size: usize,
    pub write_buffer_size: usize,
    pub max_buffer_size: usize,
    pub max_queued_buffers: usize,
    pub buffer_queue_variation: usize,
    pub use_blocking_queue: bool,
    pub read_buffering_mode: BufferingMode,
    pub reuse_value_wrapper: bool,
    pub async_write: bool,
    pub timeout_ms: u64,
    pub read_compression: Compression,
    pub write_compression: Compression,
    pub read_compress_level: i32,
    pub write_compress_level: i32,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            format: DataFormat::RowBinary,
            read_buffer_size: DEFAULT_BUFFER_SIZE,
            write_buffer_size: DEFAULT_BUFFER_SIZE,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            max_queued_buffers: DEFAULT_MAX_QUEUED_BUFFERS,
            buffer_queue_variation: DEFAULT_BUFFER_QUEUE_VARIATION,
            use_blocking_queue: false,
            read_buffering_mode: BufferingMode::ResourceEfficient,
            reuse_value_wrapper: true,
            async_write: true,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            read_compression: Compression::None,
            write_compression: Compression::None,
            read_compress_level: DEFAULT_COMPRESS_LEVEL,
            write_compress_level: DEFAULT_COMPRESS_LEVEL,
        }
    }
}

impl DataConfig {
    pub fn new() -> DataConfig {
        Default::default()
    }

    /// Resolves a buffer size against a default and an upper bound.
    ///
    /// # Arguments
    ///
    /// * `requested` - Suggested size; zero means "use `default_size`".
    /// * `default_size` - Fallback size; zero means [`DEFAULT_BUFFER_SIZE`].
    /// * `max_size` - Upper bound; zero or anything above [`DEFAULT_MAX_BUFFER_SIZE`]
    ///   is treated as [`DEFAULT_MAX_BUFFER_SIZE`].
    pub fn buffer_size(requested: usize, default_size: usize, max_size: usize) -> usize {
        let max_size = if max_size == 0 || max_size > DEFAULT_MAX_BUFFER_SIZE {
            DEFAULT_MAX_BUFFER_SIZE
        } else {
            max_size
        };
        let default_size = if default_size == 0 {
            DEFAULT_BUFFER_SIZE
        } else {
            default_size.min(max_size)
        };
        if requested == 0 {
            default_size
        } else {
            requested.min(max_size)
        }
    }

    pub fn effective_read_buffer_size(&self) -> usize {
        Self::buffer_size(
            self.read_buffer_size,
            DEFAULT_BUFFER_SIZE,
            self.max_buffer_size,
        )
    }

    pub fn effective_write_buffer_size(&self) -> usize {
        Self::buffer_size(
            self.write_buffer_size,
            DEFAULT_BUFFER_SIZE,
            self.max_buffer_size,
        )
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }

    pub fn with_format(mut self, format: DataFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    pub fn with_write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }

    pub fn with_max_queued_buffers(mut self, count: usize) -> Self {
        self.max_queued_buffers = count;
        self
    }

    pub fn with_buffer_queue_variation(mut self, variation: usize) -> Self {
        self.buffer_queue_variation = variation;
        self
    }

    pub fn with_blocking_queue(mut self, blocking: bool) -> Self {
        self.use_blocking_queue = blocking;
        self
    }

    pub fn with_read_buffering_mode(mut self, mode: BufferingMode) -> Self {
        self.read_buffering_mode = mode;
        self
    }

    pub fn with_reuse_value_wrapper(mut self, reuse: bool) -> Self {
        self.reuse_value_wrapper = reuse;
        self
    }

    pub fn with_async_write(mut self, async_write: bool) -> Self {
        self.async_write = async_write;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_read_compression(mut self, compression: Compression, level: i32) -> Self {
        self.read_compression = compression;
        self.read_compress_level = level;
        self
    }

    pub fn with_write_compression(mut self, compression: Compression, level: i32) -> Self {
        self.write_compression = compression;
        self.write_compress_level = level;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DataConfig::default();
        assert_eq!(config.read_buffer_size, 8192);
        assert_eq!(config.write_buffer_size, 8192);
        assert_eq!(config.max_buffer_size, 128 * 8192);
        assert_eq!(config.max_queued_buffers, 512);
        assert_eq!(config.buffer_queue_variation, 100);
        assert!(config.reuse_value_wrapper);
        assert!(config.async_write);
        assert!(!config.use_blocking_queue);
        assert_eq!(config.timeout(), std::time::Duration::from_secs(30));
    }

    #[test]
    fn test_buffer_size_clamping() {
        assert_eq!(DataConfig::buffer_size(0, 0, 0), DEFAULT_BUFFER_SIZE);
        assert_eq!(DataConfig::buffer_size(0, 100, 0), 100);
        assert_eq!(DataConfig::buffer_size(10, 100, 50), 10);
        assert_eq!(DataConfig::buffer_size(0, 100, 50), 50);
        assert_eq!(
            DataConfig::buffer_size(usize::MAX, 0, usize::MAX),
            DEFAULT_MAX_BUFFER_SIZE
        );
    }

    #[test]
    fn test_partial_json() {
        let config: DataConfig =
            serde_json::from_str(r#"{"use_blocking_queue": true, "write_compression": "zstd"}"#)
                .unwrap();
        assert!(config.use_blocking_queue);
        assert_eq!(config.write_compression, Compression::Zstd);
        assert_eq!(config.max_queued_buffers, DEFAULT_MAX_QUEUED_BUFFERS);

        let json = serde_json::to_string(&config).unwrap();
        let back: DataConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_format_traits() {
        assert!(DataFormat::RowBinaryWithNamesAndTypes.has_names());
        assert!(DataFormat::RowBinaryWithNamesAndTypes.has_types());
        assert!(!DataFormat::RowBinaryWithNames.has_types());
        assert!(DataFormat::RowBinaryWithDefaults.is_row_binary());
        assert!(!DataFormat::Native.is_row_binary());
        assert!(!DataFormat::Csv.is_binary());
    }
}
