//! Buffered output stream with optional compression.

use std::io::{BufWriter, Write};

use chdata_bytes::varint;
use chdata_common::{Compression, DataConfig, Result, error::Error, verify_arg};

use crate::{SealingWrite, Unsealed, codec};

const DEFAULT_BUFFER_SIZE: usize = 8192;

type PostCloseAction = Box<dyn FnOnce() + Send>;

/// A buffered byte sink used by serializers.
///
/// `close` flushes the buffer, finishes the compressor, seals the underlying sink and
/// then runs the post-close action. Writing after `close` fails with
/// `InvalidOperation`.
pub struct OutputStream {
    inner: Option<BufWriter<Box<dyn SealingWrite>>>,
    position: u64,
    compression: Compression,
    post_close: Option<PostCloseAction>,
}

impl OutputStream {
    /// Wraps a plain writer without compression.
    pub fn new(writer: impl Write + Send + 'static) -> OutputStream {
        Self::wrap(Box::new(Unsealed(writer)), Compression::None, DEFAULT_BUFFER_SIZE)
    }

    /// Wraps `sink`, compressing with `compression` at `level`.
    ///
    /// # Errors
    ///
    /// `Unsupported` if `compression` has no codec.
    pub fn with_sink(
        sink: Box<dyn SealingWrite>,
        compression: Compression,
        level: i32,
        buffer_size: usize,
    ) -> Result<OutputStream> {
        let sink = codec::compressor(compression, level, sink)?;
        Ok(Self::wrap(sink, compression, buffer_size))
    }

    /// Wraps `sink` using the write buffer size and compression of `config`.
    pub fn from_config(sink: Box<dyn SealingWrite>, config: &DataConfig) -> Result<OutputStream> {
        Self::with_sink(
            sink,
            config.write_compression,
            config.write_compress_level,
            config.effective_write_buffer_size(),
        )
    }

    fn wrap(sink: Box<dyn SealingWrite>, compression: Compression, buffer_size: usize) -> OutputStream {
        OutputStream {
            inner: Some(BufWriter::with_capacity(buffer_size.max(1), sink)),
            position: 0,
            compression,
            post_close: None,
        }
    }

    /// Registers an action to run once the stream has been closed.
    pub fn on_close(mut self, action: impl FnOnce() + Send + 'static) -> OutputStream {
        self.post_close = Some(Box::new(action));
        self
    }

    /// Number of uncompressed bytes written so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    fn writer(&mut self) -> Result<&mut BufWriter<Box<dyn SealingWrite>>> {
        self.inner
            .as_mut()
            .ok_or_else(|| Error::invalid_operation("write to a closed output stream"))
    }

    pub fn write_byte(&mut self, value: u8) -> Result<()> {
        self.write_bytes(&[value])
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer()?.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    /// Writes `value` as a varint; values above `varint::MAX_VARINT` are rejected.
    pub fn write_varint(&mut self, value: u64) -> Result<()> {
        verify_arg!(value, value <= varint::MAX_VARINT);
        let mut buf = [0u8; varint::MAX_VARINT_LEN];
        let len = varint::encode(value, &mut buf);
        self.write_bytes(&buf[..len])
    }

    /// Writes a varint length followed by the bytes.
    pub fn write_string(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_varint(bytes.len() as u64)?;
        self.write_bytes(bytes)
    }

    /// Writes exactly `length` bytes: `bytes` followed by zero padding.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `bytes` is longer than `length`.
    pub fn write_fixed(&mut self, bytes: &[u8], length: usize) -> Result<()> {
        verify_arg!(bytes, bytes.len() <= length);
        self.write_bytes(bytes)?;
        const ZEROS: [u8; 64] = [0u8; 64];
        let mut padding = length - bytes.len();
        while padding > 0 {
            let n = padding.min(ZEROS.len());
            self.write_bytes(&ZEROS[..n])?;
            padding -= n;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer()?.flush()?;
        Ok(())
    }

    /// Flushes and seals the stream. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        let Some(writer) = self.inner.take() else {
            return Ok(());
        };
        let result = writer
            .into_inner()
            .map_err(|e| e.into_error())
            .and_then(|mut sink| sink.seal());
        if let Some(action) = self.post_close.take() {
            action();
        }
        result.map_err(|e| Error::io("Failed to close output stream", e))
    }
}

impl Write for OutputStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.write_bytes(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        OutputStream::flush(self)?;
        Ok(())
    }
}

impl Drop for OutputStream {
    fn drop(&mut self) {
        if self.inner.is_some()
            && let Err(e) = self.close()
        {
            log::warn!("failed to close output stream on drop: {e}");
        }
    }
}
