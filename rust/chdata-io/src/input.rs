//! Buffered input stream with optional decompression.

use std::{
    io::{BufRead, BufReader, Read},
    panic::AssertUnwindSafe,
    path::Path,
    time::Duration,
};

use chdata_bytes::{ByteSlice, varint};
use chdata_common::{Compression, DataConfig, Result, error::Error};
use chdata_workflow::ThreadPool;

use crate::{ClosingRead, OutputStream, PipedChannel, PipedReader, Unclosed, codec};

const DEFAULT_BUFFER_SIZE: usize = 8192;

type PostCloseAction = Box<dyn FnOnce() + Send>;

/// A buffered byte source used by deserializers.
///
/// Running out of bytes in the middle of a read fails with `EndOfStream`. Reading
/// after [`close`](Self::close) fails with `InvalidOperation`.
pub struct InputStream {
    inner: Option<BufReader<Box<dyn ClosingRead>>>,
    position: u64,
    compression: Compression,
    post_close: Option<PostCloseAction>,
}

impl InputStream {
    /// Wraps a plain reader without decompression.
    pub fn new(reader: impl Read + Send + 'static) -> InputStream {
        Self::wrap(Box::new(Unclosed(reader)), Compression::None, DEFAULT_BUFFER_SIZE)
    }

    /// A stream over an in-memory buffer.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> InputStream {
        Self::new(std::io::Cursor::new(bytes.into()))
    }

    pub fn empty() -> InputStream {
        Self::from_bytes(Vec::new())
    }

    /// A stream over the reading end of a piped channel; closing the stream closes
    /// the reader.
    pub fn piped(reader: PipedReader) -> InputStream {
        Self::wrap(Box::new(reader), Compression::None, DEFAULT_BUFFER_SIZE)
    }

    /// A stream over the bytes `producer` writes to an [`OutputStream`] set up from
    /// `config`, compression included.
    ///
    /// With `async_write` the producer runs on the global thread pool and its output
    /// flows through a [`PipedChannel`] created from `config`; a failing producer
    /// aborts the channel, so the error reaches the reader. Otherwise the producer
    /// runs to completion on the calling thread before this returns.
    pub fn produce<F>(config: &DataConfig, producer: F) -> Result<InputStream>
    where
        F: FnOnce(&mut OutputStream) -> Result<()> + Send + 'static,
    {
        if !config.async_write {
            let (writer, reader) = PipedChannel::adaptive(
                config.effective_write_buffer_size(),
                chdata_workflow::CapacityPolicy::unbounded(),
                None,
            )
            .split();
            let mut output = OutputStream::from_config(Box::new(writer), config)?;
            producer(&mut output)?;
            output.close()?;
            return Self::from_config(Box::new(reader), config);
        }

        let (writer, reader) = PipedChannel::create(config).split();
        let abort = writer.abort_handle();
        let producer_config = config.clone();
        ThreadPool::global().spawn_detached(move || {
            let mut output = match OutputStream::from_config(Box::new(writer), &producer_config) {
                Ok(output) => output,
                Err(e) => return abort.abort(e.to_string()),
            };
            match std::panic::catch_unwind(AssertUnwindSafe(|| producer(&mut output))) {
                Ok(Ok(())) => {
                    if let Err(e) = output.close() {
                        abort.abort(e.to_string());
                    }
                }
                Ok(Err(e)) => {
                    log::debug!("input producer failed: {e}");
                    abort.abort(e.to_string());
                }
                Err(panic) => {
                    abort.abort("input producer panicked");
                    std::panic::resume_unwind(panic);
                }
            }
        })?;
        Self::from_config(Box::new(reader), config)
    }

    /// Wraps `source`, decompressing with `compression`.
    ///
    /// # Errors
    ///
    /// `Unsupported` if `compression` has no codec.
    pub fn with_source(
        source: Box<dyn ClosingRead>,
        compression: Compression,
        buffer_size: usize,
    ) -> Result<InputStream> {
        let source = codec::decompressor(compression, source)?;
        Ok(Self::wrap(source, compression, buffer_size))
    }

    /// Wraps `source` using the read buffer size and compression of `config`.
    pub fn from_config(source: Box<dyn ClosingRead>, config: &DataConfig) -> Result<InputStream> {
        Self::with_source(
            source,
            config.read_compression,
            config.effective_read_buffer_size(),
        )
    }

    fn wrap(source: Box<dyn ClosingRead>, compression: Compression, buffer_size: usize) -> InputStream {
        InputStream {
            inner: Some(BufReader::with_capacity(buffer_size.max(1), source)),
            position: 0,
            compression,
            post_close: None,
        }
    }

    /// Registers an action to run once the stream has been closed.
    pub fn on_close(mut self, action: impl FnOnce() + Send + 'static) -> InputStream {
        self.post_close = Some(Box::new(action));
        self
    }

    /// Number of decompressed bytes consumed so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    fn reader(&mut self) -> Result<&mut BufReader<Box<dyn ClosingRead>>> {
        self.inner
            .as_mut()
            .ok_or_else(|| Error::invalid_operation("read from a closed input stream"))
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.read_fully(&mut byte)?;
        Ok(byte[0])
    }

    /// Fills `buf` completely.
    pub fn read_fully(&mut self, buf: &mut [u8]) -> Result<()> {
        self.reader()?.read_exact(buf)?;
        self.position += buf.len() as u64;
        Ok(())
    }

    /// Reads exactly `length` bytes.
    pub fn read_bytes(&mut self, length: usize) -> Result<ByteSlice> {
        let mut bytes = Vec::with_capacity(length.min(DEFAULT_BUFFER_SIZE));
        let read = self.reader()?.take(length as u64).read_to_end(&mut bytes)?;
        self.position += read as u64;
        if read < length {
            return Err(Error::end_of_stream(format!(
                "expected {length} bytes but only {read} remained"
            )));
        }
        Ok(ByteSlice::from(bytes))
    }

    pub fn read_varint(&mut self) -> Result<u64> {
        Ok(varint::read(self)?)
    }

    /// Reads a varint length followed by that many bytes.
    pub fn read_string(&mut self) -> Result<ByteSlice> {
        let length = self.read_varint()?;
        let length = usize::try_from(length)
            .map_err(|_| Error::invalid_format("string", format!("length {length} is too large")))?;
        self.read_bytes(length)
    }

    /// Returns the next byte without consuming it, `None` at the end of the stream.
    pub fn peek(&mut self) -> Result<Option<u8>> {
        Ok(self.reader()?.fill_buf()?.first().copied())
    }

    /// Returns `true` if at least one more byte can be read.
    pub fn has_remaining(&mut self) -> Result<bool> {
        Ok(self.peek()?.is_some())
    }

    /// Skips up to `count` bytes, returning how many were skipped.
    pub fn skip(&mut self, count: u64) -> Result<u64> {
        let skipped = std::io::copy(&mut self.reader()?.take(count), &mut std::io::sink())?;
        self.position += skipped;
        Ok(skipped)
    }

    /// Copies the rest of this stream into `output` and flushes it.
    pub fn pipe(&mut self, output: &mut OutputStream) -> Result<u64> {
        let copied = std::io::copy(self, output)?;
        output.flush()?;
        Ok(copied)
    }

    /// Writes the rest of the stream to `path` on the global thread pool.
    ///
    /// Both the stream and the file are closed when done.
    ///
    /// # Returns
    ///
    /// The number of bytes written, or a `Timeout` error if the copy did not finish
    /// within `timeout` or failed.
    pub fn save_to_file(mut self, path: impl AsRef<Path>, timeout: Duration) -> Result<u64> {
        let path = path.as_ref().to_path_buf();
        let handle = ThreadPool::global().spawn(move || -> Result<u64> {
            let file = std::fs::File::create(&path)
                .map_err(|e| Error::io(format!("create {}", path.display()), e))?;
            let mut output = OutputStream::new(file);
            let copied = self.pipe(&mut output)?;
            output.close()?;
            self.close()?;
            Ok(copied)
        })?;
        handle.wait(timeout)
    }

    /// Closes the source and runs the post-close action. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        let Some(reader) = self.inner.take() else {
            return Ok(());
        };
        let result = reader.into_inner().close();
        if let Some(action) = self.post_close.take() {
            action();
        }
        result.map_err(|e| Error::io("Failed to close input stream", e))
    }
}

impl Read for InputStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.reader()?.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

impl Drop for InputStream {
    fn drop(&mut self) {
        if self.inner.is_some()
            && let Err(e) = self.close()
        {
            log::warn!("failed to close input stream on drop: {e}");
        }
    }
}
