//! Single-producer/single-consumer byte channel between two threads.
//!
//! The writer cuts its bytes into chunks of the write buffer size and offers them to a
//! [`ChunkQueue`]; the reader concatenates them back. Chunk boundaries are not visible
//! to the reader. An empty chunk marks the end of data.
//!
//! Backpressure comes from the queue: a [`BlockingQueue`] parks the writer while it is
//! full, an [`AdaptiveQueue`] grows under its [`CapacityPolicy`]. Every wait is bounded
//! by the channel timeout, when one is set.

use std::{
    io::{Read, Write},
    sync::{Arc, Mutex},
    time::Duration,
};

use chdata_common::{BufferingMode, DataConfig, Result, error::Error};
use chdata_workflow::{
    AdaptiveQueue, BlockingQueue, CapacityPolicy, ChunkQueue, JoinHandle, OfferError, PollError,
    ThreadPool,
};

use crate::{ClosingRead, SealingWrite};

struct Shared {
    queue: Box<dyn ChunkQueue<Vec<u8>>>,
    timeout: Option<Duration>,
    /// Why the writer gave up, if it did.
    failure: Mutex<Option<String>>,
}

impl Shared {
    fn millis(&self) -> u64 {
        self.timeout.map_or(0, |t| t.as_millis() as u64)
    }

    fn abort(&self, reason: String) {
        {
            let mut failure = self.failure.lock().unwrap();
            if failure.is_none() {
                *failure = Some(reason);
            }
        }
        self.queue.close();
    }

    fn failure(&self) -> Option<Error> {
        self.failure.lock().unwrap().as_ref().map(|reason| {
            Error::io(
                "Piped stream was aborted by the writer",
                std::io::Error::other(reason.clone()),
            )
        })
    }
}

/// A piped channel before it is split into its two ends.
pub struct PipedChannel {
    writer: PipedWriter,
    reader: PipedReader,
}

impl PipedChannel {
    /// Creates a channel as configured.
    ///
    /// `Performance` buffering selects an unbounded adaptive queue without timeout.
    /// Otherwise `use_blocking_queue` selects a blocking queue of `max_queued_buffers`
    /// chunks; the default is an adaptive queue with fixed capacity when
    /// `buffer_queue_variation` is 0 and linear growth up to `max_queued_buffers`
    /// otherwise.
    pub fn create(config: &DataConfig) -> PipedChannel {
        let chunk_size = config.effective_write_buffer_size();
        if config.read_buffering_mode == BufferingMode::Performance {
            return Self::adaptive(chunk_size, CapacityPolicy::unbounded(), None);
        }

        let timeout = (config.timeout_ms > 0).then(|| config.timeout());
        let max = config.max_queued_buffers;
        if config.use_blocking_queue {
            Self::blocking(chunk_size, max, timeout)
        } else if config.buffer_queue_variation < 1 {
            Self::adaptive(chunk_size, CapacityPolicy::fixed(max), timeout)
        } else {
            Self::adaptive(
                chunk_size,
                CapacityPolicy::linear(1, max, config.buffer_queue_variation),
                timeout,
            )
        }
    }

    /// Creates a channel over a blocking queue of `capacity` chunks; 0 is unbounded.
    pub fn blocking(chunk_size: usize, capacity: usize, timeout: Option<Duration>) -> PipedChannel {
        let queue: Box<dyn ChunkQueue<Vec<u8>>> = if capacity == 0 {
            Box::new(BlockingQueue::unbounded())
        } else {
            Box::new(BlockingQueue::bounded(capacity))
        };
        log::debug!(
            "created blocking piped channel: chunk size {chunk_size}, capacity {capacity}, timeout {timeout:?}"
        );
        Self::with_queue(queue, chunk_size, timeout)
    }

    /// Creates a channel over an adaptive queue sized by `policy`.
    pub fn adaptive(
        chunk_size: usize,
        policy: CapacityPolicy,
        timeout: Option<Duration>,
    ) -> PipedChannel {
        log::debug!(
            "created adaptive piped channel: chunk size {chunk_size}, policy {policy:?}, timeout {timeout:?}"
        );
        Self::with_queue(Box::new(AdaptiveQueue::new(policy)), chunk_size, timeout)
    }

    fn with_queue(
        queue: Box<dyn ChunkQueue<Vec<u8>>>,
        chunk_size: usize,
        timeout: Option<Duration>,
    ) -> PipedChannel {
        let chunk_size = chunk_size.max(1);
        let shared = Arc::new(Shared {
            queue,
            timeout,
            failure: Mutex::new(None),
        });
        PipedChannel {
            writer: PipedWriter {
                shared: shared.clone(),
                buffer: Vec::with_capacity(chunk_size),
                chunk_size,
                closed: false,
            },
            reader: PipedReader {
                shared,
                chunk: Vec::new(),
                offset: 0,
                eof: false,
                closed: false,
            },
        }
    }

    /// Current queue capacity in chunks, `None` when unbounded.
    pub fn capacity(&self) -> Option<usize> {
        self.writer.shared.queue.capacity()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.writer.shared.timeout
    }

    pub fn split(self) -> (PipedWriter, PipedReader) {
        (self.writer, self.reader)
    }

    /// Runs `producer` on the global thread pool, feeding the returned reader.
    ///
    /// The writer is closed when `producer` returns `Ok`. When it fails, panics or is
    /// rejected by the pool, the channel is aborted so the reader sees an error
    /// instead of waiting for more data.
    ///
    /// # Returns
    ///
    /// The reader end and a handle to the producer's result.
    pub fn write_async<F>(self, producer: F) -> Result<(PipedReader, JoinHandle<Result<()>>)>
    where
        F: FnOnce(&mut PipedWriter) -> Result<()> + Send + 'static,
    {
        self.write_async_on(ThreadPool::global(), producer)
    }

    /// Same as [`write_async`](Self::write_async) on the given pool.
    pub fn write_async_on<F>(
        self,
        pool: &ThreadPool,
        producer: F,
    ) -> Result<(PipedReader, JoinHandle<Result<()>>)>
    where
        F: FnOnce(&mut PipedWriter) -> Result<()> + Send + 'static,
    {
        let (mut writer, reader) = self.split();
        let handle = pool.spawn(move || match producer(&mut writer) {
            Ok(()) => writer.close(),
            Err(e) => {
                writer.abort(e.to_string());
                Err(e)
            }
        })?;
        Ok((reader, handle))
    }
}

/// The producing end of a [`PipedChannel`].
///
/// Dropping an open writer aborts the channel; call [`close`](Self::close) to signal
/// the end of data.
pub struct PipedWriter {
    shared: Arc<Shared>,
    buffer: Vec<u8>,
    chunk_size: usize,
    closed: bool,
}

impl PipedWriter {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::invalid_operation("write to a closed piped stream"))
        } else {
            Ok(())
        }
    }

    fn offer(&self, chunk: Vec<u8>) -> Result<()> {
        match self.shared.queue.offer(chunk, self.shared.timeout) {
            Ok(()) => Ok(()),
            Err(OfferError::Timeout(_)) => {
                let millis = self.shared.millis();
                Err(Error::timeout(
                    format!("Write timed out after {millis} ms"),
                    millis,
                ))
            }
            Err(OfferError::Closed(_)) => Err(self
                .shared
                .failure()
                .unwrap_or_else(|| Error::invalid_operation("piped stream was closed by the reader"))),
        }
    }

    fn send_buffer(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.chunk_size));
        self.offer(chunk)
    }

    pub fn write_bytes(&mut self, mut bytes: &[u8]) -> Result<()> {
        self.ensure_open()?;
        while !bytes.is_empty() {
            let n = (self.chunk_size - self.buffer.len()).min(bytes.len());
            self.buffer.extend_from_slice(&bytes[..n]);
            bytes = &bytes[n..];
            if self.buffer.len() >= self.chunk_size {
                self.send_buffer()?;
            }
        }
        Ok(())
    }

    /// Forwards the partially filled chunk, if any.
    pub fn flush(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.send_buffer()
    }

    /// Forwards the remaining bytes followed by the end-of-data marker. Idempotent.
    ///
    /// A reader that is already gone is not an error.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let result = self.send_buffer().and_then(|_| self.offer(Vec::new()));
        match result {
            Err(e) if self.shared.queue.is_closed() && self.shared.failure.lock().unwrap().is_none() => {
                log::debug!("piped writer closed after the reader: {e}");
                Ok(())
            }
            other => {
                log::debug!("piped writer closed");
                other
            }
        }
    }

    /// Closes the writer and fails the reader with `reason`.
    pub fn abort(&mut self, reason: impl Into<String>) {
        self.closed = true;
        self.buffer.clear();
        self.shared.abort(reason.into());
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// A handle that can abort the channel after this writer has been moved away.
    pub fn abort_handle(&self) -> PipedAbort {
        PipedAbort(self.shared.clone())
    }
}

/// Aborts a channel on behalf of a writer owned elsewhere, for example inside an
/// [`OutputStream`](crate::OutputStream).
#[derive(Clone)]
pub struct PipedAbort(Arc<Shared>);

impl PipedAbort {
    /// Fails the reader with `reason`; later writes fail with the same reason.
    pub fn abort(&self, reason: impl Into<String>) {
        self.0.abort(reason.into());
    }
}

impl Write for PipedWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.write_bytes(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        PipedWriter::flush(self)?;
        Ok(())
    }
}

impl SealingWrite for PipedWriter {
    fn seal(&mut self) -> std::io::Result<()> {
        self.close()?;
        Ok(())
    }
}

impl Drop for PipedWriter {
    fn drop(&mut self) {
        if !self.closed {
            log::warn!("piped writer dropped without close, aborting the channel");
            self.abort("writer dropped before the end of data");
        }
    }
}

/// The consuming end of a [`PipedChannel`].
pub struct PipedReader {
    shared: Arc<Shared>,
    chunk: Vec<u8>,
    offset: usize,
    eof: bool,
    closed: bool,
}

impl PipedReader {
    /// Moves to the next non-empty chunk; `false` at the end of data.
    fn next_chunk(&mut self) -> Result<bool> {
        match self.shared.queue.poll(self.shared.timeout) {
            Ok(chunk) if chunk.is_empty() => {
                self.eof = true;
                Ok(false)
            }
            Ok(chunk) => {
                self.chunk = chunk;
                self.offset = 0;
                Ok(true)
            }
            Err(PollError::Timeout) => {
                let millis = self.shared.millis();
                Err(Error::timeout(
                    format!("Read timed out after {millis} ms"),
                    millis,
                ))
            }
            Err(PollError::Closed) => match self.shared.failure() {
                Some(e) => Err(e),
                None => {
                    self.eof = true;
                    Ok(false)
                }
            },
        }
    }

    /// Reads up to `buf.len()` bytes, returning 0 only at the end of data.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.closed {
            return Err(Error::invalid_operation("read from a closed piped stream"));
        }
        if buf.is_empty() {
            return Ok(0);
        }
        while self.offset >= self.chunk.len() {
            if self.eof || !self.next_chunk()? {
                return Ok(0);
            }
        }
        let n = (self.chunk.len() - self.offset).min(buf.len());
        buf[..n].copy_from_slice(&self.chunk[self.offset..self.offset + n]);
        self.offset += n;
        Ok(n)
    }

    pub fn is_eof(&self) -> bool {
        self.eof && self.offset >= self.chunk.len()
    }

    /// Discards queued chunks and fails further writes. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.chunk = Vec::new();
        self.shared.queue.close();
        self.shared.queue.clear();
        log::debug!("piped reader closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Read for PipedReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        Ok(self.read_bytes(buf)?)
    }
}

impl ClosingRead for PipedReader {
    fn close(&mut self) -> std::io::Result<()> {
        PipedReader::close(self);
        Ok(())
    }
}

impl Drop for PipedReader {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::{
        thread,
        time::{Duration, Instant},
    };

    use super::*;

    fn chunks() -> Vec<Vec<u8>> {
        (0..40u8).map(|i| vec![i; (i as usize * 7) % 23 + 1]).collect()
    }

    fn check_ordering(channel: PipedChannel) {
        let (mut writer, mut reader) = channel.split();
        let expected: Vec<u8> = chunks().concat();
        let producer = thread::spawn(move || {
            for chunk in chunks() {
                writer.write_bytes(&chunk).unwrap();
            }
            writer.close().unwrap();
        });
        let mut actual = Vec::new();
        reader.read_to_end(&mut actual).unwrap();
        producer.join().unwrap();
        assert_eq!(actual, expected);
        assert!(reader.is_eof());
    }

    #[test]
    fn test_ordering_blocking() {
        check_ordering(PipedChannel::blocking(16, 2, Some(Duration::from_secs(10))));
    }

    #[test]
    fn test_ordering_adaptive() {
        check_ordering(PipedChannel::adaptive(
            16,
            CapacityPolicy::linear(1, 4, 2),
            Some(Duration::from_secs(10)),
        ));
        check_ordering(PipedChannel::adaptive(5, CapacityPolicy::unbounded(), None));
    }

    #[test]
    fn test_backpressure() {
        let (mut writer, mut reader) = PipedChannel::blocking(4, 2, None).split();
        let start = Instant::now();
        let producer = thread::spawn(move || {
            for i in 0..3u8 {
                writer.write_bytes(&[i; 4]).unwrap();
            }
            let elapsed = start.elapsed();
            writer.close().unwrap();
            elapsed
        });

        thread::sleep(Duration::from_millis(200));
        assert!(!producer.is_finished());

        let mut first = [0u8; 4];
        reader.read_exact(&mut first).unwrap();
        assert_eq!(first, [0; 4]);
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, [1, 1, 1, 1, 2, 2, 2, 2]);

        let elapsed = producer.join().unwrap();
        assert!(elapsed >= Duration::from_millis(150), "{elapsed:?}");
    }

    #[test]
    fn test_write_timeout() {
        let (mut writer, _reader) = PipedChannel::blocking(1, 1, Some(Duration::from_millis(50))).split();
        writer.write_bytes(&[1]).unwrap();
        let e = writer.write_bytes(&[2]).unwrap_err();
        assert!(e.is_timeout());
        assert!(e.to_string().contains("Write timed out after 50 ms"), "{e}");
        writer.abort("test done");
    }

    #[test]
    fn test_read_timeout() {
        let (_writer, mut reader) = PipedChannel::adaptive(
            8,
            CapacityPolicy::fixed(2),
            Some(Duration::from_millis(50)),
        )
        .split();
        let start = Instant::now();
        let e = reader.read_bytes(&mut [0u8; 4]).unwrap_err();
        assert!(e.is_timeout());
        assert!(e.to_string().contains("Read timed out after 50 ms"), "{e}");
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_reader_close_fails_writes() {
        let (mut writer, mut reader) = PipedChannel::blocking(2, 4, None).split();
        writer.write_bytes(b"ab").unwrap();
        reader.close();
        reader.close();
        assert!(writer.write_bytes(b"cd").is_err());
        assert!(reader.read_bytes(&mut [0u8; 1]).is_err());
        writer.close().unwrap();
    }

    #[test]
    fn test_dropped_writer_fails_reader() {
        let (mut writer, mut reader) = PipedChannel::blocking(64, 4, None).split();
        writer.write_bytes(b"partial").unwrap();
        writer.flush().unwrap();
        drop(writer);

        let mut buf = [0u8; 7];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"partial");
        assert!(reader.read_bytes(&mut buf).is_err());
    }

    #[test]
    fn test_write_async() {
        let pool = ThreadPool::new(2, 2);
        let channel = PipedChannel::blocking(3, 2, Some(Duration::from_secs(10)));
        let (mut reader, handle) = channel
            .write_async_on(&pool, |w| {
                for i in 0..10u8 {
                    w.write_bytes(&[i, i])?;
                }
                Ok(())
            })
            .unwrap();
        let mut data = Vec::new();
        reader.read_to_end(&mut data).unwrap();
        assert_eq!(data.len(), 20);
        handle.wait(Duration::from_secs(10)).unwrap();
    }

    #[test]
    fn test_write_async_failure_reaches_reader() {
        let pool = ThreadPool::new(1, 1);
        let channel = PipedChannel::adaptive(4, CapacityPolicy::fixed(8), Some(Duration::from_secs(10)));
        let (mut reader, handle) = channel
            .write_async_on(&pool, |w| {
                w.write_bytes(b"12345678")?;
                Err(Error::unsupported("producer gave up"))
            })
            .unwrap();
        let mut data = Vec::new();
        let e = Error::from(reader.read_to_end(&mut data).unwrap_err());
        assert!(e.to_string().contains("aborted"), "{e}");
        assert!(handle.wait(Duration::from_secs(10)).unwrap_err().is_timeout());
    }

    #[test]
    fn test_create_from_config() {
        let config = DataConfig::default();
        let channel = PipedChannel::create(&config);
        assert_eq!(channel.capacity(), Some(1));
        assert_eq!(channel.timeout(), Some(Duration::from_millis(30_000)));

        let channel = PipedChannel::create(&config.clone().with_blocking_queue(true));
        assert_eq!(channel.capacity(), Some(512));

        let channel = PipedChannel::create(&config.clone().with_buffer_queue_variation(0));
        assert_eq!(channel.capacity(), Some(512));

        let channel = PipedChannel::create(
            &config
                .clone()
                .with_blocking_queue(true)
                .with_read_buffering_mode(BufferingMode::Performance),
        );
        assert_eq!(channel.capacity(), None);
        assert_eq!(channel.timeout(), None);
    }
}
