//! Byte streams for the data layer:
//! - [`InputStream`] / [`OutputStream`]: buffered streams with optional compression and
//!   the primitives (bytes, varints, length-prefixed strings) used by serializers.
//! - [`piped::PipedChannel`]: a single-producer/single-consumer byte channel connecting
//!   a writer thread to a reader thread with backpressure.
//!
//! Raw sinks and sources plug in through [`SealingWrite`] and [`ClosingRead`]; any
//! `std::io::Write` or `std::io::Read` can be adapted with [`Unsealed`] and
//! [`Unclosed`].

pub mod codec;
pub mod input;
pub mod output;
pub mod piped;

pub use input::InputStream;
pub use output::OutputStream;
pub use piped::{PipedAbort, PipedChannel, PipedReader, PipedWriter};

/// A sequential writer with an explicit end.
///
/// [`seal`](SealingWrite::seal) flushes buffered data and finalizes the stream, for
/// example by writing a compression frame trailer or an end-of-data marker. Writing
/// after sealing fails.
pub trait SealingWrite: std::io::Write + Send {
    /// Finalizes the stream. Calling it again is a no-op.
    fn seal(&mut self) -> std::io::Result<()>;
}

/// A sequential reader with an explicit end, releasing the source on
/// [`close`](ClosingRead::close).
pub trait ClosingRead: std::io::Read + Send {
    /// Releases the source. Calling it again is a no-op.
    fn close(&mut self) -> std::io::Result<()>;
}

/// Adapts a plain writer: sealing only flushes it.
pub struct Unsealed<W>(pub W);

impl<W: std::io::Write> std::io::Write for Unsealed<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.flush()
    }
}

impl<W: std::io::Write + Send> SealingWrite for Unsealed<W> {
    fn seal(&mut self) -> std::io::Result<()> {
        self.0.flush()
    }
}

/// Adapts a plain reader: closing does nothing.
pub struct Unclosed<R>(pub R);

impl<R: std::io::Read> std::io::Read for Unclosed<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read(buf)
    }
}

impl<R: std::io::Read + Send> ClosingRead for Unclosed<R> {
    fn close(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<T> SealingWrite for Box<T>
where
    T: SealingWrite + ?Sized,
{
    fn seal(&mut self) -> std::io::Result<()> {
        self.as_mut().seal()
    }
}

impl<T> ClosingRead for Box<T>
where
    T: ClosingRead + ?Sized,
{
    fn close(&mut self) -> std::io::Result<()> {
        self.as_mut().close()
    }
}
