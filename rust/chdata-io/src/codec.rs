//! Compression codec factory.
//!
//! Only `Lz4` (frame format) and `Zstd` carry codecs here; every other
//! [`Compression`] is reported as unsupported.

use std::io::{Read, Write};

use chdata_common::{Compression, Result, error::Error};

use crate::{ClosingRead, SealingWrite};

/// Returns `true` if streams can be compressed and decompressed with `compression`.
pub fn is_supported(compression: Compression) -> bool {
    matches!(
        compression,
        Compression::None | Compression::Lz4 | Compression::Zstd
    )
}

/// Wraps `sink` so that bytes written are compressed with `compression`.
///
/// # Arguments
///
/// * `level` - codec-specific compression level; negative selects the codec default.
///
/// # Returns
///
/// The compressing writer; sealing it finishes the compressed frame and then seals
/// `sink`. Fails with `Unsupported` for algorithms without a codec.
pub fn compressor(
    compression: Compression,
    level: i32,
    sink: Box<dyn SealingWrite>,
) -> Result<Box<dyn SealingWrite>> {
    match compression {
        Compression::None => Ok(Box::new(PlainSink(Some(sink)))),
        Compression::Zstd => {
            let level = if level < 0 { 0 } else { level };
            let encoder = zstd::stream::write::Encoder::new(sink, level)
                .map_err(|e| Error::io("Failed to create ZSTD encoder", e))?;
            Ok(Box::new(ZstdSink(Some(encoder))))
        }
        Compression::Lz4 => {
            let encoder = lz4::EncoderBuilder::new()
                .level(level.max(0) as u32)
                .build(sink)
                .map_err(|e| Error::io("Failed to create LZ4 encoder", e))?;
            Ok(Box::new(Lz4Sink(Some(encoder))))
        }
        other => Err(Error::unsupported(format!("compression {other}"))),
    }
}

/// Wraps `source` so that bytes read are decompressed with `compression`.
///
/// Closing the returned reader closes `source`. Fails with `Unsupported` for
/// algorithms without a codec.
pub fn decompressor(
    compression: Compression,
    source: Box<dyn ClosingRead>,
) -> Result<Box<dyn ClosingRead>> {
    match compression {
        Compression::None => Ok(source),
        Compression::Zstd => {
            let decoder = zstd::stream::read::Decoder::new(source)
                .map_err(|e| Error::io("Failed to create ZSTD decoder", e))?;
            Ok(Box::new(ZstdSource(Some(decoder))))
        }
        Compression::Lz4 => {
            let decoder = lz4::Decoder::new(source)
                .map_err(|e| Error::io("Failed to create LZ4 decoder", e))?;
            Ok(Box::new(Lz4Source(Some(decoder))))
        }
        other => Err(Error::unsupported(format!("compression {other}"))),
    }
}

fn sealed() -> std::io::Error {
    std::io::Error::other("stream is already sealed")
}

fn closed() -> std::io::Error {
    std::io::Error::other("stream is already closed")
}

/// Passes bytes through unchanged; like the codecs, it refuses writes once sealed.
struct PlainSink(Option<Box<dyn SealingWrite>>);

impl Write for PlainSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.as_mut().ok_or_else(sealed)?.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.as_mut().ok_or_else(sealed)?.flush()
    }
}

impl SealingWrite for PlainSink {
    fn seal(&mut self) -> std::io::Result<()> {
        match self.0.take() {
            Some(mut sink) => sink.seal(),
            None => Ok(()),
        }
    }
}

struct ZstdSink(Option<zstd::stream::write::Encoder<'static, Box<dyn SealingWrite>>>);

impl Write for ZstdSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.as_mut().ok_or_else(sealed)?.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.as_mut().ok_or_else(sealed)?.flush()
    }
}

impl SealingWrite for ZstdSink {
    fn seal(&mut self) -> std::io::Result<()> {
        match self.0.take() {
            Some(encoder) => encoder.finish()?.seal(),
            None => Ok(()),
        }
    }
}

struct Lz4Sink(Option<lz4::Encoder<Box<dyn SealingWrite>>>);

impl Write for Lz4Sink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.as_mut().ok_or_else(sealed)?.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.as_mut().ok_or_else(sealed)?.flush()
    }
}

impl SealingWrite for Lz4Sink {
    fn seal(&mut self) -> std::io::Result<()> {
        let Some(encoder) = self.0.take() else {
            return Ok(());
        };
        let (mut sink, res) = encoder.finish();
        res?;
        sink.seal()
    }
}

type ZstdDecoder = zstd::stream::read::Decoder<'static, std::io::BufReader<Box<dyn ClosingRead>>>;

struct ZstdSource(Option<ZstdDecoder>);

impl Read for ZstdSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.as_mut().ok_or_else(closed)?.read(buf)
    }
}

impl ClosingRead for ZstdSource {
    fn close(&mut self) -> std::io::Result<()> {
        match self.0.take() {
            Some(decoder) => decoder.finish().into_inner().close(),
            None => Ok(()),
        }
    }
}

struct Lz4Source(Option<lz4::Decoder<Box<dyn ClosingRead>>>);

impl Read for Lz4Source {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.as_mut().ok_or_else(closed)?.read(buf)
    }
}

impl ClosingRead for Lz4Source {
    fn close(&mut self) -> std::io::Result<()> {
        let Some(decoder) = self.0.take() else {
            return Ok(());
        };
        // A partially read frame is not an error when the reader gives up early.
        let (mut source, _) = decoder.finish();
        source.close()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::Unclosed;

    /// Collects written bytes into a shared buffer and records sealing.
    #[derive(Clone, Default)]
    struct Collect(Arc<Mutex<(Vec<u8>, bool)>>);

    impl Write for Collect {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().0.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SealingWrite for Collect {
        fn seal(&mut self) -> std::io::Result<()> {
            self.0.lock().unwrap().1 = true;
            Ok(())
        }
    }

    fn round_trip(compression: Compression) {
        let payload: Vec<u8> = (0..50_000u32).flat_map(|i| (i % 97).to_le_bytes()).collect();
        let collect = Collect::default();
        let mut writer = compressor(compression, -1, Box::new(collect.clone())).unwrap();
        writer.write_all(&payload).unwrap();
        writer.seal().unwrap();
        writer.seal().unwrap();
        assert!(writer.write_all(b"x").is_err());
        assert!(writer.flush().is_err());

        let (compressed, was_sealed) = collect.0.lock().unwrap().clone();
        assert!(was_sealed);
        if compression != Compression::None {
            assert!(compressed.len() < payload.len());
        }

        let mut reader =
            decompressor(compression, Box::new(Unclosed(std::io::Cursor::new(compressed)))).unwrap();
        let mut decoded = Vec::new();
        reader.read_to_end(&mut decoded).unwrap();
        reader.close().unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_zstd_round_trip() {
        round_trip(Compression::Zstd);
    }

    #[test]
    fn test_lz4_round_trip() {
        round_trip(Compression::Lz4);
    }

    #[test]
    fn test_no_compression() {
        round_trip(Compression::None);
    }

    #[test]
    fn test_unsupported() {
        for compression in [Compression::Gzip, Compression::Brotli, Compression::Xz] {
            assert!(!is_supported(compression));
            assert!(compressor(compression, 0, Box::new(Collect::default())).is_err());
        }
    }
}
