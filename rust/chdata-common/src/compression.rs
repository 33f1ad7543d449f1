//! Compression algorithm selection.
//!
//! The enum only identifies an algorithm; codec implementations live in `chdata-io`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Brotli,
    Bz2,
    Deflate,
    Gzip,
    Lz4,
    Snappy,
    Xz,
    Zstd,
}

impl Compression {
    pub const ALL: [Compression; 9] = [
        Compression::None,
        Compression::Brotli,
        Compression::Bz2,
        Compression::Deflate,
        Compression::Gzip,
        Compression::Lz4,
        Compression::Snappy,
        Compression::Xz,
        Compression::Zstd,
    ];

    /// MIME type of the compressed payload, empty for `None`.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Compression::None => "",
            Compression::Brotli => "application/x-brotli",
            Compression::Bz2 => "application/x-bzip2",
            Compression::Deflate => "application/deflate",
            Compression::Gzip => "application/gzip",
            Compression::Lz4 => "application/x-lz4",
            Compression::Snappy => "application/x-snappy",
            Compression::Xz => "application/x-xz",
            Compression::Zstd => "application/zstd",
        }
    }

    /// Token used in `Content-Encoding` / `Accept-Encoding` headers.
    pub fn encoding(&self) -> &'static str {
        match self {
            Compression::None => "",
            Compression::Brotli => "br",
            Compression::Bz2 => "bz2",
            Compression::Deflate => "deflate",
            Compression::Gzip => "gzip",
            Compression::Lz4 => "lz4",
            Compression::Snappy => "snappy",
            Compression::Xz => "xz",
            Compression::Zstd => "zstd",
        }
    }

    /// File extension without the leading dot.
    pub fn file_extension(&self) -> &'static str {
        match self {
            Compression::None => "",
            Compression::Brotli => "br",
            Compression::Bz2 => "bz2",
            Compression::Deflate => "zz",
            Compression::Gzip => "gz",
            Compression::Lz4 => "lz4",
            Compression::Snappy => "sz",
            Compression::Xz => "xz",
            Compression::Zstd => "zst",
        }
    }

    /// Looks up an algorithm by its content-encoding token (case-insensitive).
    /// Unknown or empty tokens map to `None`.
    pub fn from_encoding(encoding: &str) -> Compression {
        let encoding = encoding.trim();
        Self::ALL
            .into_iter()
            .find(|c| !c.encoding().is_empty() && c.encoding().eq_ignore_ascii_case(encoding))
            .unwrap_or(Compression::None)
    }

    /// Guesses the algorithm from a file name's last extension.
    pub fn from_file_name(file_name: &str) -> Compression {
        let Some((_, ext)) = file_name.rsplit_once('.') else {
            return Compression::None;
        };
        Self::ALL
            .into_iter()
            .find(|c| !c.file_extension().is_empty() && c.file_extension().eq_ignore_ascii_case(ext))
            .unwrap_or(Compression::None)
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Compression::None => "none",
            other => other.encoding(),
        };
        f.write_str(name)
    }
}
