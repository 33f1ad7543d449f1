use thiserror::Error;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

pub type StdErrorBoxed = Box<dyn std::error::Error + Send + Sync + 'static>;

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    /// Returns `true` if the error reports that the underlying source ran out of bytes.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self.kind(), ErrorKind::EndOfStream { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.kind(), ErrorKind::Timeout { .. })
    }

    pub fn parse(input: impl Into<String>, position: usize, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::Parse {
                input: input.into(),
                position,
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn stream_corruption(
        value_index: usize,
        column_index: usize,
        column_count: usize,
        column_name: impl Into<String>,
    ) -> Error {
        Error(
            ErrorKind::StreamCorruption {
                value_index,
                column_index,
                column_count,
                column_name: column_name.into(),
            }
            .into(),
        )
    }

    pub fn column_read(
        column_index: usize,
        column_count: usize,
        column_name: impl Into<String>,
        source: Error,
    ) -> Error {
        Error(
            ErrorKind::ColumnRead {
                column_index,
                column_count,
                column_name: column_name.into(),
                source,
            }
            .into(),
        )
    }

    pub fn end_of_stream(context: impl Into<String>) -> Error {
        Error(
            ErrorKind::EndOfStream {
                context: context.into(),
            }
            .into(),
        )
    }

    pub fn unsupported(what: impl Into<String>) -> Error {
        Error(ErrorKind::Unsupported { what: what.into() }.into())
    }

    pub fn timeout(context: impl Into<String>, millis: u64) -> Error {
        Error(
            ErrorKind::Timeout {
                context: context.into(),
                millis,
                source: None,
            }
            .into(),
        )
    }

    pub fn timeout_with_source<E>(context: impl Into<String>, millis: u64, source: E) -> Error
    where
        E: Into<StdErrorBoxed>,
    {
        Error(
            ErrorKind::Timeout {
                context: context.into(),
                millis,
                source: Some(source.into()),
            }
            .into(),
        )
    }

    pub fn configuration(message: impl Into<String>) -> Error {
        Error(
            ErrorKind::Configuration {
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn rejected(capacity: usize) -> Error {
        Error(ErrorKind::Rejected { capacity }.into())
    }

    pub fn invalid_arg(name: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidArgument {
                name: name.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn invalid_format(element: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidFormat {
                element: element.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn invalid_operation(name: impl Into<String>) -> Error {
        Error(ErrorKind::InvalidOperation { name: name.into() }.into())
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Error {
        Error(
            ErrorKind::Io {
                context: context.into(),
                source,
            }
            .into(),
        )
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("invalid data for '{element}': {message}")]
    InvalidFormat { element: String, message: String },

    #[error("invalid operation {name}")]
    InvalidOperation { name: String },

    #[error("failed to parse '{input}' at position {position}: {message}")]
    Parse {
        input: String,
        position: usize,
        message: String,
    },

    #[error(
        "reached end of stream when reading column #{} of {column_count} ({column_name}), value #{value_index}",
        column_index + 1
    )]
    StreamCorruption {
        value_index: usize,
        column_index: usize,
        column_count: usize,
        column_name: String,
    },

    #[error("failed to read column #{} of {column_count} ({column_name}): {source}", column_index + 1)]
    ColumnRead {
        column_index: usize,
        column_count: usize,
        column_name: String,
        source: Error,
    },

    #[error("unexpected end of stream: {context}")]
    EndOfStream { context: String },

    #[error("unsupported: {what}")]
    Unsupported { what: String },

    #[error("{context} (timeout {millis} ms)")]
    Timeout {
        context: String,
        millis: u64,
        source: Option<StdErrorBoxed>,
    },

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("task rejected, {capacity} tasks already in flight")]
    Rejected { capacity: usize },

    #[error("IO error for '{context}': {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(kind.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        // An error that crossed a `Read`/`Write` boundary comes back as itself.
        if e.get_ref().is_some_and(|inner| inner.is::<Error>()) {
            let kind = e.kind();
            return match e.into_inner().map(|inner| inner.downcast::<Error>()) {
                Some(Ok(error)) => *error,
                Some(Err(other)) => Error::io("", std::io::Error::new(kind, other)),
                None => Error::io("", std::io::Error::from(kind)),
            };
        }
        match e.kind() {
            std::io::ErrorKind::UnexpectedEof => Error::end_of_stream(e.to_string()),
            std::io::ErrorKind::TimedOut => Error::timeout_with_source(e.to_string(), 0, e),
            _ => Error::io("", e),
        }
    }
}

impl From<Error> for std::io::Error {
    fn from(e: Error) -> Self {
        let kind = match e.kind() {
            ErrorKind::EndOfStream { .. } => std::io::ErrorKind::UnexpectedEof,
            ErrorKind::Timeout { .. } => std::io::ErrorKind::TimedOut,
            ErrorKind::InvalidArgument { .. } => std::io::ErrorKind::InvalidInput,
            ErrorKind::InvalidFormat { .. } | ErrorKind::StreamCorruption { .. } => {
                std::io::ErrorKind::InvalidData
            }
            ErrorKind::Unsupported { .. } => std::io::ErrorKind::Unsupported,
            _ => std::io::ErrorKind::Other,
        };
        std::io::Error::new(kind, e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_mapping() {
        let eof = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "no more bytes");
        assert!(Error::from(eof).is_end_of_stream());

        let timed_out = std::io::Error::new(std::io::ErrorKind::TimedOut, "Read timed out");
        assert!(Error::from(timed_out).is_timeout());

        let other = std::io::Error::other("boom");
        assert!(matches!(Error::from(other).kind(), ErrorKind::Io { .. }));
    }

    #[test]
    fn test_stream_corruption_message() {
        let e = Error::stream_corruption(5, 1, 2, "name");
        let msg = e.to_string();
        assert!(msg.contains("column #2 of 2"), "{msg}");
        assert!(msg.contains("value #5"), "{msg}");
    }

    #[test]
    fn test_round_trip_through_io_error() {
        let e = Error::end_of_stream("varint");
        let io: std::io::Error = e.into();
        assert_eq!(io.kind(), std::io::ErrorKind::UnexpectedEof);
        assert!(Error::from(io).is_end_of_stream());
    }
}
