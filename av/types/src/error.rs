/*!
    Error types for the av crate family.
*/

use std::fmt;

/**
    Error type for the av crate family.
*/
#[derive(Debug)]
pub enum Error {
    /// I/O error (file not found, short read from the OS, etc.)
    Io(std::io::Error),
    /// An FFmpeg call returned a negative status code.
    Ffmpeg {
        /// The operation that failed (e.g. `"avformat_open_input"`).
        context: String,
        /// Raw FFmpeg error code (negative AVERROR value).
        code: i32,
        /// Human-readable message from `av_strerror`.
        message: String,
    },
    /// Codec error (decode/encode failure)
    Codec { message: String },
    /// Invalid data (malformed input)
    InvalidData { message: String },
    /// Operation not supported by the stream or binding
    Unsupported { operation: String },
    /// End of stream (not really an error, but part of control flow)
    Eof,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Ffmpeg {
                context,
                code,
                message,
            } => write!(f, "{context}: {message} (code {code})"),
            Self::Codec { message } => write!(f, "codec error: {message}"),
            Self::InvalidData { message } => write!(f, "invalid data: {message}"),
            Self::Unsupported { operation } => write!(f, "unsupported operation: {operation}"),
            Self::Eof => write!(f, "end of stream"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl Error {
    /**
        Create an FFmpeg error from a call site and a negative status code.
    */
    pub fn ffmpeg(context: impl Into<String>, code: i32, message: impl Into<String>) -> Self {
        Self::Ffmpeg {
            context: context.into(),
            code,
            message: message.into(),
        }
    }

    /**
        Create a codec error with the given message.
    */
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /**
        Create an invalid data error with the given message.
    */
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /**
        Create an unsupported operation error.
    */
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /**
        Returns true if this is an EOF error.
    */
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Eof)
    }

    /**
        Returns true if this is an unsupported-operation error.
    */
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }
}

/**
    Result type alias for the av crate family.
*/
pub type Result<T> = std::result::Result<T, Error>;

// Errors cross thread boundaries in native callbacks
static_assertions::assert_impl_all!(Error: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn error_display() {
        let e = Error::codec("decode failed");
        assert_eq!(format!("{e}"), "codec error: decode failed");

        let e = Error::invalid_data("corrupted header");
        assert_eq!(format!("{e}"), "invalid data: corrupted header");

        let e = Error::unsupported("seek");
        assert_eq!(format!("{e}"), "unsupported operation: seek");

        let e = Error::ffmpeg("av_read_frame", -541478725, "End of file");
        assert_eq!(
            format!("{e}"),
            "av_read_frame: End of file (code -541478725)"
        );

        let e = Error::Eof;
        assert_eq!(format!("{e}"), "end of stream");
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(format!("{e}").contains("file not found"));
    }

    #[test]
    fn error_is_eof() {
        assert!(Error::Eof.is_eof());
        assert!(!Error::codec("test").is_eof());
    }

    #[test]
    fn error_is_unsupported() {
        assert!(Error::unsupported("seek").is_unsupported());
        assert!(!Error::Eof.is_unsupported());
    }

    #[test]
    fn error_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let e = Error::Io(io_err);
        assert!(StdError::source(&e).is_some());

        let e = Error::Eof;
        assert!(StdError::source(&e).is_none());
    }
}
