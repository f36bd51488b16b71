//! Error type shared by every container decoder and encoder.

use std::io;
use std::time::Duration;

use super::fourcc::FourCC;

/// Coarse error category, cheap to copy around and print from batch tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnsupportedFormat,
    UnexpectedChunk,
    TruncatedStream,
    UnsupportedBitDepth,
    UnsupportedCodec,
    ConsumerTimeout,
    MissingChunk,
    PartialFrame,
    EncoderClosed,
    Failed,
    Io,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::UnsupportedFormat => "unsupported format",
            ErrorKind::UnexpectedChunk => "unexpected chunk",
            ErrorKind::TruncatedStream => "truncated stream",
            ErrorKind::UnsupportedBitDepth => "unsupported bit depth",
            ErrorKind::UnsupportedCodec => "unsupported codec",
            ErrorKind::ConsumerTimeout => "consumer timeout",
            ErrorKind::MissingChunk => "missing chunk",
            ErrorKind::PartialFrame => "partial frame",
            ErrorKind::EncoderClosed => "encoder closed",
            ErrorKind::Failed => "decoder failed",
            ErrorKind::Io => "i/o error",
        };
        f.write_str(name)
    }
}

/// Errors raised while reading or writing a chunk-based audio container.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Unexpected chunk: expected {expected}, found {found}")]
    UnexpectedChunk { expected: FourCC, found: FourCC },

    #[error("Truncated stream: needed {needed} bytes, {available} available")]
    TruncatedStream { needed: u64, available: u64 },

    #[error("Unsupported bit depth: {0}")]
    UnsupportedBitDepth(u16),

    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),

    #[error("Consumer did not release chunk {chunk} within {waited:?}")]
    ConsumerTimeout { chunk: FourCC, waited: Duration },

    #[error("Missing {0} chunk")]
    MissingChunk(FourCC),

    #[error("{samples} samples do not fill whole frames of {channels} channels")]
    PartialFrame { samples: usize, channels: u16 },

    #[error("Encoder already closed")]
    EncoderClosed,

    #[error("Decoder unusable after earlier {0} error")]
    Failed(ErrorKind),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ContainerError {
    /// Returns the category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ContainerError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            ContainerError::UnexpectedChunk { .. } => ErrorKind::UnexpectedChunk,
            ContainerError::TruncatedStream { .. } => ErrorKind::TruncatedStream,
            ContainerError::UnsupportedBitDepth(_) => ErrorKind::UnsupportedBitDepth,
            ContainerError::UnsupportedCodec(_) => ErrorKind::UnsupportedCodec,
            ContainerError::ConsumerTimeout { .. } => ErrorKind::ConsumerTimeout,
            ContainerError::MissingChunk(_) => ErrorKind::MissingChunk,
            ContainerError::PartialFrame { .. } => ErrorKind::PartialFrame,
            ContainerError::EncoderClosed => ErrorKind::EncoderClosed,
            ContainerError::Failed(_) => ErrorKind::Failed,
            ContainerError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                ErrorKind::TruncatedStream
            }
            ContainerError::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether this error should stop a decode outright
    ///
    /// Header and description errors are fatal; everything else is scoped to
    /// the call or chunk that produced it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::UnsupportedFormat
                | ErrorKind::UnexpectedChunk
                | ErrorKind::TruncatedStream
                | ErrorKind::ConsumerTimeout
                | ErrorKind::Failed
                | ErrorKind::Io
        )
    }
}

/// Result type for container operations
pub type Result<T> = std::result::Result<T, ContainerError>;
