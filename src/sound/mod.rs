//! Chunk-based audio containers
//!
//! Reads and writes AIFF/AIFC, RIFF/WAVE and CAF streams. The three dialects
//! share one model: a container header followed by a flat list of
//! id + size chunks, one of which describes the stream and one of which holds
//! the samples.
//!
//! # Architecture
//!
//! - `scanner` walks chunk headers and handles the late-description rewind
//! - `chunk` is the bounded, self-draining view a consumer reads from
//! - `aiff`, `wav` and `caf` hold the per-dialect parsers and header writers
//! - `decoder` and `encoder` are the entry points for reading and writing
//! - `handoff` runs the chunk walk on a worker thread
//! - `codec`, `endian` and `ieee80` are the byte-level helpers

pub mod aiff;
pub mod caf;
pub mod chunk;
pub mod codec;
pub mod decoder;
pub mod encoder;
pub mod endian;
pub mod error;
pub mod formats;
pub mod fourcc;
pub mod handoff;
pub mod ieee80;
pub mod pcm;
pub mod scanner;
pub mod wav;

pub use chunk::{Chunk, ChunkHeader};
pub use codec::SampleCodec;
pub use decoder::{transcode, Decoder, DecoderOptions, FrameSink, FrameSource};
pub use encoder::Encoder;
pub use endian::Endian;
pub use error::{ContainerError, ErrorKind, Result};
pub use formats::{
    AiffEncoding, Container, Dialect, FormatDetails, PcmFormat, SampleFormat, StreamMetadata,
    WavFormat,
};
pub use fourcc::{ChunkRole, ChunkTag, FourCC};
pub use handoff::{spawn_scanner, Handoff, HandoffConfig, ScanHandle, SharedChunk, TimeoutPolicy};
pub use ieee80::ExtendedFloatMode;
pub use pcm::PcmCursor;
pub use scanner::ChunkScanner;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_exports() {
        let _options = DecoderOptions::default();
        let _config = HandoffConfig::default();
        assert_eq!(Dialect::sniff(b"FORM"), Some(Dialect::Aiff));
        assert_eq!(FourCC::COMM.to_string(), "COMM");
    }
}
