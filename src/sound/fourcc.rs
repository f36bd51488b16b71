//! Four-character codes and the closed set of chunk tags each dialect knows.

use std::fmt;

use super::formats::Dialect;

/// A raw four-byte identifier as it appears on disk
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    pub const FORM: FourCC = FourCC(*b"FORM");
    pub const AIFF: FourCC = FourCC(*b"AIFF");
    pub const AIFC: FourCC = FourCC(*b"AIFC");
    pub const COMM: FourCC = FourCC(*b"COMM");
    pub const SSND: FourCC = FourCC(*b"SSND");
    pub const RIFF: FourCC = FourCC(*b"RIFF");
    pub const WAVE: FourCC = FourCC(*b"WAVE");
    pub const FMT: FourCC = FourCC(*b"fmt ");
    pub const DATA: FourCC = FourCC(*b"data");
    pub const CAFF: FourCC = FourCC(*b"caff");
    pub const DESC: FourCC = FourCC(*b"desc");
    pub const LPCM: FourCC = FourCC(*b"lpcm");

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl From<[u8; 4]> for FourCC {
    fn from(bytes: [u8; 4]) -> Self {
        FourCC(bytes)
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{:02x}", b)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCC(\"{}\")", self)
    }
}

/// What the scanner does with a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkRole {
    /// Format-description chunk, decoded inline
    Description,
    /// Sound-data chunk holding the PCM bytes
    SoundData,
    /// Anything else, handed to the consumer or skipped
    Other,
}

/// Chunk identifiers recognized by at least one dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkTag {
    // AIFF / AIFC
    Common,
    SoundData,
    FormatVersion,
    Marker,
    Instrument,
    Comment,
    Name,
    Author,
    Copyright,
    Annotation,
    Application,
    // RIFF / WAVE
    Format,
    Data,
    Fact,
    List,
    Junk,
    Cue,
    BroadcastExt,
    // CAF
    Description,
    AudioData,
    ChannelLayout,
    Free,
    MagicCookie,
    PacketTable,
    Info,
    Strings,
    CafMarker,
    Region,
    CafInstrument,
    Peak,
    Overview,
    Uuid,
    Unknown(FourCC),
}

impl ChunkTag {
    /// Resolves a raw identifier in the context of a dialect
    pub fn resolve(dialect: Dialect, id: FourCC) -> ChunkTag {
        match dialect {
            Dialect::Aiff => match &id.0 {
                b"COMM" => ChunkTag::Common,
                b"SSND" => ChunkTag::SoundData,
                b"FVER" => ChunkTag::FormatVersion,
                b"MARK" => ChunkTag::Marker,
                b"INST" => ChunkTag::Instrument,
                b"COMT" => ChunkTag::Comment,
                b"NAME" => ChunkTag::Name,
                b"AUTH" => ChunkTag::Author,
                b"(c) " => ChunkTag::Copyright,
                b"ANNO" => ChunkTag::Annotation,
                b"APPL" => ChunkTag::Application,
                _ => ChunkTag::Unknown(id),
            },
            Dialect::Wav => match &id.0 {
                b"fmt " => ChunkTag::Format,
                b"data" => ChunkTag::Data,
                b"fact" => ChunkTag::Fact,
                b"LIST" => ChunkTag::List,
                b"JUNK" | b"junk" => ChunkTag::Junk,
                b"cue " => ChunkTag::Cue,
                b"bext" => ChunkTag::BroadcastExt,
                _ => ChunkTag::Unknown(id),
            },
            Dialect::Caf => match &id.0 {
                b"desc" => ChunkTag::Description,
                b"data" => ChunkTag::AudioData,
                b"chan" => ChunkTag::ChannelLayout,
                b"free" => ChunkTag::Free,
                b"kuki" => ChunkTag::MagicCookie,
                b"pakt" => ChunkTag::PacketTable,
                b"info" => ChunkTag::Info,
                b"strg" => ChunkTag::Strings,
                b"mark" => ChunkTag::CafMarker,
                b"regn" => ChunkTag::Region,
                b"inst" => ChunkTag::CafInstrument,
                b"peak" => ChunkTag::Peak,
                b"ovvw" => ChunkTag::Overview,
                b"uuid" => ChunkTag::Uuid,
                _ => ChunkTag::Unknown(id),
            },
        }
    }

    pub fn role(&self) -> ChunkRole {
        match self {
            ChunkTag::Common | ChunkTag::Format | ChunkTag::Description => ChunkRole::Description,
            ChunkTag::SoundData | ChunkTag::Data | ChunkTag::AudioData => ChunkRole::SoundData,
            _ => ChunkRole::Other,
        }
    }
}
