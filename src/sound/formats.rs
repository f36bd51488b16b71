//! Container dialects and the metadata decoded from their description chunks

use std::fmt;

use super::endian::Endian;
use super::fourcc::FourCC;

/// Chunk-based container family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// AIFF and AIFF-C (`FORM`)
    Aiff,
    /// RIFF/WAVE (`RIFF`)
    Wav,
    /// Core Audio Format (`caff`)
    Caf,
}

impl Dialect {
    /// Detects the dialect from the first four bytes of a stream
    pub fn sniff(magic: &[u8; 4]) -> Option<Dialect> {
        match magic {
            b"FORM" => Some(Dialect::Aiff),
            b"RIFF" => Some(Dialect::Wav),
            b"caff" => Some(Dialect::Caf),
            _ => None,
        }
    }

    /// Picks a dialect from a file extension (case-insensitive)
    pub fn from_extension(ext: &str) -> Option<Dialect> {
        match ext.to_ascii_lowercase().as_str() {
            "aif" | "aiff" | "aifc" => Some(Dialect::Aiff),
            "wav" | "wave" => Some(Dialect::Wav),
            "caf" => Some(Dialect::Caf),
            _ => None,
        }
    }

    pub fn magic(&self) -> FourCC {
        match self {
            Dialect::Aiff => FourCC::FORM,
            Dialect::Wav => FourCC::RIFF,
            Dialect::Caf => FourCC::CAFF,
        }
    }

    /// Byte order of chunk sizes and description fields
    pub fn byte_order(&self) -> Endian {
        match self {
            Dialect::Wav => Endian::Little,
            Dialect::Aiff | Dialect::Caf => Endian::Big,
        }
    }

    pub fn description_id(&self) -> FourCC {
        match self {
            Dialect::Aiff => FourCC::COMM,
            Dialect::Wav => FourCC::FMT,
            Dialect::Caf => FourCC::DESC,
        }
    }

    pub fn sound_data_id(&self) -> FourCC {
        match self {
            Dialect::Aiff => FourCC::SSND,
            Dialect::Wav | Dialect::Caf => FourCC::DATA,
        }
    }

    /// Length of the size field in a chunk header
    pub fn size_field_len(&self) -> u64 {
        match self {
            Dialect::Caf => 8,
            Dialect::Aiff | Dialect::Wav => 4,
        }
    }

    /// Length of a whole chunk header (id + size)
    pub fn chunk_header_len(&self) -> u64 {
        4 + self.size_field_len()
    }

    /// Whether odd-length chunks are followed by a pad byte
    pub fn pads_odd_chunks(&self) -> bool {
        !matches!(self, Dialect::Caf)
    }

    /// Conventional file extension
    pub fn extension(&self) -> &'static str {
        match self {
            Dialect::Aiff => "aif",
            Dialect::Wav => "wav",
            Dialect::Caf => "caf",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Dialect::Aiff => "AIFF",
            Dialect::Wav => "WAV",
            Dialect::Caf => "CAF",
        })
    }
}

/// Numeric representation of samples in the sound-data chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleFormat {
    /// Linear integer PCM (unsigned at 8 bits, signed otherwise)
    #[default]
    Int,
    /// IEEE 754 float
    Float,
}

/// AIFF-C compression type, resolved once from the COMM encoding tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AiffEncoding {
    /// Plain AIFF or AIFC `NONE`: big-endian integer PCM
    None,
    /// `sowt`: little-endian integer PCM
    Sowt,
    /// `twos`: big-endian two's complement PCM
    Twos,
    /// `raw `: offset-binary 8-bit PCM
    Raw,
    In24,
    In32,
    /// `fl32` / `FL32`
    Fl32,
    /// `fl64` / `FL64`
    Fl64,
    Ulaw,
    Alaw,
    Dwvw,
    Gsm,
    Ima4,
    Unknown(FourCC),
}

impl AiffEncoding {
    pub fn from_fourcc(id: FourCC) -> AiffEncoding {
        match &id.0 {
            b"NONE" | b"none" => AiffEncoding::None,
            b"sowt" => AiffEncoding::Sowt,
            b"twos" => AiffEncoding::Twos,
            b"raw " => AiffEncoding::Raw,
            b"in24" => AiffEncoding::In24,
            b"in32" => AiffEncoding::In32,
            b"fl32" | b"FL32" => AiffEncoding::Fl32,
            b"fl64" | b"FL64" => AiffEncoding::Fl64,
            b"ulaw" | b"ULAW" => AiffEncoding::Ulaw,
            b"alaw" | b"ALAW" => AiffEncoding::Alaw,
            b"DWVW" => AiffEncoding::Dwvw,
            b"GSM " => AiffEncoding::Gsm,
            b"ima4" => AiffEncoding::Ima4,
            _ => AiffEncoding::Unknown(id),
        }
    }

    pub fn fourcc(&self) -> FourCC {
        FourCC(match self {
            AiffEncoding::None => *b"NONE",
            AiffEncoding::Sowt => *b"sowt",
            AiffEncoding::Twos => *b"twos",
            AiffEncoding::Raw => *b"raw ",
            AiffEncoding::In24 => *b"in24",
            AiffEncoding::In32 => *b"in32",
            AiffEncoding::Fl32 => *b"fl32",
            AiffEncoding::Fl64 => *b"fl64",
            AiffEncoding::Ulaw => *b"ulaw",
            AiffEncoding::Alaw => *b"alaw",
            AiffEncoding::Dwvw => *b"DWVW",
            AiffEncoding::Gsm => *b"GSM ",
            AiffEncoding::Ima4 => *b"ima4",
            AiffEncoding::Unknown(id) => return *id,
        })
    }

    /// Human-readable name written after the tag in AIFC files
    pub fn default_name(&self) -> &'static str {
        match self {
            AiffEncoding::None | AiffEncoding::Twos => "not compressed",
            AiffEncoding::Sowt => "little-endian",
            AiffEncoding::Raw => "raw",
            AiffEncoding::In24 => "24-bit integer",
            AiffEncoding::In32 => "32-bit integer",
            AiffEncoding::Fl32 => "32-bit floating point",
            AiffEncoding::Fl64 => "64-bit floating point",
            AiffEncoding::Ulaw => "uLaw 2:1",
            AiffEncoding::Alaw => "aLaw 2:1",
            AiffEncoding::Dwvw => "Delta With Variable Word Width",
            AiffEncoding::Gsm => "GSM 6.10",
            AiffEncoding::Ima4 => "IMA 4:1",
            AiffEncoding::Unknown(_) => "unknown",
        }
    }

    /// Whether the linear PCM codec can decode this encoding
    pub fn is_pcm(&self) -> bool {
        matches!(
            self,
            AiffEncoding::None
                | AiffEncoding::Sowt
                | AiffEncoding::Twos
                | AiffEncoding::Raw
                | AiffEncoding::In24
                | AiffEncoding::In32
                | AiffEncoding::Fl32
        )
    }

    pub fn sample_format(&self) -> SampleFormat {
        match self {
            AiffEncoding::Fl32 | AiffEncoding::Fl64 => SampleFormat::Float,
            _ => SampleFormat::Int,
        }
    }

    pub fn byte_order(&self) -> Endian {
        match self {
            AiffEncoding::Sowt => Endian::Little,
            _ => Endian::Big,
        }
    }
}

/// `wFormatTag` values of the WAV `fmt ` chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WavFormat {
    Pcm,
    IeeeFloat,
    Alaw,
    Mulaw,
    Other(u16),
}

impl WavFormat {
    pub const TAG_PCM: u16 = 0x0001;
    pub const TAG_IEEE_FLOAT: u16 = 0x0003;
    pub const TAG_ALAW: u16 = 0x0006;
    pub const TAG_MULAW: u16 = 0x0007;
    pub const TAG_EXTENSIBLE: u16 = 0xFFFE;

    pub fn from_tag(tag: u16) -> WavFormat {
        match tag {
            Self::TAG_PCM => WavFormat::Pcm,
            Self::TAG_IEEE_FLOAT => WavFormat::IeeeFloat,
            Self::TAG_ALAW => WavFormat::Alaw,
            Self::TAG_MULAW => WavFormat::Mulaw,
            other => WavFormat::Other(other),
        }
    }

    pub fn tag(&self) -> u16 {
        match self {
            WavFormat::Pcm => Self::TAG_PCM,
            WavFormat::IeeeFloat => Self::TAG_IEEE_FLOAT,
            WavFormat::Alaw => Self::TAG_ALAW,
            WavFormat::Mulaw => Self::TAG_MULAW,
            WavFormat::Other(tag) => *tag,
        }
    }
}

/// CAF `desc` format flag: samples are IEEE floats
pub const CAF_FLAG_FLOAT: u32 = 1 << 0;
/// CAF `desc` format flag: samples are little-endian
pub const CAF_FLAG_LITTLE_ENDIAN: u32 = 1 << 1;

/// Dialect-specific fields of the description chunk
#[derive(Debug, Clone, PartialEq)]
pub enum FormatDetails {
    Aiff {
        encoding: AiffEncoding,
        /// AIFC Pascal-string codec name, if present
        encoding_name: Option<String>,
    },
    Wav {
        format: WavFormat,
        /// Set when the chunk used `WAVE_FORMAT_EXTENSIBLE`
        extensible: bool,
        block_align: u16,
    },
    Caf {
        format_id: FourCC,
        format_flags: u32,
        bytes_per_packet: u32,
        frames_per_packet: u32,
        /// Sample rate exactly as stored
        sample_rate: f64,
    },
}

impl FormatDetails {
    /// Whether samples are linear PCM the codec understands
    pub fn is_pcm(&self) -> bool {
        match self {
            FormatDetails::Aiff { encoding, .. } => encoding.is_pcm(),
            FormatDetails::Wav { format, .. } => {
                matches!(format, WavFormat::Pcm | WavFormat::IeeeFloat)
            }
            FormatDetails::Caf { format_id, .. } => *format_id == FourCC::LPCM,
        }
    }

    /// Short codec label for reports
    pub fn codec_name(&self) -> String {
        match self {
            FormatDetails::Aiff { encoding, .. } => encoding.fourcc().to_string(),
            FormatDetails::Wav { format, .. } => match format {
                WavFormat::Pcm => "PCM".to_string(),
                WavFormat::IeeeFloat => "IEEE float".to_string(),
                WavFormat::Alaw => "A-law".to_string(),
                WavFormat::Mulaw => "mu-law".to_string(),
                WavFormat::Other(tag) => format!("0x{:04x}", tag),
            },
            FormatDetails::Caf { format_id, .. } => format_id.to_string(),
        }
    }
}

/// Identity of an opened container, fixed once the header is validated
#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    pub dialect: Dialect,
    pub magic: FourCC,
    /// Declared total size from the header; CAF declares none
    pub size: Option<u64>,
    /// `AIFF`, `AIFC`, `WAVE` or `caff`
    pub form_type: FourCC,
    /// CAF file version
    pub version: Option<u16>,
}

impl Container {
    pub fn is_aifc(&self) -> bool {
        self.dialect == Dialect::Aiff && self.form_type == FourCC::AIFC
    }
}

/// Audio parameters decoded from the description chunk
#[derive(Debug, Clone, PartialEq)]
pub struct StreamMetadata {
    pub channels: u16,
    /// Integer sample rate in Hz
    pub sample_rate: u32,
    pub bit_depth: u16,
    /// Frame count declared by the description chunk (AIFF only)
    pub frame_count: Option<u64>,
    /// WAV `nAvgBytesPerSec`; zero elsewhere
    pub avg_bytes_per_sec: u32,
    pub sample_format: SampleFormat,
    /// Byte order of samples in the sound-data chunk
    pub sample_order: Endian,
    pub details: FormatDetails,
}

impl StreamMetadata {
    pub fn bytes_per_sample(&self) -> u64 {
        if self.bit_depth == 0 {
            0
        } else {
            u64::from((self.bit_depth - 1) / 8 + 1)
        }
    }

    /// Bytes occupied by one multi-channel frame
    pub fn frame_size(&self) -> u64 {
        self.bytes_per_sample() * u64::from(self.channels)
    }

    pub fn is_pcm(&self) -> bool {
        self.details.is_pcm()
    }
}

/// Sample layout an encoder writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub channels: u16,
    pub sample_rate: u32,
    pub bit_depth: u16,
    pub sample_format: SampleFormat,
}

impl PcmFormat {
    /// Integer PCM
    pub fn new(channels: u16, sample_rate: u32, bit_depth: u16) -> Self {
        Self {
            channels,
            sample_rate,
            bit_depth,
            sample_format: SampleFormat::Int,
        }
    }

    /// 32-bit IEEE float PCM
    pub fn float(channels: u16, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
            bit_depth: 32,
            sample_format: SampleFormat::Float,
        }
    }

    pub fn bytes_per_sample(&self) -> u64 {
        if self.bit_depth == 0 {
            0
        } else {
            u64::from((self.bit_depth - 1) / 8 + 1)
        }
    }

    pub fn frame_size(&self) -> u64 {
        self.bytes_per_sample() * u64::from(self.channels)
    }
}

impl From<&StreamMetadata> for PcmFormat {
    fn from(meta: &StreamMetadata) -> Self {
        Self {
            channels: meta.channels,
            sample_rate: meta.sample_rate,
            bit_depth: meta.bit_depth,
            sample_format: meta.sample_format,
        }
    }
}
