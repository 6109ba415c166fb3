use std::fmt::{Display, Formatter};

use bytes::Bytes;

use crate::frame::VideoEncoder;
use crate::image::DecodedImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecFormat {
    H264,
    H265,
}

impl CodecFormat {
    /// Decoder name as FFmpeg spells it.
    pub fn name(self) -> &'static str {
        match self {
            CodecFormat::H264 => "h264",
            CodecFormat::H265 => "hevc",
        }
    }

    /// Extension for a dumped elementary stream, e.g. `camera_x.h265`.
    pub fn file_extension(self) -> &'static str {
        match self {
            CodecFormat::H264 => "h264",
            CodecFormat::H265 => "h265",
        }
    }

    pub fn from_encoder(encoder: VideoEncoder) -> Option<Self> {
        match encoder {
            VideoEncoder::H264 => Some(CodecFormat::H264),
            VideoEncoder::H265 => Some(CodecFormat::H265),
            VideoEncoder::Unknown => None,
        }
    }

    /// Parses "h264"/"avc" and "h265"/"hevc", case-insensitively.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "h264" | "h.264" | "avc" => Some(CodecFormat::H264),
            "h265" | "h.265" | "hevc" => Some(CodecFormat::H265),
            _ => None,
        }
    }
}

impl Display for CodecFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadKind {
    Frame,
    Slice,
}

/// Decoder threading. One slice thread keeps latency at a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Threading {
    pub count: usize,
    pub kind: ThreadKind,
}

impl Default for Threading {
    fn default() -> Self {
        Self {
            count: 1,
            kind: ThreadKind::Slice,
        }
    }
}

/// A stateful video decoder for one compressed format.
pub trait Codec: Send {
    /// Splits arbitrary input bytes into packets the decoder accepts.
    fn parse(&mut self, data: &Bytes) -> anyhow::Result<Vec<Bytes>>;

    /// Decodes one packet; may yield zero or more pictures.
    fn decode(&mut self, packet: &Bytes) -> anyhow::Result<Vec<DecodedImage>>;
}

pub trait CodecFactory: Send + Sync {
    fn open(&self, format: CodecFormat, threading: Threading) -> anyhow::Result<Box<dyn Codec>>;
}
