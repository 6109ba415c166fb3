use std::fmt::{Display, Formatter};

use bytes::Bytes;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Key,
    Delta,
}

impl Display for FrameKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameKind::Key => f.write_str("key"),
            FrameKind::Delta => f.write_str("delta"),
        }
    }
}

/// One compressed video access unit as delivered by the streaming client.
///
/// The payload is reference counted, so fanning a unit out to several stages
/// clones a handle, not the bytes.
#[derive(Debug, Clone)]
pub struct FrameUnit {
    pub kind: FrameKind,
    pub payload: Bytes,
    /// Arrival sequence number assigned by the client.
    pub sequence: u64,
    /// Presentation timestamp in the stream timescale.
    pub pts: u64,
    /// Wall clock (NTP) timestamp reported by the camera.
    pub wall_clock: u64,
}

impl FrameUnit {
    pub fn new(kind: FrameKind, payload: impl Into<Bytes>, sequence: u64) -> Self {
        Self {
            kind,
            payload: payload.into(),
            sequence,
            pts: 0,
            wall_clock: 0,
        }
    }

    pub fn with_timestamps(mut self, pts: u64, wall_clock: u64) -> Self {
        self.pts = pts;
        self.wall_clock = wall_clock;
        self
    }

    pub fn is_key(&self) -> bool {
        self.kind == FrameKind::Key
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

impl Display for FrameUnit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "frm_no = {}, PTS={}, type={}, size={} bytes, NTP={}",
            self.sequence,
            self.pts,
            self.kind,
            self.payload.len(),
            self.wall_clock
        )
    }
}

#[derive(Debug, Clone)]
pub struct AudioUnit {
    pub payload: Bytes,
    pub pts: u64,
    pub wall_clock: u64,
}

impl Display for AudioUnit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "PTS={}, size={} bytes, NTP={}",
            self.pts,
            self.payload.len(),
            self.wall_clock
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoEncoder {
    H264,
    H265,
    #[default]
    Unknown,
}

impl Display for VideoEncoder {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            VideoEncoder::H264 => f.write_str("H.264"),
            VideoEncoder::H265 => f.write_str("H.265"),
            VideoEncoder::Unknown => f.write_str("Unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioEncoder {
    Aac,
    Pcm,
    #[default]
    Unknown,
}

impl Display for AudioEncoder {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioEncoder::Aac => f.write_str("AAC"),
            AudioEncoder::Pcm => f.write_str("PCM"),
            AudioEncoder::Unknown => f.write_str("Unknown"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoMeta {
    pub width: u32,
    pub height: u32,
    pub timescale: u32,
    pub unit: u32,
    pub gop: u32,
    pub encoder: VideoEncoder,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioMeta {
    pub timescale: u32,
    pub unit: u32,
    pub sample_rate: u32,
    /// Bytes per sample unit.
    pub sample_size: u32,
    pub channels: u32,
    pub bitrate: u32,
    pub encoder: AudioEncoder,
}

impl AudioMeta {
    pub fn bits_per_sample(&self) -> Option<f64> {
        if self.unit == 0 {
            return None;
        }
        Some(8.0 * self.sample_size as f64 / self.unit as f64)
    }
}

/// Stream description sent once per connection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamMeta {
    pub video: VideoMeta,
    pub audio: AudioMeta,
    pub pts_is_wall_clock: bool,
}

impl Display for StreamMeta {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let v = &self.video;
        let a = &self.audio;
        write!(
            f,
            "video {}x{} timescale={}/{} gop={} encoder={}; audio {}Hz x{} encoder={} bitrate={}; wall clock={}",
            v.width,
            v.height,
            v.timescale,
            v.unit,
            v.gop,
            v.encoder,
            a.sample_rate,
            a.channels,
            a.encoder,
            a.bitrate,
            self.pts_is_wall_clock
        )
    }
}

/// Error reported by the streaming client itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientError {
    pub code: i32,
    pub description: String,
}

impl Display for ClientError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "code={}, description={}", self.code, self.description)
    }
}
