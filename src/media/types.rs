use std::fmt::{Display, Formatter};

use frame_bus::frame::{AudioUnit, FrameUnit, StreamMeta};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Idle,
    Connected,
    Disconnected,
}

/// Last video unit seen by the relay.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VideoStatus {
    pub frm_no: u64,
    pub pts: u64,
    /// Pts delta to the previous unit, 0 for the first one.
    pub interval: u64,
    pub kind: String,
    pub size: usize,
    pub ntp: u64,
}

impl VideoStatus {
    pub fn from_unit(unit: &FrameUnit, last_pts: Option<u64>) -> Self {
        Self {
            frm_no: unit.sequence,
            pts: unit.pts,
            interval: last_pts.map_or(0, |last| unit.pts.saturating_sub(last)),
            kind: unit.kind.to_string(),
            size: unit.len(),
            ntp: unit.wall_clock,
        }
    }
}

impl Display for VideoStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Video: frm_no = {}, PTS={}, interval={}, type={}, size={} bytes, NTP={}",
            self.frm_no, self.pts, self.interval, self.kind, self.size, self.ntp
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AudioStatus {
    pub pts: u64,
    pub size: usize,
    pub ntp: u64,
}

impl From<&AudioUnit> for AudioStatus {
    fn from(unit: &AudioUnit) -> Self {
        Self {
            pts: unit.pts,
            size: unit.payload.len(),
            ntp: unit.wall_clock,
        }
    }
}

impl Display for AudioStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Audio: PTS={}, size={} bytes, NTP={}",
            self.pts, self.size, self.ntp
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetaStatus {
    pub width: u32,
    pub height: u32,
    pub timescale: u32,
    pub unit: u32,
    pub gop: u32,
    pub video_encoder: String,
    pub audio_sample_rate: u32,
    pub audio_channels: u32,
    pub audio_bitrate: u32,
    pub audio_encoder: String,
    pub pts_is_wall_clock: bool,
}

impl From<&StreamMeta> for MetaStatus {
    fn from(meta: &StreamMeta) -> Self {
        Self {
            width: meta.video.width,
            height: meta.video.height,
            timescale: meta.video.timescale,
            unit: meta.video.unit,
            gop: meta.video.gop,
            video_encoder: meta.video.encoder.to_string(),
            audio_sample_rate: meta.audio.sample_rate,
            audio_channels: meta.audio.channels,
            audio_bitrate: meta.audio.bitrate,
            audio_encoder: meta.audio.encoder.to_string(),
            pts_is_wall_clock: meta.pts_is_wall_clock,
        }
    }
}

/// Per-stage counters sampled when a status snapshot is taken.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineCounters {
    pub frames_received: u64,
    pub frames_written: u64,
    pub writer_dropped: u64,
    pub units_decoded: u64,
    pub decoder_dropped: u64,
    pub decode_errors: u64,
    pub images_presented: u64,
    pub display_dropped: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RelayStatus {
    pub connection: ConnectionState,
    pub video: Option<VideoStatus>,
    pub audio: Option<AudioStatus>,
    pub meta: Option<MetaStatus>,
    pub client_errors: u64,
    pub last_error: Option<String>,
    pub backpressure_events: u64,
    pub dump_path: Option<String>,
    pub decoder_format: Option<String>,
    pub counters: PipelineCounters,
}
