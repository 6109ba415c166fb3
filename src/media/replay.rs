use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::Context;
use bytes::Bytes;
use frame_bus::{
    annexb,
    client::ClientEvents,
    codec::CodecFormat,
    frame::{FrameUnit, StreamMeta, VideoEncoder, VideoMeta},
};
use tokio_util::sync::CancellationToken;

const TIMESCALE: u32 = 90_000;

/// Plays an Annex-B elementary stream file through `ClientEvents` at a fixed
/// frame rate, the way a live streaming client would deliver it.
pub struct ReplaySource {
    units: Vec<Bytes>,
    format: CodecFormat,
    fps: f64,
}

impl ReplaySource {
    pub fn open(path: &Path, format: CodecFormat, fps: f64) -> anyhow::Result<Self> {
        let data = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
        let source = Self::from_bytes(Bytes::from(data), format, fps);
        if source.is_empty() {
            anyhow::bail!("no {} access units found in {}", format, path.display());
        }
        log::info!(
            "replay source {}: {} access units",
            path.display(),
            source.len()
        );
        Ok(source)
    }

    /// `fps <= 0` delivers units back to back.
    pub fn from_bytes(data: Bytes, format: CodecFormat, fps: f64) -> Self {
        Self {
            units: annexb::access_units(format, &data),
            format,
            fps,
        }
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    fn frame_interval(&self) -> Option<Duration> {
        (self.fps > 0.0).then(|| Duration::from_secs_f64(1.0 / self.fps))
    }

    fn meta(&self) -> StreamMeta {
        let unit = if self.fps > 0.0 {
            (TIMESCALE as f64 / self.fps).round() as u32
        } else {
            0
        };
        StreamMeta {
            video: VideoMeta {
                timescale: TIMESCALE,
                unit,
                encoder: match self.format {
                    CodecFormat::H264 => VideoEncoder::H264,
                    CodecFormat::H265 => VideoEncoder::H265,
                },
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Delivers every unit on a new thread. The handle yields the number of
    /// units delivered before the end of the file or cancellation.
    pub fn spawn(
        self,
        events: Arc<dyn ClientEvents>,
        cancel: CancellationToken,
    ) -> anyhow::Result<JoinHandle<u64>> {
        std::thread::Builder::new()
            .name("replay-source".to_string())
            .spawn(move || self.run(events.as_ref(), &cancel))
            .context("spawn replay thread")
    }

    pub fn run(&self, events: &dyn ClientEvents, cancel: &CancellationToken) -> u64 {
        events.on_connected();
        let meta = self.meta();
        let ticks = meta.video.unit as u64;
        events.on_meta(meta);

        let interval = self.frame_interval();
        let started = Instant::now();
        let mut sent = 0u64;
        for (n, payload) in self.units.iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }
            let seq = n as u64;
            let kind = annexb::classify(self.format, payload);
            let wall_clock = chrono::Utc::now().timestamp_micros().max(0) as u64;
            let unit = FrameUnit::new(kind, payload.clone(), seq).with_timestamps(seq * ticks, wall_clock);
            events.on_frame(unit);
            sent += 1;

            if let Some(interval) = interval {
                let due = started + interval * (n as u32 + 1);
                let now = Instant::now();
                if due > now {
                    std::thread::sleep(due - now);
                }
            }
        }

        log::info!("replay finished after {} units", sent);
        events.on_disconnected();
        sent
    }
}
