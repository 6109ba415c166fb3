use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicU64, Ordering},
};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::{
    codec::{Codec, CodecFactory, CodecFormat, Threading},
    error::StartError,
    frame::FrameUnit,
    image::DecodedImage,
    queue::BoundedFrameQueue,
    worker::{Lifecycle, StopOutcome, WorkerState},
};

/// Receives every decoded picture, on the decoder thread, in decode order.
pub type ImageHandler = Arc<dyn Fn(DecodedImage) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct DecoderConfig {
    pub queue_capacity: usize,
    pub submit_timeout: Duration,
    pub poll_interval: Duration,
    pub stop_timeout: Option<Duration>,
    /// Tried first on the first start.
    pub primary: CodecFormat,
    /// Tried once if `primary` cannot be opened.
    pub fallback: Option<CodecFormat>,
    pub threading: Threading,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 30,
            submit_timeout: Duration::from_millis(100),
            poll_interval: Duration::from_millis(10),
            stop_timeout: Some(Duration::from_secs(5)),
            primary: CodecFormat::H264,
            fallback: Some(CodecFormat::H265),
            threading: Threading::default(),
        }
    }
}

#[derive(Debug, Default)]
struct DecoderStats {
    units_decoded: AtomicU64,
    images_emitted: AtomicU64,
    units_dropped: AtomicU64,
    decode_errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecoderSnapshot {
    pub units_decoded: u64,
    pub images_emitted: u64,
    pub units_dropped: u64,
    pub decode_errors: u64,
    pub queued: usize,
}

/// Decodes compressed access units into pictures on a worker thread.
///
/// Decoding is best effort: a unit that fails to decode is logged and
/// skipped, and whatever is still queued at `stop` is discarded.
pub struct StreamDecoder {
    config: DecoderConfig,
    factory: Arc<dyn CodecFactory>,
    handler: ImageHandler,
    queue: BoundedFrameQueue<FrameUnit>,
    lifecycle: Lifecycle,
    stats: Arc<DecoderStats>,
    format: Mutex<Option<CodecFormat>>,
}

impl StreamDecoder {
    pub fn new(
        config: DecoderConfig,
        factory: Arc<dyn CodecFactory>,
        handler: ImageHandler,
    ) -> Self {
        let queue = BoundedFrameQueue::new(config.queue_capacity);
        Self {
            config,
            factory,
            handler,
            queue,
            lifecycle: Lifecycle::new("stream-decoder"),
            stats: Arc::new(DecoderStats::default()),
            format: Mutex::new(None),
        }
    }

    pub fn start(&self) -> Result<(), StartError> {
        let queue = self.queue.clone();
        let handler = Arc::clone(&self.handler);
        let stats = Arc::clone(&self.stats);
        let poll_interval = self.config.poll_interval;

        self.lifecycle.start(
            || {
                let codec = self.open_codec()?;
                self.queue.try_pop_all();
                Ok(codec)
            },
            move |codec, cancel| decode_loop(codec, queue, handler, stats, poll_interval, cancel),
        )
    }

    /// Opens the codec chosen on the first successful start, or negotiates
    /// one from the configured candidates.
    fn open_codec(&self) -> Result<Box<dyn Codec>, StartError> {
        let mut chosen = self.format.lock().unwrap_or_else(PoisonError::into_inner);
        let candidates: Vec<CodecFormat> = match *chosen {
            Some(format) => vec![format],
            None => std::iter::once(self.config.primary)
                .chain(self.config.fallback)
                .collect(),
        };

        let mut reasons = Vec::new();
        for format in &candidates {
            match self.factory.open(*format, self.config.threading) {
                Ok(codec) => {
                    log::info!("stream decoder using {}", format);
                    *chosen = Some(*format);
                    return Ok(codec);
                }
                Err(e) => {
                    log::warn!("failed to open {} decoder: {:#}", format, e);
                    reasons.push(format!("{}: {:#}", format, e));
                }
            }
        }

        Err(StartError::DecoderInit {
            tried: candidates
                .iter()
                .map(|f| f.name())
                .collect::<Vec<_>>()
                .join(", "),
            reason: reasons.join("; "),
        })
    }

    pub fn stop(&self) {
        if self.lifecycle.stop(self.config.stop_timeout) == StopOutcome::Joined {
            let discarded = self.queue.try_pop_all();
            if !discarded.is_empty() {
                log::debug!("stream decoder discarded {} queued frames", discarded.len());
            }
        }
    }

    /// Queues `unit` for decoding. Returns `false` if it was dropped.
    pub fn submit(&self, unit: FrameUnit) -> bool {
        if !self.lifecycle.is_running() {
            let dropped = self.stats.units_dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped == 1 || dropped % 100 == 0 {
                log::warn!(
                    "stream decoder is not running, frame {} dropped ({} dropped so far)",
                    unit.sequence,
                    dropped
                );
            }
            return false;
        }
        if !self.queue.push(unit, self.config.submit_timeout) {
            let dropped = self.stats.units_dropped.fetch_add(1, Ordering::Relaxed) + 1;
            // A full decode queue is routine under load; keep the log readable.
            if dropped == 1 || dropped % 100 == 0 {
                log::warn!("stream decoder queue is full, {} frames dropped so far", dropped);
            }
            return false;
        }
        true
    }

    pub fn state(&self) -> WorkerState {
        self.lifecycle.state()
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    /// The negotiated format, once a start has succeeded.
    pub fn format(&self) -> Option<CodecFormat> {
        *self.format.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn snapshot(&self) -> DecoderSnapshot {
        DecoderSnapshot {
            units_decoded: self.stats.units_decoded.load(Ordering::Relaxed),
            images_emitted: self.stats.images_emitted.load(Ordering::Relaxed),
            units_dropped: self.stats.units_dropped.load(Ordering::Relaxed),
            decode_errors: self.stats.decode_errors.load(Ordering::Relaxed),
            queued: self.queue.len(),
        }
    }
}

impl Drop for StreamDecoder {
    fn drop(&mut self) {
        if self.lifecycle.state() == WorkerState::Running {
            self.stop();
        }
    }
}

fn decode_loop(
    mut codec: Box<dyn Codec>,
    queue: BoundedFrameQueue<FrameUnit>,
    handler: ImageHandler,
    stats: Arc<DecoderStats>,
    poll_interval: Duration,
    cancel: CancellationToken,
) {
    while !cancel.is_cancelled() {
        let Some(unit) = queue.pop(poll_interval) else {
            continue;
        };
        match decode_unit(codec.as_mut(), &unit, &handler, &stats) {
            Ok(_) => {
                stats.units_decoded.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                stats.decode_errors.fetch_add(1, Ordering::Relaxed);
                log::warn!("decode error on frame {}: {:#}", unit.sequence, e);
            }
        }
    }
    log::debug!("stream decoder worker exit");
}

fn decode_unit(
    codec: &mut dyn Codec,
    unit: &FrameUnit,
    handler: &ImageHandler,
    stats: &DecoderStats,
) -> anyhow::Result<usize> {
    let mut emitted = 0;
    for packet in codec.parse(&unit.payload)? {
        for mut image in codec.decode(&packet)? {
            if image.pts.is_none() {
                image.pts = i64::try_from(unit.pts).ok();
            }
            handler(image);
            emitted += 1;
            stats.images_emitted.fetch_add(1, Ordering::Relaxed);
        }
    }
    Ok(emitted)
}

#[cfg(test)]
#[path = "decoder_test.rs"]
mod decoder_test;
