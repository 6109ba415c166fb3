use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicU64, Ordering},
};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::{
    error::StartError,
    image::{DecodedImage, RgbImage},
    queue::BoundedFrameQueue,
    scaler::{Scaler, Viewport},
    worker::{Lifecycle, StopOutcome, WorkerState},
};

/// Shown while no picture has been presented.
pub const PLACEHOLDER_TEXT: &str = "Waiting for connect to camera and start stream...";

/// Where converted pictures end up. Called from the display worker thread.
pub trait PresentationSurface: Send + Sync {
    fn present(&self, image: RgbImage) -> anyhow::Result<()>;

    /// Back to the idle placeholder state.
    fn reset(&self);
}

#[derive(Debug, Clone)]
pub struct DisplayConfig {
    pub queue_capacity: usize,
    pub submit_timeout: Duration,
    pub poll_interval: Duration,
    pub stop_timeout: Option<Duration>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 3,
            submit_timeout: Duration::from_millis(100),
            poll_interval: Duration::from_millis(10),
            stop_timeout: Some(Duration::from_secs(5)),
        }
    }
}

#[derive(Debug, Default)]
struct DisplayStats {
    presented: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisplaySnapshot {
    pub presented: u64,
    pub dropped: u64,
    pub failed: u64,
    pub queued: usize,
}

/// Converts decoded pictures to RGB and hands them to a surface. The queue
/// is short so the surface shows recent pictures rather than a backlog.
pub struct DisplaySink {
    config: DisplayConfig,
    surface: Arc<dyn PresentationSurface>,
    queue: BoundedFrameQueue<DecodedImage>,
    lifecycle: Lifecycle,
    stats: Arc<DisplayStats>,
}

impl DisplaySink {
    pub fn new(config: DisplayConfig, surface: Arc<dyn PresentationSurface>) -> Self {
        let queue = BoundedFrameQueue::new(config.queue_capacity);
        Self {
            config,
            surface,
            queue,
            lifecycle: Lifecycle::new("display-sink"),
            stats: Arc::new(DisplayStats::default()),
        }
    }

    pub fn start(&self) -> Result<(), StartError> {
        let queue = self.queue.clone();
        let surface = Arc::clone(&self.surface);
        let stats = Arc::clone(&self.stats);
        let poll_interval = self.config.poll_interval;

        self.lifecycle.start(
            || {
                self.queue.try_pop_all();
                Ok(())
            },
            move |_, cancel| present_loop(queue, surface, stats, poll_interval, cancel),
        )
    }

    /// Stops presenting. The worker returns the surface to its placeholder
    /// as it exits, so a detached worker cannot repaint it afterwards.
    pub fn stop(&self) {
        if self.lifecycle.stop(self.config.stop_timeout) == StopOutcome::Joined {
            self.queue.try_pop_all();
        }
    }

    pub fn submit(&self, image: DecodedImage) -> bool {
        if !self.lifecycle.is_running() {
            let dropped = self.stats.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped == 1 || dropped % 100 == 0 {
                log::warn!(
                    "display sink is not running, dropping {} ({} dropped so far)",
                    image,
                    dropped
                );
            }
            return false;
        }
        let (width, height) = (image.width, image.height);
        if !self.queue.push(image, self.config.submit_timeout) {
            let dropped = self.stats.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped == 1 || dropped % 100 == 0 {
                log::warn!(
                    "display queue full, dropping {}x{} frame ({} dropped so far)",
                    width,
                    height,
                    dropped
                );
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

    pub fn snapshot(&self) -> DisplaySnapshot {
        DisplaySnapshot {
            presented: self.stats.presented.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            queued: self.queue.len(),
        }
    }
}

impl Drop for DisplaySink {
    fn drop(&mut self) {
        if self.lifecycle.state() == WorkerState::Running {
            self.stop();
        }
    }
}

fn present_loop(
    queue: BoundedFrameQueue<DecodedImage>,
    surface: Arc<dyn PresentationSurface>,
    stats: Arc<DisplayStats>,
    poll_interval: Duration,
    cancel: CancellationToken,
) {
    while !cancel.is_cancelled() {
        let Some(image) = queue.pop(poll_interval) else {
            continue;
        };
        match image.to_rgb().and_then(|rgb| surface.present(rgb)) {
            Ok(()) => {
                stats.presented.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                log::warn!("failed to present {}: {:#}", image, e);
            }
        }
    }
    surface.reset();
    log::debug!("display sink worker exit");
}

/// Keeps only the most recent picture and renders it on demand, scaled to
/// fit the viewport with its aspect ratio preserved.
pub struct LatestFrameSurface {
    viewport: Mutex<Viewport>,
    scaler: Mutex<Scaler>,
    latest: Mutex<Option<Arc<RgbImage>>>,
}

impl LatestFrameSurface {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport: Mutex::new(viewport),
            scaler: Mutex::new(Scaler::new()),
            latest: Mutex::new(None),
        }
    }

    pub fn viewport(&self) -> Viewport {
        *self.viewport.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_viewport(&self, viewport: Viewport) {
        *self.viewport.lock().unwrap_or_else(PoisonError::into_inner) = viewport;
    }

    pub fn is_idle(&self) -> bool {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// The latest picture at its native size.
    pub fn snapshot(&self) -> Option<Arc<RgbImage>> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The latest picture fitted to the viewport, or `None` while idle.
    pub fn render(&self) -> anyhow::Result<Option<RgbImage>> {
        let Some(image) = self.snapshot() else {
            return Ok(None);
        };
        let viewport = self.viewport();
        let mut scaler = self.scaler.lock().unwrap_or_else(PoisonError::into_inner);
        scaler.fit(&image, viewport).map(Some)
    }

    pub fn jpeg(&self, quality: u8) -> anyhow::Result<Option<Vec<u8>>> {
        match self.render()? {
            Some(image) => image.to_jpeg(quality).map(Some),
            None => Ok(None),
        }
    }

    pub fn placeholder(&self) -> &'static str {
        PLACEHOLDER_TEXT
    }
}

impl PresentationSurface for LatestFrameSurface {
    fn present(&self, image: RgbImage) -> anyhow::Result<()> {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(image));
        Ok(())
    }

    fn reset(&self) {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

#[cfg(test)]
#[path = "display_test.rs"]
mod display_test;
