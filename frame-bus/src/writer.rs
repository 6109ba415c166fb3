use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicU64, Ordering},
};
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use crate::{
    error::StartError,
    frame::FrameUnit,
    queue::BoundedFrameQueue,
    worker::{Lifecycle, StopOutcome, WorkerState},
};

#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub queue_capacity: usize,
    /// Longest time `submit` waits for queue space before dropping.
    pub submit_timeout: Duration,
    /// Worker wait between stop checks.
    pub poll_interval: Duration,
    /// `None` waits for the drain to finish no matter how long it takes.
    pub stop_timeout: Option<Duration>,
    /// Flush after every frame so the file is always playable up to the
    /// last accepted unit.
    pub flush_each_frame: bool,
    /// Log progress every N frames; 0 disables.
    pub progress_interval: u64,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 512,
            submit_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
            stop_timeout: Some(Duration::from_secs(10)),
            flush_each_frame: true,
            progress_interval: 100,
        }
    }
}

#[derive(Debug, Default)]
struct WriterStats {
    written: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriterSnapshot {
    pub frames_written: u64,
    pub frames_dropped: u64,
    pub queued: usize,
}

/// Dumps raw access units to an elementary stream file from a background
/// thread. Units queued when `stop` is called are written before the file
/// is closed.
pub struct StreamWriter {
    config: WriterConfig,
    queue: BoundedFrameQueue<FrameUnit>,
    lifecycle: Lifecycle,
    stats: Arc<WriterStats>,
    sink_path: Mutex<Option<PathBuf>>,
}

impl StreamWriter {
    pub fn new(config: WriterConfig) -> Self {
        let queue = BoundedFrameQueue::new(config.queue_capacity);
        Self {
            config,
            queue,
            lifecycle: Lifecycle::new("stream-writer"),
            stats: Arc::new(WriterStats::default()),
            sink_path: Mutex::new(None),
        }
    }

    /// Creates (or truncates) `path` and starts the write worker. Counters
    /// restart from zero on every start.
    pub fn start(&self, path: impl AsRef<Path>) -> Result<(), StartError> {
        self.start_with(path.as_ref(), |path| File::create(path).map(BufWriter::new))
    }

    /// Starts the worker on the sink returned by `open`.
    pub(crate) fn start_with<W, O>(&self, path: &Path, open: O) -> Result<(), StartError>
    where
        W: Write + Send + 'static,
        O: FnOnce(&Path) -> std::io::Result<W>,
    {
        let path = path.to_path_buf();
        let queue = self.queue.clone();
        let stats = Arc::clone(&self.stats);
        let config = self.config.clone();

        self.lifecycle.start(
            || {
                let sink = open(&path).map_err(|source| StartError::OpenSink {
                    path: path.clone(),
                    source,
                })?;
                let stale = self.queue.try_pop_all();
                if !stale.is_empty() {
                    log::warn!("discarding {} frames left from a previous run", stale.len());
                }
                self.stats.written.store(0, Ordering::Relaxed);
                self.stats.dropped.store(0, Ordering::Relaxed);
                *self.sink_path.lock().unwrap_or_else(PoisonError::into_inner) =
                    Some(path.clone());
                log::info!("opened stream file for writing: {}", path.display());
                Ok((sink, path.clone()))
            },
            move |(sink, path), cancel| write_loop(sink, path, queue, stats, config, cancel),
        )
    }

    pub fn stop(&self) {
        if self.lifecycle.stop(self.config.stop_timeout) == StopOutcome::Joined {
            let leftover = self.queue.try_pop_all();
            if !leftover.is_empty() {
                // Submitted while the worker was draining.
                log::warn!("dropping {} frames submitted during stop", leftover.len());
                self.stats
                    .dropped
                    .fetch_add(leftover.len() as u64, Ordering::Relaxed);
            }
        }
    }

    /// Queues `unit` for writing. Returns `false` if it was dropped.
    pub fn submit(&self, unit: FrameUnit) -> bool {
        if !self.lifecycle.is_running() {
            log::warn!("stream writer is not running, frame {} dropped", unit.sequence);
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        let sequence = unit.sequence;
        if !self.queue.push(unit, self.config.submit_timeout) {
            log::warn!("stream writer queue is full, dropping frame {}", sequence);
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
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

    /// Frames written by the current (or last) run.
    pub fn frames_written(&self) -> u64 {
        self.stats.written.load(Ordering::Relaxed)
    }

    /// Frames dropped since the last start, including those submitted while
    /// stopped.
    pub fn frames_dropped(&self) -> u64 {
        self.stats.dropped.load(Ordering::Relaxed)
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn sink_path(&self) -> Option<PathBuf> {
        self.sink_path
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn snapshot(&self) -> WriterSnapshot {
        WriterSnapshot {
            frames_written: self.frames_written(),
            frames_dropped: self.frames_dropped(),
            queued: self.queued(),
        }
    }
}

impl Drop for StreamWriter {
    fn drop(&mut self) {
        if self.lifecycle.state() == WorkerState::Running {
            self.stop();
        }
    }
}

fn write_loop<W: Write>(
    mut sink: W,
    path: PathBuf,
    queue: BoundedFrameQueue<FrameUnit>,
    stats: Arc<WriterStats>,
    config: WriterConfig,
    cancel: CancellationToken,
) {
    match pump(&mut sink, &queue, &stats, &config, &cancel) {
        Ok(total) => log::info!("stream writer: total frames written: {}", total),
        Err(e) => log::error!("stream writer error on {}: {:#}", path.display(), e),
    }
    drop(sink);
    log::info!("closed stream file: {}", path.display());
}

fn pump<W: Write>(
    sink: &mut W,
    queue: &BoundedFrameQueue<FrameUnit>,
    stats: &WriterStats,
    config: &WriterConfig,
    cancel: &CancellationToken,
) -> anyhow::Result<u64> {
    let mut written = 0u64;
    while !cancel.is_cancelled() {
        let Some(unit) = queue.pop(config.poll_interval) else {
            continue;
        };
        write_unit(sink, &unit, config.flush_each_frame)?;
        written += 1;
        stats.written.fetch_add(1, Ordering::Relaxed);
        if config.progress_interval > 0 && written % config.progress_interval == 0 {
            log::info!("stream writer: written {} frames", written);
        }
    }

    let remaining = queue.try_pop_all();
    for unit in &remaining {
        write_unit(sink, unit, config.flush_each_frame)?;
        written += 1;
        stats.written.fetch_add(1, Ordering::Relaxed);
    }
    if !remaining.is_empty() {
        log::info!("stream writer: written {} remaining frames", remaining.len());
    }
    sink.flush().context("final flush")?;
    Ok(written)
}

fn write_unit<W: Write>(sink: &mut W, unit: &FrameUnit, flush: bool) -> anyhow::Result<()> {
    sink.write_all(&unit.payload)
        .with_context(|| format!("write frame {}", unit.sequence))?;
    if flush {
        sink.flush()
            .with_context(|| format!("flush frame {}", unit.sequence))?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "writer_test.rs"]
mod writer_test;
