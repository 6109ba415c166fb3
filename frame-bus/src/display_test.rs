use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam_channel::Receiver;

use super::{DisplayConfig, DisplaySink, LatestFrameSurface, PresentationSurface};
use crate::image::{DecodedImage, PixelFormat, RgbImage};
use crate::scaler::Viewport;
use crate::test_log;
use crate::worker::WorkerState;

struct SlowSurface {
    delay: Duration,
    presented: Mutex<Vec<u8>>,
    resets: Mutex<u32>,
}

impl SlowSurface {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            presented: Mutex::new(Vec::new()),
            resets: Mutex::new(0),
        }
    }
}

impl PresentationSurface for SlowSurface {
    fn present(&self, image: RgbImage) -> anyhow::Result<()> {
        thread::sleep(self.delay);
        self.presented.lock().unwrap().push(image.data[0]);
        Ok(())
    }

    fn reset(&self) {
        *self.resets.lock().unwrap() += 1;
    }
}

/// Parks `present` until the test releases or drops the gate.
struct GatedSurface {
    gate: Receiver<()>,
    inner: LatestFrameSurface,
}

impl PresentationSurface for GatedSurface {
    fn present(&self, image: RgbImage) -> anyhow::Result<()> {
        let _ = self.gate.recv();
        self.inner.present(image)
    }

    fn reset(&self) {
        self.inner.reset();
    }
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

fn gray(width: u32, height: u32, value: u8) -> DecodedImage {
    DecodedImage::new(
        width,
        height,
        PixelFormat::Gray8,
        vec![Bytes::from(vec![value; (width * height) as usize])],
    )
}

fn quick_config() -> DisplayConfig {
    DisplayConfig {
        poll_interval: Duration::from_millis(2),
        stop_timeout: Some(Duration::from_secs(2)),
        ..Default::default()
    }
}

#[test]
fn test_presents_converted_images() {
    let surface = Arc::new(SlowSurface::new(Duration::ZERO));
    let sink = DisplaySink::new(quick_config(), surface.clone());
    sink.start().unwrap();

    assert!(sink.submit(gray(2, 2, 10)));
    assert!(sink.submit(gray(2, 2, 20)));

    let deadline = Instant::now() + Duration::from_secs(2);
    while surface.presented.lock().unwrap().len() < 2 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    sink.stop();

    assert_eq!(*surface.presented.lock().unwrap(), vec![10, 20]);
    assert_eq!(sink.snapshot().presented, 2);
    assert_eq!(*surface.resets.lock().unwrap(), 1);
}

#[test]
fn test_slow_surface_drops_instead_of_blocking() {
    let surface = Arc::new(SlowSurface::new(Duration::from_millis(50)));
    let sink = DisplaySink::new(
        DisplayConfig {
            submit_timeout: Duration::ZERO,
            ..quick_config()
        },
        surface.clone(),
    );
    sink.start().unwrap();

    let started = Instant::now();
    for value in 0..20u8 {
        sink.submit(gray(2, 2, value));
    }
    assert!(started.elapsed() < Duration::from_millis(500));
    assert!(sink.snapshot().dropped > 0);
    assert!(sink.snapshot().queued <= 3);

    sink.stop();
    assert_eq!(sink.state(), WorkerState::Stopped);
    assert_eq!(sink.snapshot().queued, 0);
}

#[test]
fn test_unconvertible_image_is_counted() {
    let surface = Arc::new(SlowSurface::new(Duration::ZERO));
    let sink = DisplaySink::new(quick_config(), surface.clone());
    sink.start().unwrap();

    sink.submit(DecodedImage::new(4, 4, PixelFormat::Yuv420p, Vec::new()));
    sink.submit(gray(1, 1, 7));

    let deadline = Instant::now() + Duration::from_secs(2);
    while surface.presented.lock().unwrap().is_empty() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    sink.stop();

    assert_eq!(sink.snapshot().failed, 1);
    assert_eq!(*surface.presented.lock().unwrap(), vec![7]);
}

#[test]
fn test_submit_when_stopped_is_dropped() {
    let sink = DisplaySink::new(
        quick_config(),
        Arc::new(SlowSurface::new(Duration::ZERO)),
    );
    assert!(!sink.submit(gray(1, 1, 1)));
    assert_eq!(sink.snapshot().dropped, 1);
}

#[test]
fn test_latest_frame_surface_keeps_newest() {
    let surface = LatestFrameSurface::new(Viewport::new(4, 4));
    assert!(surface.is_idle());
    assert!(surface.render().unwrap().is_none());
    assert_eq!(
        surface.placeholder(),
        "Waiting for connect to camera and start stream..."
    );

    surface
        .present(RgbImage {
            width: 8,
            height: 4,
            data: vec![1; 8 * 4 * 3],
        })
        .unwrap();
    surface
        .present(RgbImage {
            width: 8,
            height: 4,
            data: vec![90; 8 * 4 * 3],
        })
        .unwrap();

    let native = surface.snapshot().unwrap();
    assert_eq!(native.data[0], 90);

    let fitted = surface.render().unwrap().unwrap();
    assert_eq!((fitted.width, fitted.height), (4, 2));

    surface.set_viewport(Viewport::new(16, 16));
    let fitted = surface.render().unwrap().unwrap();
    assert_eq!((fitted.width, fitted.height), (16, 8));

    let jpeg = surface.jpeg(80).unwrap().unwrap();
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

    surface.reset();
    assert!(surface.is_idle());
    assert!(surface.jpeg(80).unwrap().is_none());
}

#[test]
fn test_stop_resets_latest_frame_surface() {
    let surface = Arc::new(LatestFrameSurface::new(Viewport::new(4, 4)));
    let sink = DisplaySink::new(quick_config(), surface.clone());
    sink.start().unwrap();
    sink.submit(gray(2, 2, 50));

    let deadline = Instant::now() + Duration::from_secs(2);
    while surface.is_idle() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert!(!surface.is_idle());

    sink.stop();
    assert!(surface.is_idle());
}

#[test]
fn test_drops_are_logged() {
    test_log::install();

    let stopped = DisplaySink::new(quick_config(), Arc::new(SlowSurface::new(Duration::ZERO)));
    assert!(!stopped.submit(gray(3, 5, 1)));
    let lines = test_log::warnings_containing("display sink is not running, dropping DecodedImage 3x5");
    assert!(!lines.is_empty());

    let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(0);
    let sink = DisplaySink::new(
        DisplayConfig {
            submit_timeout: Duration::ZERO,
            ..quick_config()
        },
        Arc::new(GatedSurface {
            gate: gate_rx,
            inner: LatestFrameSurface::new(Viewport::new(4, 4)),
        }),
    );
    sink.start().unwrap();
    for value in 0..20u8 {
        sink.submit(gray(7, 3, value));
    }
    let dropped = sink.snapshot().dropped;
    assert!(dropped >= 16);

    // First drop is always reported; later ones only every hundredth.
    let lines = test_log::warnings_containing("display queue full, dropping 7x3 frame");
    assert_eq!(lines.len(), 1);
    assert!(lines[0].ends_with("(1 dropped so far)"));

    drop(gate_tx);
    sink.stop();
}

#[test]
fn test_detached_worker_still_resets_surface() {
    let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(0);
    let surface = Arc::new(GatedSurface {
        gate: gate_rx,
        inner: LatestFrameSurface::new(Viewport::new(4, 4)),
    });
    let sink = DisplaySink::new(
        DisplayConfig {
            stop_timeout: Some(Duration::from_millis(20)),
            ..quick_config()
        },
        surface.clone(),
    );
    sink.start().unwrap();
    sink.submit(gray(2, 2, 80));
    assert!(wait_until(|| sink.snapshot().queued == 0));

    // The worker is parked in present, so stop gives up waiting.
    sink.stop();
    assert_eq!(sink.state(), WorkerState::Stopping);

    // The late present lands, then the exiting worker clears it.
    drop(gate_tx);
    assert!(wait_until(|| sink.state() == WorkerState::Stopped));
    assert!(surface.inner.is_idle());
    assert_eq!(sink.snapshot().presented, 1);
}
