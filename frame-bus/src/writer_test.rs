use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;

use super::{StreamWriter, WriterConfig};
use crate::error::StartError;
use crate::frame::{FrameKind, FrameUnit};
use crate::worker::WorkerState;

const SPS: [u8; 25] = [
    0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x1E, 0x95, 0xA8, 0x28, 0x0F, 0x64, 0x00, 0x00,
    0x00, 0x01, 0x68, 0xCE, 0x3C, 0x80, 0x00, 0x00, 0x00, 0x01,
];
const PPS: [u8; 8] = [0x00, 0x00, 0x00, 0x01, 0x68, 0xCE, 0x3C, 0x80];
const IDR: [u8; 19] = [
    0x00, 0x00, 0x00, 0x01, 0x65, 0x88, 0x84, 0x00, 0x33, 0xFF, 0xFE, 0xF6, 0xF0, 0xFE, 0x05,
    0x36, 0x56, 0x04, 0x50,
];

fn quick_config() -> WriterConfig {
    WriterConfig {
        poll_interval: Duration::from_millis(5),
        submit_timeout: Duration::from_millis(100),
        stop_timeout: Some(Duration::from_secs(5)),
        ..Default::default()
    }
}

/// Parks every write until the test releases or drops the gate.
struct StallingSink {
    gate: Receiver<()>,
    data: Arc<Mutex<Vec<u8>>>,
}

impl Write for StallingSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let _ = self.gate.recv();
        self.data.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
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

fn unit(seq: u64, payload: &[u8]) -> FrameUnit {
    FrameUnit::new(FrameKind::Delta, payload.to_vec(), seq)
}

#[test]
fn test_writes_units_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("camera_test.h264");

    let writer = StreamWriter::new(quick_config());
    writer.start(&path).unwrap();
    assert_eq!(writer.state(), WorkerState::Running);

    assert!(writer.submit(unit(1, &SPS)));
    assert!(writer.submit(unit(2, &PPS)));
    assert!(writer.submit(FrameUnit::new(FrameKind::Key, IDR.to_vec(), 3)));
    writer.stop();

    let written = std::fs::read(&path).unwrap();
    assert_eq!(written.len(), 52);
    assert_eq!(&written[..25], &SPS);
    assert_eq!(&written[25..33], &PPS);
    assert_eq!(&written[33..], &IDR);
    assert_eq!(writer.frames_written(), 3);
    assert_eq!(writer.frames_dropped(), 0);
    assert_eq!(writer.state(), WorkerState::Stopped);
    assert_eq!(writer.sink_path(), Some(path));
}

#[test]
fn test_stop_drains_queued_units() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("drain.h264");

    let writer = StreamWriter::new(WriterConfig {
        // Long poll so most units are still queued when stop arrives.
        poll_interval: Duration::from_millis(200),
        ..quick_config()
    });
    writer.start(&path).unwrap();

    let mut expected = Vec::new();
    for seq in 0..200u64 {
        let payload = vec![(seq % 251) as u8; 7];
        expected.extend_from_slice(&payload);
        assert!(writer.submit(unit(seq, &payload)));
    }
    writer.stop();

    assert_eq!(std::fs::read(&path).unwrap(), expected);
    assert_eq!(writer.frames_written(), 200);
    assert_eq!(writer.queued(), 0);
}

#[test]
fn test_submit_when_stopped_is_dropped() {
    let writer = StreamWriter::new(quick_config());
    assert!(!writer.submit(unit(1, &PPS)));
    assert_eq!(writer.queued(), 0);
    assert_eq!(writer.frames_dropped(), 1);
}

#[test]
fn test_restart_writes_separate_files() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.h264");
    let second = dir.path().join("second.h264");
    let writer = StreamWriter::new(quick_config());

    writer.start(&first).unwrap();
    writer.submit(unit(1, &SPS));
    writer.stop();

    assert!(!writer.submit(unit(2, &IDR)));

    writer.start(&second).unwrap();
    writer.submit(unit(3, &PPS));
    writer.stop();

    assert_eq!(std::fs::read(&first).unwrap(), SPS.to_vec());
    assert_eq!(std::fs::read(&second).unwrap(), PPS.to_vec());
    assert_eq!(writer.frames_written(), 1);
    assert_eq!(writer.frames_dropped(), 0);
}

#[test]
fn test_slow_sink_bounds_queue_and_drops_excess() {
    let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(0);
    let data = Arc::new(Mutex::new(Vec::new()));
    let sink = StallingSink {
        gate: gate_rx,
        data: Arc::clone(&data),
    };

    let writer = StreamWriter::new(WriterConfig {
        queue_capacity: 1,
        submit_timeout: Duration::ZERO,
        ..quick_config()
    });
    let path = Path::new("stalled.h264");
    writer.start_with(path, move |_| Ok(sink)).unwrap();

    // The worker takes the first unit and parks inside write.
    let mut expected = vec![0u8; 3];
    assert!(writer.submit(unit(0, &expected)));
    assert!(wait_until(|| writer.queued() == 0));

    let total = 50u64;
    for seq in 1..total {
        let payload = vec![seq as u8; 3];
        if writer.submit(unit(seq, &payload)) {
            expected.extend_from_slice(&payload);
        }
        assert!(writer.queued() <= 1);
    }
    assert_eq!(writer.frames_dropped(), total - 2);

    drop(gate_tx);
    writer.stop();

    assert_eq!(writer.frames_written(), 2);
    assert_eq!(writer.frames_written() + writer.frames_dropped(), total);
    assert_eq!(*data.lock().unwrap(), expected);
    assert_eq!(writer.sink_path().as_deref(), Some(path));
}

#[test]
fn test_start_truncates_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("old.h264");
    std::fs::write(&path, vec![0xAA; 1000]).unwrap();

    let writer = StreamWriter::new(quick_config());
    writer.start(&path).unwrap();
    writer.submit(unit(1, &PPS));
    writer.stop();

    assert_eq!(std::fs::read(&path).unwrap(), PPS.to_vec());
}

#[test]
fn test_double_start_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let writer = StreamWriter::new(quick_config());
    writer.start(dir.path().join("a.h264")).unwrap();

    let err = writer.start(dir.path().join("b.h264")).unwrap_err();
    assert!(matches!(err, StartError::AlreadyRunning(_)));
    assert!(!dir.path().join("b.h264").exists());

    writer.stop();
}

#[test]
fn test_open_failure_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("out.h264");

    let writer = StreamWriter::new(quick_config());
    match writer.start(&path) {
        Err(StartError::OpenSink { path: failed, .. }) => assert_eq!(failed, path),
        other => panic!("expected OpenSink, got {:?}", other),
    }
    assert_eq!(writer.state(), WorkerState::Stopped);
    assert!(!writer.submit(unit(1, &PPS)));
}

#[test]
fn test_stop_when_stopped_is_noop() {
    let writer = StreamWriter::new(quick_config());
    writer.stop();
    writer.stop();
    assert_eq!(writer.state(), WorkerState::Stopped);
}

#[cfg(target_os = "linux")]
#[test]
fn test_io_fault_terminates_worker() {
    let dev_full = std::path::Path::new("/dev/full");
    if !dev_full.exists() {
        return;
    }

    let writer = StreamWriter::new(quick_config());
    writer.start(dev_full).unwrap();
    writer.submit(unit(1, &IDR));

    let mut waited = 0;
    while writer.is_running() && waited < 100 {
        thread::sleep(Duration::from_millis(10));
        waited += 1;
    }
    assert!(!writer.is_running());
    assert!(!writer.submit(unit(2, &IDR)));
    assert_eq!(writer.frames_written(), 0);
    writer.stop();
    assert_eq!(writer.state(), WorkerState::Stopped);
}
