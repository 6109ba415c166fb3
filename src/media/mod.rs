//! Relay wiring around the frame-bus stages.
//!
//! ```text
//!                               ┌─► StreamWriter ─► dump/camera_*.h26x
//! stream client ──► Relay ──────┤
//!   (ClientEvents)    │         └─► Preview (StreamDecoder ─► DisplaySink) ─► LatestFrameSurface
//!                     │
//!                     └─► watch<RelayStatus> ─► /status
//! ```

use std::sync::Arc;

use frame_bus::codec::CodecFactory;

pub mod dump;
pub mod pipe;
pub mod replay;
pub mod types;

/// The codec backend compiled into this build, if any.
#[cfg(feature = "ffmpeg")]
pub fn codec_factory() -> Option<Arc<dyn CodecFactory>> {
    Some(Arc::new(frame_bus::ffmpeg::FfmpegCodecFactory))
}

#[cfg(not(feature = "ffmpeg"))]
pub fn codec_factory() -> Option<Arc<dyn CodecFactory>> {
    None
}
