//! Frame relay building blocks: a bounded queue plus three independent
//! workers fed from a camera streaming client.
//!
//! ```text
//!                          ┌─► StreamWriter ──► elementary stream file
//! client callback ─────────┤
//!                          └─► StreamDecoder ──► DisplaySink ──► PresentationSurface
//! ```
//!
//! Every stage owns its queue and its worker thread. Producers never wait
//! longer than the stage's submit timeout; when a stage falls behind, units
//! are dropped instead of buffered.

#[cfg(feature = "ffmpeg")]
/// Registers FFmpeg components. Call once at startup before opening codecs.
pub fn init() -> anyhow::Result<()> {
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("ffmpeg_next init: {}", e))
}

pub mod annexb;
pub mod client;
pub mod codec;
pub mod decoder;
pub mod display;
pub mod error;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
pub mod frame;
pub mod image;
pub mod preview;
pub mod queue;
pub mod scaler;
#[cfg(test)]
mod test_log;
pub mod worker;
pub mod writer;

pub use error::StartError;
pub use queue::BoundedFrameQueue;
pub use worker::WorkerState;
