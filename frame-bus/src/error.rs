use std::path::PathBuf;

/// Failures reported synchronously by `start()`. Anything that goes wrong
/// after the worker is running is logged by the worker instead.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("{0} is already running")]
    AlreadyRunning(&'static str),

    #[error("{0} is still stopping, the previous worker has not exited yet")]
    StillStopping(&'static str),

    #[error("failed to open sink {}", path.display())]
    OpenSink {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to initialize decoder (tried {tried}): {reason}")]
    DecoderInit { tried: String, reason: String },

    #[error("failed to spawn {name} worker thread")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}
