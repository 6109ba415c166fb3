use crate::frame::{AudioUnit, ClientError, FrameUnit, StreamMeta};

/// Callbacks raised by a camera streaming client.
///
/// Callbacks run on the client's own receive thread. Implementations must
/// return promptly: a slow callback stalls the network path.
pub trait ClientEvents: Send + Sync {
    fn on_frame(&self, unit: FrameUnit);

    fn on_audio(&self, _unit: AudioUnit) {}

    fn on_meta(&self, _meta: StreamMeta) {}

    fn on_connected(&self) {}

    fn on_disconnected(&self) {}

    fn on_error(&self, _error: ClientError) {}

    /// The client's own receive buffer overflowed.
    fn on_backpressure(&self) {}
}
