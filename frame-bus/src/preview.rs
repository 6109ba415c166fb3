use std::sync::Arc;

use crate::{
    codec::{CodecFactory, CodecFormat},
    decoder::{DecoderConfig, DecoderSnapshot, ImageHandler, StreamDecoder},
    display::{DisplayConfig, DisplaySink, DisplaySnapshot, PresentationSurface},
    error::StartError,
    frame::FrameUnit,
    image::DecodedImage,
    worker::WorkerState,
};

/// Decoder and display sink chained together: every decoded picture is
/// offered to the display queue and dropped there if the display lags.
pub struct Preview {
    decoder: StreamDecoder,
    display: Arc<DisplaySink>,
}

impl Preview {
    pub fn new(
        decoder_config: DecoderConfig,
        display_config: DisplayConfig,
        factory: Arc<dyn CodecFactory>,
        surface: Arc<dyn PresentationSurface>,
    ) -> Self {
        let display = Arc::new(DisplaySink::new(display_config, surface));
        let target = Arc::clone(&display);
        let handler: ImageHandler = Arc::new(move |image: DecodedImage| {
            target.submit(image);
        });
        Self {
            decoder: StreamDecoder::new(decoder_config, factory, handler),
            display,
        }
    }

    /// Starts the display first so the decoder never feeds a stopped sink.
    pub fn start(&self) -> Result<(), StartError> {
        self.display.start()?;
        if let Err(e) = self.decoder.start() {
            self.display.stop();
            return Err(e);
        }
        Ok(())
    }

    pub fn stop(&self) {
        if self.decoder.state() == WorkerState::Running {
            self.decoder.stop();
        }
        if self.display.state() == WorkerState::Running {
            self.display.stop();
        }
    }

    pub fn submit(&self, unit: FrameUnit) -> bool {
        self.decoder.submit(unit)
    }

    pub fn is_running(&self) -> bool {
        self.decoder.is_running() && self.display.is_running()
    }

    pub fn format(&self) -> Option<CodecFormat> {
        self.decoder.format()
    }

    pub fn decoder(&self) -> &StreamDecoder {
        &self.decoder
    }

    pub fn display(&self) -> &DisplaySink {
        &self.display
    }

    pub fn snapshot(&self) -> (DecoderSnapshot, DisplaySnapshot) {
        (self.decoder.snapshot(), self.display.snapshot())
    }
}
