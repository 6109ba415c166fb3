use std::path::{Path, PathBuf};

use frame_bus::{
    StartError, WorkerState,
    client::ClientEvents,
    frame::{AudioUnit, ClientError, FrameUnit, StreamMeta},
    preview::Preview,
    writer::{StreamWriter, WriterConfig},
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::media::types::{AudioStatus, ConnectionState, MetaStatus, RelayStatus, VideoStatus};

struct DumpTarget {
    writer: StreamWriter,
    path: PathBuf,
}

/// Fans units from a streaming client out to the dump writer and the
/// preview chain, and keeps a status snapshot for observers.
pub struct Relay {
    dump: Option<DumpTarget>,
    preview: Option<Preview>,
    status: watch::Sender<RelayStatus>,
    session: CancellationToken,
}

#[derive(Default)]
pub struct RelayBuilder {
    dump: Option<(PathBuf, WriterConfig)>,
    preview: Option<Preview>,
    session: Option<CancellationToken>,
}

impl RelayBuilder {
    pub fn dump_to(mut self, path: impl AsRef<Path>, config: WriterConfig) -> Self {
        self.dump = Some((path.as_ref().to_path_buf(), config));
        self
    }

    pub fn preview(mut self, preview: Preview) -> Self {
        self.preview = Some(preview);
        self
    }

    /// Token cancelled when the client reports a disconnect.
    pub fn session(mut self, session: CancellationToken) -> Self {
        self.session = Some(session);
        self
    }

    pub fn build(self) -> Relay {
        let dump = self.dump.map(|(path, config)| DumpTarget {
            writer: StreamWriter::new(config),
            path,
        });
        let status = RelayStatus {
            dump_path: dump.as_ref().map(|d| d.path.display().to_string()),
            ..Default::default()
        };
        let (status, _) = watch::channel(status);
        Relay {
            dump,
            preview: self.preview,
            status,
            session: self.session.unwrap_or_default(),
        }
    }
}

impl Relay {
    pub fn builder() -> RelayBuilder {
        RelayBuilder::default()
    }

    /// Starts the writer, then the preview chain. Anything already started
    /// is stopped again if a later stage fails.
    pub fn start(&self) -> Result<(), StartError> {
        if let Some(dump) = &self.dump {
            dump.writer.start(&dump.path)?;
        }
        if let Some(preview) = &self.preview {
            if let Err(e) = preview.start() {
                log::error!("failed to start preview: {}", e);
                if let Some(dump) = &self.dump {
                    dump.writer.stop();
                }
                return Err(e);
            }
            self.status.send_modify(|s| {
                s.decoder_format = preview.format().map(|f| f.to_string());
            });
        }
        log::info!("relay started");
        Ok(())
    }

    /// Stops the preview chain before the writer, so the writer's drain is
    /// the last thing that happens.
    pub fn stop(&self) {
        if let Some(preview) = &self.preview {
            preview.stop();
        }
        if let Some(dump) = &self.dump {
            if dump.writer.state() == WorkerState::Running {
                dump.writer.stop();
            }
        }
        log::info!("relay stopped");
    }

    pub fn session(&self) -> CancellationToken {
        self.session.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RelayStatus> {
        self.status.subscribe()
    }

    pub fn dump_path(&self) -> Option<&Path> {
        self.dump.as_ref().map(|d| d.path.as_path())
    }

    pub fn preview(&self) -> Option<&Preview> {
        self.preview.as_ref()
    }

    /// The latest status with stage counters sampled now.
    pub fn status(&self) -> RelayStatus {
        let mut status = self.status.borrow().clone();
        let counters = &mut status.counters;
        if let Some(dump) = &self.dump {
            let writer = dump.writer.snapshot();
            counters.frames_written = writer.frames_written;
            counters.writer_dropped = writer.frames_dropped;
        }
        if let Some(preview) = &self.preview {
            let (decoder, display) = preview.snapshot();
            counters.units_decoded = decoder.units_decoded;
            counters.decoder_dropped = decoder.units_dropped;
            counters.decode_errors = decoder.decode_errors;
            counters.images_presented = display.presented;
            counters.display_dropped = display.dropped;
        }
        status
    }
}

impl ClientEvents for Relay {
    fn on_frame(&self, unit: FrameUnit) {
        self.status.send_modify(|s| {
            let last_pts = s.video.as_ref().map(|v| v.pts);
            let video = VideoStatus::from_unit(&unit, last_pts);
            log::debug!("{}", video);
            s.video = Some(video);
            s.counters.frames_received += 1;
        });

        if let Some(dump) = &self.dump {
            dump.writer.submit(unit.clone());
        }
        if let Some(preview) = &self.preview {
            preview.submit(unit);
        }
    }

    fn on_audio(&self, unit: AudioUnit) {
        self.status.send_modify(|s| {
            let audio = AudioStatus::from(&unit);
            log::trace!("{}", audio);
            s.audio = Some(audio);
        });
    }

    fn on_meta(&self, meta: StreamMeta) {
        log::info!("stream meta: {}", meta);
        if let Some(bits) = meta.audio.bits_per_sample() {
            log::debug!("audio bits per sample: {}", bits);
        }
        self.status.send_modify(|s| s.meta = Some(MetaStatus::from(&meta)));
    }

    fn on_connected(&self) {
        log::info!("stream client connected");
        self.status
            .send_modify(|s| s.connection = ConnectionState::Connected);
    }

    fn on_disconnected(&self) {
        log::info!("stream client disconnected");
        self.status
            .send_modify(|s| s.connection = ConnectionState::Disconnected);
        self.session.cancel();
    }

    fn on_error(&self, error: ClientError) {
        log::error!("stream client error: {}", error);
        self.status.send_modify(|s| {
            s.client_errors += 1;
            s.last_error = Some(error.to_string());
        });
    }

    fn on_backpressure(&self) {
        log::warn!("stream client receive buffer is full");
        self.status.send_modify(|s| s.backpressure_events += 1);
    }
}

#[cfg(test)]
#[path = "pipe_test.rs"]
mod pipe_test;
