use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use frame_bus::{codec::CodecFormat, display::LatestFrameSurface, preview::Preview};
use tokio_util::sync::CancellationToken;

mod api;
mod config;
mod control;
mod media;

use crate::config::RelayConfig;
use crate::control::ControlClient;
use crate::media::{dump, pipe::Relay, replay::ReplaySource, types::RelayStatus};

const DEFAULT_CAMERA_IP: &str = "192.168.1.84";

#[derive(Parser)]
#[command(name = "zcam-relay", version, about = "Relay a camera stream to a dump file and a live preview")]
struct Cli {
    /// JSON config file; defaults are used for anything it leaves out.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Clone)]
struct CameraArgs {
    #[arg(long, default_value = DEFAULT_CAMERA_IP)]
    ip: String,

    /// 0 or 1
    #[arg(long, default_value_t = 1)]
    stream: u8,
}

#[derive(Args, Clone)]
struct OutputArgs {
    /// Dump the raw elementary stream to a file in the dump folder.
    #[arg(long)]
    dump: bool,

    /// Decode and serve a live JPEG preview at /preview.jpg.
    #[arg(long)]
    preview: bool,

    /// Serve /status and /preview.jpg on the configured address.
    #[arg(long)]
    serve: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Print the stream settings and whether the stream is idle.
    Query(CameraArgs),
    /// Ask the camera to send the given stream.
    Select(CameraArgs),
    /// Play an Annex-B file through the relay as if it came from the camera.
    Replay {
        #[arg(long)]
        input: PathBuf,

        /// h264 or h265
        #[arg(long, default_value = "h264")]
        format: String,

        /// 0 delivers as fast as possible.
        #[arg(long, default_value_t = 30.0)]
        fps: f64,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// Prepare the camera stream, then relay it until Ctrl-C or disconnect.
    Run {
        #[command(flatten)]
        camera: CameraArgs,

        #[command(flatten)]
        output: OutputArgs,

        /// Feed the relay from this file instead of waiting for a client.
        #[arg(long)]
        replay: Option<PathBuf>,

        #[arg(long, default_value_t = 30.0)]
        fps: f64,
    },
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .filter_module("frame_bus", level)
        .filter_module("reqwest", log::LevelFilter::Warn)
        .filter_module("hyper_util", log::LevelFilter::Warn)
        .parse_default_env()
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let relay_config = match &cli.config {
        Some(path) => RelayConfig::load(path).unwrap_or_else(|e| {
            log::error!("{:#}", e);
            std::process::exit(2);
        }),
        None => RelayConfig::default(),
    };
    config::init(relay_config);

    #[cfg(feature = "ffmpeg")]
    frame_bus::init().unwrap_or_else(|e| {
        log::error!("{:#}", e);
        std::process::exit(2);
    });

    if let Err(e) = run(cli.command).await {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(command: Command) -> anyhow::Result<()> {
    let config = config::config();
    match command {
        Command::Query(camera) => {
            let client = ControlClient::new(&camera.ip, config.control.timeout())?;
            let settings = client.query_stream_settings(camera.stream).await?;
            if settings.is_idle() {
                println!("{} Stream{} is idle", camera.ip, camera.stream);
            } else {
                println!(
                    "Stream is not idle, current status: {}",
                    settings.status.as_deref().unwrap_or("None")
                );
            }
            Ok(())
        }
        Command::Select(camera) => {
            let client = ControlClient::new(&camera.ip, config.control.timeout())?;
            client.select_stream(camera.stream).await
        }
        Command::Replay {
            input,
            format,
            fps,
            output,
        } => {
            let format = CodecFormat::parse(&format)
                .with_context(|| format!("unknown stream format: {}", format))?;
            let source = ReplaySource::open(&input, format, fps)?;
            let stem = input
                .file_stem()
                .map_or("replay".to_string(), |s| s.to_string_lossy().into_owned());
            let file_name =
                dump::dump_file_name(&stem, 0, format.file_extension(), chrono::Local::now());
            relay_session(config, output, file_name, Some(format), Some(source)).await
        }
        Command::Run {
            camera,
            output,
            replay,
            fps,
        } => {
            let client = ControlClient::new(&camera.ip, config.control.timeout())?;
            let settings = client.prepare_stream(camera.stream).await?;
            let file_name = dump::dump_file_name(
                &camera.ip,
                camera.stream,
                settings.encoder_type(),
                chrono::Local::now(),
            );
            let format = CodecFormat::parse(settings.encoder_type());
            let source = match replay {
                Some(path) => Some(ReplaySource::open(
                    &path,
                    format.unwrap_or(CodecFormat::H264),
                    fps,
                )?),
                None => None,
            };
            relay_session(config, output, file_name, format, source).await
        }
    }
}

/// Builds and starts a relay, feeds it until the session ends, then stops it.
async fn relay_session(
    config: &'static RelayConfig,
    output: OutputArgs,
    dump_file_name: String,
    format: Option<CodecFormat>,
    source: Option<ReplaySource>,
) -> anyhow::Result<()> {
    let session = CancellationToken::new();
    let mut builder = Relay::builder().session(session.clone());

    if output.dump {
        let path = dump::prepare_dump_path(&config.dump_dir, &dump_file_name)?;
        builder = builder.dump_to(path, config.writer.to_bus());
    }

    let mut surface = None;
    if output.preview {
        match media::codec_factory() {
            Some(factory) => {
                let mut decoder = config.decoder.to_bus()?;
                if let Some(format) = format {
                    // Open the stream's own codec first.
                    decoder.primary = format;
                    decoder.fallback = decoder.fallback.filter(|f| *f != format);
                }
                let latest = Arc::new(LatestFrameSurface::new(config.display.viewport()));
                builder = builder.preview(Preview::new(
                    decoder,
                    config.display.to_bus(),
                    factory,
                    latest.clone(),
                ));
                surface = Some(latest);
            }
            None => log::warn!("built without a codec backend, preview disabled"),
        }
    }

    let relay = Arc::new(builder.build());
    relay.start().context("start relay")?;

    let server_cancel = CancellationToken::new();
    let reporter = tokio::spawn(report_status(relay.subscribe(), server_cancel.clone()));
    let server = output.serve.then(|| {
        api::start_api_server(
            config.api_addr.clone(),
            api::ApiState {
                relay: relay.clone(),
                surface,
                jpeg_quality: config.display.jpeg_quality,
            },
            server_cancel.clone(),
        )
    });

    let feeder_cancel = CancellationToken::new();
    let feeder = match source {
        Some(source) => Some(source.spawn(relay.clone(), feeder_cancel.clone())?),
        None => {
            log::info!("waiting for the stream client, press Ctrl-C to stop");
            None
        }
    };

    tokio::select! {
        _ = session.cancelled() => {
            log::info!("session ended");
        },
        _ = tokio::signal::ctrl_c() => {
            log::info!("interrupted");
        },
    }

    feeder_cancel.cancel();
    let stopping = relay.clone();
    tokio::task::spawn_blocking(move || {
        if let Some(feeder) = feeder {
            if feeder.join().is_err() {
                log::error!("replay thread panicked");
            }
        }
        stopping.stop();
    })
    .await
    .context("stop relay")?;

    let status = relay.status();
    log::info!(
        "received {} frames, wrote {}, presented {} images",
        status.counters.frames_received,
        status.counters.frames_written,
        status.counters.images_presented
    );
    if let Some(path) = relay.dump_path() {
        log::info!("stream saved to {}", path.display());
    }

    server_cancel.cancel();
    let _ = reporter.await;
    if let Some(server) = server {
        let _ = server.await;
    }
    Ok(())
}

/// Logs the latest video and audio status lines every few seconds.
async fn report_status(
    mut status: tokio::sync::watch::Receiver<RelayStatus>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if !status.has_changed().unwrap_or(false) {
                    continue;
                }
                let latest = status.borrow_and_update().clone();
                if let Some(video) = &latest.video {
                    log::info!("{}", video);
                }
                if let Some(audio) = &latest.audio {
                    log::info!("{}", audio);
                }
            }
        }
    }
}
