//! FFmpeg-backed codecs (enabled with the `ffmpeg` feature).

use anyhow::anyhow;
use bytes::{Bytes, BytesMut};
use ffmpeg_next::{codec, format::Pixel, software::scaling};

use crate::{
    codec::{Codec, CodecFactory, CodecFormat, ThreadKind, Threading},
    image::{DecodedImage, PixelFormat},
};

pub struct FfmpegCodecFactory;

impl CodecFactory for FfmpegCodecFactory {
    fn open(&self, format: CodecFormat, threading: Threading) -> anyhow::Result<Box<dyn Codec>> {
        let id = match format {
            CodecFormat::H264 => codec::Id::H264,
            CodecFormat::H265 => codec::Id::HEVC,
        };
        let found = ffmpeg_next::decoder::find(id)
            .ok_or_else(|| anyhow!("{} decoder not found", format.name()))?;

        let mut ctx = codec::Context::new_with_codec(found);
        let mut config = codec::threading::Config::default();
        config.kind = match threading.kind {
            ThreadKind::Frame => codec::threading::Type::Frame,
            ThreadKind::Slice => codec::threading::Type::Slice,
        };
        config.count = threading.count;
        ctx.set_threading(config);

        let decoder = ctx.decoder().video()?;
        Ok(Box::new(FfmpegCodec {
            decoder,
            scaler: None,
        }))
    }
}

struct Scaler {
    key: (Pixel, u32, u32),
    context: scaling::Context,
}

unsafe impl Send for Scaler {}

struct FfmpegCodec {
    decoder: ffmpeg_next::decoder::Video,
    scaler: Option<Scaler>,
}

impl FfmpegCodec {
    fn receive(&mut self) -> anyhow::Result<Option<ffmpeg_next::frame::Video>> {
        let mut frame = ffmpeg_next::frame::Video::empty();
        match self.decoder.receive_frame(&mut frame) {
            Ok(()) => Ok(Some(frame)),
            Err(ffmpeg_next::Error::Eof) => Ok(None),
            Err(ffmpeg_next::Error::Other { errno }) if errno == ffmpeg_next::util::error::EAGAIN => {
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn convert(&mut self, frame: &ffmpeg_next::frame::Video) -> anyhow::Result<DecodedImage> {
        let (width, height) = (frame.width(), frame.height());
        let format = match frame.format() {
            Pixel::YUV420P | Pixel::YUVJ420P => Some(PixelFormat::Yuv420p),
            Pixel::YUV422P | Pixel::YUVJ422P => Some(PixelFormat::Yuv422p),
            Pixel::YUV444P | Pixel::YUVJ444P => Some(PixelFormat::Yuv444p),
            Pixel::GRAY8 => Some(PixelFormat::Gray8),
            _ => None,
        };

        let image = match format {
            Some(format) => copy_planes(frame, format)?,
            None => {
                let key = (frame.format(), width, height);
                if self.scaler.as_ref().is_none_or(|s| s.key != key) {
                    let context = scaling::Context::get(
                        frame.format(),
                        width,
                        height,
                        Pixel::YUV420P,
                        width,
                        height,
                        scaling::Flags::BILINEAR,
                    )?;
                    self.scaler = Some(Scaler { key, context });
                }
                let mut converted = ffmpeg_next::frame::Video::empty();
                if let Some(scaler) = self.scaler.as_mut() {
                    scaler.context.run(frame, &mut converted)?;
                }
                copy_planes(&converted, PixelFormat::Yuv420p)?
            }
        };
        Ok(image.with_pts(frame.pts()))
    }
}

/// Copies each plane without its row padding.
fn copy_planes(
    frame: &ffmpeg_next::frame::Video,
    format: PixelFormat,
) -> anyhow::Result<DecodedImage> {
    let sizes = format.plane_sizes(frame.width(), frame.height());
    if frame.planes() < sizes.len() {
        anyhow::bail!("frame has {} planes, {} expects {}", frame.planes(), format, sizes.len());
    }

    let mut planes = Vec::with_capacity(sizes.len());
    for (i, (row, rows)) in sizes.into_iter().enumerate() {
        let stride = frame.stride(i);
        let data = frame.data(i);
        let mut plane = BytesMut::with_capacity(row * rows);
        for r in 0..rows {
            let start = r * stride;
            let line = data
                .get(start..start + row)
                .ok_or_else(|| anyhow!("plane {} row {} out of bounds", i, r))?;
            plane.extend_from_slice(line);
        }
        planes.push(plane.freeze());
    }
    Ok(DecodedImage::new(frame.width(), frame.height(), format, planes))
}

impl Codec for FfmpegCodec {
    /// Units from the camera are already whole access units.
    fn parse(&mut self, data: &Bytes) -> anyhow::Result<Vec<Bytes>> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![data.clone()])
    }

    fn decode(&mut self, packet: &Bytes) -> anyhow::Result<Vec<DecodedImage>> {
        let packet = ffmpeg_next::Packet::copy(packet);
        self.decoder.send_packet(&packet)?;

        let mut images = Vec::new();
        while let Some(frame) = self.receive()? {
            images.push(self.convert(&frame)?);
        }
        Ok(images)
    }
}
