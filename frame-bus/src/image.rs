use std::fmt::{Display, Formatter};

use bytes::Bytes;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Yuv420p,
    Yuv422p,
    Yuv444p,
    Gray8,
    Rgb24,
}

impl PixelFormat {
    /// Width and height of each plane, in bytes per row and rows.
    pub fn plane_sizes(self, width: u32, height: u32) -> Vec<(usize, usize)> {
        let w = width as usize;
        let h = height as usize;
        match self {
            PixelFormat::Yuv420p => {
                let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
                vec![(w, h), (cw, ch), (cw, ch)]
            }
            PixelFormat::Yuv422p => {
                let cw = w.div_ceil(2);
                vec![(w, h), (cw, h), (cw, h)]
            }
            PixelFormat::Yuv444p => vec![(w, h), (w, h), (w, h)],
            PixelFormat::Gray8 => vec![(w, h)],
            PixelFormat::Rgb24 => vec![(w * 3, h)],
        }
    }
}

impl Display for PixelFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PixelFormat::Yuv420p => "yuv420p",
            PixelFormat::Yuv422p => "yuv422p",
            PixelFormat::Yuv444p => "yuv444p",
            PixelFormat::Gray8 => "gray",
            PixelFormat::Rgb24 => "rgb24",
        };
        f.write_str(s)
    }
}

/// Decoded picture with tightly packed planes (no row padding).
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub planes: Vec<Bytes>,
    pub pts: Option<i64>,
}

impl DecodedImage {
    pub fn new(width: u32, height: u32, format: PixelFormat, planes: Vec<Bytes>) -> Self {
        Self {
            width,
            height,
            format,
            planes,
            pts: None,
        }
    }

    pub fn with_pts(mut self, pts: Option<i64>) -> Self {
        self.pts = pts;
        self
    }

    /// Converts to packed RGB24 (BT.601).
    pub fn to_rgb(&self) -> anyhow::Result<RgbImage> {
        if self.width == 0 || self.height == 0 {
            anyhow::bail!("invalid image size {}x{}", self.width, self.height);
        }
        let sizes = self.format.plane_sizes(self.width, self.height);
        if self.planes.len() < sizes.len() {
            anyhow::bail!(
                "{} image needs {} planes, got {}",
                self.format,
                sizes.len(),
                self.planes.len()
            );
        }
        for (i, (row, rows)) in sizes.iter().enumerate() {
            if self.planes[i].len() < row * rows {
                anyhow::bail!(
                    "plane {} too small: {} < {}",
                    i,
                    self.planes[i].len(),
                    row * rows
                );
            }
        }

        let width = self.width as usize;
        let height = self.height as usize;
        let data = match self.format {
            PixelFormat::Rgb24 => self.planes[0][..width * height * 3].to_vec(),
            PixelFormat::Gray8 => {
                let mut rgb = Vec::with_capacity(width * height * 3);
                for &y in &self.planes[0][..width * height] {
                    rgb.extend_from_slice(&[y, y, y]);
                }
                rgb
            }
            PixelFormat::Yuv420p | PixelFormat::Yuv422p | PixelFormat::Yuv444p => {
                self.yuv_to_rgb(sizes[1].0)
            }
        };

        Ok(RgbImage {
            width: self.width,
            height: self.height,
            data,
        })
    }

    fn yuv_to_rgb(&self, uv_width: usize) -> Vec<u8> {
        let width = self.width as usize;
        let height = self.height as usize;
        let y_plane = &self.planes[0];
        let u_plane = &self.planes[1];
        let v_plane = &self.planes[2];

        let mut rgb = Vec::with_capacity(width * height * 3);
        for j in 0..height {
            let uv_row = match self.format {
                PixelFormat::Yuv420p => j / 2,
                _ => j,
            };
            for i in 0..width {
                let uv_col = match self.format {
                    PixelFormat::Yuv444p => i,
                    _ => i / 2,
                };
                let uv_idx = uv_row * uv_width + uv_col;

                let y = y_plane[j * width + i] as f32;
                let u = u_plane[uv_idx] as f32 - 128.0;
                let v = v_plane[uv_idx] as f32 - 128.0;

                let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
                let g = (y - 0.344136 * u - 0.714136 * v).clamp(0.0, 255.0) as u8;
                let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;

                rgb.extend_from_slice(&[r, g, b]);
            }
        }
        rgb
    }
}

impl Display for DecodedImage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "DecodedImage {}x{} {} pts: {:?}",
            self.width, self.height, self.format, self.pts
        )
    }
}

/// Packed RGB24 image ready for presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl RgbImage {
    pub fn to_jpeg(&self, quality: u8) -> anyhow::Result<Vec<u8>> {
        let width = u16::try_from(self.width)
            .map_err(|_| anyhow::anyhow!("width {} too large for jpeg", self.width))?;
        let height = u16::try_from(self.height)
            .map_err(|_| anyhow::anyhow!("height {} too large for jpeg", self.height))?;

        let mut out = Vec::new();
        let encoder = jpeg_encoder::Encoder::new(&mut out, quality);
        encoder.encode(&self.data, width, height, jpeg_encoder::ColorType::Rgb)?;
        Ok(out)
    }
}

#[cfg(test)]
#[path = "image_test.rs"]
mod image_test;
