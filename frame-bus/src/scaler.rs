use fast_image_resize as fr;

use crate::image::RgbImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Largest size with the source aspect ratio that fits inside `viewport`.
/// Never returns a zero dimension.
pub fn fit_within(width: u32, height: u32, viewport: Viewport) -> (u32, u32) {
    if width == 0 || height == 0 || viewport.width == 0 || viewport.height == 0 {
        return (1, 1);
    }
    let (w, h) = (width as u64, height as u64);
    let (vw, vh) = (viewport.width as u64, viewport.height as u64);
    // Compare w/h against vw/vh without floating point.
    let (out_w, out_h) = if w * vh >= vw * h {
        (vw, (h * vw / w).max(1))
    } else {
        ((w * vh / h).max(1), vh)
    };
    (out_w as u32, out_h as u32)
}

/// Aspect-preserving RGB scaler with a reusable resizer.
pub struct Scaler {
    resizer: fr::Resizer,
}

impl Scaler {
    pub fn new() -> Self {
        Self {
            resizer: fr::Resizer::new(),
        }
    }

    pub fn fit(&mut self, image: &RgbImage, viewport: Viewport) -> anyhow::Result<RgbImage> {
        let (width, height) = fit_within(image.width, image.height, viewport);
        if (width, height) == (image.width, image.height) {
            return Ok(image.clone());
        }

        let src = fr::images::Image::from_vec_u8(
            image.width,
            image.height,
            image.data.clone(),
            fr::PixelType::U8x3,
        )?;
        let mut dst = fr::images::Image::new(width, height, fr::PixelType::U8x3);
        self.resizer.resize(
            &src,
            &mut dst,
            &fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(
                fr::FilterType::Bilinear,
            )),
        )?;

        Ok(RgbImage {
            width,
            height,
            data: dst.buffer().to_vec(),
        })
    }
}

impl Default for Scaler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_within_wide_source() {
        assert_eq!(fit_within(1920, 1080, Viewport::new(640, 480)), (640, 360));
    }

    #[test]
    fn test_fit_within_tall_source() {
        assert_eq!(fit_within(1080, 1920, Viewport::new(640, 480)), (270, 480));
    }

    #[test]
    fn test_fit_within_upscales_small_source() {
        assert_eq!(fit_within(320, 240, Viewport::new(640, 480)), (640, 480));
    }

    #[test]
    fn test_fit_within_degenerate_inputs() {
        assert_eq!(fit_within(0, 10, Viewport::new(640, 480)), (1, 1));
        assert_eq!(fit_within(10, 10, Viewport::new(0, 480)), (1, 1));
        assert_eq!(fit_within(10000, 1, Viewport::new(100, 100)), (100, 1));
    }

    #[test]
    fn test_scaler_resizes_to_viewport() {
        let image = RgbImage {
            width: 8,
            height: 4,
            data: vec![200; 8 * 4 * 3],
        };
        let mut scaler = Scaler::new();
        let out = scaler.fit(&image, Viewport::new(4, 4)).unwrap();
        assert_eq!((out.width, out.height), (4, 2));
        assert_eq!(out.data.len(), 4 * 2 * 3);
        assert!(out.data.iter().all(|&c| (198..=202).contains(&c)));
    }
}
