//! Frame type and pixel-format conversion to 8-bit RGB.

use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};

/// A captured camera frame, converted to RGB.
#[derive(Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub sequence: u32,
    pub is_dark: bool,
}

impl Frame {
    /// Wrap a converted image, flagging it dark when more than
    /// `dark_threshold` of its pixels are near-black.
    pub fn new(image: RgbImage, sequence: u32, dark_threshold: f32) -> Self {
        let is_dark = is_dark_frame(&luma(&image), dark_threshold);
        Self { image, sequence, is_dark }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Average luma (0.0–255.0).
    pub fn avg_brightness(&self) -> f32 {
        let gray = luma(&self.image);
        if gray.is_empty() {
            return 0.0;
        }
        gray.iter().map(|&b| b as f32).sum::<f32>() / gray.len() as f32
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }
}

fn luma(image: &RgbImage) -> Vec<u8> {
    image::imageops::grayscale(image).into_raw()
}

fn rgb_from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<RgbImage, FrameError> {
    let expected = (width * height * 3) as usize;
    let actual = data.len();
    RgbImage::from_raw(width, height, data).ok_or(FrameError::InvalidLength { expected, actual })
}

/// BT.601 limited-range YCbCr to RGB.
fn ycbcr_to_rgb(y: u8, cb: u8, cr: u8) -> [u8; 3] {
    let c = (y as f32 - 16.0) * 1.164;
    let d = cb as f32 - 128.0;
    let e = cr as f32 - 128.0;
    let clamp = |v: f32| v.round().clamp(0.0, 255.0) as u8;
    [
        clamp(c + 1.596 * e),
        clamp(c - 0.392 * d - 0.813 * e),
        clamp(c + 2.017 * d),
    ]
}

/// Convert packed YUYV (4:2:2) to RGB.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share the
/// chroma pair.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected || width % 2 != 0 {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let rgb: Vec<u8> = yuyv[..expected]
        .chunks_exact(4)
        .flat_map(|px| {
            let [y0, u, y1, v] = [px[0], px[1], px[2], px[3]];
            let [r0, g0, b0] = ycbcr_to_rgb(y0, u, v);
            let [r1, g1, b1] = ycbcr_to_rgb(y1, u, v);
            [r0, g0, b0, r1, g1, b1]
        })
        .collect();
    rgb_from_raw(width, height, rgb)
}

/// Convert 16-bit little-endian grayscale by keeping the high byte.
pub fn y16_to_rgb(y16: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let expected = (width * height * 2) as usize;
    if y16.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: y16.len(),
        });
    }
    let gray = y16[..expected].chunks_exact(2).map(|px| px[1]).collect();
    grey_to_rgb(gray, width, height)
}

/// Replicate 8-bit grayscale over the three channels.
pub fn grey_to_rgb(mut grey: Vec<u8>, width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let expected = (width * height) as usize;
    let actual = grey.len();
    if actual < expected {
        return Err(FrameError::InvalidLength { expected, actual });
    }
    grey.truncate(expected);
    let gray = GrayImage::from_raw(width, height, grey).ok_or(FrameError::InvalidLength { expected, actual })?;
    Ok(DynamicImage::ImageLuma8(gray).to_rgb8())
}

/// Decode one Motion-JPEG frame.
pub fn mjpeg_to_rgb(jpeg: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let decoded = image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg)?.to_rgb8();
    if decoded.dimensions() != (width, height) {
        return Err(FrameError::UnexpectedSize {
            expected: (width, height),
            actual: decoded.dimensions(),
        });
    }
    Ok(decoded)
}

/// Whether more than `threshold_pct` of the pixels are near-black (< 32).
pub fn is_dark_frame(gray: &[u8], threshold_pct: f32) -> bool {
    if gray.is_empty() {
        return true;
    }
    let dark_count = gray.iter().filter(|&&p| p < 32).count();
    (dark_count as f32 / gray.len() as f32) > threshold_pct
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("frame is {actual:?}, negotiated {expected:?}")]
    UnexpectedSize { expected: (u32, u32), actual: (u32, u32) },
    #[error("MJPEG decode failed: {0}")]
    Decode(#[from] image::ImageError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::io::Cursor;

    #[test]
    fn test_yuyv_to_rgb_neutral_chroma() {
        // 2x1 image: [Y0=16, U=128, Y1=235, V=128] is black then white.
        let rgb = yuyv_to_rgb(&[16, 128, 235, 128], 2, 1).unwrap();
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(rgb.get_pixel(1, 0), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_yuyv_keeps_colour() {
        // Strong Cr with neutral Cb: red dominates.
        let rgb = yuyv_to_rgb(&[120, 128, 120, 220], 2, 1).unwrap();
        let Rgb([r, g, b]) = *rgb.get_pixel(0, 0);
        assert!(r > g && r > b, "({r}, {g}, {b})");
        assert_eq!(rgb.get_pixel(0, 0), rgb.get_pixel(1, 0));
    }

    #[test]
    fn test_yuyv_ignores_trailing_bytes() {
        let yuyv = [16u8, 128, 16, 128, 16, 128, 16, 128, 99, 99];
        let rgb = yuyv_to_rgb(&yuyv, 4, 1).unwrap();
        assert_eq!(rgb.dimensions(), (4, 1));
        assert!(rgb.pixels().all(|p| p == &Rgb([0, 0, 0])));
    }

    #[test]
    fn test_yuyv_invalid_length() {
        assert!(matches!(
            yuyv_to_rgb(&[100, 128], 2, 1),
            Err(FrameError::InvalidLength { expected: 4, actual: 2 })
        ));
    }

    #[test]
    fn test_y16_keeps_high_byte() {
        // 0x12ff, 0xab00
        let rgb = y16_to_rgb(&[0xff, 0x12, 0x00, 0xab], 2, 1).unwrap();
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([0x12; 3]));
        assert_eq!(rgb.get_pixel(1, 0), &Rgb([0xab; 3]));
        assert!(y16_to_rgb(&[0xff], 1, 1).is_err());
    }

    #[test]
    fn test_grey_replicates_channels() {
        let rgb = grey_to_rgb(vec![7, 200, 0], 2, 1).unwrap();
        assert_eq!(rgb.get_pixel(1, 0), &Rgb([200; 3]));
        assert!(grey_to_rgb(vec![7], 2, 1).is_err());
    }

    #[test]
    fn test_mjpeg_decode() {
        let source = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 8, Rgb([200, 40, 40])));
        let mut jpeg = Cursor::new(Vec::new());
        source.write_to(&mut jpeg, ImageFormat::Jpeg).unwrap();

        let rgb = mjpeg_to_rgb(jpeg.get_ref(), 16, 8).unwrap();
        assert_eq!(rgb.dimensions(), (16, 8));
        let Rgb([r, g, b]) = *rgb.get_pixel(8, 4);
        assert!(r > 150 && g < 90 && b < 90, "({r}, {g}, {b})");

        assert!(matches!(
            mjpeg_to_rgb(jpeg.get_ref(), 640, 480),
            Err(FrameError::UnexpectedSize { .. })
        ));
        assert!(matches!(mjpeg_to_rgb(b"garbage", 16, 8), Err(FrameError::Decode(_))));
    }

    #[test]
    fn test_dark_frame() {
        assert!(is_dark_frame(&[0u8; 1000], 0.95));
        assert!(!is_dark_frame(&[128u8; 1000], 0.95));
        assert!(is_dark_frame(&[], 0.95));

        let mut mostly_dark = vec![10u8; 960];
        mostly_dark.extend([128u8; 40]);
        assert!(is_dark_frame(&mostly_dark, 0.95));

        let mut borderline = vec![10u8; 940];
        borderline.extend([128u8; 60]);
        assert!(!is_dark_frame(&borderline, 0.95));
    }

    #[test]
    fn test_frame_brightness_and_darkness() {
        let dark = Frame::new(RgbImage::from_pixel(3, 2, Rgb([7, 7, 7])), 0, 0.95);
        assert!(dark.is_dark);
        assert!((dark.avg_brightness() - 7.0).abs() < 0.5);
        assert_eq!((dark.width(), dark.height()), (3, 2));

        let lit = Frame::new(RgbImage::from_pixel(3, 2, Rgb([250, 180, 90])), 1, 0.95);
        assert!(!lit.is_dark);
        assert_eq!(lit.into_image().get_pixel(0, 0), &Rgb([250, 180, 90]));
    }
}
