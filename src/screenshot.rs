//! Viewport screenshot capture

use crate::error::{BrowserError, Result};
use crate::page::PageDriver;
use image::{ImageFormat, RgbImage};

/// Decode PNG bytes into an RGB image, dropping any alpha channel
pub fn decode_png(bytes: &[u8]) -> Result<RgbImage> {
    let image = image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .map_err(|e| BrowserError::ScreenshotFailed(format!("Invalid PNG: {}", e)))?;
    Ok(image.to_rgb8())
}

/// Capture the current viewport as an RGB image
pub fn capture_screenshot<P>(page: &P) -> Result<RgbImage>
where
    P: PageDriver + ?Sized,
{
    let bytes = page.capture_screenshot()?;
    let image = decode_png(&bytes)?;
    log::debug!("Captured {}x{} screenshot", image.width(), image.height());
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_bytes(image: &RgbaImage) -> Vec<u8> {
        let mut bytes = Cursor::new(Vec::new());
        image.write_to(&mut bytes, ImageFormat::Png).unwrap();
        bytes.into_inner()
    }

    #[test]
    fn test_decode_png_drops_alpha() {
        let mut source = RgbaImage::new(3, 2);
        source.put_pixel(1, 1, Rgba([200, 10, 20, 128]));

        let decoded = decode_png(&png_bytes(&source)).unwrap();

        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded.get_pixel(1, 1).0, [200, 10, 20]);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode_png(b"not a png"), Err(BrowserError::ScreenshotFailed(_))));
    }
}
