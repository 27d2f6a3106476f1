//! Generic `ImageDecoder` trait and the `image`-crate implementation.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, ImageReader};
use sensorbridge_types::{BridgeError, PixelGrid};

/// Turns an opaque upload into a [`PixelGrid`].
pub trait ImageDecoder: Send + Sync {
    /// Decode `bytes`.  `mime_hint` is the declared content type
    /// (e.g. `"image/png"`), used only when the bytes themselves do not
    /// identify the format.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Decode`] if the payload is not a readable
    /// image.
    fn decode(&self, bytes: &[u8], mime_hint: Option<&str>) -> Result<PixelGrid, BridgeError>;
}

/// [`ImageDecoder`] backed by the `image` crate (PNG, JPEG, BMP, TIFF, …).
///
/// Output keeps the source channel layout (grey, grey+alpha, RGB, RGBA) at
/// 8 bits per sample; deeper images are narrowed.
#[derive(Debug, Default, Clone, Copy)]
pub struct RasterDecoder;

impl RasterDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl ImageDecoder for RasterDecoder {
    fn decode(&self, bytes: &[u8], mime_hint: Option<&str>) -> Result<PixelGrid, BridgeError> {
        if bytes.is_empty() {
            return Err(BridgeError::Decode("empty payload".to_string()));
        }
        let mut reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| BridgeError::Decode(e.to_string()))?;
        if reader.format().is_none()
            && let Some(format) = mime_hint.and_then(ImageFormat::from_mime_type)
        {
            reader.set_format(format);
        }
        let image = reader
            .decode()
            .map_err(|e| BridgeError::Decode(e.to_string()))?;
        into_grid(image)
    }
}

fn into_grid(image: DynamicImage) -> Result<PixelGrid, BridgeError> {
    let (width, height) = (image.width(), image.height());
    let (channels, data) = match image.color().channel_count() {
        1 => (1, image.into_luma8().into_raw()),
        2 => (2, image.into_luma_alpha8().into_raw()),
        3 => (3, image.into_rgb8().into_raw()),
        _ => (4, image.into_rgba8().into_raw()),
    };
    PixelGrid::new(width, height, channels, data).ok_or_else(|| {
        BridgeError::Decode(format!("decoded buffer does not match {width}x{height}x{channels}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};

    fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    #[test]
    fn decodes_black_rgb_png() {
        let png = encode(
            DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([0, 0, 0]))),
            ImageFormat::Png,
        );
        let grid = RasterDecoder.decode(&png, Some("image/png")).unwrap();
        assert_eq!((grid.width, grid.height, grid.channels), (4, 4, 3));
        assert!(grid.data.iter().all(|&v| v == 0));
    }

    #[test]
    fn keeps_greyscale_and_alpha_layouts() {
        let grey = encode(
            DynamicImage::ImageLuma8(GrayImage::from_pixel(3, 2, Luma([128]))),
            ImageFormat::Png,
        );
        let grid = RasterDecoder.decode(&grey, None).unwrap();
        assert_eq!(grid.channels, 1);
        assert_eq!(grid.shape(), (2, 3));

        let rgba = encode(
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 255]))),
            ImageFormat::Png,
        );
        let grid = RasterDecoder.decode(&rgba, None).unwrap();
        assert_eq!(grid.channels, 4);
        assert_eq!(grid.get(1, 1, 2), Some(30));
    }

    #[test]
    fn format_is_sniffed_even_when_hint_disagrees() {
        let png = encode(
            DynamicImage::ImageLuma8(GrayImage::from_pixel(1, 1, Luma([9]))),
            ImageFormat::Png,
        );
        let grid = RasterDecoder.decode(&png, Some("image/jpeg")).unwrap();
        assert_eq!(grid.data, vec![9]);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = RasterDecoder
            .decode(b"definitely not an image", Some("image/png"))
            .unwrap_err();
        assert!(matches!(err, BridgeError::Decode(_)));
    }

    #[test]
    fn empty_payload_is_a_decode_error() {
        assert!(matches!(
            RasterDecoder.decode(&[], None),
            Err(BridgeError::Decode(_))
        ));
    }
}
