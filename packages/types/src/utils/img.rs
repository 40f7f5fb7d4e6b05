use std::io::Cursor;

use anyhow::{Result, anyhow};
use image::{DynamicImage, ImageFormat, ImageReader};

/// Decode an in-memory image, guessing the container format from its magic bytes.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(anyhow!("image payload is empty"));
    }
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    if reader.format().is_none() {
        return Err(anyhow!("unrecognized image format"));
    }
    Ok(reader.decode()?)
}

/// Encode an image as PNG.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn png_roundtrip_keeps_dimensions() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(7, 3, Rgb([10, 20, 30])));
        let bytes = encode_png(&img).unwrap();
        let back = decode(&bytes).unwrap();
        assert_eq!((back.width(), back.height()), (7, 3));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(decode(b"definitely not an image").is_err());
        assert!(decode(&[]).is_err());
    }
}
