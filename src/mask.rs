use std::path::Path;

use crate::error::{SimError, SimResult};

/// Decoded boundary mask, RGB8, row 0 at the bottom of the image.
#[derive(Debug, Clone)]
pub struct MaskImage {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

impl MaskImage {
    pub fn from_rgb(width: u32, height: u32, rgb: Vec<u8>) -> SimResult<Self> {
        if width == 0 || height == 0 {
            return Err(SimError::Configuration(format!(
                "mask dimensions must be positive, got {width}x{height}"
            )));
        }
        let expected = width as usize * height as usize * 3;
        if rgb.len() != expected {
            return Err(SimError::Configuration(format!(
                "mask holds {} bytes, expected {expected} for {width}x{height} RGB",
                rgb.len()
            )));
        }
        Ok(Self { width, height, rgb })
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let i = 3 * (y as usize * self.width as usize + x as usize);
        [self.rgb[i], self.rgb[i + 1], self.rgb[i + 2]]
    }
}

/// Decodes an image file into an RGB mask, flipped so texture origin is bottom-left.
pub fn load_mask(path: &Path) -> SimResult<MaskImage> {
    let decoded = image::open(path).map_err(|source| SimError::MaskDecode {
        path: path.to_path_buf(),
        source,
    })?;
    let rgb = decoded.flipv().to_rgb8();
    let (width, height) = rgb.dimensions();
    log::info!(
        "boundary mask {} ({}x{})",
        path.display(),
        width,
        height
    );
    MaskImage::from_rgb(width, height, rgb.into_raw())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_buffer() {
        assert!(MaskImage::from_rgb(4, 4, vec![0; 47]).is_err());
        assert!(MaskImage::from_rgb(0, 4, Vec::new()).is_err());
    }

    #[test]
    fn decodes_and_flips_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.png");
        let mut img = image::RgbImage::new(3, 2);
        // top row red, bottom row blue
        for x in 0..3 {
            img.put_pixel(x, 0, image::Rgb([255, 0, 0]));
            img.put_pixel(x, 1, image::Rgb([0, 0, 255]));
        }
        img.save(&path).unwrap();

        let mask = load_mask(&path).unwrap();
        assert_eq!((mask.width, mask.height), (3, 2));
        assert_eq!(mask.pixel(0, 0), [0, 0, 255]);
        assert_eq!(mask.pixel(2, 1), [255, 0, 0]);
    }

    #[test]
    fn grayscale_with_alpha_becomes_rgb() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gray.png");
        image::GrayAlphaImage::from_pixel(2, 2, image::LumaA([200, 10]))
            .save(&path)
            .unwrap();
        let mask = load_mask(&path).unwrap();
        assert_eq!(mask.pixel(1, 1), [200, 200, 200]);
    }

    #[test]
    fn undecodable_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();
        let err = load_mask(&path).unwrap_err();
        assert!(matches!(err, SimError::MaskDecode { .. }));
        assert!(err.to_string().contains("broken.png"));
    }
}
