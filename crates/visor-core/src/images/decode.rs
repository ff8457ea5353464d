//! Decode/resize/encode helpers for image upload.

use crate::images::DecodedImage;

/// Decodes an image file and returns PNG bytes, downscaled to `max_dims`
/// when the source exceeds them.
///
/// If the source file is already PNG and does not exceed `max_dims`, bytes
/// are returned as-is (fast path).
///
/// # Errors
/// Returns an error string if file I/O, format detection/decoding, resizing,
/// or PNG encoding fails.
pub fn decode_image_to_png(
    image_path: &std::path::Path,
    max_dims: (u32, u32),
) -> Result<DecodedImage, String> {
    let path_display = image_path.display();
    let data = std::fs::read(image_path).map_err(|e| format!("{path_display}: {e}"))?;
    let is_png = data.len() >= 8 && data[..8] == [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

    let (width, height) =
        image::image_dimensions(image_path).map_err(|e| format!("dimensions: {e}"))?;

    let (max_w, max_h) = (max_dims.0.max(1), max_dims.1.max(1));
    let needs_resize = width > max_w || height > max_h;

    let png_bytes = if is_png && !needs_resize {
        data
    } else {
        let reader = image::ImageReader::new(std::io::Cursor::new(data))
            .with_guessed_format()
            .map_err(|e| format!("decode: {e}"))?;

        let dyn_img = reader.decode().map_err(|e| format!("decode: {e}"))?;
        let resized = if needs_resize {
            let (dst_w, dst_h) = fit_dims(width, height, max_w, max_h);
            resize_image_fast(&dyn_img, dst_w, dst_h)?
        } else {
            dyn_img
        };

        encode_png_fast(&resized)?
    };

    Ok(DecodedImage {
        png_bytes,
        source_width: width,
        source_height: height,
    })
}

/// Scales (w, h) down to fit within (max_w, max_h), preserving aspect ratio.
fn fit_dims(w: u32, h: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    let scale = f64::min(f64::from(max_w) / f64::from(w), f64::from(max_h) / f64::from(h));
    if scale >= 1.0 {
        return (w, h);
    }
    let dst_w = ((f64::from(w) * scale) as u32).max(1);
    let dst_h = ((f64::from(h) * scale) as u32).max(1);
    (dst_w, dst_h)
}

fn resize_image_fast(
    src: &image::DynamicImage,
    dst_w: u32,
    dst_h: u32,
) -> Result<image::DynamicImage, String> {
    use fast_image_resize as fir;

    if src.width() == dst_w && src.height() == dst_h {
        return Ok(src.clone());
    }

    let src_rgba = src.to_rgba8();
    let src_w = src_rgba.width();
    let src_h = src_rgba.height();
    let src_pixels = src_rgba.into_raw();

    let src_image = fir::images::Image::from_vec_u8(src_w, src_h, src_pixels, fir::PixelType::U8x4)
        .map_err(|e| format!("resize: {e}"))?;

    let mut dst_image = fir::images::Image::new(dst_w, dst_h, fir::PixelType::U8x4);
    let mut resizer = fir::Resizer::new();
    let options = fir::ResizeOptions::new().resize_alg(fir::ResizeAlg::Nearest);
    resizer
        .resize(&src_image, &mut dst_image, Some(&options))
        .map_err(|e| format!("resize: {e}"))?;

    let dst_pixels = dst_image.into_vec();
    let rgba = image::RgbaImage::from_raw(dst_w, dst_h, dst_pixels)
        .ok_or_else(|| "resize: invalid output buffer".to_string())?;
    Ok(image::DynamicImage::ImageRgba8(rgba))
}

fn encode_png_fast(img: &image::DynamicImage) -> Result<Vec<u8>, String> {
    use image::ImageEncoder as _;
    use image::codecs::png::{CompressionType, FilterType, PngEncoder};

    let has_alpha = img.color().has_alpha();
    let mut buf = Vec::new();

    let encoder =
        PngEncoder::new_with_quality(&mut buf, CompressionType::Fast, FilterType::Adaptive);

    if has_alpha {
        let rgba = img.to_rgba8();
        let (w, h) = rgba.dimensions();
        encoder
            .write_image(rgba.as_raw(), w, h, image::ExtendedColorType::Rgba8)
            .map_err(|e| format!("encode: {e}"))?;
    } else {
        let rgb = img.to_rgb8();
        let (w, h) = rgb.dimensions();
        encoder
            .write_image(rgb.as_raw(), w, h, image::ExtendedColorType::Rgb8)
            .map_err(|e| format!("encode: {e}"))?;
    }

    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_png(path: &std::path::Path, w: u32, h: u32) {
        let img = image::RgbImage::from_pixel(w, h, image::Rgb([12, 34, 56]));
        img.save(path).unwrap();
    }

    #[test]
    fn test_small_png_fast_path_keeps_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.png");
        write_png(&path, 4, 4);

        let original = std::fs::read(&path).unwrap();
        let decoded = decode_image_to_png(&path, (64, 64)).unwrap();

        assert_eq!(decoded.png_bytes, original);
        assert_eq!((decoded.source_width, decoded.source_height), (4, 4));
    }

    #[test]
    fn test_oversized_image_is_downscaled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("large.png");
        write_png(&path, 32, 16);

        let decoded = decode_image_to_png(&path, (8, 8)).unwrap();

        // Source dimensions are reported unchanged; the payload shrinks.
        assert_eq!((decoded.source_width, decoded.source_height), (32, 16));
        let (w, h) = image::load_from_memory(&decoded.png_bytes)
            .map(|img| (img.width(), img.height()))
            .unwrap();
        assert!(w <= 8 && h <= 8);
    }

    #[test]
    fn test_garbage_bytes_fail_to_decode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.png");
        std::fs::write(&path, b"not an image at all").unwrap();

        assert!(decode_image_to_png(&path, (64, 64)).is_err());
    }

    #[test]
    fn test_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.png");

        assert!(decode_image_to_png(&path, (64, 64)).is_err());
    }

    #[test]
    fn test_fit_dims_preserves_aspect_ratio() {
        assert_eq!(fit_dims(100, 50, 10, 10), (10, 5));
        assert_eq!(fit_dims(50, 100, 10, 10), (5, 10));
        assert_eq!(fit_dims(4, 4, 10, 10), (4, 4));
    }
}
