//! Upright-and-resize normalization applied to every upload.
//!
//! Phone cameras store the sensor image as-is and record the rotation in EXIF
//! tag 0x0112. The grid and the model's coordinates must live in the same
//! upright pixel space, so the rotation is baked in before anything else.

use std::io::Cursor;
use std::path::Path;

use exif::{In, Reader, Tag};
use image::imageops::FilterType;
use image::DynamicImage;

use crate::error::GradeError;

/// Reads the EXIF orientation value from raw file bytes.
///
/// Returns 1 (upright) when there is no EXIF block, no orientation tag, or
/// the block cannot be parsed.
pub fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let exif = match Reader::new().read_from_container(&mut cursor) {
        Ok(exif) => exif,
        Err(_) => return 1,
    };

    exif.get_field(Tag::Orientation, In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
        .unwrap_or(1)
}

/// Applies the transform that makes an image with the given EXIF orientation
/// display upright.
///
/// 1 identity, 2 horizontal flip, 3 rotate 180, 4 vertical flip,
/// 5 transpose, 6 rotate 90 CW, 7 transverse, 8 rotate 270 CW.
/// Unknown values leave the image unchanged.
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

/// Rescales to `target_width`, keeping the aspect ratio (height rounds down).
///
/// An image already at the target width is returned untouched.
pub fn resize_to_width(img: DynamicImage, target_width: u32) -> DynamicImage {
    let (width, height) = (img.width(), img.height());
    if width == 0 || target_width == 0 || width == target_width {
        return img;
    }

    let new_height = ((height as u64 * target_width as u64) / width as u64).max(1) as u32;
    img.resize_exact(target_width, new_height, FilterType::Lanczos3)
}

/// Orientation fix followed by the resize.
pub fn normalize(img: DynamicImage, orientation: u32, target_width: u32) -> DynamicImage {
    resize_to_width(apply_orientation(img, orientation), target_width)
}

/// Decodes an image file and normalizes it.
pub fn load_normalized(path: &Path, target_width: u32) -> Result<DynamicImage, GradeError> {
    let bytes = std::fs::read(path).map_err(|e| GradeError::source_unavailable(path, e))?;
    let img =
        image::load_from_memory(&bytes).map_err(|e| GradeError::source_unavailable(path, e))?;

    let orientation = read_exif_orientation(&bytes);
    if orientation != 1 {
        crate::log(&format!(
            "Applying EXIF orientation {} to {}",
            orientation,
            path.display()
        ));
    }

    Ok(normalize(img, orientation, target_width))
}
