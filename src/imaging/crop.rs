use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::error::GradeError;

/// A crop rectangle in pixels of the normalized upload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    /// X position of top-left corner
    pub x: u32,
    /// Y position of top-left corner
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for CropRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.x, self.y, self.width, self.height)
    }
}

/// Parses `x,y,width,height`.
impl FromStr for CropRect {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<u32> = s
            .split(',')
            .map(|p| p.trim().parse::<u32>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| anyhow!("Invalid crop '{}': {}", s, e))?;

        match parts.as_slice() {
            [x, y, width, height] => Ok(CropRect {
                x: *x,
                y: *y,
                width: *width,
                height: *height,
            }),
            _ => Err(anyhow!(
                "Invalid crop '{}': expected x,y,width,height",
                s
            )),
        }
    }
}

/// Crops a sub-region from an image.
///
/// The rectangle is clamped to the image bounds; a rectangle that ends up
/// with no pixels is rejected.
pub fn crop_region(img: &DynamicImage, region: &CropRect) -> Result<DynamicImage, GradeError> {
    let (w, h) = (img.width(), img.height());

    let x0 = region.x.min(w);
    let y0 = region.y.min(h);
    let rw = region.width.min(w - x0);
    let rh = region.height.min(h - y0);

    if rw == 0 || rh == 0 {
        return Err(GradeError::render(format!(
            "crop {} is outside the {}x{} image",
            region, w, h
        )));
    }

    Ok(img.crop_imm(x0, y0, rw, rh))
}
