//! Pixel-level drawing primitives shared by the grid and the annotator.

use image::{Rgb, RgbImage, Rgba};

/// Color constants for grading marks.
pub const COLOR_CHECK: Rgb<u8> = Rgb([0, 128, 0]); // Green
pub const COLOR_CROSS: Rgb<u8> = Rgb([255, 0, 0]); // Red
pub const COLOR_SCORE: Rgba<u8> = Rgba([0, 0, 255, 255]); // Blue
pub const COLOR_GRID_LABEL: Rgba<u8> = Rgba([255, 0, 0, 180]); // Red, slightly transparent

/// Blends `color` over one pixel using its alpha channel.
///
/// Coordinates outside the image are ignored, so callers can draw shapes that
/// hang over the edge.
pub fn blend_pixel(img: &mut RgbImage, x: i64, y: i64, color: Rgba<u8>) {
    let (w, h) = img.dimensions();
    if x < 0 || y < 0 || x >= w as i64 || y >= h as i64 {
        return;
    }

    let alpha = color[3] as u32;
    let pixel = img.get_pixel_mut(x as u32, y as u32);
    for c in 0..3 {
        let src = pixel[c] as u32;
        let dst = color[c] as u32;
        pixel[c] = ((dst * alpha + src * (255 - alpha) + 127) / 255) as u8;
    }
}

/// Squared distance from `p` to the segment `a`-`b`.
fn distance_sq_to_segment(p: (f32, f32), a: (f32, f32), b: (f32, f32)) -> f32 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq == 0.0 {
        0.0
    } else {
        (((p.0 - a.0) * dx + (p.1 - a.1) * dy) / len_sq).clamp(0.0, 1.0)
    };
    let (cx, cy) = (a.0 + t * dx, a.1 + t * dy);
    (p.0 - cx) * (p.0 - cx) + (p.1 - cy) * (p.1 - cy)
}

/// Draws a line segment of the given thickness with rounded ends.
///
/// Every pixel within `thickness / 2` of the segment is painted, so joined
/// segments get round joints.
pub fn draw_thick_line(
    img: &mut RgbImage,
    from: (f32, f32),
    to: (f32, f32),
    color: Rgb<u8>,
    thickness: u32,
) {
    let (img_w, img_h) = img.dimensions();
    let radius = thickness.max(1) as f32 / 2.0;
    let radius_sq = radius * radius;

    let min_x = (from.0.min(to.0) - radius).floor().max(0.0) as i64;
    let min_y = (from.1.min(to.1) - radius).floor().max(0.0) as i64;
    let max_x = ((from.0.max(to.0) + radius).ceil() as i64).min(img_w as i64 - 1);
    let max_y = ((from.1.max(to.1) + radius).ceil() as i64).min(img_h as i64 - 1);

    for py in min_y..=max_y {
        for px in min_x..=max_x {
            if distance_sq_to_segment((px as f32, py as f32), from, to) <= radius_sq {
                img.put_pixel(px as u32, py as u32, color);
            }
        }
    }
}

/// Draws connected segments through `points`.
pub fn draw_polyline(img: &mut RgbImage, points: &[(f32, f32)], color: Rgb<u8>, thickness: u32) {
    for pair in points.windows(2) {
        draw_thick_line(img, pair[0], pair[1], color, thickness);
    }
}
