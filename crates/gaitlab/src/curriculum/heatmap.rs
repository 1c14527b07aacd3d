//! Grayscale visualization of curriculum progress.

use super::Curriculum;
use image::{GrayImage, Luma};

/// Half extent of the drawn grid; cells with |x| or |y| above it are skipped.
pub const HALF_EXTENT: i32 = 7;
const SIDE: u32 = (HALF_EXTENT * 2 + 1) as u32;

/// Render scores (top) and episode counts (bottom) as one image.
///
/// Each design occupies a `15 x 15` block with `(0, 0)` at its centre; row is
/// `x`, column is `y`. Designs are laid out left to right. Scores are scaled by
/// the expansion threshold and clipped, counts by the largest count overall.
pub fn render(curriculum: &Curriculum) -> GrayImage {
    let num_designs = curriculum.num_designs() as u32;
    let mut img = GrayImage::new(SIDE * num_designs.max(1), SIDE * 2);

    let max_count = curriculum.stats().count_max;
    let score_th = curriculum.score_th();

    for (design, track) in curriculum.tracks().iter().enumerate() {
        let col_offset = design as u32 * SIDE;
        for ((cell, &score), &count) in track
            .cells()
            .iter()
            .zip(track.scores())
            .zip(track.counts())
        {
            if cell.x.abs() > HALF_EXTENT || cell.y.abs() > HALF_EXTENT {
                continue;
            }
            let row = (cell.x + HALF_EXTENT) as u32;
            let col = col_offset + (cell.y + HALF_EXTENT) as u32;

            let score_px = if score_th > 0.0 {
                (score / score_th).clamp(0.0, 1.0) * 255.0
            } else {
                255.0
            };
            let count_px = if max_count > 0 {
                count as f64 / max_count as f64 * 255.0
            } else {
                0.0
            };

            img.put_pixel(col, row, Luma([score_px as u8]));
            img.put_pixel(col, row + SIDE, Luma([count_px as u8]));
        }
    }

    img
}
