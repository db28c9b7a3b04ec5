use image::{imageops, Rgb, RgbImage};

use crate::imaging::geometry::{FitMode, GeometrySpec};

pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
pub const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

/// Cuts the part of the unscaled source that stays visible after a cover
/// fit. Sources that need no crop come back whole.
pub fn crop_source(source: RgbImage, spec: &GeometrySpec) -> RgbImage {
    if spec.fit_mode != FitMode::Cover || !spec.needs_crop() {
        return source;
    }
    let rect = spec.source_crop_rect();
    imageops::crop_imm(&source, rect.x, rect.y, rect.width, rect.height).to_image()
}

/// Places the visible region, already scaled to `spec.crop_rect()` size, on
/// a `target_width` x `target_height` canvas filled with `background`.
pub fn compose(visible: &RgbImage, spec: &GeometrySpec, background: Rgb<u8>) -> RgbImage {
    let mut canvas = RgbImage::from_pixel(spec.target_width, spec.target_height, background);
    let (paste_x, paste_y) = spec.paste_position();
    imageops::replace(&mut canvas, visible, paste_x, paste_y);
    canvas
}
