//! Destructive pixel operations on the working raster.

mod coverage;

use std::sync::Arc;

use emath::{Pos2, Vec2};
use image::{imageops, Rgba, RgbaImage};
use log::debug;

pub use coverage::CoverageMask;

use crate::{
    geometry::{distance_to_segment, ImageRect, PixelBox, Point},
    image_utils::PNG_MIME,
    selection::{Selection, Tool},
};

/// Image captured from a selection and placed by the stamp tool.
/// Swapped as a whole, never edited in place.
pub type StampSource = Arc<RgbaImage>;

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BrushSettings {
    /// Diameter in image pixels.
    pub size: f32,
    /// 0 is fully soft, 100 a hard edge.
    pub hardness: f32,
}

impl Default for BrushSettings {
    fn default() -> Self {
        Self {
            size: 40.0,
            hardness: 50.0,
        }
    }
}

impl BrushSettings {
    pub fn radius(&self) -> f32 {
        self.size.max(0.0) / 2.0
    }

    /// Width of the halo over which removal fades out.
    pub fn softness(&self) -> f32 {
        self.size.max(0.0) * (100.0 - self.hardness.clamp(0.0, 100.0)) / 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct StampSettings {
    pub scale: f32,
    /// Clockwise rotation.
    pub rotation_degrees: f32,
}

impl Default for StampSettings {
    fn default() -> Self {
        Self {
            scale: 1.0,
            rotation_degrees: 0.0,
        }
    }
}

/// Removes alpha along the capsule from `from` to `to`, or a disc at `to`
/// when the stroke has no previous position.
pub fn erase(image: &mut RgbaImage, from: Option<Point>, to: Point, brush: &BrushSettings) {
    let radius = brush.radius();
    let softness = brush.softness();
    let start = from.unwrap_or(to);
    let Some(region) = ImageRect::bounding(&[start, to])
        .and_then(|b| b.expand(radius + softness + 1.0).pixel_box(image.width(), image.height()))
    else {
        return;
    };

    for y in region.y..region.y + region.h {
        for x in region.x..region.x + region.w {
            let center = Pos2::new(x as f32 + 0.5, y as f32 + 0.5);
            let strength = removal(distance_to_segment(center, start, to), radius, softness);
            if strength > 0.0 {
                let alpha = &mut image.get_pixel_mut(x, y)[3];
                *alpha = (*alpha as f32 * (1.0 - strength)).round() as u8;
            }
        }
    }
}

fn removal(distance: f32, radius: f32, softness: f32) -> f32 {
    if softness <= 0.0 {
        return (radius - distance + 0.5).clamp(0.0, 1.0);
    }
    if distance <= radius {
        return 1.0;
    }
    let t = ((distance - radius) / softness).min(1.0);
    1.0 - t * t * (3.0 - 2.0 * t)
}

/// Where and how a source image is drawn onto a raster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub center: Point,
    pub scale: f32,
    pub rotation_degrees: f32,
}

pub fn apply_stamp(image: &mut RgbaImage, stamp: &RgbaImage, at: Point, settings: &StampSettings) {
    let placement = Placement {
        center: at,
        scale: settings.scale,
        rotation_degrees: settings.rotation_degrees,
    };
    let full = PixelBox::full(image.width(), image.height());
    draw_transformed(image, stamp, &placement, 1.0, full);
}

impl Placement {
    fn is_drawable(&self) -> bool {
        self.scale.is_finite() && self.scale > 0.0
    }

    /// Area covered by a `width`x`height` source placed this way.
    pub(crate) fn bounds(&self, width: u32, height: u32) -> Option<ImageRect> {
        if !self.is_drawable() {
            return None;
        }
        let (sin, cos) = self.rotation_degrees.to_radians().sin_cos();
        let half = Vec2::new(width as f32, height as f32) / 2.0;
        let corners = [
            Vec2::new(-half.x, -half.y),
            Vec2::new(half.x, -half.y),
            Vec2::new(half.x, half.y),
            Vec2::new(-half.x, half.y),
        ]
        .map(|c| self.center + Vec2::new(c.x * cos - c.y * sin, c.x * sin + c.y * cos) * self.scale);
        ImageRect::bounding(&corners).map(|b| b.expand(1.0))
    }
}

/// Draws `src` centred, rotated and scaled per `placement` with source-over
/// blending. Pixels outside `clip` are left alone.
pub(crate) fn draw_transformed(dst: &mut RgbaImage, src: &RgbaImage, placement: &Placement, opacity: f32, clip: PixelBox) {
    if src.width() == 0 || src.height() == 0 {
        return;
    }
    let Some(region) = placement
        .bounds(src.width(), src.height())
        .and_then(|b| b.pixel_box(dst.width(), dst.height()))
        .and_then(|b| b.intersect(&clip))
    else {
        return;
    };
    let scale = placement.scale;
    let (sin, cos) = placement.rotation_degrees.to_radians().sin_cos();
    let half = Vec2::new(src.width() as f32, src.height() as f32) / 2.0;
    let center = placement.center;

    for y in region.y..region.y + region.h {
        for x in region.x..region.x + region.w {
            let d = Pos2::new(x as f32 + 0.5, y as f32 + 0.5) - center;
            let sx = (d.x * cos + d.y * sin) / scale + half.x;
            let sy = (-d.x * sin + d.y * cos) / scale + half.y;
            let sample = sample_bilinear(src, sx - 0.5, sy - 0.5);
            if sample[3] > 0.0 {
                blend_over(dst.get_pixel_mut(x, y), sample, opacity);
            }
        }
    }
}

/// Premultiplied bilinear sample, transparent outside the image.
fn sample_bilinear(src: &RgbaImage, x: f32, y: f32) -> [f32; 4] {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let texel = |tx: f32, ty: f32| -> [f32; 4] {
        if tx < 0.0 || ty < 0.0 || tx >= src.width() as f32 || ty >= src.height() as f32 {
            return [0.0; 4];
        }
        premultiply(*src.get_pixel(tx as u32, ty as u32))
    };
    let taps = [
        (texel(x0, y0), (1.0 - fx) * (1.0 - fy)),
        (texel(x0 + 1.0, y0), fx * (1.0 - fy)),
        (texel(x0, y0 + 1.0), (1.0 - fx) * fy),
        (texel(x0 + 1.0, y0 + 1.0), fx * fy),
    ];
    let mut out = [0.0; 4];
    for (value, weight) in taps {
        if weight > 0.0 {
            for c in 0..4 {
                out[c] += value[c] * weight;
            }
        }
    }
    out
}

pub(crate) fn premultiply(px: Rgba<u8>) -> [f32; 4] {
    let a = px[3] as f32 / 255.0;
    [px[0] as f32 * a, px[1] as f32 * a, px[2] as f32 * a, px[3] as f32]
}

/// Source-over of a premultiplied colour scaled by `coverage`.
pub(crate) fn blend_over(dst: &mut Rgba<u8>, src: [f32; 4], coverage: f32) {
    let sa = (src[3] * coverage / 255.0).clamp(0.0, 1.0);
    if sa <= 0.0 {
        return;
    }
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    for c in 0..3 {
        let premul = src[c] * coverage + dst[c] as f32 * da * (1.0 - sa);
        dst[c] = (premul / out_a).round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round() as u8;
}

/// Plain copy of a region.
pub fn crop(image: &RgbaImage, region: PixelBox) -> RgbaImage {
    imageops::crop_imm(image, region.x, region.y, region.w, region.h).to_image()
}

/// Pixel region of `selection` within a `width`x`height` raster, `None` when empty.
pub fn selection_region(selection: &Selection, width: u32, height: u32) -> Option<PixelBox> {
    selection
        .bounding_box()
        .filter(ImageRect::has_area)?
        .pixel_box(width, height)
}

/// Copies the selection's bounding box. Freehand selections are clipped to
/// their path so that pixels outside become transparent.
pub fn capture(image: &RgbaImage, selection: &Selection) -> Option<RgbaImage> {
    let region = selection_region(selection, image.width(), image.height())?;
    let mut captured = crop(image, region);
    if let Selection::Freehand { .. } = selection {
        let mask = CoverageMask::for_selection(selection, region);
        for (x, y, px) in captured.enumerate_pixels_mut() {
            let coverage = mask.at(region.x + x, region.y + y);
            px[3] = (px[3] as f32 * coverage).round() as u8;
        }
    }
    debug!("Captured {}x{} from {region:?}", region.w, region.h);
    Some(captured)
}

/// MIME to store after a gesture. Pixel edits need an alpha capable format.
pub fn commit_mime(gesture: Tool, original: &str) -> &str {
    if gesture.is_raster() {
        PNG_MIME
    } else {
        original
    }
}
