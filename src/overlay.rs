//! Transparent layer drawn over the canvas: selection outline and tool cursor.
//!
//! The layer is kept between frames. [`OverlayLayer::update`] compares the
//! marks of the new scene with what was drawn last time and repaints only the
//! pixels around marks that changed, so hovering over a large photo touches
//! a few hundred pixels instead of the whole raster.

use std::sync::Arc;

use image::{Rgba, RgbaImage};

use crate::{
    geometry::{distance_to_segment, ImageRect, PixelBox, Point},
    raster::{blend_over, draw_transformed, premultiply, BrushSettings, CoverageMask, Placement, StampSettings, StampSource},
    selection::{DrawingSession, Selection, Tool},
};

const SELECTION_STROKE: Rgba<u8> = Rgba([78, 205, 196, 255]);
const SELECTION_FILL: Rgba<u8> = Rgba([78, 205, 196, 77]);
const RING_OUTER: Rgba<u8> = Rgba([255, 255, 255, 255]);
const RING_INNER: Rgba<u8> = Rgba([0, 0, 0, 255]);
const STAMP_PREVIEW_OPACITY: f32 = 0.6;

/// Everything the overlay depends on, borrowed from the editing session.
pub struct OverlayScene<'a> {
    pub width: u32,
    pub height: u32,
    pub tool: Tool,
    pub selection: Option<&'a Selection>,
    pub drawing: &'a DrawingSession,
    pub cursor: Option<Point>,
    pub brush: BrushSettings,
    pub stamp: Option<&'a StampSource>,
    pub stamp_settings: StampSettings,
}

/// Outline width scaled with the image so it stays visible on large photos.
pub fn stroke_width(image_width: u32) -> f32 {
    (4.0 * image_width as f32 / 1000.0).max(1.0)
}

/// Selection outline as drawn: open while tracing, closed once committed.
#[derive(Debug, Clone, PartialEq)]
struct PathMark {
    points: Vec<Point>,
    closed: bool,
}

#[derive(Debug, Clone)]
enum CursorMark {
    Ring { center: Point, radius: f32 },
    Stamp { placement: Placement, stamp: StampSource },
}

impl PartialEq for CursorMark {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Ring { center: a, radius: ra }, Self::Ring { center: b, radius: rb }) => a == b && ra == rb,
            (Self::Stamp { placement: a, stamp: sa }, Self::Stamp { placement: b, stamp: sb }) => {
                a == b && Arc::ptr_eq(sa, sb)
            }
            _ => false,
        }
    }
}

impl OverlayScene<'_> {
    fn path(&self) -> Option<PathMark> {
        if self.drawing.is_drawing && self.tool.is_selection() {
            let points = match self.tool {
                Tool::Freehand => self.drawing.current_points.clone(),
                _ => self.drawing.current_rect?.corners().to_vec(),
            };
            return Some(PathMark {
                closed: self.tool == Tool::Rectangle,
                points,
            });
        }
        self.selection.map(|selection| PathMark {
            points: selection.outline(),
            closed: true,
        })
    }

    fn cursor_mark(&self) -> Option<CursorMark> {
        if self.drawing.is_drawing {
            return None;
        }
        let cursor = self.cursor?;
        match (self.tool, self.stamp) {
            (Tool::Eraser, _) => Some(CursorMark::Ring {
                center: cursor,
                radius: self.brush.radius(),
            }),
            (Tool::Stamp, Some(stamp)) => Some(CursorMark::Stamp {
                placement: Placement {
                    center: cursor,
                    scale: self.stamp_settings.scale,
                    rotation_degrees: self.stamp_settings.rotation_degrees,
                },
                stamp: stamp.clone(),
            }),
            _ => None,
        }
    }
}

impl PathMark {
    fn bounds(&self, width: f32, layer: &RgbaImage) -> Option<PixelBox> {
        ImageRect::bounding(&self.points)?
            .expand(width + 1.0)
            .pixel_box(layer.width(), layer.height())
    }

    /// Translucent fill plus solid outline, limited to `clip`. The fill needs at least three points.
    fn draw(&self, layer: &mut RgbaImage, width: f32, clip: PixelBox) {
        let Some(region) = self.bounds(width, layer).and_then(|b| b.intersect(&clip)) else {
            return;
        };
        if self.points.len() > 2 {
            paint(layer, &CoverageMask::polygon(&self.points, region), SELECTION_FILL);
        }
        paint(
            layer,
            &CoverageMask::stroke(&self.points, self.closed, width, region),
            SELECTION_STROKE,
        );
    }
}

impl CursorMark {
    fn bounds(&self, layer: &RgbaImage) -> Option<PixelBox> {
        let rect = match self {
            Self::Ring { center, radius } => ImageRect::new(center.x, center.y, 0.0, 0.0).expand(radius + 3.0),
            Self::Stamp { placement, stamp } => placement.bounds(stamp.width(), stamp.height())?,
        };
        rect.pixel_box(layer.width(), layer.height())
    }

    fn draw(&self, layer: &mut RgbaImage, clip: PixelBox) {
        match self {
            Self::Ring { center, radius } => {
                let Some(region) = self.bounds(layer).and_then(|b| b.intersect(&clip)) else {
                    return;
                };
                ring(layer, region, *center, *radius, 2.0, RING_OUTER);
                ring(layer, region, *center, *radius, 1.0, RING_INNER);
            }
            Self::Stamp { placement, stamp } => {
                draw_transformed(layer, stamp, placement, STAMP_PREVIEW_OPACITY, clip)
            }
        }
    }
}

/// Overlay raster kept between frames.
pub struct OverlayLayer {
    image: RgbaImage,
    path: Option<PathMark>,
    cursor: Option<CursorMark>,
}

impl OverlayLayer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
            path: None,
            cursor: None,
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Brings the layer in line with `scene` and returns the repainted
    /// region, `None` when nothing visible changed. A scene of another size
    /// starts over with a blank layer and repaints all of it.
    pub fn update(&mut self, scene: &OverlayScene<'_>) -> Option<PixelBox> {
        let resized = self.image.dimensions() != (scene.width, scene.height);
        if resized {
            *self = Self::new(scene.width, scene.height);
        }
        let width = stroke_width(self.image.width());
        let path = scene.path();
        let cursor = scene.cursor_mark();

        let mut dirty = resized.then(|| PixelBox::full(scene.width, scene.height));
        let mut touch = |region: Option<PixelBox>| {
            if let Some(region) = region {
                dirty = Some(dirty.map_or(region, |d| d.union(&region)));
            }
        };
        if path != self.path {
            for mark in [&self.path, &path].into_iter().flatten() {
                touch(mark.bounds(width, &self.image));
            }
        }
        if cursor != self.cursor {
            for mark in [&self.cursor, &cursor].into_iter().flatten() {
                touch(mark.bounds(&self.image));
            }
        }
        self.path = path;
        self.cursor = cursor;

        let region = dirty.filter(|d| !d.is_empty())?;
        for y in region.y..region.y + region.h {
            for x in region.x..region.x + region.w {
                self.image.put_pixel(x, y, Rgba([0, 0, 0, 0]));
            }
        }
        if let Some(path) = &self.path {
            path.draw(&mut self.image, width, region);
        }
        if let Some(cursor) = &self.cursor {
            cursor.draw(&mut self.image, region);
        }
        Some(region)
    }
}

fn ring(layer: &mut RgbaImage, region: PixelBox, center: Point, radius: f32, width: f32, color: Rgba<u8>) {
    let src = premultiply(color);
    for y in region.y..region.y + region.h {
        for x in region.x..region.x + region.w {
            let p = Point::new(x as f32 + 0.5, y as f32 + 0.5);
            let distance = (distance_to_segment(p, center, center) - radius).abs();
            let coverage = (width / 2.0 - distance + 0.5).clamp(0.0, 1.0);
            if coverage > 0.0 {
                blend_over(layer.get_pixel_mut(x, y), src, coverage);
            }
        }
    }
}

fn paint(layer: &mut RgbaImage, mask: &CoverageMask, color: Rgba<u8>) {
    let src = premultiply(color);
    for (x, y, coverage) in mask.covered() {
        blend_over(layer.get_pixel_mut(x, y), src, coverage);
    }
}

#[cfg(test)]
mod tests {
    use emath::pos2;

    use super::*;

    /// A fresh layer brought up to date in one step.
    fn render(scene: &OverlayScene<'_>) -> RgbaImage {
        let mut layer = OverlayLayer::new(scene.width, scene.height);
        layer.update(scene);
        layer.image
    }

    fn scene<'a>(drawing: &'a DrawingSession, selection: Option<&'a Selection>) -> OverlayScene<'a> {
        OverlayScene {
            width: 100,
            height: 100,
            tool: Tool::Rectangle,
            selection,
            drawing,
            cursor: None,
            brush: BrushSettings::default(),
            stamp: None,
            stamp_settings: StampSettings::default(),
        }
    }

    #[test]
    fn empty_scene_is_transparent() {
        let drawing = DrawingSession::default();
        let layer = render(&scene(&drawing, None));
        assert!(layer.pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn rectangle_has_border_and_translucent_fill() {
        let drawing = DrawingSession::default();
        let selection = Selection::Rectangle {
            rect: ImageRect::new(20.0, 20.0, 40.0, 40.0),
        };
        let layer = render(&scene(&drawing, Some(&selection)));
        let inside = layer.get_pixel(40, 40);
        assert_eq!(&SELECTION_FILL, inside);
        assert!(layer.get_pixel(20, 40)[3] > inside[3]);
        assert!(layer.get_pixel(19, 40)[3] > 0);
        assert_eq!(0, layer.get_pixel(17, 40)[3]);
        assert_eq!(0, layer.get_pixel(5, 5)[3]);
    }

    #[test]
    fn freehand_closes_only_once_committed() {
        let points = vec![pos2(10.0, 10.0), pos2(60.0, 10.0), pos2(10.0, 60.0)];
        let tracing = DrawingSession {
            is_drawing: true,
            current_points: points.clone(),
            ..Default::default()
        };
        let mut open = scene(&tracing, None);
        open.tool = Tool::Freehand;
        // Just left of the segment from the last point back to the first.
        assert_eq!(0, render(&open).get_pixel(9, 35)[3]);

        let idle = DrawingSession::default();
        let selection = Selection::Freehand { points };
        let mut closed = scene(&idle, Some(&selection));
        closed.tool = Tool::Freehand;
        assert!(render(&closed).get_pixel(9, 35)[3] > 0);
    }

    #[test]
    fn eraser_ring_hidden_while_drawing() {
        let idle = DrawingSession::default();
        let mut eraser = scene(&idle, None);
        eraser.tool = Tool::Eraser;
        eraser.cursor = Some(pos2(50.0, 50.0));
        let layer = render(&eraser);
        assert!(layer.pixels().any(|p| p[3] > 0));
        assert_eq!(0, layer.get_pixel(50, 50)[3]);

        let active = DrawingSession {
            is_drawing: true,
            ..Default::default()
        };
        let mut drawing = scene(&active, None);
        drawing.tool = Tool::Eraser;
        drawing.cursor = Some(pos2(50.0, 50.0));
        assert!(render(&drawing).pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn stamp_preview_is_translucent() {
        let idle = DrawingSession::default();
        let stamp: StampSource = Arc::new(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let mut preview = scene(&idle, None);
        preview.tool = Tool::Stamp;
        preview.stamp = Some(&stamp);
        preview.cursor = Some(pos2(50.0, 50.0));
        let layer = render(&preview);
        assert_eq!(&Rgba([255, 0, 0, 153]), layer.get_pixel(50, 50));
    }

    #[test]
    fn hover_repaints_only_around_the_cursor() {
        let idle = DrawingSession::default();
        let selection = Selection::Rectangle {
            rect: ImageRect::new(100.0, 100.0, 2900.0, 2400.0),
        };
        let mut hover = OverlayScene {
            width: 4000,
            height: 3000,
            tool: Tool::Eraser,
            cursor: Some(pos2(500.0, 500.0)),
            ..scene(&idle, Some(&selection))
        };
        let mut layer = OverlayLayer::new(4000, 3000);
        assert_eq!(Some(PixelBox::full(4000, 3000)), layer.update(&hover));
        assert_eq!(None, layer.update(&hover));

        hover.cursor = Some(pos2(520.0, 510.0));
        let dirty = layer.update(&hover).unwrap();
        // Old and new ring of a 40px brush.
        assert!(dirty.w <= 70 && dirty.h <= 60, "{dirty:?}");
        assert!(dirty.contains(500, 500) && dirty.contains(520, 510));
    }

    #[test]
    fn partial_repaints_match_a_full_render() {
        let idle = DrawingSession::default();
        let selection = Selection::Rectangle {
            rect: ImageRect::new(20.0, 30.0, 120.0, 90.0),
        };
        let stamp: StampSource = Arc::new(RgbaImage::from_pixel(12, 8, Rgba([0, 0, 255, 255])));
        let mut current = OverlayScene {
            width: 200,
            height: 160,
            tool: Tool::Eraser,
            cursor: Some(pos2(18.0, 30.0)),
            stamp: Some(&stamp),
            ..scene(&idle, Some(&selection))
        };
        let mut layer = OverlayLayer::new(200, 160);
        layer.update(&current);
        for (x, y) in [(25.0, 28.0), (70.0, 60.0), (139.0, 119.0), (190.0, 5.0)] {
            current.cursor = Some(pos2(x, y));
            layer.update(&current);
            assert_eq!(&render(&current), layer.image(), "cursor at {x},{y}");
        }
        current.tool = Tool::Stamp;
        layer.update(&current);
        assert_eq!(&render(&current), layer.image());
        current.cursor = None;
        layer.update(&current);
        assert_eq!(&render(&current), layer.image());
    }

    #[test]
    fn stroke_width_grows_with_image() {
        assert_eq!(1.0, stroke_width(100));
        assert_eq!(8.0, stroke_width(2000));
    }
}
