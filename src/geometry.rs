use emath::{Pos2, Rect, Vec2};
use itertools::Itertools;

/// A position in the natural pixel space of the edited image.
pub type Point = Pos2;

/// Axis aligned rectangle in natural pixel space.
///
/// Unlike [`emath::Rect`] this keeps the origin/size representation used by
/// selections, so a rectangle under construction can be normalised from two
/// arbitrary corners.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct ImageRect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl ImageRect {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// Rectangle spanned by a drag from `anchor` to `current`.
    /// Negative deltas move the origin so that `w` and `h` stay positive.
    pub fn from_corners(anchor: Point, current: Point) -> Self {
        let w = current.x - anchor.x;
        let h = current.y - anchor.y;
        Self {
            x: if w < 0.0 { anchor.x + w } else { anchor.x },
            y: if h < 0.0 { anchor.y + h } else { anchor.y },
            w: w.abs(),
            h: h.abs(),
        }
    }

    /// Smallest rectangle containing all points, `None` for an empty slice.
    pub fn bounding(points: &[Point]) -> Option<Self> {
        let (min_x, max_x) = points
            .iter()
            .map(|p| p.x)
            .minmax_by(|a, b| a.total_cmp(b))
            .into_option()?;
        let (min_y, max_y) = points
            .iter()
            .map(|p| p.y)
            .minmax_by(|a, b| a.total_cmp(b))
            .into_option()?;
        Some(Self::new(min_x, min_y, max_x - min_x, max_y - min_y))
    }

    pub fn has_area(&self) -> bool {
        self.w > 0.0 && self.h > 0.0
    }

    pub fn expand(&self, margin: f32) -> Self {
        Self::new(
            self.x - margin,
            self.y - margin,
            self.w + 2.0 * margin,
            self.h + 2.0 * margin,
        )
    }

    /// Corners in clockwise order starting top-left.
    pub fn corners(&self) -> [Point; 4] {
        [
            Pos2::new(self.x, self.y),
            Pos2::new(self.x + self.w, self.y),
            Pos2::new(self.x + self.w, self.y + self.h),
            Pos2::new(self.x, self.y + self.h),
        ]
    }

    /// Whole pixels touched by this rectangle, clipped to a `width`x`height` raster.
    pub fn pixel_box(&self, width: u32, height: u32) -> Option<PixelBox> {
        let x0 = self.x.floor().max(0.0);
        let y0 = self.y.floor().max(0.0);
        let x1 = (self.x + self.w).ceil().min(width as f32);
        let y1 = (self.y + self.h).ceil().min(height as f32);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(PixelBox {
            x: x0 as u32,
            y: y0 as u32,
            w: (x1 - x0) as u32,
            h: (y1 - y0) as u32,
        })
    }
}

/// Pixel aligned region of a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PixelBox {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl PixelBox {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    pub fn area(&self) -> usize {
        self.w as usize * self.h as usize
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && x - self.x < self.w && y - self.y < self.h
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &PixelBox) -> PixelBox {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = (self.x + self.w).max(other.x + other.w);
        let bottom = (self.y + self.h).max(other.y + other.h);
        PixelBox::new(x, y, right - x, bottom - y)
    }

    pub fn intersect(&self, other: &PixelBox) -> Option<PixelBox> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = (self.x + self.w).min(other.x + other.w);
        let bottom = (self.y + self.h).min(other.y + other.h);
        (right > x && bottom > y).then(|| PixelBox::new(x, y, right - x, bottom - y))
    }
}

/// Input positions in screen space, as delivered by the windowing layer.
#[derive(Debug, Clone, Copy)]
pub enum PointerInput<'a> {
    Mouse(Pos2),
    /// Active touches; only the first one drives the tools.
    Touch(&'a [Pos2]),
}

/// Where the canvas is shown on screen and how large its raster is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasGeometry {
    /// Bounding box of the displayed canvas in screen coordinates.
    pub displayed: Rect,
    /// Natural size of the raster in pixels.
    pub natural: Vec2,
}

impl CanvasGeometry {
    pub fn new(displayed: Rect, natural: Vec2) -> Self {
        Self { displayed, natural }
    }

    /// Letterboxes a raster of `natural` size into `available`, keeping its aspect ratio.
    pub fn fit(available: Rect, natural: Vec2) -> Self {
        let size = available.size();
        let fit_scale = (size.x / natural.x).min(size.y / natural.y);
        let displayed_size = if fit_scale.is_finite() && fit_scale > 0.0 {
            natural * fit_scale
        } else {
            Vec2::ZERO
        };
        Self {
            displayed: Rect::from_center_size(available.center(), displayed_size),
            natural,
        }
    }

    /// Screen-to-image scale, `None` while the canvas has no visible area.
    fn scale(&self) -> Option<Vec2> {
        let size = self.displayed.size();
        (size.x > 0.0 && size.y > 0.0).then(|| self.natural / size)
    }

    /// Maps a pointer position to natural pixel space.
    pub fn to_image(&self, input: PointerInput<'_>) -> Option<Point> {
        let client = match input {
            PointerInput::Mouse(pos) => pos,
            PointerInput::Touch(touches) => *touches.first()?,
        };
        let local = client - self.displayed.min;
        Some((local * self.scale()?).to_pos2())
    }
}

/// Maps a pointer event if the canvas is currently laid out; events arriving
/// before the first layout are dropped.
pub fn map_pointer(geometry: Option<&CanvasGeometry>, input: PointerInput<'_>) -> Option<Point> {
    geometry?.to_image(input)
}

/// Distance from `p` to the segment `a`-`b`; a zero length segment is a point.
pub fn distance_to_segment(p: Point, a: Point, b: Point) -> f32 {
    let ab = b - a;
    let len_sq = ab.length_sq();
    let t = if len_sq > 0.0 {
        ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    (p - (a + ab * t)).length()
}
