use crate::{
    geometry::{distance_to_segment, ImageRect, PixelBox, Point},
    selection::Selection,
};

/// Vertical samples per pixel row when scan converting polygons.
const SUBSAMPLES: usize = 4;

/// Anti-aliased per pixel coverage in `0.0..=1.0` for a region of a raster.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageMask {
    region: PixelBox,
    values: Vec<f32>,
}

impl CoverageMask {
    pub fn empty(region: PixelBox) -> Self {
        Self {
            region,
            values: vec![0.0; region.area()],
        }
    }

    /// Coverage of the closed polygon through `points` using the nonzero winding rule.
    /// Points are in raster coordinates, the mask only spans `region`.
    pub fn polygon(points: &[Point], region: PixelBox) -> Self {
        let mut mask = Self::empty(region);
        if points.len() < 3 || region.is_empty() {
            return mask;
        }
        let weight = 1.0 / SUBSAMPLES as f32;
        let mut crossings: Vec<(f32, i32)> = Vec::new();

        for row in 0..region.h {
            let line = &mut mask.values
                [row as usize * region.w as usize..(row as usize + 1) * region.w as usize];
            for sample in 0..SUBSAMPLES {
                let y = (region.y + row) as f32 + (sample as f32 + 0.5) / SUBSAMPLES as f32;
                crossings.clear();
                for (a, b) in points.iter().zip(points.iter().cycle().skip(1)) {
                    let direction = if a.y <= y && b.y > y {
                        1
                    } else if b.y <= y && a.y > y {
                        -1
                    } else {
                        continue;
                    };
                    let t = (y - a.y) / (b.y - a.y);
                    let x = a.x + t * (b.x - a.x) - region.x as f32;
                    crossings.push((x, direction));
                }
                crossings.sort_by(|a, b| a.0.total_cmp(&b.0));

                let mut winding = 0;
                for pair in crossings.windows(2) {
                    winding += pair[0].1;
                    if winding != 0 {
                        add_span(line, pair[0].0, pair[1].0, weight);
                    }
                }
            }
        }
        mask.values.iter_mut().for_each(|v| *v = v.min(1.0));
        mask
    }

    pub fn for_selection(selection: &Selection, region: PixelBox) -> Self {
        Self::polygon(&selection.outline(), region)
    }

    /// Coverage of a stroked polyline with round joins and caps.
    pub fn stroke(points: &[Point], closed: bool, width: f32, region: PixelBox) -> Self {
        let mut mask = Self::empty(region);
        let half = width / 2.0;
        let segments: Vec<(Point, Point)> = match points {
            [] => Vec::new(),
            [single] => vec![(*single, *single)],
            _ if closed => points
                .iter()
                .copied()
                .zip(points.iter().copied().cycle().skip(1))
                .collect(),
            _ => points.windows(2).map(|w| (w[0], w[1])).collect(),
        };
        for (a, b) in segments {
            let Some(bounds) = ImageRect::bounding(&[a, b]) else {
                continue;
            };
            let Some(local) = bounds
                .expand(half + 1.0)
                .pixel_box(region.x + region.w, region.y + region.h)
            else {
                continue;
            };
            for y in local.y.max(region.y)..local.y + local.h {
                for x in local.x.max(region.x)..local.x + local.w {
                    let center = Point::new(x as f32 + 0.5, y as f32 + 0.5);
                    let coverage = (half - distance_to_segment(center, a, b) + 0.5).clamp(0.0, 1.0);
                    if coverage > 0.0 {
                        let value = mask.value_mut(x, y);
                        *value = value.max(coverage);
                    }
                }
            }
        }
        mask
    }

    /// Coverage at raster coordinates, zero outside the region.
    pub fn at(&self, x: u32, y: u32) -> f32 {
        if !self.region.contains(x, y) {
            return 0.0;
        }
        self.values[self.index(x, y)]
    }

    /// Raster coordinates and coverage of every touched pixel.
    pub fn covered(&self) -> impl Iterator<Item = (u32, u32, f32)> + '_ {
        let region = self.region;
        self.values
            .iter()
            .enumerate()
            .filter(|(_, v)| **v > 0.0)
            .map(move |(i, v)| {
                let i = i as u32;
                (region.x + i % region.w, region.y + i / region.w, *v)
            })
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y - self.region.y) as usize * self.region.w as usize + (x - self.region.x) as usize
    }

    fn value_mut(&mut self, x: u32, y: u32) -> &mut f32 {
        let index = self.index(x, y);
        &mut self.values[index]
    }
}

/// Adds the exact horizontal overlap of `[x0, x1)` with each pixel of `line`.
fn add_span(line: &mut [f32], x0: f32, x1: f32, weight: f32) {
    let width = line.len() as f32;
    let x0 = x0.clamp(0.0, width);
    let x1 = x1.clamp(0.0, width);
    if x1 <= x0 {
        return;
    }
    let first = x0.floor() as usize;
    let last = (x1.ceil() as usize).min(line.len());
    for (px, value) in line.iter_mut().enumerate().take(last).skip(first) {
        let left = (px as f32).max(x0);
        let right = ((px + 1) as f32).min(x1);
        if right > left {
            *value += (right - left) * weight;
        }
    }
}

#[cfg(test)]
mod tests {
    use emath::pos2;

    use super::*;

    #[test]
    fn axis_aligned_square_is_fully_covered() {
        let square = [
            pos2(2.0, 2.0),
            pos2(6.0, 2.0),
            pos2(6.0, 6.0),
            pos2(2.0, 6.0),
        ];
        let mask = CoverageMask::polygon(&square, PixelBox::full(8, 8));
        assert_eq!(1.0, mask.at(2, 2));
        assert_eq!(1.0, mask.at(5, 5));
        assert_eq!(0.0, mask.at(1, 3));
        assert_eq!(0.0, mask.at(6, 3));
        assert_eq!(16, mask.covered().count());
    }

    #[test]
    fn half_pixel_edge_is_half_covered() {
        let rect = [
            pos2(0.0, 0.0),
            pos2(2.5, 0.0),
            pos2(2.5, 1.0),
            pos2(0.0, 1.0),
        ];
        let mask = CoverageMask::polygon(&rect, PixelBox::full(4, 1));
        assert!((mask.at(2, 0) - 0.5).abs() < 1e-6);
        assert_eq!(0.0, mask.at(3, 0));
    }

    #[test]
    fn region_offsets_are_respected() {
        let triangle = [pos2(10.0, 10.0), pos2(20.0, 10.0), pos2(10.0, 20.0)];
        let mask = CoverageMask::polygon(&triangle, PixelBox::new(10, 10, 10, 10));
        assert_eq!(1.0, mask.at(11, 11));
        assert_eq!(0.0, mask.at(19, 19));
        assert_eq!(0.0, mask.at(0, 0));
    }

    #[test]
    fn stroke_covers_line_neighbourhood() {
        let mask = CoverageMask::stroke(
            &[pos2(0.0, 5.5), pos2(10.0, 5.5)],
            false,
            3.0,
            PixelBox::full(12, 12),
        );
        assert_eq!(1.0, mask.at(4, 5));
        assert_eq!(1.0, mask.at(4, 4));
        assert_eq!(0.0, mask.at(4, 9));
    }
}
